//! Turn-taking arbiter: decides when a caller's utterance
//! should be treated as complete and handed to the LLM. Pure decision
//! function over an explicit snapshot of buffer/timing state so the agent
//! crate's async orchestrator can call it twice — once immediately on a
//! silence tick, once again after the recheck sleep — without either call
//! needing to know about wall-clock time itself.

use std::time::{Duration, Instant};

use voice_agent_config::constants::turn as cfg;

/// Snapshot of the STT-buffer/timing state relevant to the commit decision.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub buffer: String,
    pub is_final: bool,
    pub last_speech_time: Option<Instant>,
    pub last_interim_time: Option<Instant>,
    pub silence_threshold: Duration,
}

/// Should the current buffer be committed as a completed utterance?
///
/// Three independent paths to commit:
///  1. A `final` STT event was received and the trailing silence gate has
///     elapsed on the *final* timer.
///  2. No `final` ever arrived, but interim silence (500ms) has elapsed and
///     the buffer is non-trivial.
///  3. The hard VAD timeout has elapsed regardless of STT behavior.
pub fn should_commit(input: &TurnInput, now: Instant) -> bool {
    if input.buffer.trim().len() < cfg::MIN_BUFFER_CHARS {
        return false;
    }

    if input.is_final {
        return input
            .last_speech_time
            .map(|t| now.saturating_duration_since(t) >= input.silence_threshold)
            .unwrap_or(false);
    }

    if input.buffer.trim().len() < cfg::DEFAULT_INTERIM_MIN_LENGTH {
        return false;
    }

    let interim_silent = input
        .last_interim_time
        .map(|t| now.saturating_duration_since(t) >= Duration::from_millis(cfg::INTERIM_SILENCE_MS))
        .unwrap_or(false);
    if interim_silent {
        return true;
    }

    input
        .last_speech_time
        .map(|t| now.saturating_duration_since(t) >= Duration::from_millis(cfg::VAD_TIMEOUT_MS))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input(now: Instant) -> TurnInput {
        TurnInput {
            buffer: "hello there".into(),
            is_final: false,
            last_speech_time: Some(now),
            last_interim_time: Some(now),
            silence_threshold: Duration::from_secs_f64(cfg::DEFAULT_SILENCE_THRESHOLD_SEC),
        }
    }

    #[test]
    fn empty_buffer_never_commits() {
        let now = Instant::now();
        let mut input = base_input(now);
        input.buffer = "   ".into();
        assert!(!should_commit(&input, now));
    }

    #[test]
    fn final_event_waits_for_silence_threshold() {
        let t0 = Instant::now();
        let mut input = base_input(t0);
        input.is_final = true;
        input.last_speech_time = Some(t0);

        assert!(!should_commit(&input, t0 + Duration::from_millis(400)));
        assert!(should_commit(&input, t0 + Duration::from_millis(900)));
    }

    #[test]
    fn interim_only_commits_after_interim_silence() {
        let t0 = Instant::now();
        let mut input = base_input(t0);
        input.is_final = false;
        input.last_interim_time = Some(t0);
        input.last_speech_time = Some(t0);

        assert!(!should_commit(&input, t0 + Duration::from_millis(200)));
        assert!(should_commit(&input, t0 + Duration::from_millis(550)));
    }

    #[test]
    fn short_interim_buffer_does_not_commit_on_silence_alone() {
        let t0 = Instant::now();
        let mut input = base_input(t0);
        input.buffer = "hi".into();
        input.last_interim_time = Some(t0);

        assert!(!should_commit(&input, t0 + Duration::from_millis(600)));
    }

    #[test]
    fn hard_vad_timeout_forces_commit() {
        let t0 = Instant::now();
        let mut input = base_input(t0);
        input.last_interim_time = Some(t0 + Duration::from_millis(400));
        input.last_speech_time = Some(t0);

        assert!(should_commit(&input, t0 + Duration::from_millis(2100)));
    }
}
