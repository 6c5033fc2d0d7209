//! The adaptive-baseline barge-in detector. Pure state +
//! pure evaluation function — no I/O, no timers — so it can be driven
//! deterministically from tests and from the real per-frame ingress loop
//! alike.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use voice_agent_config::constants::interrupt as cfg;

/// Tunable thresholds; defaults match the mid-range recommendation for
/// telephony-grade μ-law audio.
#[derive(Debug, Clone)]
pub struct BargeInConfig {
    pub enabled: bool,
    pub baseline_factor: f64,
    pub min_energy: u32,
    pub min_speech_ms: u64,
    pub debounce_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_factor: cfg::DEFAULT_BASELINE_FACTOR,
            min_energy: cfg::DEFAULT_MIN_ENERGY,
            min_speech_ms: cfg::DEFAULT_MIN_SPEECH_MS,
            debounce_ms: cfg::DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// The barge-in-relevant subset of a media session's fields.
#[derive(Debug, Clone)]
pub struct BargeInState {
    pub baseline_energy: f64,
    background_samples: VecDeque<u32>,
    speech_energy_buffer: VecDeque<u32>,
    speech_start_time: Option<Instant>,
    last_interrupt_time: Option<Instant>,
}

impl Default for BargeInState {
    fn default() -> Self {
        Self {
            baseline_energy: 0.0,
            background_samples: VecDeque::with_capacity(cfg::BACKGROUND_WINDOW),
            speech_energy_buffer: VecDeque::with_capacity(cfg::SPEECH_ENERGY_WINDOW),
            speech_start_time: None,
            last_interrupt_time: None,
        }
    }
}

fn median(samples: &VecDeque<u32>) -> f64 {
    let mut v: Vec<u32> = samples.iter().copied().collect();
    v.sort_unstable();
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] as f64 + v[mid] as f64) / 2.0
    } else {
        v[mid] as f64
    }
}

impl BargeInState {
    /// Update the adaptive ambient-noise baseline from a frame observed
    /// while the agent is *not* speaking.
    pub fn update_baseline(&mut self, energy: u32) {
        let cap = (cfg::BACKGROUND_CAP_FACTOR * self.baseline_energy)
            .max(cfg::BACKGROUND_CAP_FLOOR as f64);
        if (energy as f64) >= cap {
            return;
        }
        if self.background_samples.len() >= cfg::BACKGROUND_WINDOW {
            self.background_samples.pop_front();
        }
        self.background_samples.push_back(energy);

        if self.background_samples.len() >= cfg::BACKGROUND_MIN_SAMPLES {
            let old = self.baseline_energy;
            let sample_median = median(&self.background_samples);
            self.baseline_energy = 0.7 * old + 0.3 * sample_median;
        }
    }
}

/// Outcome of evaluating one ingress frame against the barge-in detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeInOutcome {
    /// Nothing to do: either the agent isn't speaking, or the frame hasn't
    /// crossed a threshold yet.
    NoAction,
    /// Fire the interrupt now.
    Interrupt,
}

/// Evaluate one ingress frame. `agent_speaking` and `already_interrupted`
/// gate the whole detector: while the agent is not speaking this must
/// never return `Interrupt`.
pub fn evaluate(
    config: &BargeInConfig,
    state: &mut BargeInState,
    energy: u32,
    agent_speaking: bool,
    already_interrupted: bool,
    now: Instant,
) -> BargeInOutcome {
    if !agent_speaking {
        state.update_baseline(energy);
        return BargeInOutcome::NoAction;
    }

    if !config.enabled || already_interrupted {
        return BargeInOutcome::NoAction;
    }

    let threshold = (state.baseline_energy * config.baseline_factor).max(config.min_energy as f64);

    if energy as f64 <= threshold {
        state.speech_energy_buffer.clear();
        state.speech_start_time = None;
        return BargeInOutcome::NoAction;
    }

    if state.speech_energy_buffer.len() >= cfg::SPEECH_ENERGY_WINDOW {
        state.speech_energy_buffer.pop_front();
    }
    state.speech_energy_buffer.push_back(energy);

    let over_threshold = state
        .speech_energy_buffer
        .iter()
        .filter(|&&e| e as f64 > threshold)
        .count();
    if over_threshold < cfg::SPEECH_ENERGY_MIN_OVER_THRESHOLD {
        return BargeInOutcome::NoAction;
    }

    if state.speech_start_time.is_none() {
        state.speech_start_time = Some(now);
    }
    let Some(speech_start) = state.speech_start_time else {
        return BargeInOutcome::NoAction;
    };

    let speech_elapsed = now.saturating_duration_since(speech_start);
    if speech_elapsed < Duration::from_millis(config.min_speech_ms) {
        return BargeInOutcome::NoAction;
    }

    let debounced = state
        .last_interrupt_time
        .map(|t| now.saturating_duration_since(t) >= Duration::from_millis(config.debounce_ms))
        .unwrap_or(true);
    if !debounced {
        return BargeInOutcome::NoAction;
    }

    state.last_interrupt_time = Some(now);
    state.speech_energy_buffer.clear();
    state.speech_start_time = None;
    BargeInOutcome::Interrupt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_1_no_interrupt_while_agent_silent() {
        let config = BargeInConfig::default();
        let mut state = BargeInState::default();
        let now = Instant::now();
        for energy in [100, 5000, 20000, 50] {
            let outcome = evaluate(&config, &mut state, energy, false, false, now);
            assert_eq!(outcome, BargeInOutcome::NoAction);
        }
    }

    #[test]
    fn scenario_s3_barge_in_fires_within_window() {
        // baseline=300, factor=2.0, min_energy=500 -> threshold=600.
        // Three frames at energy=1500 spanning 150ms should fire exactly once.
        let config = BargeInConfig {
            enabled: true,
            baseline_factor: 2.0,
            min_energy: 500,
            min_speech_ms: 100,
            debounce_ms: 300,
        };
        let mut state = BargeInState::default();
        state.baseline_energy = 300.0;

        let t0 = Instant::now();
        let mut fired = None;
        for (i, offset_ms) in [0u64, 75, 150].into_iter().enumerate() {
            let now = t0 + Duration::from_millis(offset_ms);
            let outcome = evaluate(&config, &mut state, 1500, true, false, now);
            if outcome == BargeInOutcome::Interrupt {
                fired = Some(i);
            }
        }
        assert_eq!(fired, Some(2));
    }

    #[test]
    fn debounce_prevents_immediate_refire() {
        let config = BargeInConfig {
            min_speech_ms: 0,
            debounce_ms: 300,
            ..BargeInConfig::default()
        };
        let mut state = BargeInState::default();
        state.baseline_energy = 100.0;
        let t0 = Instant::now();

        // First burst fires.
        evaluate(&config, &mut state, 5000, true, false, t0);
        let first = evaluate(&config, &mut state, 5000, true, false, t0 + Duration::from_millis(1));
        assert_eq!(first, BargeInOutcome::Interrupt);

        // Immediately after, even with sustained energy, debounce blocks a refire.
        evaluate(&config, &mut state, 5000, true, false, t0 + Duration::from_millis(10));
        let second = evaluate(&config, &mut state, 5000, true, false, t0 + Duration::from_millis(20));
        assert_eq!(second, BargeInOutcome::NoAction);
    }

    #[test]
    fn invariant_4_baseline_update_is_smoothed() {
        let mut state = BargeInState::default();
        for _ in 0..cfg::BACKGROUND_MIN_SAMPLES {
            state.update_baseline(200);
        }
        let before = state.baseline_energy;
        state.update_baseline(200);
        let after = state.baseline_energy;
        // |new - old| <= 0.3 * |sample - old|
        assert!((after - before).abs() <= 0.3 * (200.0 - before).abs() + 1e-6);
    }
}
