//! Turns raw LLM token output into spoken sentences: strips markdown the model might emit, segments on
//! sentence boundaries as soon as they appear in the streaming token text,
//! and caps a single turn at [`cfg::MAX_SENTENCES_PER_TURN`] sentences so a
//! runaway generation can't monopolize the call.

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_agent_config::constants::timeouts as cfg;
use voice_agent_core::Error;

use crate::tts::TtsQueueItem;

fn markdown_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"```[\s\S]*?```").unwrap(), ""),
            (Regex::new(r"`([^`]*)`").unwrap(), "$1"),
            (Regex::new(r"\*\*([^*]+)\*\*").unwrap(), "$1"),
            (Regex::new(r"__([^_]+)__").unwrap(), "$1"),
            (Regex::new(r"\*([^*]+)\*").unwrap(), "$1"),
            (Regex::new(r"_([^_]+)_").unwrap(), "$1"),
            (Regex::new(r"~~([^~]+)~~").unwrap(), "$1"),
            (Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap(), "$1"),
            (Regex::new(r"(?m)^#{1,6}\s*").unwrap(), ""),
            (Regex::new(r"(?m)^[\-\*\+]\s+").unwrap(), ""),
        ]
    })
}

/// Strip the markdown constructs an LLM tends to emit even when told not to.
pub fn strip_markdown(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in markdown_patterns() {
        out = re.replace_all(&out, *replacement).to_string();
    }
    out
}

/// Split `text` into sentences on `.`/`?`/`!`, keeping the terminator and
/// trimming surrounding whitespace. The final fragment (no terminator yet)
/// is returned separately as the new pending remainder.
pub fn split_sentences(text: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '?' | '!') {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    (sentences, current)
}

/// Drive token-by-token shaping: accumulate tokens, emit a [`TtsQueueItem`]
/// per completed sentence, and stop at the turn's sentence cap. Returns the
/// number of sentences emitted. Dropping `tokens` (by returning) signals the
/// LLM backend to stop generating further tokens.
pub async fn run(
    mut tokens: mpsc::Receiver<String>,
    out: mpsc::Sender<TtsQueueItem>,
    cancel: CancellationToken,
) -> Result<usize, Error> {
    let mut pending = String::new();
    let mut emitted = 0usize;
    let started_at = Instant::now();

    while emitted < cfg::MAX_SENTENCES_PER_TURN {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(emitted);
            }
            token = tokens.recv() => {
                let Some(token) = token else { break };
                pending.push_str(&token);
                let (sentences, remainder) = split_sentences(&pending);
                pending = remainder;

                for sentence in sentences {
                    let cleaned = strip_markdown(&sentence);
                    if cleaned.trim().is_empty() {
                        continue;
                    }
                    emitted += 1;
                    let is_last_by_cap = emitted == cfg::MAX_SENTENCES_PER_TURN;
                    let item = TtsQueueItem::Sentence {
                        text: cleaned,
                        is_last: is_last_by_cap,
                    };
                    let send = tokio::time::timeout(cfg::TTS_QUEUE_PUT, out.send(item));
                    if send.await.is_err() {
                        return Ok(emitted);
                    }
                    if emitted == 1 {
                        metrics::histogram!("voice_agent_turn_to_first_sentence_seconds")
                            .record(started_at.elapsed().as_secs_f64());
                    }
                    if emitted >= cfg::MAX_SENTENCES_PER_TURN {
                        break;
                    }
                }
            }
        }
    }

    if emitted >= cfg::MAX_SENTENCES_PER_TURN {
        return Ok(emitted);
    }

    // Stream ended (or was cancelled) with a trailing fragment that never
    // hit a terminator; speak it anyway as the turn's final sentence.
    let cleaned = strip_markdown(&pending);
    if !cleaned.trim().is_empty() {
        let is_first = emitted == 0;
        emitted += 1;
        let item = TtsQueueItem::Sentence {
            text: cleaned,
            is_last: true,
        };
        let _ = tokio::time::timeout(cfg::TTS_QUEUE_PUT, out.send(item)).await;
        if is_first {
            metrics::histogram!("voice_agent_turn_to_first_sentence_seconds")
                .record(started_at.elapsed().as_secs_f64());
        }
    }

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn strips_common_markdown() {
        let out = strip_markdown("**Hello** _there_, check `this` out: [link](http://x)");
        assert_eq!(out, "Hello there, check this out: link");
    }

    #[test]
    fn strips_headers_and_bullets() {
        let out = strip_markdown("# Title\n- item one\n- item two");
        assert_eq!(out, "Title\nitem one\nitem two");
    }

    #[test]
    fn splits_on_terminal_punctuation_and_keeps_remainder() {
        let (sentences, remainder) = split_sentences("Hi there. How are you? I am fine");
        assert_eq!(sentences, vec!["Hi there.", "How are you?"]);
        assert_eq!(remainder, " I am fine");
    }

    #[tokio::test]
    async fn emits_one_sentence_per_boundary() {
        let (tx, rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(rx, out_tx, cancel));
        for token in ["Hello", " there", ".", " Bye", "."] {
            tx.send(token.to_string()).await.unwrap();
        }
        drop(tx);

        let first = out_rx.recv().await.unwrap();
        assert_eq!(
            first,
            TtsQueueItem::Sentence { text: "Hello there.".into(), is_last: false }
        );
        let second = out_rx.recv().await.unwrap();
        assert_eq!(
            second,
            TtsQueueItem::Sentence { text: "Bye.".into(), is_last: true }
        );
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn sentence_cap_truncates_and_drops_receiver() {
        let (tx, rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        for i in 0..(cfg::MAX_SENTENCES_PER_TURN + 5) {
            tx.try_send(format!("Sentence {i}.")).unwrap();
        }
        drop(tx);

        let emitted = run(rx, out_tx, cancel).await.unwrap();
        assert_eq!(emitted, cfg::MAX_SENTENCES_PER_TURN);

        let mut count = 0;
        while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(50), out_rx.recv()).await {
            if let TtsQueueItem::Sentence { is_last, .. } = item {
                count += 1;
                if count == cfg::MAX_SENTENCES_PER_TURN {
                    assert!(is_last);
                }
            }
        }
        assert_eq!(count, cfg::MAX_SENTENCES_PER_TURN);
    }

    #[tokio::test]
    async fn cancellation_stops_shaping_immediately() {
        let (_tx, rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let emitted = run(rx, out_tx, cancel).await.unwrap();
        assert_eq!(emitted, 0);
    }
}
