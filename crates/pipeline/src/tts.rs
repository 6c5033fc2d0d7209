//! Streaming TTS sink: pulls sentences off a bounded
//! queue, synthesizes each through a [`TextToSpeech`] backend, resamples,
//! fades, repacketizes into 20ms μ-law frames, and pushes them through a
//! [`MediaSink`] under interrupt control.
//!
//! Fade-in applies to the very first audio chunk of a turn. Fade-out is
//! trickier: it must land on the genuinely last chunk of the genuinely last
//! sentence, but the sink can't know a chunk is "last" until it has already
//! pulled the *next* one. So the sink buffers exactly one chunk of
//! lookahead — and only while processing the sentence the producer marked
//! `is_last` — trading one chunk of latency on the final sentence only, not
//! on every sentence.

use futures::StreamExt;
use tokio::sync::mpsc;

use voice_agent_config::constants::audio as audio_cfg;
use voice_agent_core::{audio, Error, MediaSink, TextToSpeech};

/// One unit of work for the TTS sink: a sentence of text, flagged by the
/// response shaper as the turn's final sentence or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsQueueItem {
    Sentence { text: String, is_last: bool },
}

/// Run the sink until the queue closes or an interrupt lands. Returns
/// `true` if the turn finished naturally (queue drained, no interrupt).
pub async fn run(
    mut queue: mpsc::Receiver<TtsQueueItem>,
    tts: &dyn TextToSpeech,
    sink: &dyn MediaSink,
    voice: &str,
    resampler_state: &mut audio::ResamplerState,
) -> Result<bool, Error> {
    sink.set_agent_speaking(true);
    let mut first_chunk_of_turn = true;

    while let Some(item) = queue.recv().await {
        if sink.is_interrupted() {
            sink.set_agent_speaking(false);
            return Ok(false);
        }

        let TtsQueueItem::Sentence { text, is_last } = item;
        let interrupted = speak_sentence(
            &text,
            is_last,
            tts,
            sink,
            voice,
            resampler_state,
            &mut first_chunk_of_turn,
        )
        .await?;
        if interrupted {
            sink.set_agent_speaking(false);
            return Ok(false);
        }
    }

    sink.set_agent_speaking(false);
    Ok(true)
}

/// Synthesize and play one sentence. Returns `true` if an interrupt cut it
/// short.
async fn speak_sentence(
    text: &str,
    is_last: bool,
    tts: &dyn TextToSpeech,
    sink: &dyn MediaSink,
    voice: &str,
    resampler_state: &mut audio::ResamplerState,
    first_chunk_of_turn: &mut bool,
) -> Result<bool, Error> {
    let mut stream = tts.synthesize(text, voice).await?;

    // Only the final sentence buffers one chunk of lookahead, so fade-out
    // can be applied to the actual last chunk without delaying every chunk
    // of every other sentence in the turn.
    let mut lookahead: Option<Vec<u8>> = None;

    loop {
        let next = stream.next().await;
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(e),
            None => break,
        };

        let resampled = audio::resample(
            &chunk.pcm16,
            chunk.sample_rate_hz,
            audio_cfg::TELEPHONY_SAMPLE_RATE_HZ,
            resampler_state,
        );

        if !is_last {
            if emit_pcm(&resampled, first_chunk_of_turn, false, sink).await? {
                return Ok(true);
            }
            continue;
        }

        if let Some(prev) = lookahead.take() {
            if emit_pcm(&prev, first_chunk_of_turn, false, sink).await? {
                return Ok(true);
            }
        }
        lookahead = Some(resampled);
    }

    if let Some(last) = lookahead {
        if emit_pcm(&last, first_chunk_of_turn, is_last, sink).await? {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Apply fades (if applicable), μ-law encode, repacketize and send. Returns
/// `true` if the sink refused a frame (interrupt/stream_id drift).
async fn emit_pcm(
    pcm: &[u8],
    first_chunk_of_turn: &mut bool,
    apply_fade_out: bool,
    sink: &dyn MediaSink,
) -> Result<bool, Error> {
    let mut samples = audio::pcm16_bytes_to_samples(pcm);
    if *first_chunk_of_turn {
        audio::fade_in(&mut samples);
        *first_chunk_of_turn = false;
    }
    if apply_fade_out {
        audio::fade_out(&mut samples);
    }
    let pcm = audio::samples_to_pcm16_bytes(&samples);
    let ulaw = audio::pcm16_to_ulaw(&pcm);

    for frame in audio::to_frames(&ulaw) {
        if sink.is_interrupted() {
            return Ok(true);
        }
        let accepted = sink.send_frame(frame).await?;
        if !accepted {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use voice_agent_core::TtsChunk;

    struct FakeTts {
        chunks_per_call: Vec<i16>,
    }

    #[async_trait]
    impl TextToSpeech for FakeTts {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
        ) -> Result<futures::stream::BoxStream<'static, Result<TtsChunk, Error>>, Error> {
            let samples = self.chunks_per_call.clone();
            let chunks: Vec<Result<TtsChunk, Error>> = samples
                .into_iter()
                .map(|amplitude| {
                    Ok(TtsChunk {
                        pcm16: audio::samples_to_pcm16_bytes(&vec![amplitude; 400]),
                        sample_rate_hz: 8000,
                    })
                })
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    #[derive(Default)]
    struct FakeSink {
        interrupted: AtomicBool,
        frames_sent: AtomicUsize,
        speaking: Mutex<bool>,
    }

    #[async_trait]
    impl MediaSink for FakeSink {
        async fn send_frame(&self, _frame: [u8; audio::FRAME_BYTES]) -> Result<bool, Error> {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.frames_sent.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn is_interrupted(&self) -> bool {
            self.interrupted.load(Ordering::SeqCst)
        }

        fn set_agent_speaking(&self, speaking: bool) {
            *self.speaking.lock().unwrap() = speaking;
        }
    }

    #[tokio::test]
    async fn plays_sentences_in_order_and_clears_speaking_flag() {
        let tts = FakeTts { chunks_per_call: vec![10000, 10000] };
        let sink = FakeSink::default();
        let (tx, rx) = mpsc::channel(8);
        tx.send(TtsQueueItem::Sentence { text: "Hi.".into(), is_last: false })
            .await
            .unwrap();
        tx.send(TtsQueueItem::Sentence { text: "Bye.".into(), is_last: true })
            .await
            .unwrap();
        drop(tx);

        let mut state = audio::ResamplerState::default();
        let finished = run(rx, &tts, &sink, "default", &mut state).await.unwrap();
        assert!(finished);
        assert!(sink.frames_sent.load(Ordering::SeqCst) > 0);
        assert!(!*sink.speaking.lock().unwrap());
    }

    #[tokio::test]
    async fn interrupt_stops_playback_and_reports_unfinished() {
        let tts = FakeTts { chunks_per_call: vec![10000; 10] };
        let sink = FakeSink::default();
        sink.interrupted.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(8);
        tx.send(TtsQueueItem::Sentence { text: "Hi.".into(), is_last: true })
            .await
            .unwrap();
        drop(tx);

        let mut state = audio::ResamplerState::default();
        let finished = run(rx, &tts, &sink, "default", &mut state).await.unwrap();
        assert!(!finished);
        assert_eq!(sink.frames_sent.load(Ordering::SeqCst), 0);
    }
}
