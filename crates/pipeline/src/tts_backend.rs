//! An ElevenLabs-compatible streaming TTS backend: POSTs text to the
//! voice-specific streaming endpoint and turns the raw PCM byte stream into
//! fixed-size [`TtsChunk`]s.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use voice_agent_core::{Error as CoreError, TextToSpeech, TtsChunk};

/// PCM16 output sample rate ElevenLabs' `pcm_16000` output format produces.
const OUTPUT_SAMPLE_RATE_HZ: u32 = 16000;
/// Re-chunk the raw byte stream on this boundary so every [`TtsChunk`] holds
/// a whole number of PCM16 samples.
const CHUNK_BYTES: usize = 3200;

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io/v1/text-to-speech".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Clone)]
pub struct ElevenLabsTts {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsTts {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<TtsChunk, CoreError>>, CoreError> {
        let url = format!("{}/{voice}/stream?output_format=pcm_16000", self.config.endpoint);
        let body = SynthesizeRequest {
            text,
            model_id: "eleven_turbo_v2",
            voice_settings: VoiceSettings { stability: 0.4, similarity_boost: 0.8 },
        };

        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TransientExternal(format!("tts request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::TransientExternal(format!("tts returned {status}: {text}")));
        }

        let byte_stream = response.bytes_stream();
        let chunk_stream = stream::unfold(
            (byte_stream, Vec::<u8>::new(), false),
            move |(mut byte_stream, mut carry, done)| async move {
                if done {
                    return None;
                }
                loop {
                    if carry.len() >= CHUNK_BYTES {
                        let even = carry.len() - (carry.len() % 2);
                        let chunk: Vec<u8> = carry.drain(..even.min(CHUNK_BYTES)).collect();
                        return Some((
                            Ok(TtsChunk { pcm16: chunk, sample_rate_hz: OUTPUT_SAMPLE_RATE_HZ }),
                            (byte_stream, carry, false),
                        ));
                    }
                    match byte_stream.next().await {
                        Some(Ok(bytes)) => carry.extend_from_slice(&bytes),
                        Some(Err(e)) => {
                            return Some((
                                Err(CoreError::TransientExternal(format!("tts stream error: {e}"))),
                                (byte_stream, carry, true),
                            ))
                        }
                        None => {
                            if carry.is_empty() {
                                return None;
                            }
                            let even = carry.len() - (carry.len() % 2);
                            let chunk: Vec<u8> = carry.drain(..even).collect();
                            if chunk.is_empty() {
                                return None;
                            }
                            return Some((
                                Ok(TtsChunk { pcm16: chunk, sample_rate_hz: OUTPUT_SAMPLE_RATE_HZ }),
                                (byte_stream, carry, true),
                            ));
                        }
                    }
                }
            },
        );

        Ok(Box::pin(chunk_stream))
    }
}
