//! Domain-agnostic numeric constants. Grouped by engineering concern, not
//! by business domain. Business/domain-specific constants
//! (agent prompts, department lists, webhook schemas) do not belong here —
//! those are per-agent configuration loaded at call time.

/// Audio codec / framing constants.
pub mod audio {
    /// Telephony egress frame size in bytes (20 ms @ 8 kHz μ-law).
    pub const FRAME_BYTES: usize = 160;
    pub const TELEPHONY_SAMPLE_RATE_HZ: u32 = 8000;
    pub const TTS_SAMPLE_RATE_HZ: u32 = 16000;
}

/// Turn-taking / arbiter constants.
pub mod turn {
    use std::time::Duration;

    pub const DEFAULT_SILENCE_THRESHOLD_SEC: f64 = 0.8;
    pub const INTERIM_SILENCE_MS: u64 = 500;
    pub const INTERIM_FINAL_THRESHOLD_MS: u64 = 50;
    pub const DEFAULT_INTERIM_MIN_LENGTH: usize = 5;
    pub const MIN_BUFFER_CHARS: usize = 3;
    pub const VAD_TIMEOUT_MS: u64 = 2000;
    pub const RECHECK_SLEEP_MS: u64 = 50;

    pub fn utterance_end_ms(silence_threshold_sec: f64) -> u64 {
        (silence_threshold_sec * 1000.0) as u64
    }

    pub fn silence_threshold(silence_threshold_sec: f64) -> Duration {
        Duration::from_secs_f64(silence_threshold_sec)
    }
}

/// Barge-in detector constants.
pub mod interrupt {
    pub const DEFAULT_BASELINE_FACTOR: f64 = 2.0;
    pub const DEFAULT_MIN_ENERGY: u32 = 500;
    pub const DEFAULT_MIN_SPEECH_MS: u64 = 120;
    pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
    pub const BACKGROUND_WINDOW: usize = 30;
    pub const BACKGROUND_MIN_SAMPLES: usize = 20;
    pub const SPEECH_ENERGY_WINDOW: usize = 10;
    pub const SPEECH_ENERGY_MIN_OVER_THRESHOLD: usize = 2;
    pub const BASELINE_SMOOTHING: f64 = 0.3;
    /// Cap on the background/ambient tracking window before baseline updates.
    pub const BACKGROUND_CAP_FACTOR: f64 = 2.0;
    pub const BACKGROUND_CAP_FLOOR: u32 = 600;
}

/// Retrieval constants.
pub mod rag {
    pub const DEFAULT_CHUNK_SIZE: usize = 384;
    pub const DEFAULT_CHUNK_OVERLAP: usize = 64;
    pub const DEFAULT_TOP_K: usize = 3;
    pub const CANDIDATE_MULTIPLIER: usize = 2;
    pub const DISTANCE_CUTOFF: f32 = 1.3;
    pub const EMBEDDING_DIM: usize = 384;
}

/// Timeouts shared across adapters.
pub mod timeouts {
    use std::time::Duration;

    pub const TTS_QUEUE_PUT: Duration = Duration::from_secs(2);
    pub const TTS_HTTP: Duration = Duration::from_secs(30);
    pub const WEBHOOK_HTTP: Duration = Duration::from_secs(10);
    pub const SESSION_TEARDOWN: Duration = Duration::from_secs(2);
    pub const END_CALL_GRACE: Duration = Duration::from_millis(1500);
    pub const TRANSFER_GRACE: Duration = Duration::from_secs(3);
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
    pub const MAX_SENTENCES_PER_TURN: usize = 10;
    pub const TTS_TOKEN_CHANNEL_CAPACITY: usize = 500;
    pub const TTS_QUEUE_CAPACITY: usize = 50;
}
