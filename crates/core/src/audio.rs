//! Audio codec utilities: G.711 μ-law ⇄ linear PCM16, RMS energy, a stateful
//! linear-rate resampler, and the fixed-size telephony frame packetization.
//!
//! Every function here is pure (no session state) except [`resample`], whose
//! [`ResamplerState`] carries the fractional sample position across calls so
//! that splitting a stream into arbitrary chunks does not introduce phase
//! discontinuities at chunk boundaries.

use serde::{Deserialize, Serialize};

/// Bytes per egress μ-law telephony frame: 20 ms @ 8 kHz mono.
pub const FRAME_BYTES: usize = 160;
/// μ-law silence byte (all bits set decodes to ~0 amplitude).
pub const ULAW_SILENCE: u8 = 0xFF;
/// Number of samples the edge fades ramp over.
pub const FADE_SAMPLES: usize = 160;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Encode one linear PCM16 sample to G.711 μ-law.
///
/// Standard segment/exponent table-free formulation (equivalent to the
/// classic `linear2ulaw` reference table, computed rather than looked up).
pub fn linear_to_ulaw_sample(pcm: i16) -> u8 {
    let sign: i32 = if pcm < 0 { 0x7F } else { 0xFF };
    let mut sample = pcm as i32;
    if sample < 0 {
        sample = -sample;
    }
    if sample > ULAW_CLIP {
        sample = ULAW_CLIP;
    }
    sample += ULAW_BIAS;

    let exponent = (24 - sample.leading_zeros() as i32).clamp(0, 7);
    let mantissa = (sample >> (exponent + 3)) & 0x0F;
    let ulaw = !(((exponent << 4) | mantissa) as i32) & 0x7F;
    (ulaw as u8) ^ (sign as u8 & 0x80)
}

/// Decode one G.711 μ-law byte to a linear PCM16 sample.
pub fn ulaw_to_linear_sample(ulaw: u8) -> i16 {
    let u = !ulaw;
    let sign = u & 0x80;
    let exponent = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;
    let mut sample = ((mantissa as i32) << 3) + ULAW_BIAS;
    sample <<= exponent as i32;
    sample -= ULAW_BIAS;
    let sample = if sign != 0 { -sample } else { sample };
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Decode a byte string of μ-law samples into little-endian PCM16 bytes.
pub fn ulaw_to_pcm16(ulaw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ulaw.len() * 2);
    for &b in ulaw {
        out.extend_from_slice(&ulaw_to_linear_sample(b).to_le_bytes());
    }
    out
}

/// Encode little-endian PCM16 bytes into μ-law. Trailing odd byte is dropped.
pub fn pcm16_to_ulaw(pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len() / 2);
    for chunk in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        out.push(linear_to_ulaw_sample(sample));
    }
    out
}

/// Decode little-endian PCM16 bytes into `i16` samples.
pub fn pcm16_bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Encode `i16` samples into little-endian PCM16 bytes.
pub fn samples_to_pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// RMS energy of a PCM16 byte buffer, clamped to `[0, 32767]`.
pub fn rms(pcm: &[u8]) -> u32 {
    let samples = pcm16_bytes_to_samples(pcm);
    if samples.is_empty() {
        return 0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let mean_sq = sum_sq / samples.len() as f64;
    (mean_sq.sqrt() as u32).min(32767)
}

/// Carried state for the 16 kHz → 8 kHz (or any rational ratio) resampler.
///
/// `phase` is the fractional position (in input-sample units) of the next
/// output sample, and `last_sample` is the final input sample of the
/// previous call, used so linear interpolation does not discontinue at a
/// chunk boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResamplerState {
    pub phase: f64,
    pub last_sample: i16,
    pub primed: bool,
}

/// Resample a PCM16 buffer from `in_rate` to `out_rate`, threading `state`
/// across calls so that the fractional sample position survives arbitrary
/// chunk boundaries. A linear-interpolation rational resampler: exact for
/// unity ratio, adequate for the 16 kHz → 8 kHz TTS egress path and the
/// symmetric case used by tests.
pub fn resample(pcm: &[u8], in_rate: u32, out_rate: u32, state: &mut ResamplerState) -> Vec<u8> {
    if in_rate == out_rate {
        return pcm.to_vec();
    }
    let input = pcm16_bytes_to_samples(pcm);
    if input.is_empty() {
        return Vec::new();
    }
    if !state.primed {
        state.last_sample = input[0];
        state.primed = true;
    }

    let ratio = in_rate as f64 / out_rate as f64;
    let mut output = Vec::new();
    // `prev` conceptually sits at input index -1 relative to `input`.
    let mut pos = state.phase;
    loop {
        // Sample index -1 maps to `state.last_sample`.
        let idx = pos.floor();
        let frac = pos - idx;
        let i0 = idx as i64;
        let sample = if i0 < 0 {
            let a = state.last_sample as f64;
            let b = *input.first().unwrap() as f64;
            a + (b - a) * frac
        } else {
            let i0u = i0 as usize;
            if i0u + 1 >= input.len() {
                break;
            }
            let a = input[i0u] as f64;
            let b = input[i0u + 1] as f64;
            a + (b - a) * frac
        };
        output.push(sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        pos += ratio;
        if pos.floor() as i64 >= input.len() as i64 - 1 {
            break;
        }
    }
    state.phase = pos - input.len() as f64;
    state.last_sample = *input.last().unwrap();
    samples_to_pcm16_bytes(&output)
}

/// Pad (or truncate) a μ-law byte buffer to exactly [`FRAME_BYTES`], right-padding
/// with [`ULAW_SILENCE`] when short.
pub fn pack_frame(ulaw: &[u8]) -> [u8; FRAME_BYTES] {
    let mut frame = [ULAW_SILENCE; FRAME_BYTES];
    let n = ulaw.len().min(FRAME_BYTES);
    frame[..n].copy_from_slice(&ulaw[..n]);
    frame
}

/// Split a μ-law byte buffer into `FRAME_BYTES`-sized frames, padding the
/// final partial frame with silence.
pub fn to_frames(ulaw: &[u8]) -> Vec<[u8; FRAME_BYTES]> {
    ulaw.chunks(FRAME_BYTES).map(pack_frame).collect()
}

/// Apply a linear fade-in over the first `min(len, FADE_SAMPLES)` samples in place.
pub fn fade_in(samples: &mut [i16]) {
    let n = samples.len().min(FADE_SAMPLES);
    for (i, s) in samples.iter_mut().take(n).enumerate() {
        let gain = (i + 1) as f64 / n as f64;
        *s = (*s as f64 * gain).round() as i16;
    }
}

/// Apply a linear fade-out over the last `min(len, FADE_SAMPLES)` samples in place.
pub fn fade_out(samples: &mut [i16]) {
    let n = samples.len().min(FADE_SAMPLES);
    let start = samples.len() - n;
    for (i, s) in samples[start..].iter_mut().enumerate() {
        let gain = 1.0 - (i + 1) as f64 / n as f64;
        *s = (*s as f64 * gain).round() as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_roundtrip_within_quantization_noise() {
        for pcm in [-30000i16, -1000, -1, 0, 1, 1000, 30000] {
            let bytes = pcm.to_le_bytes();
            let ulaw = pcm16_to_ulaw(&bytes);
            let back = ulaw_to_pcm16(&ulaw);
            let decoded = i16::from_le_bytes([back[0], back[1]]);
            // Per-sample distance in the mu-law index, not raw amplitude: re-encoding
            // the decoded sample must land on the same code.
            let reencoded = linear_to_ulaw_sample(decoded);
            assert_eq!(ulaw[0], reencoded);
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        let silence = vec![0u8; 320];
        assert_eq!(rms(&silence), 0);
    }

    #[test]
    fn rms_of_full_scale_square_wave_is_near_max() {
        let mut bytes = Vec::new();
        for i in 0..100 {
            let s: i16 = if i % 2 == 0 { i16::MAX } else { i16::MIN };
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert!(rms(&bytes) > 30000);
    }

    #[test]
    fn resample_state_continuity_matches_whole_buffer() {
        let samples: Vec<i16> = (0..1600).map(|i| ((i % 100) * 300) as i16).collect();
        let pcm = samples_to_pcm16_bytes(&samples);

        let mut whole_state = ResamplerState::default();
        let whole = resample(&pcm, 16000, 8000, &mut whole_state);

        let mut chunked_state = ResamplerState::default();
        let mut chunked = Vec::new();
        for chunk in pcm.chunks(37 * 2) {
            chunked.extend(resample(chunk, 16000, 8000, &mut chunked_state));
        }

        // Splitting into arbitrary chunks with carried state must not drift
        // more than a rounding sample from the whole-buffer result.
        assert!((whole.len() as i64 - chunked.len() as i64).abs() <= 2);
        let n = whole.len().min(chunked.len());
        assert_eq!(&whole[..n], &chunked[..n]);
    }

    #[test]
    fn frame_packing_pads_with_silence() {
        let short = vec![0x10u8; 10];
        let frame = pack_frame(&short);
        assert_eq!(frame.len(), FRAME_BYTES);
        assert_eq!(&frame[..10], &short[..]);
        assert!(frame[10..].iter().all(|&b| b == ULAW_SILENCE));
    }

    #[test]
    fn fade_in_ramps_from_zero() {
        let mut samples = vec![10000i16; 200];
        fade_in(&mut samples);
        // gain at sample 0 is 1/FADE_SAMPLES.
        assert_eq!(samples[0], (10000.0 / FADE_SAMPLES as f64).round() as i16);
        assert_eq!(samples[FADE_SAMPLES - 1], 10000);
        assert_eq!(samples[199], 10000);
    }

    #[test]
    fn fade_out_ramps_to_zero() {
        let mut samples = vec![10000i16; 200];
        fade_out(&mut samples);
        assert_eq!(samples[199], 0);
        // index 200-FADE_SAMPLES is the first (least-faded) sample of the ramp,
        // gain (FADE_SAMPLES-1)/FADE_SAMPLES.
        let expected = (10000.0 * (FADE_SAMPLES - 1) as f64 / FADE_SAMPLES as f64).round() as i16;
        assert_eq!(samples[200 - FADE_SAMPLES], expected);
    }
}
