use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Rate most browser audio contexts run at when the client doesn't say.
pub const DEFAULT_CLIENT_AUDIO_RATE: u32 = 48_000;

const RESAMPLE_CHUNK: usize = 1024;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Base64 of raw PCM16 bytes, as sent to the streamed player.
pub fn encode_pcm16(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Interprets little-endian PCM16 bytes as f32 samples in [-1.0, 1.0].
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encodes a slice of f32 samples into a base64 string (converting to i16 PCM first).
pub fn encode_f32_to_base64_i16(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    encode_pcm16(&pcm16)
}

/// Resamples mono audio. The output is trimmed to the length implied by the
/// rate ratio so padding from the final partial chunk is dropped.
pub fn resample(samples: &[f32], from: u32, to: u32) -> anyhow::Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(from as f64, to as f64, RESAMPLE_CHUNK)?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let mut out = Vec::with_capacity(expected + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let chunk = resampler.process(&[samples[pos..pos + n].to_vec()], None)?;
        out.extend_from_slice(&chunk[0]);
        pos += n;
    }
    if pos < samples.len() {
        let tail = [samples[pos..].to_vec()];
        let chunk = resampler.process_partial(Some(&tail[..]), None)?;
        out.extend_from_slice(&chunk[0]);
    }
    out.truncate(expected);
    Ok(out)
}
