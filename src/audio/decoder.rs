use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Result, ScoringError};
use crate::types::Waveform;

/// Decode an audio file to mono f32 samples at its native rate.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|err| ScoringError::decode(format!("failed to open {}: {err}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), extension)
}

/// Decode an in-memory container (request bodies, uploads).
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Waveform> {
    if bytes.is_empty() {
        return Err(ScoringError::decode("empty audio payload"));
    }
    decode_source(Box::new(Cursor::new(bytes)), extension)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<Waveform> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| ScoringError::decode(format!("failed to probe audio format: {err}")))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ScoringError::decode("no audio tracks found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ScoringError::decode("sample rate not specified"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| ScoringError::decode(format!("failed to create decoder: {err}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(ScoringError::decode(format!("failed to read packet: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let channels = decoded.spec().channels.count().max(1);
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                downmix_into(buffer.samples(), channels, &mut samples);
            }
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(error = %err, "skipping undecodable packet");
            }
            Err(err) => {
                return Err(ScoringError::decode(format!(
                    "failed to decode audio packet: {err}"
                )))
            }
        }
    }

    debug!(samples = samples.len(), sample_rate, "decoded audio");
    Waveform::new(samples, sample_rate)
}

/// Average interleaved frames into mono samples.
fn downmix_into(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    if channels == 1 {
        output.extend_from_slice(interleaved);
        return;
    }
    output.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
