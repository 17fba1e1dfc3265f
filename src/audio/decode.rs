use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DatasetError, Result};

/// Fully decoded audio, interleaved f32 in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples
    pub samples: Vec<f32>,
    /// Source sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

/// Decode a whole file (FLAC, MP3, OGG/Vorbis, WAV) into memory
///
/// Corrupt packets are logged and skipped; a file with no decodable audio
/// track is an error.
///
/// # Errors
/// Returns [`DatasetError::Decode`] if the format is unknown or undecodable,
/// or [`DatasetError::Io`] if the file cannot be opened
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let decode_err = |reason: String| DatasetError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(format!("failed to probe format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no supported audio track".to_owned()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("failed to create decoder: {e}")))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count());
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                channels = Some(spec.channels.count());

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::warn!(path = %path.display(), reason, "skipping corrupt packet");
            }
            Err(e) => return Err(decode_err(e.to_string())),
        }
    }

    let sample_rate = sample_rate
        .filter(|&r| r > 0)
        .ok_or_else(|| decode_err("unknown sample rate".to_owned()))?;
    let channels = channels
        .and_then(|c| u16::try_from(c).ok())
        .filter(|&c| c > 0)
        .ok_or_else(|| decode_err("unknown channel layout".to_owned()))?;

    tracing::debug!(
        path = %path.display(),
        sample_rate,
        channels,
        samples = samples.len(),
        "decoded audio"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
