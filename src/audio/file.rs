//! Audio file loading
//!
//! Decodes a whole file into memory with symphonia so the audio thread
//! never touches the filesystem. Clips are loaded up front in the control
//! context; no resampling is done.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer as DecodeBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::buffer::{AudioBuffer, BufferError};
use super::clip::Clip;
use crate::playback::SAMPLE_RATE;

/// Errors that can occur while loading an audio file
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to open file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to probe audio format: {0}")]
    ProbeError(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Unsupported codec")]
    UnsupportedCodec,

    #[error("Decoder error: {0}")]
    DecoderError(String),

    #[error("Invalid sample data: {0}")]
    InvalidBuffer(#[from] BufferError),
}

/// A fully decoded file
#[derive(Debug)]
pub struct DecodedAudio {
    pub buffer: AudioBuffer,
    pub sample_rate: u32,
}

/// Decode every packet of the first audio track into interleaved `f32`
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio, FileError> {
    let path = path.as_ref();
    let file = File::open(path)?;
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
        .map_err(|e| FileError::ProbeError(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(FileError::NoTracks)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => FileError::UnsupportedCodec,
            other => FileError::DecoderError(other.to_string()),
        })?;

    let mut samples: Vec<f32> = Vec::new();
    let mut scratch: Option<DecodeBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(FileError::DecoderError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, the rest of the file may still be fine
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(FileError::DecoderError(e.to_string())),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        sample_rate = spec.rate;

        let needs_alloc = scratch
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity());
        if needs_alloc {
            scratch = Some(DecodeBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = scratch.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let buffer = AudioBuffer::new(samples, channels)?;
    Ok(DecodedAudio {
        buffer,
        sample_rate,
    })
}

/// Load a file as a clip named after the file
pub fn load_clip(path: impl AsRef<Path>) -> Result<Clip, FileError> {
    let path = path.as_ref();
    let decoded = decode_file(path)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("Unknown")
        .to_string();

    if decoded.sample_rate != SAMPLE_RATE {
        log::warn!(
            "{} is {} Hz, it will play at {} Hz",
            name,
            decoded.sample_rate,
            SAMPLE_RATE
        );
    }
    if !decoded.buffer.is_playable() {
        log::warn!("{} is too short to play", name);
    }

    log::info!(
        "Loaded {} ({} frames, {} channel(s))",
        name,
        decoded.buffer.frames(),
        decoded.buffer.channels()
    );

    Ok(Clip::new(name, decoded.buffer))
}
