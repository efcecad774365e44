//! WAV encoding and decoding for audio units.

use std::io::{BufWriter, Cursor, Read, Seek};
use std::path::Path;

use super::PcmBuffer;
use crate::errors::AudioError;

/// Header facts of a WAV file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
}

impl WavInfo {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames * 1000 / self.sample_rate as u64
    }

    /// Exact duration in milliseconds as a float
    pub fn duration_ms_f64(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 * 1000.0 / self.sample_rate as f64
    }
}

fn decode_error(source: &str, e: impl std::fmt::Display) -> AudioError {
    AudioError::Decode {
        path: source.to_string(),
        message: e.to_string(),
    }
}

fn encode_error(path: &Path, e: impl std::fmt::Display) -> AudioError {
    AudioError::Encode {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn decode_reader<R: Read>(reader: hound::WavReader<R>, source: &str) -> Result<PcmBuffer, AudioError> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| decode_error(source, e))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| decode_error(source, e))?
        }
    };

    Ok(PcmBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Decode WAV bytes returned by an engine
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<PcmBuffer, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| decode_error("<engine response>", e))?;
    decode_reader(reader, "<engine response>")
}

/// Read a WAV file into memory
pub fn read_wav(path: &Path) -> Result<PcmBuffer, AudioError> {
    let source = path.display().to_string();
    let reader = hound::WavReader::open(path).map_err(|e| decode_error(&source, e))?;
    decode_reader(reader, &source)
}

/// Read only the header of a WAV file
pub fn wav_info(path: &Path) -> Result<WavInfo, AudioError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| decode_error(&path.display().to_string(), e))?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration() as u64,
    })
}

fn write_samples<W: std::io::Write + Seek>(
    writer: W,
    buffer: &PcmBuffer,
    path: &Path,
) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(|e| encode_error(path, e))?;
    for &sample in &buffer.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        wav_writer.write_sample(value).map_err(|e| encode_error(path, e))?;
    }
    wav_writer.finalize().map_err(|e| encode_error(path, e))
}

/// Write a 16-bit WAV unit.
///
/// The data goes to a temporary file next to `path` which is renamed into
/// place once complete, so a unit is either whole or absent.
pub fn write_wav(path: &Path, buffer: &PcmBuffer) -> Result<(), AudioError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| encode_error(path, e))?;

    let temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| encode_error(path, e))?;
    let file = temp.reopen().map_err(|e| encode_error(path, e))?;
    write_samples(BufWriter::new(file), buffer, path)?;

    temp.persist(path).map_err(|e| encode_error(path, e.error))?;
    Ok(())
}
