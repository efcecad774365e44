/*!
 * Audio buffers and WAV audio units.
 *
 * - `PcmBuffer`: interleaved samples exchanged with synthesis engines
 * - `wav`: reading and writing the per-chunk WAV units
 */

pub use self::wav::{WavInfo, decode_wav_bytes, read_wav, wav_info, write_wav};

pub mod wav;

/// Interleaved PCM samples in the range [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Buffer of silence lasting `ms` milliseconds
    pub fn silence(ms: u64, sample_rate: u32, channels: u16) -> Self {
        let frames = (sample_rate as u64 * ms / 1000) as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
