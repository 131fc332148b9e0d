//! PCM stream formats

use core::fmt;

use serde::{Deserialize, Serialize};

/// Underlying type of every sample in a stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// Not negotiated yet
    #[default]
    NotSet,
    Int16,
    Int32,
    Float32,
}

impl SampleType {
    /// Size of one sample in bytes, 0 for `NotSet`
    #[inline]
    pub fn byte_size(self) -> usize {
        match self {
            SampleType::NotSet => 0,
            SampleType::Int16 => 2,
            SampleType::Int32 => 4,
            SampleType::Float32 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleType::NotSet => "NotSet",
            SampleType::Int16 => "Int16",
            SampleType::Int32 => "Int32",
            SampleType::Float32 => "Float32",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format of a PCM stream
///
/// Two formats are equal only when the sample type, the channel count and
/// the sample rate all match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Format {
    pub sample_type: SampleType,
    pub sample_rate: u32,
    pub channel_count: u32,
}

impl Format {
    pub fn new(sample_type: SampleType, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            sample_type,
            sample_rate,
            channel_count,
        }
    }

    pub fn float32(sample_rate: u32, channel_count: u32) -> Self {
        Self::new(SampleType::Float32, sample_rate, channel_count)
    }

    pub fn int16(sample_rate: u32, channel_count: u32) -> Self {
        Self::new(SampleType::Int16, sample_rate, channel_count)
    }

    pub fn int32(sample_rate: u32, channel_count: u32) -> Self {
        Self::new(SampleType::Int32, sample_rate, channel_count)
    }

    /// Only mono and stereo streams of a known sample type are processed
    pub fn is_valid(&self) -> bool {
        self.sample_type != SampleType::NotSet
            && self.sample_rate > 0
            && (self.channel_count == 1 || self.channel_count == 2)
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.sample_type.byte_size() * self.channel_count as usize
    }

    /// Number of whole frames covering `ms` milliseconds
    #[inline]
    pub fn frames_in_millis(&self, ms: u32) -> usize {
        (self.sample_rate as u64 * ms as u64 / 1000) as usize
    }

    /// Bytes in one millisecond of audio, rounded down to whole frames
    #[inline]
    pub fn millisecond_byte_count(&self) -> usize {
        self.frame_size() * (self.sample_rate / 1000) as usize
    }

    /// Length of `frames` frames in milliseconds
    #[inline]
    pub fn frames_to_millis(&self, frames: usize) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f32 * 1000.0 / self.sample_rate as f32
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch @ {}Hz",
            self.sample_type, self.channel_count, self.sample_rate
        )
    }
}
