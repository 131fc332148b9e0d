//! Sample and frame model
//!
//! Every numeric operation on PCM data goes through [`PcmSample`], which maps
//! a sample into an accumulator wide enough to never overflow during a gain
//! or a mix, and saturates on the way back for integer types.

use dasp_sample::{FromSample, ToSample};

use crate::format::SampleType;

/// One sample instant across `N` channels, laid out contiguously
pub type Frame<S, const N: usize> = [S; N];

pub trait PcmSample:
    Copy + Default + PartialEq + Send + Sync + 'static + FromSample<f32> + ToSample<f32>
{
    /// Size of the sample in bytes
    const SIZE: usize;
    /// Largest magnitude an integer sample is clamped to. 1.0 for floats.
    const FULL_SCALE: Self;
    /// Stream type tag, `None` for types that never appear on a port
    const SAMPLE_TYPE: Option<SampleType>;

    /// Wide accumulator used for gain and mixing
    type Acc: Copy + Default + core::ops::Add<Output = Self::Acc>;

    fn to_acc(self, gain: f32) -> Self::Acc;

    /// Narrow an accumulator back into a sample. Integers saturate at
    /// `[-FULL_SCALE, FULL_SCALE]`, floats are left unclamped.
    fn from_acc(acc: Self::Acc) -> Self;

    fn read(bytes: &[u8]) -> Self;

    fn write(self, bytes: &mut [u8]);
}

macro_rules! int_sample {
    ($t:ty, $size:expr, $tag:expr) => {
        impl PcmSample for $t {
            const SIZE: usize = $size;
            const FULL_SCALE: Self = <$t>::MAX;
            const SAMPLE_TYPE: Option<SampleType> = $tag;

            type Acc = f64;

            #[inline]
            fn to_acc(self, gain: f32) -> f64 {
                self as f64 * gain as f64
            }

            #[inline]
            fn from_acc(acc: f64) -> Self {
                let max = <$t>::MAX as i64;
                (acc as i64).clamp(-max, max) as $t
            }

            #[inline]
            fn read(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&bytes[..$size]);
                <$t>::from_ne_bytes(raw)
            }

            #[inline]
            fn write(self, bytes: &mut [u8]) {
                bytes[..$size].copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

int_sample!(i8, 1, None);
int_sample!(i16, 2, Some(SampleType::Int16));
int_sample!(i32, 4, Some(SampleType::Int32));

impl PcmSample for f32 {
    const SIZE: usize = 4;
    const FULL_SCALE: Self = 1.0;
    const SAMPLE_TYPE: Option<SampleType> = Some(SampleType::Float32);

    type Acc = f32;

    #[inline]
    fn to_acc(self, gain: f32) -> f32 {
        self * gain
    }

    #[inline]
    fn from_acc(acc: f32) -> Self {
        acc
    }

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_ne_bytes(raw)
    }

    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

/// Expand `$body` once per supported `(sample type, channel count)` pair,
/// binding the sample type to `$S` and the channel count to `$N`.
///
/// Evaluates to `Some(body)` or `None` when the format is not one of the
/// six processable combinations.
macro_rules! dispatch_format {
    ($format:expr, $S:ident, $N:ident => $body:expr) => {{
        use $crate::format::SampleType as __St;
        let __format: $crate::format::Format = $format;
        match (__format.sample_type, __format.channel_count) {
            (__St::Int16, 1) => {
                type $S = i16;
                const $N: usize = 1;
                Some($body)
            }
            (__St::Int16, 2) => {
                type $S = i16;
                const $N: usize = 2;
                Some($body)
            }
            (__St::Int32, 1) => {
                type $S = i32;
                const $N: usize = 1;
                Some($body)
            }
            (__St::Int32, 2) => {
                type $S = i32;
                const $N: usize = 2;
                Some($body)
            }
            (__St::Float32, 1) => {
                type $S = f32;
                const $N: usize = 1;
                Some($body)
            }
            (__St::Float32, 2) => {
                type $S = f32;
                const $N: usize = 2;
                Some($body)
            }
            _ => None,
        }
    }};
}

pub(crate) use dispatch_format;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_accumulator_saturates_symmetrically() {
        assert_eq!(i16::from_acc(40000.0), i16::MAX);
        assert_eq!(i16::from_acc(-40000.0), -i16::MAX);
        assert_eq!(i8::from_acc(-128.0), -127);
        assert_eq!(i32::from_acc(1e12), i32::MAX);
    }

    #[test]
    fn float_accumulator_is_unclamped() {
        assert_eq!(f32::from_acc(1.5), 1.5);
        assert_eq!(f32::from_acc(-3.0), -3.0);
    }

    #[test]
    fn bytes_round_trip() {
        let mut raw = [0u8; 4];
        (-1234i16).write(&mut raw);
        assert_eq!(i16::read(&raw), -1234);
        0.25f32.write(&mut raw);
        assert_eq!(f32::read(&raw), 0.25);
    }
}
