//! Numeric core shared by the elements
//!
//! Integer paths accumulate wide and saturate at the sample type's full
//! scale. The float path never clamps.

use tracing::warn;

use crate::buffer::{Buffer, BufferHandle};
use crate::sample::{dispatch_format, Frame, PcmSample};

/// Scale every channel of `frame` by `gain`
#[inline]
pub fn adjust_frame_gain<S: PcmSample, const N: usize>(frame: &mut Frame<S, N>, gain: f32) {
    for sample in frame.iter_mut() {
        *sample = S::from_acc(sample.to_acc(gain));
    }
}

/// Sum `gain * sample` over all source frames, per channel
#[inline]
pub fn mix_frames<S, const N: usize, I>(srcs: I, gain: f32) -> Frame<S, N>
where
    S: PcmSample,
    I: IntoIterator<Item = Frame<S, N>>,
{
    let mut acc = [S::Acc::default(); N];
    for src in srcs {
        for (value, sample) in acc.iter_mut().zip(src.iter()) {
            *value = *value + sample.to_acc(gain);
        }
    }
    acc.map(S::from_acc)
}

/// Scale every frame of a buffer in place
pub fn adjust_buffer_gain<S: PcmSample, const N: usize>(buffer: &mut Buffer, gain: f32) {
    for i in 0..buffer.frame_count() {
        let mut frame = buffer.read_frame::<S, N>(i);
        adjust_frame_gain(&mut frame, gain);
        buffer.write_frame(i, frame);
    }
}

/// Apply a fade curve to every frame of `buffer`
///
/// The gain at time `t` is `x^2.2` where `x = clamp01((t - start) / duration)`
/// for a fade in and `1 - x` for a fade out. Every frame advances the time
/// cursor by `1000 / sample_rate` milliseconds. Returns the cursor for the
/// next buffer.
pub fn fade_buffer<S: PcmSample, const N: usize>(
    buffer: &mut Buffer,
    mut current_time: f32,
    start_time: f32,
    duration: f32,
    fade_in: bool,
) -> f32 {
    let format = buffer.format();
    debug_assert_eq!(buffer.byte_size() % (S::SIZE * N), 0);
    let frame_duration = 1000.0 / format.sample_rate as f32;

    for i in 0..buffer.frame_count() {
        let effect_time = current_time - start_time;
        let norm = if duration > 0.0 {
            (effect_time / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let value = if fade_in { norm } else { 1.0 - norm };
        let mut frame = buffer.read_frame::<S, N>(i);
        adjust_frame_gain(&mut frame, value.powf(2.2));
        buffer.write_frame(i, frame);
        current_time += frame_duration;
    }
    current_time
}

/// Mix buffers of one format into the largest of them
///
/// Shorter buffers drop out of the mix once their last frame has been
/// summed, the remaining frames keep mixing the buffers that are left.
/// Info tags of every input are copied onto the output.
pub fn mix_buffers_typed<S: PcmSample, const N: usize>(
    mut buffers: Vec<BufferHandle>,
    gain: f32,
) -> Option<BufferHandle> {
    let largest = buffers
        .iter()
        .enumerate()
        .max_by_key(|(i, buffer)| (buffer.byte_size(), core::cmp::Reverse(*i)))
        .map(|(i, _)| i)?;
    let mut out = buffers.swap_remove(largest);

    for buffer in &buffers {
        Buffer::copy_info_tags(buffer, &mut out);
    }

    let max_frames = out.frame_count();
    let mut active: Vec<&Buffer> = buffers.iter().map(|b| &**b).collect();

    for frame in 0..max_frames {
        let mut i = 0;
        while i < active.len() {
            if active[i].frame_count() <= frame {
                active.swap_remove(i);
            } else {
                i += 1;
            }
        }
        let own = out.read_frame::<S, N>(frame);
        let mixed = mix_frames(
            core::iter::once(own).chain(active.iter().map(|b| b.read_frame::<S, N>(frame))),
            gain,
        );
        out.write_frame(frame, mixed);
    }
    Some(out)
}

/// Format-dispatching front of [`mix_buffers_typed`]
///
/// Returns `None` for an empty input or an unsupported format.
pub fn mix_buffers(buffers: Vec<BufferHandle>, gain: f32) -> Option<BufferHandle> {
    let format = buffers.first()?.format();
    debug_assert!(buffers.iter().all(|b| b.format() == format));

    match dispatch_format!(format, S, N => mix_buffers_typed::<S, N>(buffers, gain)) {
        Some(mixed) => mixed,
        None => {
            warn!(%format, "unsupported buffer format for mixing");
            None
        }
    }
}

/// Format-dispatching gain over a whole buffer. False if the format is unsupported.
pub fn adjust_gain(buffer: &mut Buffer, gain: f32) -> bool {
    let format = buffer.format();
    dispatch_format!(format, S, N => adjust_buffer_gain::<S, N>(buffer, gain)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;

    fn mono_f32(values: &[f32]) -> BufferHandle {
        let mut buffer = Buffer::with_frames(Format::float32(1000, 1), values.len());
        for (i, v) in values.iter().enumerate() {
            buffer.write_frame::<f32, 1>(i, [*v]);
        }
        buffer
    }

    #[test]
    fn shorter_buffer_leaves_the_mix() {
        let long = mono_f32(&[0.1, 0.1, 0.1, 0.1]);
        let short = mono_f32(&[0.2, 0.2]);
        let out = mix_buffers(vec![short, long], 1.0).unwrap();
        assert_eq!(out.frame_count(), 4);
        let samples: Vec<f32> = (0..4).map(|i| out.read_frame::<f32, 1>(i)[0]).collect();
        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!((samples[1] - 0.3).abs() < 1e-6);
        assert!((samples[2] - 0.1).abs() < 1e-6);
        assert!((samples[3] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn mix_frames_saturates_integers() {
        let frames = [[i16::MAX, -i16::MAX], [i16::MAX, -i16::MAX]];
        let mixed = mix_frames::<i16, 2, _>(frames, 1.0);
        assert_eq!(mixed, [i16::MAX, -i16::MAX]);
    }

    #[test]
    fn zero_duration_fade_is_complete() {
        let mut buffer = mono_f32(&[1.0, 1.0]);
        fade_buffer::<f32, 1>(&mut buffer, 0.0, 0.0, 0.0, false);
        assert_eq!(buffer.read_frame::<f32, 1>(0)[0], 0.0);
    }
}
