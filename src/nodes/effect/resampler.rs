//! Sample rate conversion

use core::slice;

use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferAllocator};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::format::{Format, SampleType};
use crate::loader::Loader;
use crate::port::Port;
use crate::sample::PcmSample;

/// Converts interleaved `f32` frames from one rate to another
pub trait SampleRateConverter: Send {
    /// Convert as much of `input` as fits into `output`. `ratio` is the output
    /// rate over the input rate. Returns the number of input frames consumed
    /// and the number of output frames produced.
    fn convert(&mut self, input: &[f32], output: &mut [f32], channels: usize, ratio: f64) -> (usize, usize);

    fn reset(&mut self);
}

/// Linear interpolation between neighbouring frames
///
/// The last frame of the previous call is kept so interpolation is
/// continuous across buffers.
#[derive(Clone, Debug, Default)]
pub struct LinearConverter {
    /// Fractional read position, 0 is the previous call's last frame
    position: f64,
    last: [f32; 2],
}

impl LinearConverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleRateConverter for LinearConverter {
    fn convert(&mut self, input: &[f32], output: &mut [f32], channels: usize, ratio: f64) -> (usize, usize) {
        let in_frames = input.len() / channels;
        let out_frames = output.len() / channels;
        let step = 1.0 / ratio;

        // virtual frame 0 is `last`, frame k is input frame k - 1
        let sample = |frame: usize, ch: usize| -> f32 {
            if frame == 0 {
                self.last[ch]
            } else {
                input[(frame - 1) * channels + ch]
            }
        };

        let mut produced = 0;
        let mut pos = self.position;
        while produced < out_frames {
            let index = pos.floor() as usize;
            if index >= in_frames {
                break;
            }
            let frac = (pos - index as f64) as f32;
            for ch in 0..channels {
                let a = sample(index, ch);
                let b = sample(index + 1, ch);
                output[produced * channels + ch] = a + (b - a) * frac;
            }
            produced += 1;
            pos = self.position + produced as f64 * step;
        }

        let consumed = ((pos + 1e-9).floor() as usize).min(in_frames);
        if consumed > 0 {
            for ch in 0..channels {
                self.last[ch] = input[(consumed - 1) * channels + ch];
            }
        }
        self.position = (pos - consumed as f64).max(0.0);
        (consumed, produced)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Converts a Float32 stream to a fixed output sample rate
///
/// Input the converter does not consume within one tick is dropped with a
/// warning and counted in [`Resampler::discarded_frames`].
pub struct Resampler {
    name: String,
    id: String,
    sample_rate: u32,
    converter: Box<dyn SampleRateConverter>,
    discarded: u64,
    scratch: Vec<f32>,
    converted: Vec<f32>,
    inp: Port,
    out: Port,
}

impl Resampler {
    pub fn new(name: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            sample_rate,
            converter: Box::new(LinearConverter::new()),
            discarded: 0,
            scratch: Vec::new(),
            converted: Vec::new(),
            inp: Port::new("in"),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_converter(mut self, converter: Box<dyn SampleRateConverter>) -> Self {
        self.converter = converter;
        self
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total number of input frames dropped so far
    #[inline]
    pub fn discarded_frames(&self) -> u64 {
        self.discarded
    }
}

impl Element for Resampler {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Resampler"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let input = self.inp.format();
        if input.sample_type != SampleType::Float32 {
            warn!(elem = %self.name, format = %input, "resampler input must be Float32");
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: format!("resampler input must be Float32, got {}", input.sample_type),
            });
        }
        let output = Format {
            sample_rate: self.sample_rate,
            ..input
        };
        if !output.is_valid() {
            warn!(elem = %self.name, format = %output, "invalid resampler output format");
            return Err(PrepareError::UnsupportedFormat {
                elem: self.name.clone(),
                format: output,
            });
        }
        self.converter.reset();
        self.out.set_format(output);
        debug!(elem = %self.name, input = %input, output = %output, "resampler prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, ms: u32) {
        let Some(buffer) = self.inp.pull_buffer() else {
            return;
        };
        let input = buffer.format();
        let output = self.out.format();
        if input.sample_type != SampleType::Float32 || input.sample_rate == 0 {
            warn!(elem = %self.name, format = %input, "unsupported resampler input format");
            return;
        }

        let channels = input.channel_count as usize;
        let in_frames = buffer.frame_count();
        let ratio = output.sample_rate as f64 / input.sample_rate as f64;
        let out_frames = output
            .frames_in_millis(ms)
            .min((in_frames as f64 * ratio).ceil() as usize);

        self.scratch.clear();
        self.scratch.extend(buffer.as_bytes().chunks_exact(4).map(f32::read));

        let mut out = allocator.allocate(out_frames * output.frame_size());
        out.set_format(output);
        self.converted.clear();
        self.converted.resize(out_frames * channels, 0.0);
        let (consumed, produced) = self
            .converter
            .convert(&self.scratch, &mut self.converted, channels, ratio);

        if consumed < in_frames {
            let dropped = in_frames - consumed;
            self.discarded += dropped as u64;
            warn!(elem = %self.name, consumed, dropped, "resampler discarded unconsumed input frames");
        }

        out.set_byte_size(produced * output.frame_size());
        for (sample, bytes) in self.converted[..produced * channels]
            .iter()
            .zip(out.as_bytes_mut().chunks_exact_mut(4))
        {
            (*sample).write(bytes);
        }
        Buffer::copy_info_tags(&buffer, &mut out);

        if self.out.push_buffer(out).is_err() {
            warn!(elem = %self.name, "resampler output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        slice::from_ref(&self.inp)
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.inp)
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
