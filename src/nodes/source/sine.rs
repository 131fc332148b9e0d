//! Sine test tone

use core::slice;

use dasp_sample::FromSample;
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferAllocator};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::format::Format;
use crate::loader::Loader;
use crate::port::Port;
use crate::sample::{dispatch_format, PcmSample};

/// A sine wave generator writing the same tone on every channel
///
/// A duration of 0 means the tone never ends.
pub struct SineSource {
    name: String,
    id: String,
    format: Format,
    frequency: u32,
    duration: u32,
    frames_emitted: u64,
    out: Port,
}

impl SineSource {
    pub fn new(name: impl Into<String>, format: Format, frequency: u32) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            format,
            frequency,
            duration: 0,
            frames_emitted: 0,
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Limit the tone to `ms` milliseconds
    pub fn with_duration(mut self, ms: u32) -> Self {
        self.duration = ms;
        self
    }

    #[inline]
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    fn duration_frames(&self) -> u64 {
        self.format.sample_rate as u64 * self.duration as u64 / 1000
    }

    fn generate<S: PcmSample, const N: usize>(&mut self, buffer: &mut Buffer) {
        let rate = self.format.sample_rate as f64;
        let step = core::f64::consts::TAU * self.frequency as f64 / rate;
        for i in 0..buffer.frame_count() {
            // running counter keeps the phase continuous across buffers
            let value = ((self.frames_emitted + i as u64) as f64 * step).sin() as f32;
            buffer.write_frame::<S, N>(i, [S::from_sample_(value); N]);
        }
    }
}

impl Element for SineSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "SineSource"
    }

    fn is_source(&self) -> bool {
        true
    }

    fn is_source_done(&self) -> bool {
        self.duration > 0 && self.frames_emitted >= self.duration_frames()
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        if !self.format.is_valid() {
            return Err(PrepareError::UnsupportedFormat {
                elem: self.name.clone(),
                format: self.format,
            });
        }
        self.out.set_format(self.format);
        debug!(elem = %self.name, format = %self.format, frequency = self.frequency, "sine source prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, ms: u32) {
        let mut frames = self.format.frames_in_millis(ms) as u64;
        if self.duration > 0 {
            frames = frames.min(self.duration_frames().saturating_sub(self.frames_emitted));
        }
        let frame_size = self.format.frame_size();

        let mut buffer = allocator.allocate(frame_size * frames as usize);
        buffer.set_format(self.format);
        buffer.set_byte_size(frame_size * frames as usize);

        let format = self.format;
        if dispatch_format!(format, S, N => self.generate::<S, N>(&mut buffer)).is_none() {
            warn!(elem = %self.name, %format, "unsupported sine source format");
            return;
        }
        self.frames_emitted += frames;

        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "sine source output overrun");
        }
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
