//! Mono/stereo channel routing

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferAllocator, BufferHandle};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::format::Format;
use crate::loader::Loader;
use crate::port::Port;
use crate::sample::{dispatch_format, PcmSample};

fn channel_error(elem: &str, port: &Port, wanted: u32) -> PrepareError {
    warn!(elem = %elem, port = %port.name(), format = %port.format(), wanted, "unexpected channel count");
    PrepareError::FormatMismatch {
        elem: elem.to_string(),
        detail: format!(
            "port '{}' has {} channel(s) but {} are required",
            port.name(),
            port.format().channel_count,
            wanted
        ),
    }
}

fn tagged(format: Format, frames: usize, allocator: &dyn BufferAllocator, src: &[&Buffer]) -> BufferHandle {
    let mut buffer = allocator.allocate(format.frame_size() * frames);
    buffer.set_format(format);
    buffer.set_byte_size(format.frame_size() * frames);
    for s in src {
        Buffer::copy_info_tags(s, &mut buffer);
    }
    buffer
}

/// Interleaves two mono streams into one stereo stream
///
/// Waits until both inputs have a buffer.
pub struct StereoJoiner {
    name: String,
    id: String,
    ins: [Port; 2],
    out: [Port; 1],
}

impl StereoJoiner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            ins: [Port::new("left"), Port::new("right")],
            out: [Port::new("out")],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn join<S: PcmSample, const N: usize>(left: &Buffer, right: &Buffer, out: &mut Buffer) {
        for i in 0..out.frame_count() {
            let l = left.read_frame::<S, N>(i);
            let r = right.read_frame::<S, N>(i);
            out.write_frame::<S, 2>(i, [l[0], r[0]]);
        }
    }
}

impl Element for StereoJoiner {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "StereoJoiner"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let [left, right] = &self.ins;
        if left.format() != right.format() {
            warn!(elem = %self.name, left = %left.format(), right = %right.format(), "stereo joiner input format mismatch");
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: format!("left is {} but right is {}", left.format(), right.format()),
            });
        }
        if left.format().channel_count != 1 {
            return Err(channel_error(&self.name, left, 1));
        }
        let format = Format {
            channel_count: 2,
            ..left.format()
        };
        self.out[0].set_format(format);
        debug!(elem = %self.name, output = %format, "stereo joiner prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        if !self.ins.iter().all(Port::has_buffers) {
            return;
        }
        let [left, right] = &mut self.ins;
        let (Some(left), Some(right)) = (left.pull_buffer(), right.pull_buffer()) else {
            return;
        };
        if left.frame_count() != right.frame_count() {
            warn!(elem = %self.name, left = left.frame_count(), right = right.frame_count(), "stereo joiner input lengths differ");
        }
        let in_format = left.format();
        let frames = left.frame_count().min(right.frame_count());
        let mut out = tagged(self.out[0].format(), frames, allocator, &[&*left, &*right]);
        if dispatch_format!(in_format, S, N => Self::join::<S, N>(&left, &right, &mut out)).is_none() {
            warn!(elem = %self.name, format = %in_format, "unsupported stereo joiner input format");
            return;
        }
        if self.out[0].push_buffer(out).is_err() {
            warn!(elem = %self.name, "stereo joiner output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        &self.ins
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut self.ins
    }

    fn output_ports(&self) -> &[Port] {
        &self.out
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut self.out
    }
}

/// Splits a stereo stream into two mono streams
pub struct StereoSplitter {
    name: String,
    id: String,
    inp: [Port; 1],
    outs: [Port; 2],
}

impl StereoSplitter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            inp: [Port::new("in")],
            outs: [Port::new("left"), Port::new("right")],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn split<S: PcmSample, const N: usize>(src: &Buffer, left: &mut Buffer, right: &mut Buffer) {
        for i in 0..src.frame_count() {
            let frame = src.read_frame::<S, N>(i);
            left.write_frame::<S, 1>(i, [frame[0]]);
            right.write_frame::<S, 1>(i, [frame[N - 1]]);
        }
    }
}

impl Element for StereoSplitter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "StereoSplitter"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let input = self.inp[0].format();
        if input.channel_count != 2 {
            return Err(channel_error(&self.name, &self.inp[0], 2));
        }
        let format = Format {
            channel_count: 1,
            ..input
        };
        for out in &mut self.outs {
            out.set_format(format);
        }
        debug!(elem = %self.name, output = %format, "stereo splitter prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(buffer) = self.inp[0].pull_buffer() else {
            return;
        };
        let in_format = buffer.format();
        let out_format = self.outs[0].format();
        let frames = buffer.frame_count();
        let mut left = tagged(out_format, frames, allocator, &[&*buffer]);
        let mut right = tagged(out_format, frames, allocator, &[&*buffer]);
        if dispatch_format!(in_format, S, N => Self::split::<S, N>(&buffer, &mut left, &mut right)).is_none() {
            warn!(elem = %self.name, format = %in_format, "unsupported stereo splitter input format");
            return;
        }
        let [l, r] = &mut self.outs;
        if l.push_buffer(left).is_err() || r.push_buffer(right).is_err() {
            warn!(elem = %self.name, "stereo splitter output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        &self.inp
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut self.inp
    }

    fn output_ports(&self) -> &[Port] {
        &self.outs
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut self.outs
    }
}

/// Where a [`StereoMaker`] places the mono signal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Left,
    Right,
    #[default]
    Both,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Left => "Left",
            Channel::Right => "Right",
            Channel::Both => "Both",
        }
    }
}

/// Turns a mono stream into a stereo stream
pub struct StereoMaker {
    name: String,
    id: String,
    channel: Channel,
    inp: [Port; 1],
    out: [Port; 1],
}

impl StereoMaker {
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            channel,
            inp: [Port::new("in")],
            out: [Port::new("out")],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn make<S: PcmSample, const N: usize>(channel: Channel, src: &Buffer, out: &mut Buffer) {
        let silent = S::default();
        for i in 0..src.frame_count() {
            let s = src.read_frame::<S, N>(i)[0];
            let frame = match channel {
                Channel::Left => [s, silent],
                Channel::Right => [silent, s],
                Channel::Both => [s, s],
            };
            out.write_frame::<S, 2>(i, frame);
        }
    }
}

impl Element for StereoMaker {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "StereoMaker"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let input = self.inp[0].format();
        if input.channel_count != 1 {
            return Err(channel_error(&self.name, &self.inp[0], 1));
        }
        let format = Format {
            channel_count: 2,
            ..input
        };
        self.out[0].set_format(format);
        debug!(elem = %self.name, output = %format, channel = self.channel.as_str(), "stereo maker prepared");
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(buffer) = self.inp[0].pull_buffer() else {
            return;
        };
        let in_format = buffer.format();
        let channel = self.channel;
        let mut out = tagged(self.out[0].format(), buffer.frame_count(), allocator, &[&*buffer]);
        if dispatch_format!(in_format, S, N => Self::make::<S, N>(channel, &buffer, &mut out)).is_none() {
            warn!(elem = %self.name, format = %in_format, "unsupported stereo maker input format");
            return;
        }
        if self.out[0].push_buffer(out).is_err() {
            warn!(elem = %self.name, "stereo maker output overrun");
        }
    }

    fn input_ports(&self) -> &[Port] {
        &self.inp
    }

    fn input_ports_mut(&mut self) -> &mut [Port] {
        &mut self.inp
    }

    fn output_ports(&self) -> &[Port] {
        &self.out
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        &mut self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HeapAllocator;
    use crate::loader::MemoryLoader;

    fn mono(values: &[i16]) -> Box<Buffer> {
        let mut buffer = Buffer::with_frames(Format::int16(8000, 1), values.len());
        for (i, v) in values.iter().enumerate() {
            buffer.write_frame::<i16, 1>(i, [*v]);
        }
        buffer
    }

    #[test]
    fn joiner_waits_for_both_inputs() {
        let mut joiner = StereoJoiner::new("join");
        for port in joiner.input_ports_mut() {
            port.set_format(Format::int16(8000, 1));
        }
        joiner.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        assert_eq!(joiner.output_port(0).format(), Format::int16(8000, 2));

        let mut events = EventQueue::new();
        joiner.input_port_mut(0).push_buffer(mono(&[1, 2])).unwrap();
        joiner.process(&HeapAllocator, &mut events, 0);
        assert!(!joiner.output_port(0).has_buffers());

        joiner.input_port_mut(1).push_buffer(mono(&[3, 4])).unwrap();
        joiner.process(&HeapAllocator, &mut events, 0);
        let out = joiner.output_port_mut(0).pull_buffer().unwrap();
        assert_eq!(out.read_frame::<i16, 2>(0), [1, 3]);
        assert_eq!(out.read_frame::<i16, 2>(1), [2, 4]);
    }

    #[test]
    fn maker_places_signal_on_one_channel() {
        let mut maker = StereoMaker::new("maker", Channel::Right);
        maker.input_port_mut(0).set_format(Format::int16(8000, 1));
        maker.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        maker.input_port_mut(0).push_buffer(mono(&[7])).unwrap();
        maker.process(&HeapAllocator, &mut EventQueue::new(), 0);
        let out = maker.output_port_mut(0).pull_buffer().unwrap();
        assert_eq!(out.read_frame::<i16, 2>(0), [0, 7]);
    }

    #[test]
    fn splitter_requires_stereo() {
        let mut splitter = StereoSplitter::new("split");
        splitter.input_port_mut(0).set_format(Format::float32(8000, 1));
        assert!(splitter
            .prepare(&MemoryLoader::new(), &PrepareParams::default())
            .is_err());
    }
}
