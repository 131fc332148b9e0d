//! Sequential and shuffled playback of several inputs

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferAllocator};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::loader::Loader;
use crate::port::Port;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Sequential,
    Shuffle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatMode {
    /// Stop after the last input
    PlayOne,
    /// Start over after the last input
    #[default]
    PlayAll,
}

/// Plays its inputs one after another
///
/// Only the current input is pulled; the others stay back-pressured. The
/// playlist moves to the next input once every source that fed a buffer
/// reports done, so an input mixing several sources plays until the last of
/// them ends.
pub struct Playlist {
    name: String,
    id: String,
    play_mode: PlayMode,
    repeat_mode: RepeatMode,
    order: Vec<usize>,
    cursor: usize,
    finished: bool,
    ins: Vec<Port>,
    out: [Port; 1],
}

impl Playlist {
    /// Create a playlist with inputs named `in0`, `in1`, ...
    pub fn new(name: impl Into<String>, num_srcs: usize) -> Self {
        Self::with_ports(name, (0..num_srcs).map(|i| format!("in{}", i)))
    }

    pub fn with_ports<S: Into<String>>(name: impl Into<String>, ins: impl IntoIterator<Item = S>) -> Self {
        let ins: Vec<Port> = ins.into_iter().map(Port::new).collect();
        debug_assert!(!ins.is_empty(), "playlist needs at least one input port");
        Self {
            name: name.into(),
            id: random_id(),
            play_mode: PlayMode::default(),
            repeat_mode: RepeatMode::default(),
            order: (0..ins.len()).collect(),
            cursor: 0,
            finished: false,
            ins,
            out: [Port::new("out")],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_play_mode(mut self, mode: PlayMode) -> Self {
        self.play_mode = mode;
        self
    }

    pub fn with_repeat_mode(mut self, mode: RepeatMode) -> Self {
        self.repeat_mode = mode;
        self
    }

    /// Index of the input port currently playing, `None` once finished
    pub fn current_input(&self) -> Option<usize> {
        if self.finished {
            return None;
        }
        self.order.get(self.cursor).copied()
    }

    fn reorder(&mut self) {
        self.order = (0..self.ins.len()).collect();
        if self.play_mode == PlayMode::Shuffle {
            self.order.shuffle(&mut rand::thread_rng());
        }
        self.cursor = 0;
    }

    fn next_input(&mut self) {
        self.cursor += 1;
        if self.cursor < self.order.len() {
            debug!(elem = %self.name, input = self.order[self.cursor], "playlist advanced");
            return;
        }
        match self.repeat_mode {
            RepeatMode::PlayAll => {
                self.reorder();
                debug!(elem = %self.name, "playlist starts over");
            }
            RepeatMode::PlayOne => {
                self.finished = true;
                debug!(elem = %self.name, "playlist is finished");
            }
        }
    }
}

// true when the buffer carries source tags and all of them are done
fn input_finished(buffer: &Buffer) -> bool {
    let mut sources = buffer.info_tags().iter().filter(|tag| tag.is_source()).peekable();
    sources.peek().is_some() && sources.all(|tag| tag.is_source_done())
}

impl Element for Playlist {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Playlist"
    }

    fn prepare(&mut self, _loader: &dyn Loader, _params: &PrepareParams) -> Result<(), PrepareError> {
        let Some(format) = self.ins.first().map(Port::format) else {
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: "playlist has no input ports".into(),
            });
        };
        if let Some(port) = self.ins.iter().find(|p| p.format() != format) {
            warn!(elem = %self.name, port = %port.name(), expected = %format, found = %port.format(), "playlist input format mismatch");
            return Err(PrepareError::FormatMismatch {
                elem: self.name.clone(),
                detail: format!("input '{}' is {} but expected {}", port.name(), port.format(), format),
            });
        }
        self.out[0].set_format(format);
        self.finished = false;
        self.reorder();
        debug!(elem = %self.name, output = %format, inputs = self.ins.len(), "playlist prepared");
        Ok(())
    }

    fn process(&mut self, _allocator: &dyn BufferAllocator, _events: &mut EventQueue, _ms: u32) {
        let Some(current) = self.current_input() else {
            // nothing left to play, drain whatever still arrives
            for port in &mut self.ins {
                port.pull_buffer();
            }
            return;
        };
        let Some(buffer) = self.ins[current].pull_buffer() else {
            return;
        };
        if input_finished(&buffer) {
            self.next_input();
        }
        if self.out[0].push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "playlist output overrun");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{HeapAllocator, InfoTag};
    use crate::format::Format;
    use crate::loader::MemoryLoader;

    fn prepared(repeat: RepeatMode) -> Playlist {
        let mut playlist = Playlist::new("list", 2).with_repeat_mode(repeat);
        for port in playlist.input_ports_mut() {
            port.set_format(Format::float32(1000, 1));
        }
        playlist.prepare(&MemoryLoader::new(), &PrepareParams::default()).unwrap();
        playlist
    }

    fn buffer(done: bool) -> Box<Buffer> {
        let mut buffer = Buffer::with_frames(Format::float32(1000, 1), 4);
        buffer.add_info_tag(InfoTag::element("src", "id", true, done));
        buffer
    }

    #[test]
    fn advances_on_source_done() {
        let mut playlist = prepared(RepeatMode::PlayOne);
        let mut events = EventQueue::new();
        assert_eq!(playlist.current_input(), Some(0));

        // the second input is not pulled while the first one plays
        playlist.input_port_mut(1).push_buffer(buffer(false)).unwrap();
        playlist.input_port_mut(0).push_buffer(buffer(true)).unwrap();
        playlist.process(&HeapAllocator, &mut events, 0);
        assert!(playlist.output_port_mut(0).pull_buffer().is_some());
        assert!(playlist.input_port(1).has_buffers());
        assert_eq!(playlist.current_input(), Some(1));

        playlist.input_port_mut(1).pull_buffer();
        playlist.input_port_mut(1).push_buffer(buffer(true)).unwrap();
        playlist.process(&HeapAllocator, &mut events, 0);
        assert_eq!(playlist.current_input(), None);
    }

    #[test]
    fn waits_for_every_mixed_source() {
        let mut playlist = prepared(RepeatMode::PlayOne);
        let mut events = EventQueue::new();

        // two sources mixed into the first input, only one of them ended
        let mut mixed = Buffer::with_frames(Format::float32(1000, 1), 4);
        mixed.add_info_tag(InfoTag::element("a", "a", true, true));
        mixed.add_info_tag(InfoTag::element("b", "b", true, false));
        mixed.add_info_tag(InfoTag::element("mixer", "m", false, false));
        playlist.input_port_mut(0).push_buffer(mixed).unwrap();
        playlist.process(&HeapAllocator, &mut events, 0);
        playlist.output_port_mut(0).pull_buffer();
        assert_eq!(playlist.current_input(), Some(0));

        let mut last = Buffer::with_frames(Format::float32(1000, 1), 4);
        last.add_info_tag(InfoTag::element("b", "b", true, true));
        last.add_info_tag(InfoTag::element("mixer", "m", false, false));
        playlist.input_port_mut(0).push_buffer(last).unwrap();
        playlist.process(&HeapAllocator, &mut events, 0);
        assert_eq!(playlist.current_input(), Some(1));
    }

    #[test]
    fn untagged_buffers_keep_playing() {
        let mut playlist = prepared(RepeatMode::PlayOne);
        let mut events = EventQueue::new();
        let mut buffer = Buffer::with_frames(Format::float32(1000, 1), 4);
        buffer.add_info_tag(InfoTag::element("gain", "g", false, false));
        playlist.input_port_mut(0).push_buffer(buffer).unwrap();
        playlist.process(&HeapAllocator, &mut events, 0);
        assert_eq!(playlist.current_input(), Some(0));
    }

    #[test]
    fn play_all_wraps_around() {
        let mut playlist = prepared(RepeatMode::PlayAll);
        let mut events = EventQueue::new();
        for input in [0, 1] {
            playlist.input_port_mut(input).push_buffer(buffer(true)).unwrap();
            playlist.process(&HeapAllocator, &mut events, 0);
            playlist.output_port_mut(0).pull_buffer();
        }
        assert_eq!(playlist.current_input(), Some(0));
    }
}
