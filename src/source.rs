//! Device-facing pull interface

use tracing::{debug, trace, warn};

use crate::buffer::{BufferHandle, BufferPool};
use crate::command::{Event, EventQueue, GraphCommand};
use crate::element::{Element, PrepareParams};
use crate::error::{PrepareError, SourceError};
use crate::format::{Format, SampleType};
use crate::graph::Graph;
use crate::loader::Loader;

/// Something an audio device can pull PCM bytes from
pub trait Source: Send {
    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> u32;

    fn sample_type(&self) -> SampleType;

    fn name(&self) -> &str;

    fn format(&self) -> Format {
        Format::new(self.sample_type(), self.sample_rate(), self.channel_count())
    }

    /// Write up to `buf.len()` bytes of audio, returns the number written
    fn fill_buffer(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Whether more data follows after `bytes_read` bytes were consumed
    fn has_more(&self, bytes_read: u64) -> bool;

    fn shutdown(&mut self) {}

    fn receive_command(&mut self, cmd: GraphCommand) {
        warn!(source = %self.name(), dest = %cmd.dest, cmd = cmd.cmd.name(), "source does not take commands");
    }

    fn next_event(&mut self) -> Option<Event> {
        None
    }
}

/// Plays a [`Graph`] as a [`Source`]
///
/// Every fill runs as many whole milliseconds through the graph as fit in
/// the device buffer. Output that does not fit is kept for the next fill.
pub struct GraphSource {
    graph: Graph,
    pool: BufferPool,
    events: EventQueue,
    pending: Option<BufferHandle>,
    pending_offset: usize,
    millis: u64,
}

impl GraphSource {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            pool: BufferPool::default(),
            events: EventQueue::new(),
            pending: None,
            pending_offset: 0,
            millis: 0,
        }
    }

    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn prepare(&mut self, loader: &dyn Loader, params: &PrepareParams) -> Result<(), PrepareError> {
        self.graph.prepare(loader, params)?;
        debug!(graph = %self.graph.name(), format = %self.graph.format(), "graph source prepared");
        Ok(())
    }

    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Milliseconds of audio run through the graph so far
    #[inline]
    pub fn elapsed_millis(&self) -> u64 {
        self.millis
    }

    // copy out of the pending buffer, returns the bytes copied
    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let Some(pending) = self.pending.as_ref() else {
            return 0;
        };
        let bytes = &pending.as_bytes()[self.pending_offset..];
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.pending_offset += n;
        if self.pending_offset == pending.byte_size() {
            self.pending = None;
            self.pending_offset = 0;
        }
        n
    }
}

impl Source for GraphSource {
    fn sample_rate(&self) -> u32 {
        self.graph.format().sample_rate
    }

    fn channel_count(&self) -> u32 {
        self.graph.format().channel_count
    }

    fn sample_type(&self) -> SampleType {
        self.graph.format().sample_type
    }

    fn name(&self) -> &str {
        self.graph.name()
    }

    fn fill_buffer(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if self.pending.is_some() {
            return Ok(self.drain_pending(buf));
        }

        let ms_bytes = self.graph.format().millisecond_byte_count();
        if ms_bytes == 0 {
            return Err(SourceError::Failed(format!(
                "graph '{}' is not prepared",
                self.graph.name()
            )));
        }
        let ms = (buf.len() / ms_bytes) as u32;

        self.graph.process(&self.pool, &mut self.events, ms);
        self.graph.advance(ms);
        self.millis += ms as u64;

        if let Some(buffer) = self.graph.output_port_mut(0).pull_buffer() {
            self.pending = Some(buffer);
            self.pending_offset = 0;
            return Ok(self.drain_pending(buf));
        }

        if !self.graph.is_done() {
            #[cfg(feature = "warn_on_empty")]
            warn!(graph = %self.graph.name(), "graph produced no output, filling silence");
            trace!(graph = %self.graph.name(), bytes = buf.len(), "filling silence");
            buf.fill(0);
            return Ok(buf.len());
        }

        warn!(graph = %self.graph.name(), "no audio buffer available");
        Ok(0)
    }

    fn has_more(&self, _bytes_read: u64) -> bool {
        self.pending.is_some() || !self.graph.is_done()
    }

    fn shutdown(&mut self) {
        self.graph.shutdown();
        self.pending = None;
    }

    fn receive_command(&mut self, cmd: GraphCommand) {
        let GraphCommand { dest, cmd } = cmd;
        if let Err(cmd) = self.graph.dispatch_command(&dest, cmd) {
            warn!(graph = %self.graph.name(), dest = %dest, cmd = cmd.name(), "no element to receive command");
        }
    }

    fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::nodes::source::SineSource;

    fn sine_source(duration: u32) -> GraphSource {
        let mut graph = Graph::new("tone");
        let sine = graph.add_element(
            SineSource::new("sine", Format::int16(8000, 1), 440).with_duration(duration),
        );
        graph.link_graph(sine, 0);
        let mut source = GraphSource::new(graph);
        source
            .prepare(&MemoryLoader::new(), &PrepareParams::default())
            .unwrap();
        source
    }

    #[test]
    fn small_device_buffers_drain_pending_output() {
        let mut source = sine_source(0);
        // 16 bytes per millisecond, 5ms per fill
        let mut buf = [0u8; 80];
        assert_eq!(source.fill_buffer(&mut buf).unwrap(), 80);
        assert_eq!(source.elapsed_millis(), 5);
        assert!(source.has_more(80));
    }

    #[test]
    fn finishes_with_the_graph() {
        let mut source = sine_source(10);
        let mut buf = [0u8; 80];
        let mut total = 0;
        while source.has_more(total as u64) {
            let n = source.fill_buffer(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 160);
    }
}
