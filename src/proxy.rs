//! Runs a [`Source`] on its own thread
//!
//! The worker fills buffers from a small fixed pool ahead of the device. The
//! device side copies bytes out of filled buffers and hands drained buffers
//! back. Commands go to the worker and events come back over unbounded
//! channels, buffers move through two queues behind one mutex.

use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, trace, warn, Dispatch, Span};

use crate::command::{Event, GraphCommand};
use crate::error::SourceError;
use crate::format::{Format, SampleType};
use crate::source::Source;

/// Settings of a [`SourceThreadProxy`]
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    buffer_size: Option<usize>,
    num_buffers: usize,
    dispatch: Option<Dispatch>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            buffer_size: None,
            num_buffers: 2,
            dispatch: None,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes per pool buffer. Defaults to 20ms of audio in the source format.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }

    pub fn with_num_buffers(mut self, count: usize) -> Self {
        self.num_buffers = count.max(1);
        self
    }

    /// Subscriber for the worker's diagnostics, the caller's by default
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }
}

struct Filled {
    data: Vec<u8>,
    offset: usize,
}

#[derive(Default)]
struct State {
    empty: VecDeque<Vec<u8>>,
    fill: VecDeque<Filled>,
    error: Option<SourceError>,
    /// The source has nothing more to give
    done: bool,
    /// The error has been handed to the device side
    terminated: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.cond.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

/// Pulls a [`Source`] ahead of the device on a worker thread
///
/// The proxy is itself a [`Source`]. Errors and panics of the wrapped source
/// are captured on the worker and returned by the next `fill_buffer`.
pub struct SourceThreadProxy {
    name: String,
    format: Format,
    config: ProxyConfig,
    source: Option<Box<dyn Source>>,
    shared: Arc<Shared>,
    commands: Option<Sender<GraphCommand>>,
    events: Option<Receiver<Event>>,
    thread: Option<JoinHandle<Box<dyn Source>>>,
    first_fill: bool,
}

impl SourceThreadProxy {
    pub fn new(source: Box<dyn Source>, config: ProxyConfig) -> Self {
        Self {
            name: source.name().to_string(),
            format: source.format(),
            config,
            source: Some(source),
            shared: Arc::new(Shared::default()),
            commands: None,
            events: None,
            thread: None,
            first_fill: true,
        }
    }

    /// Spawn the worker thread
    ///
    /// The tracing dispatch and the current span are carried over to the
    /// worker. Calling `start` again is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };

        let buffer_size = self
            .config
            .buffer_size
            .unwrap_or_else(|| self.format.millisecond_byte_count() * 20)
            .max(self.format.frame_size().max(1));
        {
            let mut state = self.shared.lock();
            state.empty = (0..self.config.num_buffers)
                .map(|_| vec![0; buffer_size])
                .collect();
        }

        let (cmd_tx, cmd_rx) = channel::unbounded();
        let (event_tx, event_rx) = channel::unbounded();
        let dispatch = self
            .config
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(|d| d.clone()));
        let span = Span::current();
        let shared = self.shared.clone();

        let thread = thread::Builder::new()
            .name(format!("source-{}", self.name))
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    let _entered = span.enter();
                    let mut worker = Worker {
                        source,
                        shared,
                        commands: cmd_rx,
                        events: event_tx,
                        bytes_read: 0,
                    };
                    worker.run();
                    worker.source
                })
            })?;

        debug!(source = %self.name, buffer_size, buffers = self.config.num_buffers, "source thread started");
        self.commands = Some(cmd_tx);
        self.events = Some(event_rx);
        self.thread = Some(thread);
        Ok(())
    }

    /// Block until a filled buffer is available or the worker is finished
    pub fn wait_buffer(&self) {
        let mut state = self.shared.lock();
        while state.fill.is_empty() && state.error.is_none() && !state.done {
            state = self.shared.wait(state);
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the worker and hand back the wrapped source
    ///
    /// The worker notices the request before starting its next fill, a fill
    /// in progress is completed first. The source is shut down either way.
    pub fn shutdown_source(&mut self) -> Option<Box<dyn Source>> {
        if let Some(thread) = self.thread.take() {
            self.shared.lock().shutdown = true;
            self.shared.cond.notify_all();
            match thread.join() {
                Ok(source) => self.source = Some(source),
                Err(panic) => error!(source = %self.name, reason = %panic_message(&*panic), "source thread panicked"),
            }
            debug!(source = %self.name, "source thread stopped");
        }
        let mut source = self.source.take()?;
        source.shutdown();
        Some(source)
    }
}

impl Source for SourceThreadProxy {
    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn channel_count(&self) -> u32 {
        self.format.channel_count
    }

    fn sample_type(&self) -> SampleType {
        self.format.sample_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fill_buffer(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        if self.thread.is_none() {
            return Err(SourceError::Terminated);
        }

        let mut state = self.shared.lock();
        if self.first_fill {
            // no gap at startup
            while state.fill.is_empty() && state.error.is_none() && !state.done {
                state = self.shared.wait(state);
            }
            self.first_fill = false;
        }

        if let Some(e) = state.error.take() {
            state.terminated = true;
            return Err(e);
        }
        if state.terminated {
            return Err(SourceError::Terminated);
        }

        let Some(front) = state.fill.front_mut() else {
            trace!(source = %self.name, "no filled buffer available");
            return Ok(0);
        };
        let bytes = &front.data[front.offset..];
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        front.offset += n;

        if front.offset == front.data.len() {
            if let Some(drained) = state.fill.pop_front() {
                state.empty.push_back(drained.data);
            }
            drop(state);
            self.shared.cond.notify_all();
        }
        Ok(n)
    }

    fn has_more(&self, _bytes_read: u64) -> bool {
        let state = self.shared.lock();
        !state.terminated && (!state.fill.is_empty() || !state.done)
    }

    fn shutdown(&mut self) {
        drop(self.shutdown_source());
    }

    /// Queue a command for the worker. Commands are applied in order before
    /// the worker's next fill, however long it is blocked on the pool.
    fn receive_command(&mut self, cmd: GraphCommand) {
        let Some(commands) = self.commands.as_ref() else {
            warn!(source = %self.name, dest = %cmd.dest, "source thread is not running, command dropped");
            return;
        };
        if let Err(channel::SendError(cmd)) = commands.send(cmd) {
            warn!(source = %self.name, dest = %cmd.dest, "source thread has exited, command dropped");
        }
    }

    fn next_event(&mut self) -> Option<Event> {
        self.events.as_ref()?.try_recv().ok()
    }
}

impl Drop for SourceThreadProxy {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

struct Worker {
    source: Box<dyn Source>,
    shared: Arc<Shared>,
    commands: Receiver<GraphCommand>,
    events: Sender<Event>,
    bytes_read: u64,
}

impl Worker {
    fn forward_events(&mut self) {
        while let Some(event) = self.source.next_event() {
            if let Err(channel::SendError(event)) = self.events.send(event) {
                debug!(source = %self.source.name(), ?event, "proxy is gone, event dropped");
            }
        }
    }

    fn run(&mut self) {
        debug!(source = %self.source.name(), "source thread running");
        loop {
            while let Ok(cmd) = self.commands.try_recv() {
                self.source.receive_command(cmd);
            }
            self.forward_events();

            let mut buffer = {
                let mut state = self.shared.lock();
                loop {
                    if state.shutdown {
                        debug!(source = %self.source.name(), "source thread exiting on shutdown");
                        return;
                    }
                    if let Some(buffer) = state.empty.pop_front() {
                        break buffer;
                    }
                    state = self.shared.wait(state);
                }
            };

            let capacity = buffer.capacity().max(buffer.len());
            buffer.resize(capacity, 0);
            let source = &mut self.source;
            let result = catch_unwind(AssertUnwindSafe(|| source.fill_buffer(&mut buffer)));

            let failure = match result {
                Ok(Ok(n)) => {
                    self.bytes_read += n as u64;
                    buffer.truncate(n);
                    let more = self.source.has_more(self.bytes_read);
                    self.forward_events();

                    let mut state = self.shared.lock();
                    if n > 0 {
                        state.fill.push_back(Filled {
                            data: buffer,
                            offset: 0,
                        });
                    } else {
                        state.empty.push_back(buffer);
                    }
                    state.done = !more;
                    drop(state);
                    self.shared.cond.notify_all();
                    if !more {
                        debug!(source = %self.source.name(), bytes = self.bytes_read, "source is done");
                        return;
                    }
                    continue;
                }
                Ok(Err(e)) => e,
                Err(panic) => SourceError::Panicked(panic_message(&*panic)),
            };

            error!(source = %self.source.name(), error = %failure, "source failed to fill buffer");
            let mut state = self.shared.lock();
            state.error = Some(failure);
            state.done = true;
            drop(state);
            self.shared.cond.notify_all();
            return;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        remaining: usize,
    }

    impl Source for Counter {
        fn sample_rate(&self) -> u32 {
            8000
        }

        fn channel_count(&self) -> u32 {
            1
        }

        fn sample_type(&self) -> SampleType {
            SampleType::Int16
        }

        fn name(&self) -> &str {
            "counter"
        }

        fn fill_buffer(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
            let n = buf.len().min(self.remaining);
            buf[..n].fill(7);
            self.remaining -= n;
            Ok(n)
        }

        fn has_more(&self, _bytes_read: u64) -> bool {
            self.remaining > 0
        }
    }

    #[test]
    fn delivers_everything_in_order() {
        let config = ProxyConfig::new().with_buffer_size(64);
        let mut proxy = SourceThreadProxy::new(Box::new(Counter { remaining: 200 }), config);
        proxy.start().unwrap();

        let mut total = 0;
        let mut buf = [0u8; 50];
        while proxy.has_more(total as u64) {
            proxy.wait_buffer();
            let n = proxy.fill_buffer(&mut buf).unwrap();
            assert!(buf[..n].iter().all(|b| *b == 7));
            total += n;
        }
        assert_eq!(total, 200);
        assert!(proxy.shutdown_source().is_some());
    }
}
