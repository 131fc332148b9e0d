//! Single-slot ports
//!
//! A port holds at most one buffer. A full port refuses the next push, and
//! the refused buffer stays with the caller, which is how back-pressure
//! travels upstream through a graph.

use crate::buffer::BufferHandle;
use crate::format::Format;

#[derive(Debug)]
pub struct Port {
    name: String,
    format: Format,
    slot: Option<BufferHandle>,
}

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: Format::default(),
            slot: None,
        }
    }

    /// Push a buffer into the port
    ///
    /// Returns the buffer back if the port is already full. The buffer
    /// held by the port is left untouched in that case.
    pub fn push_buffer(&mut self, buffer: BufferHandle) -> Result<(), BufferHandle> {
        if self.slot.is_some() {
            return Err(buffer);
        }
        self.slot = Some(buffer);
        Ok(())
    }

    /// Take the buffer out of the port, if any
    pub fn pull_buffer(&mut self) -> Option<BufferHandle> {
        self.slot.take()
    }

    #[inline]
    pub fn has_buffers(&self) -> bool {
        self.slot.is_some()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slot.is_some()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Negotiated format, `Format::default()` until prepared
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// True if `format` can be negotiated onto this port
    ///
    /// A port without a format takes any valid one, a port that already
    /// has a format only takes that same format again.
    pub fn can_accept(&self, format: &Format) -> bool {
        format.is_valid() && (!self.format.is_valid() || self.format == *format)
    }
}
