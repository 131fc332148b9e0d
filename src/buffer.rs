//! PCM buffers and their allocators

use core::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use crossbeam::queue::ArrayQueue;

use crate::format::Format;
use crate::sample::{Frame, PcmSample};

bitflags! {
    /// Per-buffer flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u8 {
        /// The producer has nothing after this buffer
        const LAST_BUFFER = 0b0000_0001;
    }
}

/// Metadata that travels with a buffer through the graph
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum InfoTag {
    /// Appended by the graph every time a buffer leaves an element
    Element(ElementInfoTag),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementInfoTag {
    pub name: String,
    pub id: String,
    pub source: bool,
    pub source_done: bool,
}

impl InfoTag {
    pub fn element(name: &str, id: &str, source: bool, source_done: bool) -> Self {
        InfoTag::Element(ElementInfoTag {
            name: name.to_string(),
            id: id.to_string(),
            source,
            source_done,
        })
    }

    /// True if the tag was added by a source element
    pub fn is_source(&self) -> bool {
        match self {
            InfoTag::Element(tag) => tag.source,
        }
    }

    /// True if the tag marks the final buffer of a source element
    pub fn is_source_done(&self) -> bool {
        match self {
            InfoTag::Element(tag) => tag.source && tag.source_done,
        }
    }
}

type Recycler = Arc<ArrayQueue<Vec<u8>>>;

/// A block of PCM bytes tagged with its format
///
/// The byte size can be changed freely within the capacity the buffer was
/// allocated with. Growing past the capacity is a bug.
pub struct Buffer {
    data: Vec<u8>,
    byte_size: usize,
    format: Format,
    flags: BufferFlags,
    tags: Vec<InfoTag>,
    recycler: Option<Recycler>,
}

/// Buffers are moved from port to port, fan-out makes deep copies
pub type BufferHandle = Box<Buffer>;

impl Buffer {
    /// Allocate a zeroed buffer on the heap
    pub fn new(capacity: usize) -> Self {
        Self::from_storage(vec![0; capacity], None)
    }

    fn from_storage(data: Vec<u8>, recycler: Option<Recycler>) -> Self {
        let byte_size = data.len();
        Self {
            data,
            byte_size,
            format: Format::default(),
            flags: BufferFlags::empty(),
            tags: Vec::new(),
            recycler,
        }
    }

    /// Allocate a buffer holding `frames` frames of `format`
    pub fn with_frames(format: Format, frames: usize) -> BufferHandle {
        let mut buffer = Box::new(Self::new(format.frame_size() * frames));
        buffer.format = format;
        buffer
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Change the number of valid bytes. Panics if `bytes` exceeds the capacity.
    pub fn set_byte_size(&mut self, bytes: usize) {
        assert!(
            bytes <= self.capacity(),
            "buffer byte size {} exceeds capacity {}",
            bytes,
            self.capacity()
        );
        debug_assert!(
            self.format.frame_size() == 0 || bytes % self.format.frame_size() == 0,
            "buffer byte size is not a whole number of frames"
        );
        self.byte_size = bytes;
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: BufferFlags, on: bool) {
        self.flags.set(flag, on);
    }

    #[inline]
    pub fn test_flag(&self, flag: BufferFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.byte_size]
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.byte_size]
    }

    /// Number of whole frames in the buffer for its current format
    pub fn frame_count(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            size => self.byte_size / size,
        }
    }

    #[inline]
    pub fn read_frame<S: PcmSample, const N: usize>(&self, index: usize) -> Frame<S, N> {
        let offset = index * S::SIZE * N;
        let bytes = &self.data[offset..offset + S::SIZE * N];
        let mut frame = [S::default(); N];
        for (ch, sample) in frame.iter_mut().enumerate() {
            *sample = S::read(&bytes[ch * S::SIZE..]);
        }
        frame
    }

    #[inline]
    pub fn write_frame<S: PcmSample, const N: usize>(&mut self, index: usize, frame: Frame<S, N>) {
        let offset = index * S::SIZE * N;
        let bytes = &mut self.data[offset..offset + S::SIZE * N];
        for (ch, sample) in frame.iter().enumerate() {
            sample.write(&mut bytes[ch * S::SIZE..]);
        }
    }

    /// Fill the valid bytes with zeros
    pub fn clear(&mut self) {
        let size = self.byte_size;
        self.data[..size].fill(0);
    }

    pub fn add_info_tag(&mut self, tag: InfoTag) {
        self.tags.push(tag);
    }

    #[inline]
    pub fn info_tags(&self) -> &[InfoTag] {
        &self.tags
    }

    /// Append a copy of every tag of `src` to `dst`
    pub fn copy_info_tags(src: &Buffer, dst: &mut Buffer) {
        dst.tags.extend(src.tags.iter().cloned());
    }

    /// Deep copy of the valid bytes, format, flags and tags
    pub fn duplicate(&self, allocator: &dyn BufferAllocator) -> BufferHandle {
        let mut copy = allocator.allocate(self.byte_size);
        copy.set_format(self.format);
        copy.set_byte_size(self.byte_size);
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        copy.flags = self.flags;
        Buffer::copy_info_tags(self, &mut copy);
        copy
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("byte_size", &self.byte_size)
            .field("capacity", &self.capacity())
            .field("format", &self.format)
            .field("flags", &self.flags)
            .field("tags", &self.tags)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            // a full pool just lets the storage go
            let _ = recycler.push(core::mem::take(&mut self.data));
        }
    }
}

/// Source of buffers for elements that produce data
///
/// Allocation never blocks and never fails.
pub trait BufferAllocator {
    fn allocate(&self, bytes: usize) -> BufferHandle;
}

/// Plain heap allocation for every buffer
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, bytes: usize) -> BufferHandle {
        Box::new(Buffer::new(bytes))
    }
}

/// Bounded pool of buffer storage
///
/// Storage of buffers handed out by the pool returns to it when the buffer
/// is dropped, so a steady-state graph stops allocating after warm-up. An
/// exhausted pool falls back to fresh heap storage.
#[derive(Clone, Debug)]
pub struct BufferPool {
    free: Recycler,
}

impl BufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self {
            free: Arc::new(ArrayQueue::new(max_buffers.max(1))),
        }
    }

    /// Number of storage blocks currently waiting for reuse
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32)
    }
}

impl BufferAllocator for BufferPool {
    fn allocate(&self, bytes: usize) -> BufferHandle {
        let storage = match self.free.pop() {
            Some(mut data) => {
                if data.len() < bytes {
                    data.resize(bytes, 0);
                }
                data
            }
            None => vec![0; bytes],
        };
        let mut buffer = Buffer::from_storage(storage, Some(self.free.clone()));
        buffer.byte_size = bytes;
        Box::new(buffer)
    }
}
