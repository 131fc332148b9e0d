//! Audio file playback

use core::slice;
use std::sync::{Arc, Mutex, OnceLock};

use dasp_sample::FromSample;
use hashbrown::HashMap;
use tracing::{debug, trace_span, warn};

use crate::buffer::{Buffer, BufferAllocator};
use crate::command::EventQueue;
use crate::element::{random_id, Element, PrepareParams};
use crate::error::PrepareError;
use crate::format::{Format, SampleType};
use crate::loader::{IoStrategy, Loader};
use crate::nodes::source::decoder::{open_decoder, Decoder, PcmBuffer, PcmDecoder};
use crate::port::Port;
use crate::sample::{dispatch_format, PcmSample};

type PcmCache = Mutex<HashMap<String, Arc<PcmBuffer>>>;

// completed decodes, keyed by element id
fn pcm_cache() -> &'static PcmCache {
    static CACHE: OnceLock<PcmCache> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

fn cached_pcm(id: &str) -> Option<Arc<PcmBuffer>> {
    let cache = pcm_cache().lock().unwrap_or_else(|e| e.into_inner());
    cache.get(id).cloned()
}

type InfoCache = Mutex<HashMap<String, FileInfo>>;

// file facts read so far, keyed by file URI
fn info_cache() -> &'static InfoCache {
    static CACHE: OnceLock<InfoCache> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

fn cached_info(file: &str) -> Option<FileInfo> {
    let cache = info_cache().lock().unwrap_or_else(|e| e.into_inner());
    cache.get(file).copied()
}

/// Drop every cached PCM buffer and file info
pub fn clear_caches() {
    pcm_cache().lock().unwrap_or_else(|e| e.into_inner()).clear();
    info_cache().lock().unwrap_or_else(|e| e.into_inner()).clear();
}

fn remember_info(file: &str, decoder: &dyn Decoder) -> FileInfo {
    let sample_rate = decoder.sample_rate();
    let frames = decoder.frame_count();
    let info = FileInfo {
        sample_rate,
        channels: decoder.channel_count(),
        frames,
        seconds: frames as f32 / sample_rate.max(1) as f32,
    };
    info_cache()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(file.to_string(), info);
    info
}

/// Basic facts about an audio file
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FileInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub frames: usize,
    pub seconds: f32,
}

/// Plays an audio file through a [`Decoder`]
///
/// Loops the file `loops` times, where 0 loops forever. When PCM caching is
/// enabled both on the element and in the [`PrepareParams`] the first full
/// decode is kept and later loops and prepares replay it.
pub struct FileSource {
    name: String,
    id: String,
    file: String,
    sample_type: SampleType,
    loop_count: u32,
    play_count: u32,
    pcm_caching: bool,
    file_caching: bool,
    io_strategy: IoStrategy,
    format: Format,
    decoder: Option<Box<dyn Decoder>>,
    frames_read: usize,
    // decode in progress that goes into the cache once complete
    capture: Option<PcmBuffer>,
    scratch: Vec<f32>,
    out: Port,
}

impl FileSource {
    pub fn new(name: impl Into<String>, file: impl Into<String>, sample_type: SampleType) -> Self {
        Self {
            name: name.into(),
            id: random_id(),
            file: file.into(),
            sample_type,
            loop_count: 1,
            play_count: 0,
            pcm_caching: false,
            file_caching: false,
            io_strategy: IoStrategy::Default,
            format: Format::default(),
            decoder: None,
            frames_read: 0,
            capture: None,
            scratch: Vec::new(),
            out: Port::new("out"),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_loops(mut self, loops: u32) -> Self {
        self.loop_count = loops;
        self
    }

    pub fn with_pcm_caching(mut self, on: bool) -> Self {
        self.pcm_caching = on;
        self
    }

    /// Ask the loader to keep the file contents for later opens
    pub fn with_file_caching(mut self, on: bool) -> Self {
        self.file_caching = on;
        self
    }

    pub fn with_io_strategy(mut self, strategy: IoStrategy) -> Self {
        self.io_strategy = strategy;
        self
    }

    pub fn set_loop_count(&mut self, loops: u32) {
        self.loop_count = loops;
    }

    #[inline]
    pub fn file(&self) -> &str {
        &self.file
    }

    #[inline]
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Open `file` just far enough to learn its format and length
    ///
    /// Answers from the file info cache when the file has been read or
    /// prepared before.
    pub fn file_info(loader: &dyn Loader, file: &str) -> Option<FileInfo> {
        if let Some(info) = cached_info(file) {
            return Some(info);
        }
        let stream = loader.open_stream(file).ok()?;
        let decoder = open_decoder(file, stream).ok()?;
        Some(remember_info(file, decoder.as_ref()))
    }

    fn convert<S: PcmSample, const N: usize>(&self, buffer: &mut Buffer, frames: usize) {
        for (i, chunk) in self.scratch[..frames * N].chunks_exact(N).enumerate() {
            let mut frame = [S::default(); N];
            for (sample, value) in frame.iter_mut().zip(chunk) {
                *sample = S::from_sample_(*value);
            }
            buffer.write_frame::<S, N>(i, frame);
        }
    }

    fn finish_pass(&mut self) {
        if let Some(pcm) = self.capture.take() {
            let pcm = Arc::new(pcm);
            debug!(elem = %self.name, file = %self.file, id = %self.id, samples = pcm.samples.len(), "pcm buffer is complete");
            pcm_cache()
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(self.id.clone(), pcm.clone());
            self.decoder = Some(Box::new(PcmDecoder::new(pcm)));
        }

        self.play_count = self.play_count.saturating_add(1);
        if self.play_count != self.loop_count {
            if let Some(decoder) = self.decoder.as_mut() {
                decoder.reset();
            }
            self.frames_read = 0;
            debug!(elem = %self.name, file = %self.file, count = self.play_count + 1, "file source reset for looped playback");
        } else {
            debug!(elem = %self.name, file = %self.file, "file source is done");
        }
    }
}

impl Element for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "FileSource"
    }

    fn is_source(&self) -> bool {
        true
    }

    fn is_source_done(&self) -> bool {
        match &self.decoder {
            Some(decoder) => self.frames_read == decoder.frame_count(),
            None => true,
        }
    }

    fn prepare(&mut self, loader: &dyn Loader, params: &PrepareParams) -> Result<(), PrepareError> {
        let caching = params.enable_pcm_caching && self.pcm_caching;

        let decoder: Box<dyn Decoder> = match cached_pcm(&self.id).filter(|_| caching) {
            Some(pcm) => {
                debug!(elem = %self.name, file = %self.file, id = %self.id, "using a cached pcm buffer");
                Box::new(PcmDecoder::new(pcm))
            }
            None => {
                let stream = loader
                    .open_audio_stream(&self.file, self.io_strategy, self.file_caching)
                    .map_err(|source| {
                        warn!(elem = %self.name, file = %self.file, error = %source, "failed to open audio file");
                        PrepareError::Open {
                            elem: self.name.clone(),
                            uri: self.file.clone(),
                            source,
                        }
                    })?;
                let decoder = open_decoder(&self.file, stream).map_err(|e| {
                    warn!(elem = %self.name, file = %self.file, error = %e, "failed to open audio decoder");
                    PrepareError::Decode {
                        elem: self.name.clone(),
                        uri: self.file.clone(),
                        detail: e.to_string(),
                    }
                })?;
                if cached_info(&self.file).is_none() {
                    remember_info(&self.file, decoder.as_ref());
                    debug!(elem = %self.name, file = %self.file, "saved file info");
                }
                if caching {
                    self.capture = Some(PcmBuffer {
                        sample_rate: decoder.sample_rate(),
                        channel_count: decoder.channel_count(),
                        samples: Vec::with_capacity(decoder.frame_count() * decoder.channel_count() as usize),
                    });
                }
                decoder
            }
        };

        let format = Format::new(self.sample_type, decoder.sample_rate(), decoder.channel_count());
        if !format.is_valid() {
            warn!(elem = %self.name, file = %self.file, %format, "unsupported file source format");
            return Err(PrepareError::UnsupportedFormat {
                elem: self.name.clone(),
                format,
            });
        }

        debug!(elem = %self.name, file = %self.file, %format, "file source prepared");
        self.decoder = Some(decoder);
        self.format = format;
        self.frames_read = 0;
        self.play_count = 0;
        self.out.set_format(format);
        Ok(())
    }

    fn process(&mut self, allocator: &dyn BufferAllocator, _events: &mut EventQueue, ms: u32) {
        let _span = trace_span!("FileSource::process", elem = %self.name).entered();

        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        let channels = self.format.channel_count as usize;
        let available = decoder.frame_count();
        let frames = self.format.frames_in_millis(ms).min(available - self.frames_read);

        self.scratch.resize(frames * channels, 0.0);
        let mut read = decoder.read_frames(&mut self.scratch);
        if read != frames {
            warn!(elem = %self.name, expected = frames, decoded = read, "unexpected number of frames decoded");
            // a short read means the stream ended early, treat it as the end
            read = read.min(frames);
            self.frames_read = available - read;
        }

        if let Some(capture) = self.capture.as_mut() {
            capture.samples.extend_from_slice(&self.scratch[..read * channels]);
        }

        let frame_size = self.format.frame_size();
        let mut buffer = allocator.allocate(frame_size * read);
        buffer.set_format(self.format);
        buffer.set_byte_size(frame_size * read);
        let format = self.format;
        dispatch_format!(format, S, N => self.convert::<S, N>(&mut buffer, read));

        self.frames_read += read;
        if self.frames_read == available {
            self.finish_pass();
        }

        if self.out.push_buffer(buffer).is_err() {
            warn!(elem = %self.name, "file source output overrun");
        }
    }

    fn shutdown(&mut self) {
        self.decoder = None;
        self.capture = None;
    }

    fn output_ports(&self) -> &[Port] {
        slice::from_ref(&self.out)
    }

    fn output_ports_mut(&mut self) -> &mut [Port] {
        slice::from_mut(&mut self.out)
    }
}
