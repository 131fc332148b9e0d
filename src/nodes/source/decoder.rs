//! Decoders feeding the file source
//!
//! Every decoder hands out interleaved `f32` frames. The file source converts
//! them to the sample type it was asked for.

use std::sync::Arc;

#[cfg(feature = "vorbis_src")]
use lewton::inside_ogg::OggStreamReader;
use thiserror::Error;
use tracing::warn;

use crate::loader::ReadSeek;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[cfg(feature = "vorbis_src")]
    #[error(transparent)]
    Vorbis(#[from] lewton::VorbisError),

    #[error("unsupported audio file type '{0}'")]
    Unsupported(String),
}

pub trait Decoder: Send {
    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> u32;

    /// Total number of frames in the stream
    fn frame_count(&self) -> usize;

    /// Fill `out` with whole interleaved frames. Returns the number of
    /// frames read.
    fn read_frames(&mut self, out: &mut [f32]) -> usize;

    /// Rewind to the first frame
    fn reset(&mut self);
}

/// Fully decoded interleaved PCM
#[derive(Clone, Debug, Default)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channel_count: u32,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    #[inline]
    pub fn frame_count(&self) -> usize {
        match self.channel_count {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }
}

/// Plays back a decoded [`PcmBuffer`]. Cheap to create, the PCM is shared.
pub struct PcmDecoder {
    pcm: Arc<PcmBuffer>,
    frame: usize,
}

impl PcmDecoder {
    pub fn new(pcm: Arc<PcmBuffer>) -> Self {
        Self { pcm, frame: 0 }
    }
}

impl Decoder for PcmDecoder {
    fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate
    }

    fn channel_count(&self) -> u32 {
        self.pcm.channel_count
    }

    fn frame_count(&self) -> usize {
        self.pcm.frame_count()
    }

    fn read_frames(&mut self, out: &mut [f32]) -> usize {
        let channels = self.pcm.channel_count as usize;
        let wanted = out.len() / channels;
        let frames = wanted.min(self.frame_count() - self.frame);
        let start = self.frame * channels;
        out[..frames * channels].copy_from_slice(&self.pcm.samples[start..start + frames * channels]);
        self.frame += frames;
        frames
    }

    fn reset(&mut self) {
        self.frame = 0;
    }
}

/// Streaming WAV decoder
pub struct WavDecoder {
    reader: hound::WavReader<Box<dyn ReadSeek>>,
}

impl WavDecoder {
    pub fn open(stream: Box<dyn ReadSeek>) -> Result<Self, DecoderError> {
        Ok(Self {
            reader: hound::WavReader::new(stream)?,
        })
    }
}

impl Decoder for WavDecoder {
    fn sample_rate(&self) -> u32 {
        self.reader.spec().sample_rate
    }

    fn channel_count(&self) -> u32 {
        self.reader.spec().channels as u32
    }

    fn frame_count(&self) -> usize {
        self.reader.duration() as usize
    }

    fn read_frames(&mut self, out: &mut [f32]) -> usize {
        let spec = self.reader.spec();
        let channels = spec.channels as usize;
        let wanted = out.len() / channels * channels;
        let mut read = 0;

        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    match sample {
                        Ok(value) => out[read] = value,
                        Err(e) => {
                            warn!(error = %e, "wav decode error");
                            break;
                        }
                    }
                    read += 1;
                }
            }
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    match sample {
                        Ok(value) => out[read] = value as f32 * scale,
                        Err(e) => {
                            warn!(error = %e, "wav decode error");
                            break;
                        }
                    }
                    read += 1;
                }
            }
        }
        read / channels
    }

    fn reset(&mut self) {
        if let Err(e) = self.reader.seek(0) {
            warn!(error = %e, "failed to rewind wav stream");
        }
    }
}

/// Decode a whole Ogg/Vorbis stream up front
#[cfg(feature = "vorbis_src")]
pub fn decode_vorbis(stream: Box<dyn ReadSeek>) -> Result<PcmBuffer, DecoderError> {
    let mut srr = OggStreamReader::new(stream)?;
    let mut pcm = PcmBuffer {
        sample_rate: srr.ident_hdr.audio_sample_rate,
        channel_count: srr.ident_hdr.audio_channels as u32,
        samples: Vec::new(),
    };

    while let Some(packet) = srr.read_dec_packet_itl()? {
        pcm.samples
            .extend(packet.iter().map(|s| *s as f32 / 32768.0));
    }
    Ok(pcm)
}

/// Pick a decoder by file extension
pub fn open_decoder(uri: &str, stream: Box<dyn ReadSeek>) -> Result<Box<dyn Decoder>, DecoderError> {
    let upper = uri.to_ascii_uppercase();
    if upper.ends_with(".WAV") {
        return Ok(Box::new(WavDecoder::open(stream)?));
    }
    #[cfg(feature = "vorbis_src")]
    if upper.ends_with(".OGG") {
        let pcm = decode_vorbis(stream)?;
        return Ok(Box::new(PcmDecoder::new(Arc::new(pcm))));
    }
    Err(DecoderError::Unsupported(uri.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_decoder_stops_at_end() {
        let pcm = Arc::new(PcmBuffer {
            sample_rate: 8000,
            channel_count: 2,
            samples: vec![0.5; 10],
        });
        let mut decoder = PcmDecoder::new(pcm);
        let mut out = [0.0; 8];
        assert_eq!(decoder.read_frames(&mut out), 4);
        assert_eq!(decoder.read_frames(&mut out), 1);
        assert_eq!(decoder.read_frames(&mut out), 0);
        decoder.reset();
        assert_eq!(decoder.read_frames(&mut out), 4);
    }
}
