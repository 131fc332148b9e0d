//! Elements that originate audio

mod decoder;
mod file;
mod mixer_source;
mod sine;
mod zero;

pub use decoder::{open_decoder, Decoder, DecoderError, PcmBuffer, PcmDecoder, WavDecoder};
#[cfg(feature = "vorbis_src")]
pub use decoder::decode_vorbis;
pub use file::{clear_caches, FileInfo, FileSource};
pub use mixer_source::{FadeIn, FadeOut, MixerSource, SourceEffect};
pub use sine::SineSource;
pub use zero::ZeroSource;
