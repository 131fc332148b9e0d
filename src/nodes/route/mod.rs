//! Elements that combine, split and select streams

mod mixer;
mod playlist;
mod splitter;
mod stereo;

pub use mixer::Mixer;
pub use playlist::{PlayMode, Playlist, RepeatMode};
pub use splitter::Splitter;
pub use stereo::{Channel, StereoJoiner, StereoMaker, StereoSplitter};
