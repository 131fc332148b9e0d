mod null;

pub use null::Null;
