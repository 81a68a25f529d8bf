pub mod blob;
pub mod frame;
pub mod text;

pub use blob::{BlobCodec, JsonBlobCodec};
pub use frame::FrameAccumulator;
