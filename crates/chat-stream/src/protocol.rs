//! The data stream protocol: one `<code>:<json>` record per line.
pub mod decoder;
pub mod frame;
pub mod partial_json;

pub use decoder::{decode_frames, FrameDecoder};
pub use frame::{FinishReason, Frame, Usage, DATA_STREAM_HEADER, DATA_STREAM_VERSION};
pub use partial_json::parse_partial_json;
