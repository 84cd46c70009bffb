//! Protocol module containing the frame codec and the JSON wire messages.

pub mod frame;
pub mod messages;

pub use frame::{decode_frame, FrameDecodeError, RasterFrame};
pub use messages::*;
