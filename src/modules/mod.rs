//! Provider-facing media operations.

pub mod audio;
pub mod image;
pub mod input;
pub mod storage;
pub mod video;
