//! Clinical message protocol
//!
//! Pure encoding and decoding; no I/O happens in this module.

pub mod header;
pub mod message;
pub mod types;

// Re-export commonly used types
pub use header::{ControlIdGenerator, Delimiters, MessageCategory, MessageHeader, MessageType};
pub use message::{ClinicalMessage, Component, Field, Segment, SegmentKind};
