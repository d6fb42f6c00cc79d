//! Marlin-style RepRap host protocol
//!
//! Numbered, checksummed line frames going out; `ok` acknowledgments and
//! `echo:` diagnostics coming back.

pub mod command_creator;
pub mod frame;
pub mod response_parser;

pub use command_creator::{Axes, Axis, ImmediateCommand};
pub use frame::{checksum, command_content, decode, encode, verify, DecodedFrame};
pub use response_parser::{ResponseEvent, ResponseParser};
