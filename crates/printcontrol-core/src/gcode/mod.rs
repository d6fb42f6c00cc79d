//! G-Code program model and line tokenizing helpers.

pub mod document;

pub use document::{
    parse_word, strip_comment, tokenize, GcodeDocument, COMMENT_MARKER, MOTION_MNEMONIC,
};
