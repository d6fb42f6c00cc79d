//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Arc<Mutex<T>>` and friends used across threads.

pub mod aliases;

pub use aliases::*;
