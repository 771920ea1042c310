//! Protocol buffer messages.
//!
//! Only the records that pass through the app-state cipher are defined here.

pub mod sync;

pub use sync::*;
