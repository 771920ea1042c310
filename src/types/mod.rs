//! Addressing types shared by the node codec and callers.

mod jid;

pub use jid::*;
