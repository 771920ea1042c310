//! Storage for app-state sync keys and collection state.

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;
