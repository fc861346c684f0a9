//! Item store access
//!
//! The bridge queries a library through the [`LibraryStore`] trait. The
//! bundled [`MemoryLibrary`] serves a JSON snapshot of a library.

mod backend;
pub mod filter;
mod memory;

pub use backend::LibraryStore;
pub use filter::{Condition, ItemQuery, SearchField, SearchOperator};
pub use memory::{LibrarySnapshot, MemoryLibrary};
