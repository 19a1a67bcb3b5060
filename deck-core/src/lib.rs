//! Storage primitives for deck: stable document ids and the document stores
//! the repository layer is built on.

mod store;
mod util;

pub use store::*;
pub use util::*;
