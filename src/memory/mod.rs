//! Memory model: the flat arena, the value codec and heap objects

pub mod arena;
pub mod codec;
pub mod heap;

pub use arena::{Arena, Offset, NIL, NIL_GUARD};
pub use codec::{decode, encode, Value, HEADER_SIZE};
