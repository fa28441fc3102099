//! Quetzal saved games
//!
//! A save is an `IFZS` form holding the story identity, the changed
//! dynamic memory and the call stacks. Blorb files reuse the identity
//! chunk to say which story they belong to.

pub mod chunks;
pub mod compressed_memory;
pub mod save;

pub use save::SaveState;
