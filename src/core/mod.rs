//! Contracts between the probe and the grid it measures.

pub mod entry;
pub mod listener;
pub mod map;

pub use entry::Entry;
pub use listener::{EntryEvent, EvictionListener, ListenerId};
pub use map::TimerMap;
