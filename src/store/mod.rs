//! Counter state storage and per-key atomicity.

mod backend;
mod key;
mod memory;
mod state;

pub use backend::{CounterStore, SaveOutcome, VersionedState};
pub use key::CounterKey;
pub use memory::MemoryStore;
pub use state::CounterState;
