//! InMemory implementations of the domain repositories.

pub mod history;

pub use history::InMemoryHistoryStore;
