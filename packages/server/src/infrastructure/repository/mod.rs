//! Repository 実装
//!
//! - `inmemory`: プロセス内メモリを使った実装
//! - 将来的に: `sqlite`, `postgres` など

pub mod inmemory;

pub use inmemory::InMemoryHistoryStore;
