// src/memory/mod.rs

//! Local conversational memory: document model, persistence adapters,
//! keyword search, and background summarization.

pub mod search;
pub mod service;
pub mod store;
pub mod summarization;
pub mod types;

// Re-export commonly used items
pub use self::service::{MemoryService, SUMMARIZATION_THRESHOLD};
pub use self::store::{DocumentStore, JsonFileStore, StoreError};
pub use self::types::{MemoryDocument, MemoryEntry, Session, Turn, UserRecord, UserStats};
