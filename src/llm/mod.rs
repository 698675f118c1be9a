// src/llm/mod.rs

pub mod client;

pub use self::client::{GeminiClient, SummarizationClient};
