pub mod client;
pub mod error;

pub use client::{ExtractionClient, LlmResponse, OpenAiExtractionClient};
pub use error::{ExtractError, ExtractResult};
