//! LLM backend abstraction layer.
//!
//! The evaluation service and the companion replies both go through the
//! `LlmBackend` trait:
//! - OpenAI-compatible HTTP APIs (OpenAI, vLLM, Ollama, ...)
//! - Mock backend for testing

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;
pub use traits::{
    ChatTurn, CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError,
    ModelCapabilities, Role, Usage,
};
