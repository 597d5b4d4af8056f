//! Orchestration layer.
//!
//! The [`WaveOrchestrator`] partitions tasks into waves and drives each
//! task through admission, validation, execution and parsing. The
//! validator, executor and parser are injected through the traits in
//! [`collaborators`].

pub mod collaborators;
mod dispatch;
mod orchestrator;

pub use collaborators::{
    ExecutorResponse, JsonResponseParser, LengthPromptValidator, PromptValidator,
    ResponseParser, TaskExecutor, ValidationOutcome, DEFAULT_MAX_PROMPT_BYTES,
};
pub use orchestrator::{WaveOptions, WaveOrchestrator};
