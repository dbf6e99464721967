pub mod generation;
pub mod orchestrator;
pub mod prompt;

pub use generation::{GenerationOutput, Generator, OpenAiGenerator};
pub use orchestrator::{AnswerEngine, AnswerRequest, EngineSettings};
