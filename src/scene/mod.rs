pub mod orchestrator;
pub mod prompt;
pub mod types;
pub mod validation;

pub use orchestrator::SceneImageOrchestrator;
pub use prompt::{PromptBuilder, PromptCrafter, RENDERING_HINTS, fallback_prompt};
pub use types::{GenerationRequest, GenerationResponse, Subject, SubjectRef};
