pub mod factory;
pub mod function_calling;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod system_prompt;

pub use factory::create_client;
pub use model::{ChatMessage, LlmClient, LlmError, LlmResponse, LlmToolCall, ProviderKind};
pub use orchestrator::{ConversationOrchestrator, GeneratedKind, GeneratedMessage, APOLOGY_MESSAGE};
pub use providers::MockLlmClient;
pub use system_prompt::SystemPromptBuilder;
