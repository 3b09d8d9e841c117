pub mod mock;

#[cfg(feature = "openai")]
pub mod openai;

pub use mock::{MockLlmClient, MockStep, RecordedRequest};

#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
