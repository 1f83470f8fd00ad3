pub mod inference_client;
pub mod prompt_builder;
pub mod response_parser;
pub mod text_extractor;

pub use inference_client::{InferenceClient, RetryPolicy};
pub use prompt_builder::{Prompt, PromptBuilder, Task};
pub use response_parser::{ParseOutcome, ParsedAnswer, ParsedEvaluation};
pub use text_extractor::TextExtractor;
