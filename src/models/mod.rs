pub mod answer;
pub mod challenge;
pub mod document;
pub mod loaders;

pub use answer::{AnswerResult, SummaryResult};
pub use challenge::{ChallengeBatch, ChallengeQuestion, Evaluation, Verdict};
pub use document::{Document, MimeKind};
pub use loaders::load_document_file;
