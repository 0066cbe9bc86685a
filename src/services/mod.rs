pub mod backend;
pub mod fingerprint_cache;
pub mod grouper;
pub mod images;
pub mod openai_backend;
pub mod prompt;
pub mod recovery;
pub mod result_store;

pub use backend::{BackendCapability, GenerationBackend, PromptPayload, RawModelOutput, WorkItem};
pub use fingerprint_cache::FingerprintCache;
pub use grouper::group_by_language_and_main_id;
pub use openai_backend::OpenAiBackend;
pub use recovery::{recover, AnswerRecord, Recovered};
pub use result_store::ResultStore;
