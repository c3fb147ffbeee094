pub mod generation_store;
pub mod hash;
pub mod metadata;
pub mod storage;

pub use generation_store::{FileGenerationStore, GenerationStore, InMemoryGenerationStore};
pub use hash::{compute_hash, fragment_fingerprint};
pub use metadata::GenerationRecord;
pub use storage::LocalFileStorage;
