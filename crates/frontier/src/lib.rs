mod hash;
mod queue;
mod store;

pub use hash::{hash_normalized, normalize_url, url_hash};
pub use queue::{MemoryQueue, PersistentQueue};
pub use store::VisitStore;
