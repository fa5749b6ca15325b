pub mod backend;
mod clock;
pub mod conformance;
mod context;
mod error;
mod root;
mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::StorageContext;
pub use error::StorageError;
pub use root::{
    ProbeOutcome, RootCandidate, RootDiagnostics, RootSource, StorageRoot, StorageRootResolver,
    DEFAULT_FALLBACK_ROOT, DEFAULT_ROOT_CANDIDATES,
};
pub use store::{CollectionGuard, DurableCollection, DurableStore};
