pub mod auth;
pub mod extractor;
pub mod reconciler;
pub mod store;

pub use auth::{ArchiveSession, AuthSessionManager, Authenticator, PageFetcher};
pub use extractor::{WorkExtractor, WorkStream};
pub use reconciler::{reconcile, reconcile_entries};
pub use store::{build_store, LibraryStore, MemoryStore, RestStore};
