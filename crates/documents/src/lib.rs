pub mod loader;

pub use loader::{DocumentError, DocumentLoader, LoadedDocument, PageText};
