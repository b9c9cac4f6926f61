pub mod errors;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod routes;
pub mod sse;

pub use errors::RagError;
pub use rag::RagService;
pub use routes::create_app;
