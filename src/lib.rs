//! What's New Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod config;
pub mod library;
pub mod server;
pub mod whatsnew;

// Re-export commonly used types for convenience
pub use library::{InMemoryLibrary, LibraryFixture};
pub use server::{run_server, RequestsLoggingLevel};
pub use whatsnew::WhatsNewService;
