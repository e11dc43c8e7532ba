//! Host media library seam.
//!
//! The what's-new feed never owns item metadata, visibility or playback
//! state: it asks the host library through the traits defined here. The
//! in-memory implementation backs the standalone binary and the tests.

mod memory_library;
mod models;
mod trait_def;

pub use memory_library::{InMemoryLibrary, LibraryFixture, UserFixture};
pub use models::{Identity, ItemKind, LibraryFolder, LibraryItem};
pub use trait_def::{Authenticator, LibraryEvent, LibraryHost, LibrarySubscription};
