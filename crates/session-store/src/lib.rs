//! Session persistence for the profile client.
//!
//! Holds the authenticated user record behind a pluggable storage
//! backend so the session layer never talks to storage directly.

mod error;
mod keys;
mod storage;
mod store;
mod user;

pub use error::{StorageError, StorageResult};
pub use keys::StorageKeys;
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::SessionStore;
pub use user::{StoredUser, UserProfile};
