//! Downstream backend clients consuming audience-scoped API tokens.
//!
//! Each client exposes a plain `execute` call plus a constructor that
//! wires it into an `AuthorizedApiRequest` orchestrator.

mod backend;
mod profile;

pub use api_access::RequestError;
pub use backend::{BackendClient, PetData};
pub use profile::{ProfileClient, ProfileData};
