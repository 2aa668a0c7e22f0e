//! Token-fetch and authorized-request orchestration on top of the
//! session client.
//!
//! `ApiAccessTokenActions` turns the client's binary authentication
//! state into a finer-grained token-fetch status and keeps the
//! audience-keyed token map current. `AuthorizedApiRequest` composes
//! that with an arbitrary token-consuming request function.

mod authorized_request;
mod error;
mod status;
#[cfg(test)]
mod test_support;
mod token_actions;

pub use authorized_request::{
    AuthorizedApiRequest, AuthorizedRequestFn, AuthorizedRequestProps, RequestProps,
};
pub use error::RequestError;
pub use status::FetchStatus;
pub use token_actions::{ApiAccessTokenActions, TokenEvent};
