//! OIDC session client.
//!
//! Wraps an external OIDC session manager behind an explicit status
//! state machine, persists the authenticated user, exchanges the
//! session for audience-scoped API tokens and broadcasts changes over
//! a typed event bus.

mod client;
mod error;
mod events;
mod fsm;
mod oidc;
mod token_exchange;

pub use client::{Client, ClientEvent, EventPayload, UserTokens};
pub use error::{AuthError, AuthResult, ClientErrorKind, ClientErrorObject};
pub use events::{EventBus, ListenerHandle};
pub use fsm::{ClientStatus, StatusMachine, StatusMachineInput, StatusMachineState};
pub use oidc::{OidcSessionManager, SessionEvent, SessionEventCallback};
pub use token_exchange::{ApiTokenMap, TokenExchangeClient, TokenExchangeOptions};
