//! Client status state machine using rust-fsm.
//!
//! Status changes only through machine transitions; there is no way to
//! set the status directly.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ InitStarted
//!          ▼
//! ┌─────────────────┐
//! │  Initializing   │
//! └────────┬────────┘
//!          │ GainedAuth / LostAuth
//!          ▼
//! ┌─────────────────┐  LostAuth   ┌─────────────────┐
//! │   Authorized    │ ──────────► │  Unauthorized   │
//! └─────────────────┘ ◄────────── └────────┬────────┘
//!                      GainedAuth          │ InitStarted
//!                                          ▼
//!                                     Initializing
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

// Generates the `status_machine` module with State, Input and
// StateMachine types.
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub status_machine(Uninitialized)

    Uninitialized => {
        InitStarted => Initializing,
        // Direct transitions let auth changes drive a client that was
        // never initialized
        GainedAuth => Authorized,
        LostAuth => Unauthorized
    },
    Initializing => {
        GainedAuth => Authorized,
        LostAuth => Unauthorized
    },
    Authorized => {
        LostAuth => Unauthorized
    },
    Unauthorized => {
        GainedAuth => Authorized,
        InitStarted => Initializing
    }
}

// Re-export the generated types with clearer names
pub use status_machine::Input as StatusMachineInput;
pub use status_machine::State as StatusMachineState;
pub use status_machine::StateMachine as StatusMachine;

/// Client status for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// No initialization has been attempted.
    Uninitialized,
    /// Session restoration is in flight.
    Initializing,
    /// A valid user session exists.
    Authorized,
    /// Initialization settled without a session, or the session ended.
    Unauthorized,
}

impl ClientStatus {
    /// Returns true if a valid session exists (Authorized only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ClientStatus::Authorized)
    }

    /// Returns true once initialization has settled either way.
    pub fn is_initialized(&self) -> bool {
        matches!(self, ClientStatus::Authorized | ClientStatus::Unauthorized)
    }
}

impl From<&StatusMachineState> for ClientStatus {
    fn from(state: &StatusMachineState) -> Self {
        match state {
            StatusMachineState::Uninitialized => ClientStatus::Uninitialized,
            StatusMachineState::Initializing => ClientStatus::Initializing,
            StatusMachineState::Authorized => ClientStatus::Authorized,
            StatusMachineState::Unauthorized => ClientStatus::Unauthorized,
        }
    }
}
