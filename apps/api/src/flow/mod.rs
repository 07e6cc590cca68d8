//! Flow orchestration: request intake, fingerprinting, the run state machine
//! and the controller that ties the collaborators together.

pub mod controller;
pub mod fingerprint;
pub mod handlers;
pub mod request;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{Collaborators, FlowController, FlowReport};
pub use request::{PathSelector, Request, SourceRef, TriggerPayload};
