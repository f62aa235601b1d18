//! Client side of the relay protocol.
//!
//! - [`CorrelationEngine`] pairs each command with its response by
//!   `request_id` and forwards everything else to the relayed-message
//!   subscribers.
//! - [`SessionClient`] is the stateful facade: it tracks the current session
//!   and turns non-success responses into [`HuddleError::Rejected`].
//!
//! [`HuddleError::Rejected`]: crate::error::HuddleError::Rejected

mod config;
mod correlation;
mod session;
mod subscribers;

pub use config::ClientConfig;
pub use correlation::CorrelationEngine;
pub use session::SessionClient;
pub use subscribers::{MessageHandler, Subscribers, Subscription};
