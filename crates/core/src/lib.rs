//! Test generation loop: conversation, sandbox, code extraction, test
//! runner, model client and the session driving them.
//!
//! A [`Session`] asks a model for tests of a [`Component`], stages them in a
//! [`Sandbox`], runs them with a [`TestRunner`] and feeds failures back to
//! the model until the tests pass or the iteration budget is spent.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod component;
pub mod conversation;
pub mod extract;
mod harness;
mod model_client;
pub mod prompt;
pub mod retrieval;
pub mod runner;
pub mod sandbox;
mod session;
pub mod testing_type;

pub use component::{Component, ComponentName};
pub use conversation::Conversation;
pub use extract::{Extraction, Extractor};
pub use harness::{Harness, HarnessError};
pub use model_client::{GatewayError, ModelClient};
pub use runner::{JestRunner, RunOutcome, RunnerConfig, TestRunner};
pub use sandbox::Sandbox;
pub use session::{
    CancellationToken, Session, SessionBuilder, SessionError, SessionErrorKind,
    SessionEvent, SessionOutcome, Stopped,
};
pub use testing_type::{IterationBudget, TestingType};
