//! The contract every model backend implements.
//!
//! The test generator talks to language models through the types in this
//! crate only, so that a session can switch between backends without
//! touching the generation loop. A backend receives the whole conversation
//! and answers with one complete reply.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
