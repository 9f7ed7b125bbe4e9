//! Medilab Session Gate
//!
//! Decodes an externally issued bearer credential without touching the
//! network and answers one question for the rest of the engine: may an
//! authenticated endpoint be called right now?
//!
//! # Example
//!
//! ```rust,ignore
//! use medilab_session::{Credential, SessionGate};
//!
//! let credential = Credential::new(token_from_session_provider);
//! let gate = SessionGate::new();
//!
//! if gate.is_usable(&credential) {
//!     // issue the request
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod credential;
mod error;
mod gate;

pub use credential::{Claims, Credential, DecodedCredential};
pub use error::SessionError;
pub use gate::SessionGate;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
