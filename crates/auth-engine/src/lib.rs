//! Authentication engine for the Kaiwa client.
//!
//! This crate provides:
//! - Secret hash computation for user pools configured with a client secret
//! - Identity token decoding into a claim set (no signature verification;
//!   the client trusts transport TLS and checks expiry itself)
//! - The identity provider wire protocol (sign-up, confirmation, sign-in,
//!   refresh, global sign-out)
//! - Explicit FSM-based session state management with persisted tokens

mod claims;
mod error;
pub mod protocol;
mod secret_hash;
mod session;
mod session_fsm;

pub use claims::{decode_id_token, token_is_live, ClaimSet, DecodeError};
pub use error::{AuthError, AuthResult};
pub use secret_hash::SecretSigner;
pub use session::{ProviderConfig, SessionManager, SignUpOutcome};
pub use session_fsm::session_machine;
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
