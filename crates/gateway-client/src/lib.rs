//! Authenticated REST client for the Kaiwa backend.
//!
//! Every call attaches the identity token as a bearer credential and
//! funnels through one request path. A `401` from the backend tears down
//! all persisted session state and notifies the owner through a single
//! unauthorized hook.

mod client;
mod error;

pub use client::{ApiClient, ChatReply, UnauthorizedHook};
pub use error::{ApiError, ApiResult};
