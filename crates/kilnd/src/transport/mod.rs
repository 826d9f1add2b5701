//! HTTP listeners shared by the dispatcher and the auxiliary services.
//!
//! Every listener binds synchronously, so the caller learns the bound port
//! before anything that depends on it starts, and then serves an `axum`
//! router on a background thread until shut down.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{JsonResponse, not_found};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{http_get, http_post, http_status};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
