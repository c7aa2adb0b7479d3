//! HTTP proxy surface.
//!
//! Accepts chat-completion requests, authenticates the caller, resolves a
//! routing decision and forwards the untouched body to the selected
//! backend, piping the response straight back.

mod handlers;
mod server;
pub mod types;

pub use handlers::{PROVIDER_HEADER, REQUEST_ID_HEADER, ROUTE_HEADER};
pub use server::{create_router, run_server, AppState, RequestId};
pub use types::{ChatRequest, Message, ThinkingField};
