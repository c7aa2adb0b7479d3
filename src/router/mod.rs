//! Router module for route-class selection.
//!
//! This module classifies each request into a route class and resolves
//! the class to a provider/model pair from the routing table:
//! - Direct `"provider,model"` override
//! - Thinking, long-context and background classification
//! - Prompt token estimation feeding the long-context check

mod estimate;
mod selector;

pub use estimate::estimate_prompt_tokens;
pub use selector::{RouteClass, Router, RoutingDecision, LONG_CONTEXT_THRESHOLD};
