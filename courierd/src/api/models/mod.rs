//! Request/response data structures for the intake API.

pub mod configs;
pub mod webhooks;
