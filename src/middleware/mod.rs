//! Tower middleware applied in front of the dispatch engine.
//!
//! [`cors`] answers CORS preflights and stamps the fixed CORS headers on
//! every response, proxied or not.

pub mod cors;

pub use cors::cors;
