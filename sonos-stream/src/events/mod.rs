//! Event decoding and streaming
//!
//! Property-set bodies are decoded into variable maps and fanned out through
//! the [`EventMultiplexer`] to filtered consumer views.

pub mod multiplexer;
pub mod property_set;

pub use multiplexer::{EventFilter, EventMultiplexer, EventSubscriber};
pub use property_set::decode_property_set;
