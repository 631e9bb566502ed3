//! Publish/subscribe transports carrying serialized batches.
//!
//! The pipeline only needs `publish(topic, bytes)` with an acknowledgement;
//! the broker owns ordering and delivery.

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::InMemoryBroker;

use futures::future::BoxFuture;

use crate::error::Result;

pub trait Transport: Send + Sync {
    /// Submit one serialized message. `Ok` means the transport accepted it,
    /// not that it was persisted downstream.
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>>;
}
