//! # Dispatch
//!
//! The host-runtime side of a model instance: a queue of submitted
//! requests, a background worker that groups them into cycles, and a
//! [`Frontend`](crate::frontend::Frontend) that hands every outcome back to
//! its submitter.
//!
//! ```ignore
//! let dispatcher = InstanceDispatcher::new(instance);
//! let response = dispatcher.submit(request).await.await?;
//! ```
//!
//! Dropping the dispatcher stops its worker once the cycle in flight, if
//! any, completes. Requests still queued at that point resolve with an
//! `Unavailable` error.
mod channel_frontend;
mod dispatcher;
mod worker;

pub use channel_frontend::{ChannelFrontend, DispatchStatistics};
pub use dispatcher::{InstanceDispatcher, ResponseHandle};
