//! CourtView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the CourtView pipeline
//! run against a real runtime (tokio + websockets) or a deterministic
//! harness (virtual clock + in-memory subscribers).
//!
//! # What gets intercepted
//!
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Randomness (`derive_rng()`, used for track colors)
//! - Subscriber transport (`SubscriberSink::send()`)
//!
//! # Example
//!
//! ```ignore
//! use courtview_env::{CourtViewContext, SubscriberSink};
//!
//! async fn pump<Ctx: CourtViewContext, S: SubscriberSink>(ctx: &Ctx, sink: &mut S) {
//!     loop {
//!         if sink.send("{}".into()).await.is_err() {
//!             break;
//!         }
//!         ctx.sleep(Duration::from_millis(33)).await;
//!     }
//! }
//! ```

mod context;
mod sink;
mod types;
mod error;
mod tokio_impl;

pub use context::CourtViewContext;
pub use sink::SubscriberSink;
pub use types::{SubscriberId, Payload};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
