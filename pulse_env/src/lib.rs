//! Pulse Environment Abstraction Layer
//!
//! This crate provides the wall-clock abstraction that lets the pulse demo
//! engine run against **real time** (tokio) or **manual time** (tests and
//! headless replay).
//!
//! # Core Concept: Two Clocks
//!
//! The engine juggles two notions of time:
//! - **Virtual time**: owned by the engine, advanced at `acceleration × real`
//! - **Wall-clock time**: owned by the context, drives notification expiry
//!
//! Only the second one lives here. By routing every wall-clock read through
//! [`DemoContext`], a test can step the clock by hand and observe notification
//! fades at exact instants.
//!
//! # Example
//!
//! ```ignore
//! use pulse_env::{DemoContext, TokioContext};
//!
//! async fn drive<Ctx: DemoContext>(ctx: &Ctx) {
//!     loop {
//!         let before = ctx.now();
//!         ctx.sleep(Duration::from_millis(50)).await;
//!         engine.tick(ctx.now() - before);
//!     }
//! }
//! ```

mod context;
mod manual;
mod tokio_impl;
mod types;

pub use context::DemoContext;
pub use manual::ManualContext;
pub use tokio_impl::TokioContext;
pub use types::{EventId, NotificationId, RunId, SubscriptionId};
