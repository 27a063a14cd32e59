//! Redis-backed concurrency substrate: namespace/slot manager, atomic
//! server-side scripts, and the global lifecycle event bus.
//!
//! Every session-scoped key this crate mints carries a hash tag so a
//! clustered backend colocates them on one node; the atomic scripts in
//! [`script`] and the stream in [`lifecycle`] both depend on that.

pub mod lifecycle;
pub mod namespace;
pub mod script;

pub use lifecycle::{Handler, HandlerFuture, LifecycleBus, LifecycleEvent};
pub use namespace::NamespaceManager;
pub use script::ScriptManager;
