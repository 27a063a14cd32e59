//! Property-graph driver for the L3 episodic tier's relationship half.
//!
//! All access runs through [`template`]'s registry — no caller builds
//! Cypher text directly, which is what keeps parameter binding the only
//! way data reaches the driver and keeps current-state filtering uniform.

pub mod client;
pub mod template;

pub use client::{GraphClient, GraphRow};
pub use template::{GraphQueryTemplate, TemplateCategory, TemplateRegistry};
