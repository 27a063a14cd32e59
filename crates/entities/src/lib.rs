//! Hand-written `sea-orm` entities for the relational half of L2/L3/L4.
//!
//! Normally these would be `sea-orm-cli generate entity` output; they are
//! authored by hand here because the columns that matter for this service
//! (generated `search_text`, pgvector columns) need annotations the
//! generator doesn't reliably produce.

pub mod episode;
pub mod fact;
pub mod knowledge_document;
pub mod pending_repair;
