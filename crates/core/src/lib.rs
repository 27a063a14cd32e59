pub mod agent;
pub mod ciar;
pub mod consolidation;
pub mod context;
pub mod distillation;
pub mod promotion;
pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod tier4;

pub use agent::{Agent, FullContextAgent, MemoryAgent, RagAgent, TurnState};
pub use consolidation::{ConsolidationEngine, ConsolidationOutcome};
pub use context::{ContextAssembler, ContextBlock};
pub use distillation::{DistillationEngine, DistillationOutcome};
pub use promotion::{PromotionEngine, PromotionOutcome};
pub use tier1::ActiveContextTier;
pub use tier2::WorkingMemoryTier;
pub use tier3::{EpisodicTier, Relationship};
pub use tier4::SemanticTier;

pub use tetramem_shared::{Message, MessageRole, Turn};
