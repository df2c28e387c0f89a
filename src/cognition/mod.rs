//! 认知层：per-actor 记忆、推理、规划与学习

pub mod engine;
pub mod long_term;
pub mod state;
pub mod working;

pub use engine::{CognitiveEngine, CognitiveError, PlanOutcome, PlanPhase, ReasoningOutcome};
pub use long_term::LongTermStore;
pub use state::{CognitiveState, Experience, Insight, InsightKind, MemoryEntry};
pub use working::WorkingMemory;
