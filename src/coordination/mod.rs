//! 协同层：Sequential / Parallel / Conditional / Workflow 四种模式

pub mod condition;
pub mod engine;
pub mod graph;
pub mod types;

pub use engine::CoordinationEngine;
pub use types::{
    ConditionOperator, CoordinatedTask, CoordinationError, CoordinationId, CoordinationMetrics,
    CoordinationPattern, CoordinationRequest, CoordinationResult, GuardCondition,
};
