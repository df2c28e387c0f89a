//! 调度层：Agent 注册表、优先级队列、派发循环、能力处理器

pub mod dispatch;
pub mod handler;
pub mod queue;
pub mod registry;
pub mod task;

pub use dispatch::TaskScheduler;
pub use handler::{CapabilityHandler, EchoHandler, HandlerOutput, HandlerRegistry};
pub use queue::TaskQueue;
pub use registry::{Agent, AgentId, AgentPerformance, AgentRegistry, AgentStatus, Modality};
pub use task::{TaskContext, TaskId, TaskPriority, TaskRequest, TaskResult, TaskStatus};
