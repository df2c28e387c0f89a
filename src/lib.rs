//! Hive - Rust 多智能体任务编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排错误类型
//! - **scheduler**: 能力感知调度（Agent 注册表、优先级队列、派发循环）
//! - **coordination**: 四种协同模式（Sequential / Parallel / Conditional / Workflow）
//! - **cognition**: per-actor 认知引擎（工作/长期记忆、推理、规划、学习）
//! - **multimodal**: 多模态摄取管道与流式变体
//! - **external**: 外部协作者接口（持久化、鉴权、加密）

pub mod cognition;
pub mod config;
pub mod coordination;
pub mod core;
pub mod external;
pub mod multimodal;
pub mod observability;
pub mod scheduler;

pub use cognition::CognitiveEngine;
pub use coordination::CoordinationEngine;
pub use multimodal::MultiModalPipeline;
pub use scheduler::TaskScheduler;
