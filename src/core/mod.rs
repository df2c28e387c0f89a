//! 核心层：跨模块共享的错误类型

pub mod error;

pub use error::OrchestratorError;
