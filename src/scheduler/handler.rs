//! 能力处理器
//!
//! 所有执行体实现 CapabilityHandler trait（task_type / handle），由
//! HandlerRegistry 按任务类型注册与查找；调度与协同逻辑不感知具体后端，
//! 替换真实执行体无需改动派发代码。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::scheduler::task::TaskRequest;

/// 处理器输出：结果 JSON 与置信度
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub output: Value,
    pub confidence: f64,
}

impl HandlerOutput {
    pub fn new(output: Value, confidence: f64) -> Self {
        Self { output, confidence }
    }
}

/// 能力处理器 trait：按任务类型注册，失败以 String 返回并落入 TaskResult
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// 处理的任务类型（用于注册表查找）
    fn task_type(&self) -> &str;

    /// 执行任务
    async fn handle(&self, task: &TaskRequest) -> Result<HandlerOutput, String>;
}

/// 处理器注册表：按任务类型存储 Arc<dyn CapabilityHandler>
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl CapabilityHandler + 'static) {
        let task_type = handler.task_type().to_string();
        self.handlers.insert(task_type, Arc::new(handler));
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// Echo 处理器：回显 payload（测试用）
pub struct EchoHandler;

#[async_trait]
impl CapabilityHandler for EchoHandler {
    fn task_type(&self) -> &str {
        "echo"
    }

    async fn handle(&self, task: &TaskRequest) -> Result<HandlerOutput, String> {
        Ok(HandlerOutput::new(task.payload.clone(), 1.0))
    }
}
