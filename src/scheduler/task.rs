//! 任务类型定义
//!
//! TaskRequest 入队后不可变；TaskResult 写入执行日志后即被丢弃（瞬态）。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 任务 ID
pub type TaskId = String;

/// 任务优先级（数值越大越先派发）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// 任务生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// 已入队等待派发
    Queued,
    /// 已派发给 Agent 执行
    Dispatched,
    /// 执行成功
    Completed,
    /// 执行失败
    Failed,
}

/// 提交方上下文：actor / 租户 / 会话 / 角色
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub actor_id: String,
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub role: String,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            actor_id: "anonymous".to_string(),
            tenant_id: "default".to_string(),
            session_id: None,
            role: "user".to_string(),
        }
    }
}

impl TaskContext {
    pub fn new(actor_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// 任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// 任务 ID
    pub id: TaskId,
    /// 任务类型，同时决定由哪个 CapabilityHandler 执行
    pub task_type: String,
    /// 优先级
    pub priority: TaskPriority,
    /// 任务载荷（敏感载荷在入队前被加密协作方替换）
    pub payload: serde_json::Value,
    /// 执行所需能力集合；Agent 能力须为其超集才可被选中
    pub required_capabilities: HashSet<String>,
    /// 提交方上下文
    pub context: TaskContext,
    /// 截止时间（毫秒时间戳）；超过后任务不再派发，直接判定失败
    pub deadline: Option<i64>,
    /// 前置任务 ID（Workflow 协同模式使用）
    pub depends_on: Vec<TaskId>,
    /// 载荷是否敏感（提交时触发加密）
    pub sensitive: bool,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

impl TaskRequest {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            payload,
            required_capabilities: HashSet::new(),
            context: TaskContext::default(),
            deadline: None,
            depends_on: Vec::new(),
            sensitive: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_deadline(mut self, deadline_ms: i64) -> Self {
        self.deadline = Some(deadline_ms);
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<TaskId>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// 截止时间是否已过
    pub fn deadline_passed(&self, now_ms: i64) -> bool {
        self.deadline.map(|d| now_ms > d).unwrap_or(false)
    }
}

/// 任务结果（瞬态：记入执行日志后丢弃）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// 执行耗时（毫秒）
    pub execution_ms: u64,
    pub confidence: f64,
}

impl TaskResult {
    pub fn ok(
        task_id: impl Into<TaskId>,
        output: serde_json::Value,
        execution_ms: u64,
        confidence: f64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            output: Some(output),
            error: None,
            execution_ms,
            confidence,
        }
    }

    pub fn fail(task_id: impl Into<TaskId>, error: impl Into<String>, execution_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            execution_ms,
            confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn test_deadline_passed() {
        let now = chrono::Utc::now().timestamp_millis();
        let task = TaskRequest::new("echo", serde_json::json!({})).with_deadline(now - 1);
        assert!(task.deadline_passed(now));

        let task = TaskRequest::new("echo", serde_json::json!({}));
        assert!(!task.deadline_passed(now));
    }

    #[test]
    fn test_builder_style_construction() {
        let task = TaskRequest::new("report", serde_json::json!({"topic": "q3"}))
            .with_priority(TaskPriority::High)
            .with_capabilities(["nlp", "summarize"])
            .sensitive();

        assert_eq!(task.priority, TaskPriority::High);
        assert!(task.required_capabilities.contains("nlp"));
        assert!(task.sensitive);
        assert!(task.id.starts_with("task_"));
    }
}
