//! 协同类型定义
//!
//! 定义协同模式、守卫条件、请求与结果等核心数据类型

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::task::{TaskContext, TaskId, TaskRequest};

/// 协同 ID
pub type CoordinationId = String;

/// 协同模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinationPattern {
    /// 按提交顺序执行，首个失败即中止（fail-fast）
    Sequential,
    /// 全部并发提交，等齐所有结果再聚合
    Parallel,
    /// 逐个执行，执行前评估守卫条件，不满足则跳过
    Conditional,
    /// 按声明的依赖图拓扑序执行
    Workflow,
}

/// 守卫条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Exists,
    NotExists,
}

/// 守卫条件：对先前任务结果的 (字段, 操作符, 值) 三元组断言
///
/// 字段写作 "任务ID.路径"，如 "task1.status"、"fetch.body.count"；
/// "status" 解析为 "ok" / "error"，其余路径按点号深入结果 JSON。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl GuardCondition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// 协同中的任务单元：任务请求 + 可选守卫条件
///
/// Workflow 模式的依赖关系声明在 TaskRequest::depends_on 上。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatedTask {
    pub request: TaskRequest,
    #[serde(default)]
    pub guards: Vec<GuardCondition>,
}

impl CoordinatedTask {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request,
            guards: Vec::new(),
        }
    }

    pub fn with_guard(mut self, guard: GuardCondition) -> Self {
        self.guards.push(guard);
        self
    }
}

/// 协同请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationRequest {
    pub id: CoordinationId,
    pub pattern: CoordinationPattern,
    pub tasks: Vec<CoordinatedTask>,
    pub context: TaskContext,
}

impl CoordinationRequest {
    pub fn new(pattern: CoordinationPattern) -> Self {
        Self {
            id: format!("coord_{}", uuid::Uuid::new_v4()),
            pattern,
            tasks: Vec::new(),
            context: TaskContext::default(),
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn task(mut self, request: TaskRequest) -> Self {
        self.tasks.push(CoordinatedTask::new(request));
        self
    }

    pub fn guarded_task(mut self, task: CoordinatedTask) -> Self {
        self.tasks.push(task);
        self
    }
}

/// 协同指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationMetrics {
    pub tasks_completed: usize,
    pub tasks_total: usize,
    /// 各任务执行耗时均值（毫秒）
    pub avg_task_ms: f64,
    /// 模式特定的效率指标（见各模式定义）
    pub efficiency: f64,
}

/// 协同结果：结果映射 + 错误映射 + 指标
///
/// 不变式：tasks_completed ≤ tasks_total；部分失败不抛错，
/// 由 success 标志与 errors 映射表达。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub coordination_id: CoordinationId,
    pub success: bool,
    pub results: HashMap<TaskId, serde_json::Value>,
    pub errors: HashMap<TaskId, String>,
    pub metrics: CoordinationMetrics,
}

/// 协同错误类型（仅同步校验失败；执行期错误落入 errors 映射）
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Coordination request has no tasks")]
    EmptyRequest,
    #[error("Cyclic dependency detected involving task '{0}'")]
    CyclicDependency(TaskId),
    #[error("Task '{0}' depends on unknown task '{1}'")]
    UnknownDependency(TaskId, TaskId),
    #[error("Duplicate task id '{0}' in coordination request")]
    DuplicateTaskId(TaskId),
    #[error(transparent)]
    Orchestrator(#[from] crate::core::OrchestratorError),
}
