//! 协同引擎
//!
//! 四种模式把一组相关任务归约为一个 CoordinationResult；单个任务的
//! 执行一律委托给调度器，这里不做任何 Agent 选择。部分失败通过
//! success 标志与 errors 映射表达，只有同步校验失败才抛错。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;

use crate::coordination::condition::guards_hold;
use crate::coordination::graph::topological_order;
use crate::coordination::types::{
    CoordinatedTask, CoordinationError, CoordinationMetrics, CoordinationPattern,
    CoordinationRequest, CoordinationResult,
};
use crate::scheduler::task::{TaskId, TaskResult};
use crate::scheduler::TaskScheduler;

/// 协同引擎：持有调度器句柄，按模式归约任务组
pub struct CoordinationEngine {
    scheduler: Arc<TaskScheduler>,
}

impl CoordinationEngine {
    pub fn new(scheduler: Arc<TaskScheduler>) -> Self {
        Self { scheduler }
    }

    /// 执行一个协同请求
    pub async fn execute(
        &self,
        request: CoordinationRequest,
    ) -> Result<CoordinationResult, CoordinationError> {
        if request.tasks.is_empty() {
            return Err(CoordinationError::EmptyRequest);
        }

        tracing::info!(
            coordination_id = %request.id,
            pattern = ?request.pattern,
            tasks = request.tasks.len(),
            "Coordination started"
        );

        let outcome = match request.pattern {
            CoordinationPattern::Sequential => self.run_sequential(&request.tasks).await?,
            CoordinationPattern::Parallel => self.run_parallel(&request.tasks).await?,
            CoordinationPattern::Conditional => self.run_conditional(&request.tasks).await?,
            CoordinationPattern::Workflow => self.run_workflow(&request.tasks).await?,
        };

        let result = outcome.into_result(request.id, request.tasks.len());
        tracing::info!(
            coordination_id = %result.coordination_id,
            completed = result.metrics.tasks_completed,
            total = result.metrics.tasks_total,
            "Coordination finished"
        );
        Ok(result)
    }

    /// Sequential：按提交顺序执行，首个失败中止剩余任务；效率恒为 1.0
    async fn run_sequential(
        &self,
        tasks: &[CoordinatedTask],
    ) -> Result<PatternOutcome, CoordinationError> {
        let mut outcome = PatternOutcome::default();

        for task in tasks {
            let result = self.scheduler.execute(task.request.clone()).await?;
            let failed = !result.success;
            outcome.absorb(&task.request.id, result);
            if failed {
                tracing::warn!(task_id = %task.request.id, "Sequential coordination aborted");
                break;
            }
        }

        outcome.efficiency = 1.0;
        Ok(outcome)
    }

    /// Parallel：全部并发提交并等齐；效率 = 任务均耗时 × 任务数 ÷ 墙钟耗时
    async fn run_parallel(
        &self,
        tasks: &[CoordinatedTask],
    ) -> Result<PatternOutcome, CoordinationError> {
        let started = Instant::now();
        let futures = tasks
            .iter()
            .map(|task| self.scheduler.execute(task.request.clone()));
        let results = join_all(futures).await;
        let wall_ms = started.elapsed().as_millis() as f64;

        let mut outcome = PatternOutcome::default();
        for (task, result) in tasks.iter().zip(results) {
            outcome.absorb(&task.request.id, result?);
        }

        outcome.efficiency = if wall_ms > 0.0 {
            (outcome.avg_task_ms() * tasks.len() as f64) / wall_ms
        } else {
            1.0
        };
        Ok(outcome)
    }

    /// Conditional：执行前评估守卫；任一守卫不满足则跳过该任务
    /// （跳过不计入结果也不计入错误）；效率 = 完成数 ÷ 总数
    async fn run_conditional(
        &self,
        tasks: &[CoordinatedTask],
    ) -> Result<PatternOutcome, CoordinationError> {
        let mut outcome = PatternOutcome::default();
        let mut prior: HashMap<TaskId, TaskResult> = HashMap::new();

        for task in tasks {
            if !guards_hold(&task.guards, &prior) {
                tracing::debug!(task_id = %task.request.id, "Guard not satisfied, task skipped");
                outcome.skipped += 1;
                continue;
            }
            let result = self.scheduler.execute(task.request.clone()).await?;
            prior.insert(task.request.id.clone(), result.clone());
            outcome.absorb(&task.request.id, result);
        }

        let total = tasks.len().max(1);
        outcome.efficiency = outcome.completed as f64 / total as f64;
        Ok(outcome)
    }

    /// Workflow：依赖图拓扑序执行；依赖未产出成功结果的任务记录
    /// "dependency not met" 局部错误，兄弟任务不受影响；
    /// 效率 = 任务均耗时 ÷ 最大任务耗时（均衡负载得高分）
    async fn run_workflow(
        &self,
        tasks: &[CoordinatedTask],
    ) -> Result<PatternOutcome, CoordinationError> {
        let order = topological_order(tasks)?;
        let by_id: HashMap<&str, &CoordinatedTask> = tasks
            .iter()
            .map(|t| (t.request.id.as_str(), t))
            .collect();

        let mut outcome = PatternOutcome::default();

        for task_id in &order {
            let task = by_id[task_id.as_str()];

            if let Some(missing) = task
                .request
                .depends_on
                .iter()
                .find(|dep| !outcome.results.contains_key(*dep))
            {
                tracing::warn!(task_id = %task_id, dep = %missing, "Workflow dependency not met");
                outcome
                    .errors
                    .insert(task_id.clone(), format!("Dependency not met: {missing}"));
                continue;
            }

            let result = self.scheduler.execute(task.request.clone()).await?;
            outcome.absorb(task_id, result);
        }

        outcome.efficiency = if outcome.max_task_ms > 0.0 {
            outcome.avg_task_ms() / outcome.max_task_ms
        } else {
            1.0
        };
        Ok(outcome)
    }
}

/// 单个模式执行过程中的累积状态
#[derive(Default)]
struct PatternOutcome {
    results: HashMap<TaskId, serde_json::Value>,
    errors: HashMap<TaskId, String>,
    completed: usize,
    skipped: usize,
    total_task_ms: f64,
    max_task_ms: f64,
    attempted: usize,
    efficiency: f64,
}

impl PatternOutcome {
    /// 吸收一个任务结果：成功进 results，失败进 errors
    fn absorb(&mut self, task_id: &str, result: TaskResult) {
        self.attempted += 1;
        self.total_task_ms += result.execution_ms as f64;
        self.max_task_ms = self.max_task_ms.max(result.execution_ms as f64);

        if result.success {
            self.completed += 1;
            self.results.insert(
                task_id.to_string(),
                result.output.unwrap_or(serde_json::Value::Null),
            );
        } else {
            self.errors.insert(
                task_id.to_string(),
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            );
        }
    }

    fn avg_task_ms(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.total_task_ms / self.attempted as f64
        }
    }

    fn into_result(self, coordination_id: String, tasks_total: usize) -> CoordinationResult {
        let avg_task_ms = self.avg_task_ms();
        CoordinationResult {
            coordination_id,
            success: self.errors.is_empty(),
            metrics: CoordinationMetrics {
                tasks_completed: self.completed,
                tasks_total,
                avg_task_ms,
                efficiency: self.efficiency,
            },
            results: self.results,
            errors: self.errors,
        }
    }
}
