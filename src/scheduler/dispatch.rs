//! 任务调度器：提交入口与派发循环
//!
//! 单一派发循环每周期做一次任务-Agent 匹配；匹配成功后执行体在独立
//! 任务中被 await（循环不等待执行完成），并发量由 Semaphore 限制。
//! 无合格 Agent 时任务重新入队并短暂退避；执行异常转为失败的
//! TaskResult，调度器不自动重试（重试由调用方重新提交）。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::{FitnessSection, SchedulerSection};
use crate::core::OrchestratorError;
use crate::external::{
    AccessControl, AllowAll, DurableStore, Encryptor, ExecutionLog, NoopEncryptor,
};
use crate::scheduler::handler::HandlerRegistry;
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::registry::{Agent, AgentRegistry, AgentStatus};
use crate::scheduler::task::{TaskId, TaskPriority, TaskRequest, TaskResult, TaskStatus};

/// 任务调度器
pub struct TaskScheduler {
    registry: Arc<AgentRegistry>,
    handlers: Arc<HandlerRegistry>,
    store: Arc<dyn DurableStore>,
    access: Arc<dyn AccessControl>,
    encryptor: Arc<dyn Encryptor>,
    queue: TaskQueue,
    cfg: SchedulerSection,
    /// 任务状态观测；结果交付后条目随之移除（完成的任务离开活动集合）
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
    /// 无人等待的已完成结果暂存，取走即删，超过上限淘汰最旧
    finished: Mutex<FinishedResults>,
    /// 等待结果的 oneshot 发送端
    waiters: Mutex<HashMap<TaskId, Vec<oneshot::Sender<TaskResult>>>>,
    /// 并发执行许可
    exec_permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        handlers: Arc<HandlerRegistry>,
        store: Arc<dyn DurableStore>,
        cfg: SchedulerSection,
    ) -> Self {
        let permits = cfg.max_concurrent_executions.max(1);
        let finished_cap = cfg.finished_results_cap;
        Self {
            registry,
            handlers,
            store,
            access: Arc::new(AllowAll),
            encryptor: Arc::new(NoopEncryptor),
            queue: TaskQueue::new(),
            cfg,
            statuses: RwLock::new(HashMap::new()),
            finished: Mutex::new(FinishedResults::new(finished_cap)),
            waiters: Mutex::new(HashMap::new()),
            exec_permits: Arc::new(Semaphore::new(permits)),
            cancel: CancellationToken::new(),
        }
    }

    /// 注入访问控制协作方（默认放行所有请求）
    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    /// 注入加密协作方（默认透传）
    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// 提交任务：鉴权 → 敏感载荷加密 → 入队，立即返回任务 ID（非阻塞）
    pub async fn submit(&self, mut request: TaskRequest) -> Result<TaskId, OrchestratorError> {
        if !self
            .access
            .can_submit(&request.context.actor_id, &request.context.role)
        {
            tracing::warn!(
                actor = %request.context.actor_id,
                role = %request.context.role,
                "Task submission denied"
            );
            return Err(OrchestratorError::PermissionDenied(
                request.context.actor_id.clone(),
            ));
        }

        if request.sensitive {
            let plain = serde_json::to_vec(&request.payload)
                .map_err(|e| OrchestratorError::StoreError(e.to_string()))?;
            let cipher = self.encryptor.encrypt(&plain);
            request.payload = serde_json::json!({ "ciphertext": cipher });
        }

        let task_id = request.id.clone();
        self.statuses
            .write()
            .await
            .insert(task_id.clone(), TaskStatus::Queued);
        tracing::debug!(task_id = %task_id, task_type = %request.task_type, "Task queued");
        self.queue.push(request);
        Ok(task_id)
    }

    /// 等待某个已提交任务的结果
    ///
    /// 结果是瞬态的：取走即从暂存区与状态表删除，再次等待同一 ID
    /// 视同未知任务。
    pub async fn wait(&self, task_id: &str) -> Result<TaskResult, OrchestratorError> {
        let rx = {
            // finish() 先取 waiters 锁再写结果，持锁期间查结果可避免注册/完成竞态
            let mut waiters = self.waiters.lock().await;
            if let Some(result) = self.finished.lock().await.take(task_id) {
                self.statuses.write().await.remove(task_id);
                return Ok(result);
            }
            if !self.statuses.read().await.contains_key(task_id) {
                return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
            }
            let (tx, rx) = oneshot::channel();
            waiters.entry(task_id.to_string()).or_default().push(tx);
            rx
        };

        rx.await.map_err(|_| OrchestratorError::SchedulerStopped)
    }

    /// 提交并等待结果
    pub async fn execute(&self, request: TaskRequest) -> Result<TaskResult, OrchestratorError> {
        let task_id = self.submit(request).await?;
        self.wait(&task_id).await
    }

    /// 任务当前状态
    pub async fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses.read().await.get(task_id).copied()
    }

    /// 待派发任务数
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// 启动派发循环（后台任务，shutdown 时结束）
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let sched = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!("Dispatch loop started");
            loop {
                if sched.cancel.is_cancelled() {
                    break;
                }
                match sched.queue.pop() {
                    Some(task) => sched.dispatch_one(task).await,
                    None => {
                        let idle = Duration::from_millis(sched.cfg.dispatch_interval_ms);
                        tokio::select! {
                            _ = sched.cancel.cancelled() => break,
                            _ = tokio::time::sleep(idle) => {}
                        }
                    }
                }
            }
            tracing::info!("Dispatch loop stopped");
        })
    }

    /// 停止派发循环并唤醒所有等待者
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        // 丢弃发送端，等待者收到 SchedulerStopped
        self.waiters.lock().await.clear();
    }

    /// 单周期派发：弹出的任务要么派给最优 Agent，要么重新入队退避
    async fn dispatch_one(self: &Arc<Self>, task: TaskRequest) {
        let now = chrono::Utc::now().timestamp_millis();
        if task.deadline_passed(now) {
            tracing::warn!(task_id = %task.id, "Deadline exceeded before dispatch");
            let result = TaskResult::fail(&task.id, "Deadline exceeded before dispatch", 0);
            self.log_execution(&task, "unassigned", &result).await;
            self.finish(result).await;
            return;
        }

        let candidates = self.registry.candidates(&task.required_capabilities).await;
        let best = candidates
            .into_iter()
            .map(|agent| {
                let score = fitness(&self.cfg.fitness, &agent, task.priority);
                (agent, score)
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(agent, _)| agent);

        let Some(agent) = best else {
            tracing::trace!(task_id = %task.id, "No qualifying agent, requeue");
            self.queue.push(task);
            let backoff = Duration::from_millis(self.cfg.retry_backoff_ms);
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(backoff) => {}
            }
            return;
        };

        if !self.registry.mark_busy(&agent.id).await {
            // 状态在候选筛选之后变了，放回队列下周期再试
            self.queue.push(task);
            return;
        }

        self.statuses
            .write()
            .await
            .insert(task.id.clone(), TaskStatus::Dispatched);
        tracing::debug!(task_id = %task.id, agent_id = %agent.id, "Task dispatched");

        self.spawn_execution(task, agent.id);
    }

    /// 在独立任务中执行：循环继续派发下一个任务，执行体并发运行
    fn spawn_execution(self: &Arc<Self>, task: TaskRequest, agent_id: String) {
        let sched = Arc::clone(self);
        let permits = Arc::clone(&self.exec_permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let started = std::time::Instant::now();
            let result = match sched.handlers.get(&task.task_type) {
                Some(handler) => match handler.handle(&task).await {
                    Ok(out) => TaskResult::ok(
                        &task.id,
                        out.output,
                        started.elapsed().as_millis() as u64,
                        out.confidence,
                    ),
                    Err(e) => TaskResult::fail(&task.id, e, started.elapsed().as_millis() as u64),
                },
                None => TaskResult::fail(
                    &task.id,
                    format!("No handler registered for task type '{}'", task.task_type),
                    started.elapsed().as_millis() as u64,
                ),
            };

            sched
                .registry
                .record_outcome(&agent_id, result.success, result.execution_ms)
                .await;

            if result.success {
                tracing::info!(task_id = %task.id, agent_id = %agent_id, ms = result.execution_ms, "Task completed");
            } else {
                tracing::warn!(
                    task_id = %task.id,
                    agent_id = %agent_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Task failed"
                );
            }

            sched.log_execution(&task, &agent_id, &result).await;
            sched.finish(result).await;
        });
    }

    async fn log_execution(&self, task: &TaskRequest, agent_id: &str, result: &TaskResult) {
        let log = ExecutionLog {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            agent_id: agent_id.to_string(),
            actor_id: task.context.actor_id.clone(),
            tenant_id: task.context.tenant_id.clone(),
            success: result.success,
            execution_ms: result.execution_ms,
            error: result.error.clone(),
            recorded_at: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.store.log_task_execution(log).await {
            tracing::warn!("Failed to log task execution: {e}");
        }
    }

    /// 交付结果：有等待者即时送达并清除账目，否则进暂存区等待认领
    async fn finish(&self, result: TaskResult) {
        let mut waiters = self.waiters.lock().await;
        match waiters.remove(&result.task_id) {
            Some(senders) => {
                self.statuses.write().await.remove(&result.task_id);
                for tx in senders {
                    let _ = tx.send(result.clone());
                }
            }
            None => {
                let task_id = result.task_id.clone();
                let status = if result.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                let evicted = self.finished.lock().await.park(result);
                let mut statuses = self.statuses.write().await;
                statuses.insert(task_id, status);
                for id in evicted {
                    statuses.remove(&id);
                }
            }
        }
    }
}

/// 无人认领的已完成结果暂存区（按完成顺序淘汰）
struct FinishedResults {
    map: HashMap<TaskId, TaskResult>,
    order: VecDeque<TaskId>,
    cap: usize,
}

impl FinishedResults {
    fn new(cap: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// 暂存一条结果；超过上限先淘汰最旧，返回被淘汰的任务 ID
    fn park(&mut self, result: TaskResult) -> Vec<TaskId> {
        let mut evicted = Vec::new();
        while self.map.len() >= self.cap {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.map.remove(&oldest).is_some() {
                tracing::warn!(task_id = %oldest, "Unclaimed task result evicted");
                evicted.push(oldest);
            }
        }
        self.order.push_back(result.task_id.clone());
        self.map.insert(result.task_id.clone(), result);
        evicted
    }

    /// 取走一条结果（同时从淘汰顺序中移除）
    fn take(&mut self, task_id: &str) -> Option<TaskResult> {
        let result = self.map.remove(task_id)?;
        self.order.retain(|id| id != task_id);
        Some(result)
    }
}

/// Agent 适配度：静态权重、成功率、速度、错误数的加权和，外加可用性与任务优先级加成
fn fitness(cfg: &FitnessSection, agent: &Agent, priority: TaskPriority) -> f64 {
    let perf = &agent.performance;
    // 响应越快越接近 1
    let speed = 1000.0 / (perf.avg_response_ms + 1000.0);
    let availability = match agent.status {
        AgentStatus::Idle => cfg.bonus_idle,
        AgentStatus::Active => cfg.bonus_idle / 2.0,
        _ => 0.0,
    };

    cfg.weight_priority * agent.priority_weight
        + cfg.weight_success * perf.success_rate
        + cfg.weight_speed * speed
        - cfg.weight_error * perf.error_count as f64
        + availability
        + cfg.bonus_task_priority * priority as u8 as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{InMemoryStore, RoleList, XorEncryptor};
    use crate::scheduler::handler::{CapabilityHandler, EchoHandler, HandlerOutput};
    use crate::scheduler::registry::Modality;
    use crate::scheduler::task::TaskContext;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// 记录执行顺序的处理器
    struct RecordingHandler {
        order: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl CapabilityHandler for RecordingHandler {
        fn task_type(&self) -> &str {
            "record"
        }

        async fn handle(&self, task: &TaskRequest) -> Result<HandlerOutput, String> {
            let label = task
                .payload
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string();
            self.order.lock().unwrap().push(label);
            Ok(HandlerOutput::new(serde_json::json!({"status": "ok"}), 0.9))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl CapabilityHandler for FailingHandler {
        fn task_type(&self) -> &str {
            "explode"
        }

        async fn handle(&self, _task: &TaskRequest) -> Result<HandlerOutput, String> {
            Err("simulated failure".to_string())
        }
    }

    fn test_cfg() -> SchedulerSection {
        SchedulerSection {
            dispatch_interval_ms: 1,
            retry_backoff_ms: 2,
            ..SchedulerSection::default()
        }
    }

    fn build_scheduler(handlers: HandlerRegistry) -> Arc<TaskScheduler> {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(AgentRegistry::new(store.clone(), 0.3));
        Arc::new(TaskScheduler::new(
            registry,
            Arc::new(handlers),
            store,
            test_cfg(),
        ))
    }

    async fn register_generalist(sched: &Arc<TaskScheduler>, id: &str) {
        let agent = Agent::new(id, Modality::Generalist).with_id(id);
        sched.registry().register(agent).await;
    }

    #[tokio::test]
    async fn test_dispatch_order_follows_priority() {
        let order = Arc::new(StdMutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        handlers.register(RecordingHandler {
            order: order.clone(),
        });
        let sched = build_scheduler(handlers);
        register_generalist(&sched, "solo").await;

        // 启动前全部入队，保证三个任务同堆竞争
        let mut ids = Vec::new();
        for (label, priority) in [
            ("low", TaskPriority::Low),
            ("critical", TaskPriority::Critical),
            ("medium", TaskPriority::Medium),
        ] {
            let task = TaskRequest::new("record", serde_json::json!({"label": label}))
                .with_priority(priority);
            ids.push(sched.submit(task).await.unwrap());
        }

        let handle = sched.start();
        for id in &ids {
            sched.wait(id).await.unwrap();
        }
        sched.shutdown().await;
        let _ = handle.await;

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["critical", "medium", "low"]);
    }

    #[tokio::test]
    async fn test_capability_mismatch_requeues_until_agent_appears() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let sched = build_scheduler(handlers);

        let task = TaskRequest::new("echo", serde_json::json!({"x": 1}))
            .with_capabilities(["vision"]);
        let task_id = sched.submit(task).await.unwrap();
        let handle = sched.start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        // 无合格 Agent：任务仍在排队，而不是失败
        assert_eq!(sched.status(&task_id).await, Some(TaskStatus::Queued));

        let agent = Agent::new("seer", Modality::Image)
            .with_id("seer")
            .with_capabilities(["vision"]);
        sched.registry().register(agent).await;

        let result = sched.wait(&task_id).await.unwrap();
        assert!(result.success);
        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_permission_denied_is_synchronous() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(AgentRegistry::new(store.clone(), 0.3));
        let sched = TaskScheduler::new(registry, Arc::new(handlers), store, test_cfg())
            .with_access(Arc::new(RoleList::new(["operator"])));

        let task = TaskRequest::new("echo", serde_json::json!({}))
            .with_context(TaskContext::new("u1", "t1").with_role("guest"));
        let err = sched.submit(task).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_execution_failure_releases_agent_and_captures_error() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(FailingHandler);
        let sched = build_scheduler(handlers);
        register_generalist(&sched, "worker").await;

        let handle = sched.start();
        let result = sched
            .execute(TaskRequest::new("explode", serde_json::json!({})))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("simulated failure"));

        let agent = sched.registry().get("worker").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.performance.error_count, 1);
        assert!((agent.performance.success_rate - 0.95).abs() < 1e-9);

        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_sensitive_payload_is_encrypted_before_queue() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(AgentRegistry::new(store.clone(), 0.3));
        let sched = Arc::new(
            TaskScheduler::new(registry, Arc::new(handlers), store, test_cfg())
                .with_encryptor(Arc::new(XorEncryptor::new(b"k".to_vec()))),
        );
        register_generalist(&sched, "worker").await;

        let handle = sched.start();
        let result = sched
            .execute(TaskRequest::new("echo", serde_json::json!({"secret": "pw"})).sensitive())
            .await
            .unwrap();

        // EchoHandler 回显的是密文载荷，原文不可见
        let output = result.output.unwrap();
        assert!(output.get("ciphertext").is_some());
        assert!(output.get("secret").is_none());

        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_instead_of_dispatch() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let sched = build_scheduler(handlers);
        register_generalist(&sched, "worker").await;

        let past = chrono::Utc::now().timestamp_millis() - 1_000;
        let task = TaskRequest::new("echo", serde_json::json!({})).with_deadline(past);

        let handle = sched.start();
        let result = sched.execute(task).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Deadline"));

        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_wait_unknown_task_id() {
        let sched = build_scheduler(HandlerRegistry::new());
        let err = sched.wait("task_missing").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_result_delivery_prunes_bookkeeping() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let sched = build_scheduler(handlers);
        register_generalist(&sched, "worker").await;

        let handle = sched.start();
        let task_id = sched
            .submit(TaskRequest::new("echo", serde_json::json!({"n": 1})))
            .await
            .unwrap();
        let result = sched.wait(&task_id).await.unwrap();
        assert!(result.success);

        // 结果是瞬态的：交付后状态表与暂存区都不再保留该任务
        assert_eq!(sched.status(&task_id).await, None);
        let err = sched.wait(&task_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TaskNotFound(_)));

        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_unawaited_result_parked_until_claimed() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let sched = build_scheduler(handlers);
        register_generalist(&sched, "worker").await;

        let handle = sched.start();
        let task_id = sched
            .submit(TaskRequest::new("echo", serde_json::json!({})))
            .await
            .unwrap();

        // 没有等待者时结果进暂存区，状态可观测为 Completed
        let mut tries = 0;
        while sched.status(&task_id).await != Some(TaskStatus::Completed) {
            tries += 1;
            assert!(tries < 500, "task did not complete in time");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let result = sched.wait(&task_id).await.unwrap();
        assert!(result.success);
        assert_eq!(sched.status(&task_id).await, None);

        sched.shutdown().await;
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_unclaimed_results_evicted_beyond_cap() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(EchoHandler);
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(AgentRegistry::new(store.clone(), 0.3));
        let cfg = SchedulerSection {
            finished_results_cap: 2,
            ..test_cfg()
        };
        let sched = Arc::new(TaskScheduler::new(registry, Arc::new(handlers), store, cfg));
        register_generalist(&sched, "worker").await;

        // 单 Agent 串行执行，同优先级按提交顺序完成
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(
                sched
                    .submit(TaskRequest::new("echo", serde_json::json!({"n": n})))
                    .await
                    .unwrap(),
            );
        }
        let handle = sched.start();

        let mut tries = 0;
        while sched.status(&ids[2]).await != Some(TaskStatus::Completed) {
            tries += 1;
            assert!(tries < 500, "tasks did not complete in time");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // 暂存上限为 2：最早完成的结果被淘汰，后两条仍可认领
        let err = sched.wait(&ids[0]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TaskNotFound(_)));
        assert!(sched.wait(&ids[1]).await.unwrap().success);
        assert!(sched.wait(&ids[2]).await.unwrap().success);

        sched.shutdown().await;
        let _ = handle.await;
    }
}
