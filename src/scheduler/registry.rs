//! Agent 注册表
//!
//! 维护工作 Agent 的能力集合、状态与滚动性能统计；注册是按 ID 的幂等
//! upsert，Agent 永不删除，只会标记为 Offline。状态变更会镜像一份快照
//! 到持久化存储协作方。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::external::{AgentSnapshot, DurableStore};

/// Agent ID
pub type AgentId = String;

/// Agent 模态类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Text,
    Audio,
    Image,
    Video,
    /// 通用型，不限模态
    Generalist,
}

/// Agent 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// 在线且刚完成工作
    Active,
    /// 在线空闲
    Idle,
    /// 正在执行任务
    Busy,
    /// 离线（终态，重新注册后复活）
    Offline,
}

/// 滚动性能统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// 响应时间指数移动平均（毫秒）
    pub avg_response_ms: f64,
    /// 成功率：成功 +0.01、失败 −0.05（信任跌得快、涨得慢）
    pub success_rate: f64,
    pub error_count: u64,
    pub tasks_completed: u64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            avg_response_ms: 0.0,
            success_rate: 1.0,
            error_count: 0,
            tasks_completed: 0,
        }
    }
}

/// 工作 Agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub modality: Modality,
    pub status: AgentStatus,
    /// 能力集合；须为任务所需能力的超集才可被派发
    pub capabilities: HashSet<String>,
    /// 打分时的静态权重
    pub priority_weight: f64,
    pub performance: AgentPerformance,
    /// 最近心跳（毫秒时间戳）
    pub last_heartbeat: i64,
}

impl Agent {
    pub fn new(name: impl Into<String>, modality: Modality) -> Self {
        Self {
            id: format!("agent_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            modality,
            status: AgentStatus::Idle,
            capabilities: HashSet::new(),
            priority_weight: 0.5,
            performance: AgentPerformance::default(),
            last_heartbeat: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority_weight(mut self, weight: f64) -> Self {
        self.priority_weight = weight;
        self
    }

    /// 能力集合是否覆盖任务所需
    pub fn covers(&self, required: &HashSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// 是否可接新任务（Idle / Active）
    pub fn available(&self) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::Active)
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            status: format!("{:?}", self.status),
            success_rate: self.performance.success_rate,
            tasks_completed: self.performance.tasks_completed,
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Agent 注册表（共享临界区，RwLock 保护）
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Agent>>,
    store: Arc<dyn DurableStore>,
    /// 响应时间 EMA 平滑系数
    ema_alpha: f64,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn DurableStore>, ema_alpha: f64) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            store,
            ema_alpha,
        }
    }

    /// 幂等注册：同 ID 重复注册为原地更新（保留性能统计），状态恢复为 Idle
    pub async fn register(&self, agent: Agent) {
        let mut agents = self.agents.write().await;
        let agent = match agents.remove(&agent.id) {
            Some(existing) => Agent {
                performance: existing.performance,
                status: AgentStatus::Idle,
                last_heartbeat: chrono::Utc::now().timestamp_millis(),
                ..agent
            },
            None => agent,
        };
        let snapshot = agent.snapshot();
        tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent registered");
        agents.insert(agent.id.clone(), agent);
        drop(agents);

        if let Err(e) = self.store.save_agent_snapshot(snapshot).await {
            tracing::warn!("Failed to mirror agent snapshot: {e}");
        }
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// 刷新心跳时间
    pub async fn heartbeat(&self, agent_id: &str) {
        if let Some(agent) = self.agents.write().await.get_mut(agent_id) {
            agent.last_heartbeat = chrono::Utc::now().timestamp_millis();
        }
    }

    /// 候选 Agent：能力覆盖所需且状态为 Idle / Active
    pub async fn candidates(&self, required: &HashSet<String>) -> Vec<Agent> {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| a.available() && a.covers(required))
            .cloned()
            .collect()
    }

    /// 占用 Agent（派发时调用）；已不可用则返回 false，防止双重派发
    pub async fn mark_busy(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get_mut(agent_id) {
            Some(agent) if agent.available() => {
                agent.status = AgentStatus::Busy;
                true
            }
            _ => false,
        }
    }

    /// 标记离线（终态，直到重新注册）
    pub async fn mark_offline(&self, agent_id: &str) {
        let snapshot = {
            let mut agents = self.agents.write().await;
            match agents.get_mut(agent_id) {
                Some(agent) => {
                    agent.status = AgentStatus::Offline;
                    Some(agent.snapshot())
                }
                None => None,
            }
        };
        if let Some(snapshot) = snapshot {
            if let Err(e) = self.store.save_agent_snapshot(snapshot).await {
                tracing::warn!("Failed to mirror agent snapshot: {e}");
            }
        }
    }

    /// 记录执行结果并释放 Agent（Busy → Idle）
    ///
    /// 响应时间取 EMA；成功率成功 +0.01、失败 −0.05，夹在 [0, 1]。
    pub async fn record_outcome(&self, agent_id: &str, success: bool, elapsed_ms: u64) {
        let mut agents = self.agents.write().await;
        let Some(agent) = agents.get_mut(agent_id) else {
            return;
        };

        let perf = &mut agent.performance;
        let sample = elapsed_ms as f64;
        perf.avg_response_ms = if perf.tasks_completed == 0 {
            sample
        } else {
            self.ema_alpha * sample + (1.0 - self.ema_alpha) * perf.avg_response_ms
        };
        perf.tasks_completed += 1;
        if success {
            perf.success_rate = (perf.success_rate + 0.01).min(1.0);
        } else {
            perf.success_rate = (perf.success_rate - 0.05).max(0.0);
            perf.error_count += 1;
        }

        if agent.status == AgentStatus::Busy {
            agent.status = AgentStatus::Idle;
        }
        agent.last_heartbeat = chrono::Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryStore;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(InMemoryStore::new()), 0.3)
    }

    fn agent(id: &str, caps: &[&str]) -> Agent {
        Agent::new(id, Modality::Generalist)
            .with_id(id)
            .with_capabilities(caps.iter().copied())
    }

    #[tokio::test]
    async fn test_register_is_idempotent_upsert() {
        let reg = registry();
        reg.register(agent("a1", &["nlp"])).await;
        reg.register(agent("a1", &["nlp", "vision"])).await;

        assert_eq!(reg.len().await, 1);
        let a = reg.get("a1").await.unwrap();
        assert!(a.capabilities.contains("vision"));
    }

    #[tokio::test]
    async fn test_reregister_preserves_performance() {
        let reg = registry();
        reg.register(agent("a1", &["nlp"])).await;
        reg.record_outcome("a1", false, 100).await;

        reg.register(agent("a1", &["nlp"])).await;
        let a = reg.get("a1").await.unwrap();
        assert_eq!(a.performance.error_count, 1);
        assert_eq!(a.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_candidates_require_capability_superset() {
        let reg = registry();
        reg.register(agent("nlp_only", &["nlp"])).await;
        reg.register(agent("full", &["nlp", "vision"])).await;

        let required: HashSet<String> = ["nlp".to_string(), "vision".to_string()].into();
        let found = reg.candidates(&required).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "full");
    }

    #[tokio::test]
    async fn test_busy_agent_not_candidate_and_no_double_dispatch() {
        let reg = registry();
        reg.register(agent("a1", &[])).await;

        assert!(reg.mark_busy("a1").await);
        assert!(!reg.mark_busy("a1").await);
        assert!(reg.candidates(&HashSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_asymmetric_success_rate_update() {
        let reg = registry();
        reg.register(agent("a1", &[])).await;

        reg.record_outcome("a1", false, 50).await;
        let after_fail = reg.get("a1").await.unwrap().performance.success_rate;
        assert!((after_fail - 0.95).abs() < 1e-9);

        reg.record_outcome("a1", true, 50).await;
        let after_ok = reg.get("a1").await.unwrap().performance.success_rate;
        assert!((after_ok - 0.96).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_offline_is_terminal_until_reregistered() {
        let reg = registry();
        reg.register(agent("a1", &[])).await;
        reg.mark_offline("a1").await;

        assert!(reg.candidates(&HashSet::new()).await.is_empty());
        assert!(!reg.mark_busy("a1").await);

        reg.register(agent("a1", &[])).await;
        assert_eq!(reg.get("a1").await.unwrap().status, AgentStatus::Idle);
    }
}
