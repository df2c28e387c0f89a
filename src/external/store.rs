//! 持久化存储协作方
//!
//! 引擎向这里写 Agent 状态快照、任务执行日志与认知状态序列化结果；
//! 提供 InMemoryStore（测试/默认）与 FileStore（JSON 文件）两个实现，
//! 真实数据库后端由调用方实现同一 trait 注入。

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Agent 状态快照（注册与状态变更时写入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub name: String,
    pub status: String,
    pub success_rate: f64,
    pub tasks_completed: u64,
    /// 毫秒时间戳
    pub recorded_at: i64,
}

/// 任务执行日志（每次派发完成后写入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub task_id: String,
    pub task_type: String,
    pub agent_id: String,
    pub actor_id: String,
    pub tenant_id: String,
    pub success: bool,
    pub execution_ms: u64,
    pub error: Option<String>,
    /// 毫秒时间戳
    pub recorded_at: i64,
}

/// 持久化存储 trait：点写（派发完成、状态变更）与点读（认知状态初始化）
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 写入 Agent 状态快照
    async fn save_agent_snapshot(&self, snapshot: AgentSnapshot) -> anyhow::Result<()>;

    /// 追加一条任务执行日志
    async fn log_task_execution(&self, log: ExecutionLog) -> anyhow::Result<()>;

    /// 按 key（actor:tenant）写入序列化后的认知状态
    async fn save_cognitive_state(&self, key: &str, state: serde_json::Value) -> anyhow::Result<()>;

    /// 按 key 读取认知状态，不存在时返回 None
    async fn load_cognitive_state(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
}

/// 内存实现：RwLock 包裹的 HashMap，测试与默认装配使用
#[derive(Default)]
pub struct InMemoryStore {
    agents: RwLock<HashMap<String, AgentSnapshot>>,
    executions: RwLock<Vec<ExecutionLog>>,
    cognitive: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的执行日志条数（测试断言用）
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// 最近一次写入的某 Agent 快照
    pub async fn agent_snapshot(&self, agent_id: &str) -> Option<AgentSnapshot> {
        self.agents.read().await.get(agent_id).cloned()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn save_agent_snapshot(&self, snapshot: AgentSnapshot) -> anyhow::Result<()> {
        self.agents
            .write()
            .await
            .insert(snapshot.agent_id.clone(), snapshot);
        Ok(())
    }

    async fn log_task_execution(&self, log: ExecutionLog) -> anyhow::Result<()> {
        self.executions.write().await.push(log);
        Ok(())
    }

    async fn save_cognitive_state(&self, key: &str, state: serde_json::Value) -> anyhow::Result<()> {
        self.cognitive.write().await.insert(key.to_string(), state);
        Ok(())
    }

    async fn load_cognitive_state(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.cognitive.read().await.get(key).cloned())
    }
}

/// 文件实现：根目录下按类型分文件存 JSON，父目录不存在时自动创建
///
/// 布局：agents/<id>.json、cognitive/<key>.json、executions.jsonl（逐行追加）
pub struct FileStore {
    root: std::path::PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    async fn write_json(&self, rel: &str, value: &impl Serialize) -> anyhow::Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_string_pretty(value)?).await?;
        Ok(())
    }

    /// key 可能含 ':' 等分隔符，落盘前替换为下划线
    fn sanitize(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn save_agent_snapshot(&self, snapshot: AgentSnapshot) -> anyhow::Result<()> {
        self.write_json(
            &format!("agents/{}.json", Self::sanitize(&snapshot.agent_id)),
            &snapshot,
        )
        .await
    }

    async fn log_task_execution(&self, log: ExecutionLog) -> anyhow::Result<()> {
        use tokio::io::AsyncWriteExt;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join("executions.jsonl");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut line = serde_json::to_string(&log)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn save_cognitive_state(&self, key: &str, state: serde_json::Value) -> anyhow::Result<()> {
        self.write_json(&format!("cognitive/{}.json", Self::sanitize(key)), &state)
            .await
    }

    async fn load_cognitive_state(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let path = self
            .root
            .join(format!("cognitive/{}.json", Self::sanitize(key)));
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
