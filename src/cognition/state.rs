//! 认知状态类型定义
//!
//! 按 (actor, tenant) 键维护的认知状态：有界工作记忆、无界长期记忆、
//! 上下文历史、目标列表与注意力/认知负荷标量；每次 reason / plan / learn
//! 调用后整体落盘。

use serde::{Deserialize, Serialize};

use crate::cognition::long_term::LongTermStore;
use crate::cognition::working::WorkingMemory;

/// 记忆条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    /// 重要度 [0, 1]：淘汰时决定是否晋升长期记忆
    pub importance: f64,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>, importance: f64) -> Self {
        Self {
            id: format!("mem_{}", uuid::Uuid::new_v4()),
            content: content.into(),
            importance: importance.clamp(0.0, 1.0),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 洞察类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsightKind {
    /// 重复出现的模式
    Pattern,
    /// 偏离近期基线的异常
    Anomaly,
    /// 由因果链推出的预测
    Prediction,
    /// 基于反馈的建议
    Recommendation,
}

/// 派生洞察：附证据与置信度，追加到 per-actor 日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub description: String,
    pub confidence: f64,
    pub relevance: f64,
    pub evidence: Vec<String>,
    /// 毫秒时间戳
    pub created_at: i64,
}

/// 编码后的经验（learn 的输入产物）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub description: String,
    /// 情绪效价 [-1, 1]
    pub valence: f64,
    pub importance: f64,
    /// 结构复杂度 [0, 1]
    pub complexity: f64,
    pub feedback: Option<String>,
    /// 毫秒时间戳
    pub recorded_at: i64,
}

/// (actor, tenant) 维度的认知状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveState {
    pub actor_id: String,
    pub tenant_id: String,
    pub working: WorkingMemory,
    pub long_term: LongTermStore,
    /// 近期处理过的输入（premise / objective / experience）
    pub context_history: Vec<String>,
    pub goals: Vec<String>,
    pub focus: Option<String>,
    /// 注意力水平 [0, 1]
    pub attention: f64,
    /// 认知负荷 [0, 1]
    pub cognitive_load: f64,
    /// 模式检测窗口内的经验
    pub experiences: Vec<Experience>,
    pub insights: Vec<Insight>,
}

impl CognitiveState {
    pub fn new(
        actor_id: impl Into<String>,
        tenant_id: impl Into<String>,
        working_capacity: usize,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id: tenant_id.into(),
            working: WorkingMemory::new(working_capacity),
            long_term: LongTermStore::new(),
            context_history: Vec::new(),
            goals: Vec::new(),
            focus: None,
            attention: 0.8,
            cognitive_load: 0.2,
            experiences: Vec::new(),
            insights: Vec::new(),
        }
    }
}
