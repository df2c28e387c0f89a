//! 长期记忆：无界、只增的联想存储
//!
//! 检索按定义好的相关度函数打分（词重叠 × 新近度衰减 × 目标对齐），
//! 不做随机抽取；后续可换接真实向量库，打分接口不变。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cognition::state::MemoryEntry;

/// 将文本切分为小写词集合，用于重叠相似度
pub(crate) fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 相关度：0.5·词重叠 + 0.3·新近度 + 0.2·目标对齐，全部落在 [0, 1]
pub(crate) fn relevance_score(
    entry: &MemoryEntry,
    query_tokens: &HashSet<String>,
    goal_tokens: &HashSet<String>,
    now_ms: i64,
) -> f64 {
    let entry_tokens = tokenize_lower(&entry.content);
    if entry_tokens.is_empty() {
        return 0.0;
    }

    let overlap = if query_tokens.is_empty() {
        0.0
    } else {
        query_tokens.intersection(&entry_tokens).count() as f64 / query_tokens.len() as f64
    };

    // 半衰期约一天的新近度衰减
    let age_days = ((now_ms - entry.created_at).max(0)) as f64 / 86_400_000.0;
    let recency = 1.0 / (1.0 + age_days);

    let goal_align = if goal_tokens.is_empty() {
        0.0
    } else {
        goal_tokens.intersection(&entry_tokens).count() as f64 / goal_tokens.len() as f64
    };

    0.5 * overlap + 0.3 * recency + 0.2 * goal_align
}

/// 无界长期记忆（append-only，条数单调不减）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LongTermStore {
    entries: Vec<MemoryEntry>,
}

impl LongTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: MemoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按相关度检索最相关的 k 条（重叠为零且无目标对齐的条目不返回）
    pub fn search(&self, query: &str, goals: &[String], k: usize) -> Vec<MemoryEntry> {
        let query_tokens = tokenize_lower(query);
        let goal_tokens: HashSet<String> = goals.iter().flat_map(|g| tokenize_lower(g)).collect();
        let now = chrono::Utc::now().timestamp_millis();

        let mut scored: Vec<(f64, &MemoryEntry)> = self
            .entries
            .iter()
            .map(|e| (relevance_score(e, &query_tokens, &goal_tokens, now), e))
            .filter(|(score, _)| *score > 0.3)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(k).map(|(_, e)| e.clone()).collect()
    }
}
