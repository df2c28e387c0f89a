//! 认知引擎：reason / plan / learn
//!
//! 状态按 (actor, tenant) 键隔离，同键并发调用经每键互斥锁串行化，
//! 跨键互不阻塞。每个操作先校验再计算，状态变更永远是最后一步，
//! 任何阶段出错都不会留下半成品状态。写回后把序列化快照点写到
//! 持久化存储。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::cognition::long_term::{relevance_score, tokenize_lower};
use crate::cognition::state::{
    CognitiveState, Experience, Insight, InsightKind, MemoryEntry,
};
use crate::config::CognitionSection;
use crate::external::DurableStore;

/// 认知操作错误：全部在状态变更前抛出
#[derive(Error, Debug)]
pub enum CognitiveError {
    #[error("Premise is empty")]
    EmptyPremise,
    #[error("Objective is empty")]
    EmptyObjective,
    #[error("Experience is empty")]
    EmptyExperience,
    #[error("No feasible plan under the given constraints")]
    NoFeasiblePlan,
}

/// reason 的产物
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    pub conclusion: String,
    pub confidence: f64,
    /// 推理步骤描述
    pub trace: Vec<String>,
    /// 支撑结论的记忆条目内容
    pub supporting: Vec<String>,
}

/// 计划中的一个阶段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub subgoal: String,
    /// 前置阶段名
    pub depends_on: Vec<String>,
    /// 相对工作量 [0, 1]
    pub estimated_effort: f64,
}

/// plan 的产物：选中的候选计划及其阶段化时间线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub objective: String,
    pub profile: String,
    pub subgoals: Vec<String>,
    pub phases: Vec<PlanPhase>,
    pub risk: f64,
    pub resource_cost: f64,
    pub score: f64,
}

/// 认知引擎
pub struct CognitiveEngine {
    /// 每个 (actor, tenant) 键一个状态单元；操作全程持有单元锁
    states: RwLock<HashMap<String, Arc<Mutex<CognitiveState>>>>,
    store: Arc<dyn DurableStore>,
    cfg: CognitionSection,
}

impl CognitiveEngine {
    pub fn new(store: Arc<dyn DurableStore>, cfg: CognitionSection) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            store,
            cfg,
        }
    }

    fn key(actor_id: &str, tenant_id: &str) -> String {
        format!("{actor_id}:{tenant_id}")
    }

    /// 取状态克隆（测试与上层观测用）
    pub async fn state(&self, actor_id: &str, tenant_id: &str) -> Option<CognitiveState> {
        let cell = self
            .states
            .read()
            .await
            .get(&Self::key(actor_id, tenant_id))
            .cloned()?;
        let state = cell.lock().await.clone();
        Some(state)
    }

    /// 取该键的状态单元；首次访问从持久化存储点读，没有则新建
    ///
    /// 同键操作共用一个 Mutex，load→计算→写回全程持锁，
    /// 并发调用按键串行化，不会互相覆盖更新。
    async fn entry(&self, actor_id: &str, tenant_id: &str) -> Arc<Mutex<CognitiveState>> {
        let key = Self::key(actor_id, tenant_id);
        if let Some(cell) = self.states.read().await.get(&key) {
            return Arc::clone(cell);
        }

        let loaded = match self.store.load_cognitive_state(&key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(state) => Some(state),
                Err(e) => {
                    tracing::warn!("Discarding unreadable cognitive snapshot: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to load cognitive state: {e}");
                None
            }
        };
        let state = loaded
            .unwrap_or_else(|| CognitiveState::new(actor_id, tenant_id, self.cfg.working_capacity));

        let mut states = self.states.write().await;
        // 两个首次调用可能同时加载，以先插入者为准
        Arc::clone(
            states
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(state))),
        )
    }

    /// 点写快照（调用方持有该键的状态锁）
    async fn persist(&self, state: &CognitiveState) {
        let key = Self::key(&state.actor_id, &state.tenant_id);
        match serde_json::to_value(state) {
            Ok(snapshot) => {
                if let Err(e) = self.store.save_cognitive_state(&key, snapshot).await {
                    tracing::warn!("Failed to persist cognitive state: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize cognitive state: {e}"),
        }
    }

    /// 有界插入：淘汰的条目重要度达标则晋升长期记忆，否则丢弃
    fn remember(&self, state: &mut CognitiveState, content: String, importance: f64) {
        if let Some(evicted) = state.working.insert(MemoryEntry::new(content, importance)) {
            if evicted.importance >= self.cfg.promote_threshold {
                tracing::debug!(content = %evicted.content, "Evicted entry promoted to long-term memory");
                state.long_term.add(evicted);
            } else {
                tracing::trace!(content = %evicted.content, "Evicted entry discarded");
            }
        }
    }

    /// 推理：分析前提 → 汇集相关记忆 → 构建推理轨迹 → 产出结论与置信度
    pub async fn reason(
        &self,
        actor_id: &str,
        tenant_id: &str,
        premise: &str,
        goal: &str,
    ) -> Result<ReasoningOutcome, CognitiveError> {
        let premise = premise.trim();
        if premise.is_empty() {
            return Err(CognitiveError::EmptyPremise);
        }

        let cell = self.entry(actor_id, tenant_id).await;
        let mut state = cell.lock().await;

        // 前提结构分析
        let premise_tokens = tokenize_lower(premise);
        let goal_tokens = tokenize_lower(goal);
        let clause_count = premise.split([',', ';']).filter(|c| !c.trim().is_empty()).count();
        let negated = premise_tokens.contains("not")
            || premise_tokens.contains("no")
            || premise_tokens.contains("never");
        let is_question = premise.ends_with('?');

        let mut trace = vec![format!(
            "Analyzed premise: {clause_count} clause(s), negation={negated}, question={is_question}"
        )];

        // 相关记忆汇集：工作记忆走同一相关度函数，长期记忆走检索
        let now = chrono::Utc::now().timestamp_millis();
        let mut supporting: Vec<String> = state
            .working
            .iter_recent()
            .filter(|e| relevance_score(e, &premise_tokens, &goal_tokens, now) > 0.3)
            .map(|e| e.content.clone())
            .collect();
        for hit in state.long_term.search(premise, &state.goals, 3) {
            supporting.push(hit.content);
        }
        trace.push(format!(
            "Gathered {} supporting entr(ies) from memory",
            supporting.len()
        ));

        // 结论与置信度
        let goal_overlap = if goal_tokens.is_empty() {
            0.0
        } else {
            premise_tokens.intersection(&goal_tokens).count() as f64 / goal_tokens.len() as f64
        };
        let mut confidence = 0.5 + 0.1 * (supporting.len().min(3) as f64) + 0.15 * goal_overlap;
        if negated {
            confidence -= 0.1;
        }
        if is_question {
            confidence -= 0.1;
        }
        let confidence = confidence.clamp(0.1, 0.95);

        let conclusion = if supporting.is_empty() {
            format!("No prior evidence; tentatively relating '{premise}' to goal '{goal}'")
        } else {
            format!(
                "Premise '{premise}' is consistent with {} remembered observation(s) toward goal '{goal}'",
                supporting.len()
            )
        };
        trace.push(format!("Concluded with confidence {confidence:.2}"));

        // 状态写入是最后一步
        self.remember(
            &mut state,
            format!("{premise} => {conclusion}"),
            0.3 + 0.5 * goal_overlap,
        );
        state.context_history.push(premise.to_string());
        if !goal.is_empty() && !state.goals.iter().any(|g| g == goal) {
            state.goals.push(goal.to_string());
        }
        state.focus = Some(goal.to_string());
        state.attention = (0.9 * state.attention + 0.1 * confidence).clamp(0.0, 1.0);
        state.cognitive_load =
            (state.cognitive_load + 0.02 * clause_count as f64).clamp(0.0, 1.0);
        self.persist(&state).await;

        Ok(ReasoningOutcome {
            conclusion,
            confidence,
            trace,
            supporting,
        })
    }

    /// 规划：目标分解 → 资源盘点 → 约束过滤 → 多候选打分 → 阶段化时间线
    pub async fn plan(
        &self,
        actor_id: &str,
        tenant_id: &str,
        objective: &str,
        constraints: &[String],
    ) -> Result<PlanOutcome, CognitiveError> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(CognitiveError::EmptyObjective);
        }

        let cell = self.entry(actor_id, tenant_id).await;
        let mut state = cell.lock().await;

        // 目标分解：按连接词切分；单一目标展开为分析/执行/验证三段
        let mut subgoals: Vec<String> = objective
            .split([',', ';'])
            .flat_map(|part| part.split(" and "))
            .flat_map(|part| part.split(" then "))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if subgoals.len() == 1 {
            let only = subgoals.remove(0);
            subgoals = vec![
                format!("analyze: {only}"),
                format!("execute: {only}"),
                format!("verify: {only}"),
            ];
        }

        // 资源盘点：可用注意力随认知负荷下降，每条约束再扣一档
        let capacity = (1.0 - state.cognitive_load) * state.attention;
        let budget = capacity - 0.05 * constraints.len() as f64;
        if budget <= 0.0 {
            return Err(CognitiveError::NoFeasiblePlan);
        }

        // 候选计划：三种风险/资源画像，取加权分最高者
        let constraint_pressure = (0.1 * constraints.len() as f64).min(0.4);
        let candidates = [
            ("conservative", 0.15, 0.75),
            ("balanced", 0.4, 0.5),
            ("aggressive", 0.7, 0.3),
        ];
        let (profile, risk, resource_cost, score) = candidates
            .iter()
            .map(|(name, base_risk, base_cost)| {
                let risk = (base_risk + constraint_pressure).min(1.0);
                let cost = (base_cost / budget.max(0.1)).min(1.0);
                let score = 0.5 * (1.0 - risk) + 0.5 * (1.0 - cost);
                (*name, risk, cost, score)
            })
            .max_by(|a, b| a.3.total_cmp(&b.3))
            .ok_or(CognitiveError::NoFeasiblePlan)?;

        // 阶段化时间线：线性依赖链，工作量均摊
        let effort = resource_cost / subgoals.len() as f64;
        let phases: Vec<PlanPhase> = subgoals
            .iter()
            .enumerate()
            .map(|(i, sub)| PlanPhase {
                name: format!("phase-{}", i + 1),
                subgoal: sub.clone(),
                depends_on: if i == 0 {
                    Vec::new()
                } else {
                    vec![format!("phase-{i}")]
                },
                estimated_effort: effort,
            })
            .collect();

        // 状态写入是最后一步
        self.remember(
            &mut state,
            format!("plan[{profile}]: {objective}"),
            0.5 + 0.2 * (1.0 - risk),
        );
        state.context_history.push(objective.to_string());
        if !state.goals.iter().any(|g| g == objective) {
            state.goals.push(objective.to_string());
        }
        state.focus = Some(objective.to_string());
        state.cognitive_load =
            (state.cognitive_load + 0.03 * phases.len() as f64).clamp(0.0, 1.0);
        self.persist(&state).await;

        Ok(PlanOutcome {
            objective: objective.to_string(),
            profile: profile.to_string(),
            subgoals,
            phases,
            risk,
            resource_cost,
            score,
        })
    }

    /// 学习：经验编码 → 模式检测 → 长期记忆固化 → 逐模式产出洞察
    pub async fn learn(
        &self,
        actor_id: &str,
        tenant_id: &str,
        experience: &str,
        feedback: Option<&str>,
    ) -> Result<Vec<Insight>, CognitiveError> {
        let experience = experience.trim();
        if experience.is_empty() {
            return Err(CognitiveError::EmptyExperience);
        }

        let cell = self.entry(actor_id, tenant_id).await;
        let mut state = cell.lock().await;
        let now = chrono::Utc::now().timestamp_millis();

        // 经验编码
        let tokens = tokenize_lower(experience);
        let valence = estimate_valence(&tokens);
        let complexity = (tokens.len() as f64 / 40.0).min(1.0);
        let goal_tokens: std::collections::HashSet<String> = state
            .goals
            .iter()
            .flat_map(|g| tokenize_lower(g))
            .collect();
        let goal_align = if goal_tokens.is_empty() {
            0.0
        } else {
            tokens.intersection(&goal_tokens).count() as f64 / goal_tokens.len() as f64
        };
        let repetition = state
            .experiences
            .iter()
            .filter(|e| shares_tokens(&tokens, &e.description, 2))
            .count();
        let importance =
            (0.4 * valence.abs() + 0.4 * goal_align + 0.2 * (repetition as f64 / 3.0).min(1.0))
                .clamp(0.05, 1.0);

        let encoded = Experience {
            description: experience.to_string(),
            valence,
            importance,
            complexity,
            feedback: feedback.map(str::to_string),
            recorded_at: now,
        };

        // 模式检测（对含新经验的窗口求值）
        let mut window: Vec<&Experience> = state.experiences.iter().collect();
        window.push(&encoded);
        let window = &window[window.len().saturating_sub(self.cfg.experience_window)..];

        let mut insights = Vec::new();

        // Sequence：最近三条经验共享同一词
        if window.len() >= 3 {
            let recent = &window[window.len() - 3..];
            if let Some(common) = common_token(recent) {
                insights.push(Insight {
                    kind: InsightKind::Pattern,
                    description: format!("Recurring sequence involving '{common}'"),
                    confidence: 0.7,
                    relevance: importance,
                    evidence: recent.iter().map(|e| e.description.clone()).collect(),
                    created_at: now,
                });
            }
        }

        // Correlation：某个词在窗口内至少出现三次
        for token in &tokens {
            let occurrences = window
                .iter()
                .filter(|e| tokenize_lower(&e.description).contains(token))
                .count();
            if occurrences >= 3 {
                insights.push(Insight {
                    kind: InsightKind::Pattern,
                    description: format!(
                        "'{token}' correlates across {occurrences} recent experiences"
                    ),
                    confidence: (0.4 + 0.1 * occurrences as f64).min(0.9),
                    relevance: importance,
                    evidence: vec![experience.to_string()],
                    created_at: now,
                });
                break;
            }
        }

        // Causal：显式因果标记推出预测
        const CAUSAL_MARKERS: [&str; 4] = ["because", "caused", "therefore", "led"];
        if CAUSAL_MARKERS.iter().any(|m| tokens.contains(*m)) {
            insights.push(Insight {
                kind: InsightKind::Prediction,
                description: format!("Causal link recorded; similar antecedents likely repeat: {experience}"),
                confidence: 0.6,
                relevance: importance,
                evidence: vec![experience.to_string()],
                created_at: now,
            });
        }

        // Anomaly：效价显著偏离窗口基线
        if window.len() >= 3 {
            let baseline: f64 =
                window.iter().map(|e| e.valence).sum::<f64>() / window.len() as f64;
            if (valence - baseline).abs() > 0.6 {
                insights.push(Insight {
                    kind: InsightKind::Anomaly,
                    description: format!(
                        "Valence {valence:.2} deviates from recent baseline {baseline:.2}"
                    ),
                    confidence: 0.65,
                    relevance: importance,
                    evidence: vec![experience.to_string()],
                    created_at: now,
                });
            }
        }

        // 反馈产出建议类洞察
        if let Some(fb) = feedback {
            insights.push(Insight {
                kind: InsightKind::Recommendation,
                description: format!("Apply feedback next time: {fb}"),
                confidence: 0.75,
                relevance: importance,
                evidence: vec![experience.to_string(), fb.to_string()],
                created_at: now,
            });
        }

        // 状态写入是最后一步
        for insight in &insights {
            // 检出的模式固化进长期记忆
            state
                .long_term
                .add(MemoryEntry::new(insight.description.clone(), importance.max(0.6)));
        }
        let working_note = match feedback {
            Some(fb) => format!("{experience} | feedback: {fb}"),
            None => experience.to_string(),
        };
        self.remember(&mut state, working_note, importance);
        state.context_history.push(experience.to_string());
        state.experiences.push(encoded);
        let window_cap = self.cfg.experience_window;
        if state.experiences.len() > window_cap {
            let drop = state.experiences.len() - window_cap;
            state.experiences.drain(0..drop);
        }
        state.insights.extend(insights.iter().cloned());
        if state.insights.len() > self.cfg.insight_log_cap {
            let drop = state.insights.len() - self.cfg.insight_log_cap;
            state.insights.drain(0..drop);
        }
        self.persist(&state).await;

        Ok(insights)
    }
}

const POSITIVE_WORDS: [&str; 8] = [
    "success", "succeeded", "good", "great", "fast", "improved", "won", "passed",
];
const NEGATIVE_WORDS: [&str; 8] = [
    "failure", "failed", "bad", "slow", "error", "crashed", "lost", "broken",
];

/// 情绪效价：正负词计数差归一化到 [-1, 1]
fn estimate_valence(tokens: &std::collections::HashSet<String>) -> f64 {
    let pos = POSITIVE_WORDS.iter().filter(|w| tokens.contains(**w)).count() as f64;
    let neg = NEGATIVE_WORDS.iter().filter(|w| tokens.contains(**w)).count() as f64;
    if pos + neg == 0.0 {
        0.0
    } else {
        (pos - neg) / (pos + neg)
    }
}

/// 两段文本是否共享至少 n 个词
fn shares_tokens(tokens: &std::collections::HashSet<String>, other: &str, n: usize) -> bool {
    let other_tokens = tokenize_lower(other);
    tokens.intersection(&other_tokens).count() >= n
}

/// 一组经验共享的任一词（取字典序最小保证确定性）
fn common_token(experiences: &[&Experience]) -> Option<String> {
    let mut iter = experiences.iter();
    let first = tokenize_lower(&iter.next()?.description);
    let mut common: Vec<String> = first
        .into_iter()
        .filter(|t| {
            experiences[1..]
                .iter()
                .all(|e| tokenize_lower(&e.description).contains(t))
        })
        .collect();
    common.sort();
    common.into_iter().next()
}
