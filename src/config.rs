//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SCHEDULER__DISPATCH_INTERVAL_MS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub cognition: CognitionSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// [scheduler] 段：调度循环节奏、并发上限、性能统计参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// 调度循环空转时的休眠间隔（毫秒）
    pub dispatch_interval_ms: u64,
    /// 无可用 Agent 时重新入队后的退避时长（毫秒）
    pub retry_backoff_ms: u64,
    /// 响应时间指数移动平均的平滑系数
    pub ema_alpha: f64,
    /// 同时执行的任务上限（Semaphore 许可数）
    pub max_concurrent_executions: usize,
    /// 无人等待的已完成结果暂存上限，超过即淘汰最旧
    pub finished_results_cap: usize,
    #[serde(default)]
    pub fitness: FitnessSection,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 10,
            retry_backoff_ms: 50,
            ema_alpha: 0.3,
            max_concurrent_executions: 8,
            finished_results_cap: 1024,
            fitness: FitnessSection::default(),
        }
    }
}

/// [scheduler.fitness] 段：Agent 适配度打分的权重
///
/// score = w_priority·权重 + w_success·成功率 + w_speed·速度项 − w_error·错误数
///         + 可用性加成 + 任务优先级加成
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitnessSection {
    pub weight_priority: f64,
    pub weight_success: f64,
    pub weight_speed: f64,
    pub weight_error: f64,
    /// Idle 状态的可用性加成（Active 取其一半）
    pub bonus_idle: f64,
    /// 每级任务优先级的加成系数
    pub bonus_task_priority: f64,
}

impl Default for FitnessSection {
    fn default() -> Self {
        Self {
            weight_priority: 0.25,
            weight_success: 0.30,
            weight_speed: 0.25,
            weight_error: 0.10,
            bonus_idle: 0.10,
            bonus_task_priority: 0.05,
        }
    }
}

/// [cognition] 段：工作记忆容量、晋升阈值、洞察日志上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CognitionSection {
    /// 工作记忆条数上限（超出即淘汰最旧条目）
    pub working_capacity: usize,
    /// 淘汰条目晋升到长期记忆所需的最低重要度
    pub promote_threshold: f64,
    /// 每个 actor 保留的洞察条数上限
    pub insight_log_cap: usize,
    /// 模式检测回看的经验条数窗口
    pub experience_window: usize,
}

impl Default for CognitionSection {
    fn default() -> Self {
        Self {
            working_capacity: 20,
            promote_threshold: 0.6,
            insight_log_cap: 100,
            experience_window: 20,
        }
    }
}

/// [pipeline] 段：多模态管线参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 所有提取都失败时的兜底置信度
    pub default_confidence: f64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            default_confidence: 0.5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            cognition: CognitionSection::default(),
            pipeline: PipelineSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
