//! 多模态摄取管道
//!
//! 一次输入可携带文本/音频/图像/视频，按请求的提取项扇出为调度器任务并
//! 全部等齐。某项提取失败只记日志并从结果表剔除（部分成功语义，与协同层
//! Sequential 的 fail-fast 不同）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::PipelineSection;
use crate::scheduler::task::{TaskContext, TaskRequest};
use crate::scheduler::TaskScheduler;

/// 多模态输入：各模态载荷均可缺省
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiModalInput {
    pub text: Option<String>,
    /// 音频载荷（URI 或内联数据）
    pub audio: Option<serde_json::Value>,
    pub image: Option<serde_json::Value>,
    pub video: Option<serde_json::Value>,
}

impl MultiModalInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_audio(mut self, audio: serde_json::Value) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_image(mut self, image: serde_json::Value) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_video(mut self, video: serde_json::Value) -> Self {
        self.video = Some(video);
        self
    }
}

/// 请求的提取项开关
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub sentiment: bool,
    pub summary: bool,
    pub transcription: bool,
    pub object_detection: bool,
    pub scene_extraction: bool,
}

impl ExtractionOptions {
    pub fn all() -> Self {
        Self {
            sentiment: true,
            summary: true,
            transcription: true,
            object_detection: true,
            scene_extraction: true,
        }
    }
}

/// 单项提取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub output: serde_json::Value,
    pub confidence: f64,
}

/// 管道结果：成功的提取项映射 + 整体置信度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiModalResult {
    pub extractions: HashMap<String, Extraction>,
    /// 各提取项置信度的算术平均；无成功项时取配置默认值
    pub overall_confidence: f64,
    pub elapsed_ms: u64,
}

/// 多模态管道：持有调度器句柄，所有提取都经调度器路由到具备
/// 对应能力的 Agent
pub struct MultiModalPipeline {
    scheduler: Arc<TaskScheduler>,
    default_confidence: f64,
}

impl MultiModalPipeline {
    pub fn new(scheduler: Arc<TaskScheduler>, cfg: PipelineSection) -> Self {
        Self {
            scheduler,
            default_confidence: cfg.default_confidence,
        }
    }

    /// 提取项仅当模态载荷存在且开关置位时进入计划
    fn extraction_plan(
        input: &MultiModalInput,
        options: &ExtractionOptions,
    ) -> Vec<(&'static str, serde_json::Value)> {
        let mut plan = Vec::new();

        if let Some(text) = &input.text {
            if options.sentiment {
                plan.push(("sentiment", serde_json::json!({ "text": text })));
            }
            if options.summary {
                plan.push(("summary", serde_json::json!({ "text": text })));
            }
        }
        if let Some(audio) = &input.audio {
            if options.transcription {
                plan.push(("transcription", serde_json::json!({ "audio": audio })));
            }
        }
        if let Some(image) = &input.image {
            if options.object_detection {
                plan.push(("object_detection", serde_json::json!({ "image": image })));
            }
        }
        if let Some(video) = &input.video {
            if options.scene_extraction {
                plan.push(("scene_extraction", serde_json::json!({ "video": video })));
            }
        }

        plan
    }

    /// 处理一次输入：适用的提取全部并发提交并等齐
    pub async fn process(
        &self,
        input: &MultiModalInput,
        options: &ExtractionOptions,
        context: &TaskContext,
    ) -> MultiModalResult {
        let started = Instant::now();
        let plan = Self::extraction_plan(input, options);

        tracing::info!(extractions = plan.len(), "Multi-modal processing started");

        let futures = plan.iter().map(|(name, payload)| {
            let request = TaskRequest::new(*name, payload.clone())
                .with_capabilities([*name])
                .with_context(context.clone());
            self.scheduler.execute(request)
        });
        let results = join_all(futures).await;

        let mut extractions = HashMap::new();
        for ((name, _), result) in plan.iter().zip(results) {
            match result {
                Ok(result) if result.success => {
                    extractions.insert(
                        name.to_string(),
                        Extraction {
                            output: result.output.unwrap_or(serde_json::Value::Null),
                            confidence: result.confidence,
                        },
                    );
                }
                Ok(result) => {
                    tracing::warn!(
                        extraction = name,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Extraction failed, excluded from result"
                    );
                }
                Err(e) => {
                    tracing::warn!(extraction = name, error = %e, "Extraction rejected, excluded from result");
                }
            }
        }

        let overall_confidence = if extractions.is_empty() {
            self.default_confidence
        } else {
            extractions.values().map(|e| e.confidence).sum::<f64>() / extractions.len() as f64
        };

        MultiModalResult {
            extractions,
            overall_confidence,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerSection;
    use crate::external::InMemoryStore;
    use crate::scheduler::handler::{CapabilityHandler, HandlerOutput, HandlerRegistry};
    use crate::scheduler::registry::{Agent, AgentRegistry, Modality};
    use async_trait::async_trait;

    /// 固定置信度应答；可按需失败
    struct FixedHandler {
        task_type: String,
        confidence: f64,
        fail: bool,
    }

    #[async_trait]
    impl CapabilityHandler for FixedHandler {
        fn task_type(&self) -> &str {
            &self.task_type
        }

        async fn handle(&self, task: &TaskRequest) -> Result<HandlerOutput, String> {
            if self.fail {
                return Err(format!("{} backend unavailable", self.task_type));
            }
            Ok(HandlerOutput::new(
                serde_json::json!({ "extraction": self.task_type, "from": task.payload.clone() }),
                self.confidence,
            ))
        }
    }

    async fn pipeline_with_handlers(
        handlers: Vec<FixedHandler>,
    ) -> (Arc<MultiModalPipeline>, Arc<TaskScheduler>) {
        let mut registry = HandlerRegistry::new();
        for h in handlers {
            registry.register(h);
        }

        let store = Arc::new(InMemoryStore::new());
        let agents = Arc::new(AgentRegistry::new(store.clone(), 0.3));
        let cfg = SchedulerSection {
            dispatch_interval_ms: 1,
            retry_backoff_ms: 2,
            ..SchedulerSection::default()
        };
        let sched = Arc::new(TaskScheduler::new(agents, Arc::new(registry), store, cfg));
        sched
            .registry()
            .register(
                Agent::new("modal-worker", Modality::Generalist)
                    .with_id("modal-worker")
                    .with_capabilities([
                        "sentiment",
                        "summary",
                        "transcription",
                        "object_detection",
                        "scene_extraction",
                    ]),
            )
            .await;
        sched.start();

        let pipeline = Arc::new(MultiModalPipeline::new(
            Arc::clone(&sched),
            PipelineSection::default(),
        ));
        (pipeline, sched)
    }

    fn fixed(task_type: &str, confidence: f64) -> FixedHandler {
        FixedHandler {
            task_type: task_type.to_string(),
            confidence,
            fail: false,
        }
    }

    #[tokio::test]
    async fn test_text_only_sentiment_only() {
        let (pipeline, sched) =
            pipeline_with_handlers(vec![fixed("sentiment", 0.9), fixed("summary", 0.7)]).await;

        let input = MultiModalInput::new().with_text("what a great day");
        let options = ExtractionOptions {
            sentiment: true,
            ..ExtractionOptions::default()
        };
        let result = pipeline.process(&input, &options, &TaskContext::default()).await;

        assert_eq!(result.extractions.len(), 1);
        assert!(result.extractions.contains_key("sentiment"));
        // 唯一成功项时整体置信度等于该项置信度
        assert!((result.overall_confidence - 0.9).abs() < f64::EPSILON);

        sched.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_extraction_excluded_partial_success() {
        let (pipeline, sched) = pipeline_with_handlers(vec![
            fixed("sentiment", 0.9),
            fixed("summary", 0.7),
            FixedHandler {
                task_type: "transcription".to_string(),
                confidence: 0.0,
                fail: true,
            },
        ])
        .await;

        let input = MultiModalInput::new()
            .with_text("quarterly report")
            .with_audio(serde_json::json!("s3://bucket/call.wav"));
        let options = ExtractionOptions {
            sentiment: true,
            summary: true,
            transcription: true,
            ..ExtractionOptions::default()
        };
        let result = pipeline.process(&input, &options, &TaskContext::default()).await;

        assert_eq!(result.extractions.len(), 2);
        assert!(!result.extractions.contains_key("transcription"));
        assert!((result.overall_confidence - 0.8).abs() < 1e-9);

        sched.shutdown().await;
    }

    #[tokio::test]
    async fn test_extraction_needs_both_payload_and_flag() {
        let (pipeline, sched) =
            pipeline_with_handlers(vec![fixed("sentiment", 0.9), fixed("transcription", 0.8)])
                .await;

        // 有音频但未请求转写；请求情感分析但没有文本
        let input = MultiModalInput::new().with_audio(serde_json::json!("inline"));
        let options = ExtractionOptions {
            sentiment: true,
            ..ExtractionOptions::default()
        };
        let result = pipeline.process(&input, &options, &TaskContext::default()).await;

        assert!(result.extractions.is_empty());
        assert!((result.overall_confidence - 0.5).abs() < f64::EPSILON);

        sched.shutdown().await;
    }

    #[tokio::test]
    async fn test_all_modalities_fan_out() {
        let (pipeline, sched) = pipeline_with_handlers(vec![
            fixed("sentiment", 0.9),
            fixed("summary", 0.8),
            fixed("transcription", 0.7),
            fixed("object_detection", 0.6),
            fixed("scene_extraction", 0.5),
        ])
        .await;

        let input = MultiModalInput::new()
            .with_text("a video essay")
            .with_audio(serde_json::json!("a"))
            .with_image(serde_json::json!("i"))
            .with_video(serde_json::json!("v"));
        let result = pipeline
            .process(&input, &ExtractionOptions::all(), &TaskContext::default())
            .await;

        assert_eq!(result.extractions.len(), 5);
        assert!((result.overall_confidence - 0.7).abs() < 1e-9);

        sched.shutdown().await;
    }
}
