//! 流式摄取：逐帧消费的有限序列
//!
//! 帧列表在构造时给定；`next()` 每次消费一帧并产出该帧的部分结果，
//! 耗尽后恒返回 None。流本身被迭代消耗，重新处理必须开新流。

use std::collections::VecDeque;
use std::sync::Arc;

use crate::multimodal::pipeline::{ExtractionOptions, MultiModalInput, MultiModalPipeline, MultiModalResult};
use crate::scheduler::task::TaskContext;

/// 有限多模态流（不可重放）
pub struct MultiModalStream {
    pipeline: Arc<MultiModalPipeline>,
    frames: VecDeque<MultiModalInput>,
    options: ExtractionOptions,
    context: TaskContext,
}

impl MultiModalStream {
    pub fn new(
        pipeline: Arc<MultiModalPipeline>,
        frames: impl IntoIterator<Item = MultiModalInput>,
        options: ExtractionOptions,
        context: TaskContext,
    ) -> Self {
        Self {
            pipeline,
            frames: frames.into_iter().collect(),
            options,
            context,
        }
    }

    /// 剩余未消费的帧数
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// 消费下一帧并产出其部分结果；耗尽时返回 None
    pub async fn next(&mut self) -> Option<MultiModalResult> {
        let frame = self.frames.pop_front()?;
        tracing::debug!(remaining = self.frames.len(), "Processing stream frame");
        Some(self.pipeline.process(&frame, &self.options, &self.context).await)
    }
}
