//! 多模态层：扇出式摄取管道与逐帧流式变体

pub mod pipeline;
pub mod stream;

pub use pipeline::{
    Extraction, ExtractionOptions, MultiModalInput, MultiModalPipeline, MultiModalResult,
};
pub use stream::MultiModalStream;
