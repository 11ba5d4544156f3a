//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TtsEngine）
//! - planner: 增量生成计划
//! - commands: CLI 子命令背后的用例
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod planner;
pub mod ports;

pub use commands::{
    run_clear, run_generate, run_invalidate, run_refresh_voices, run_status, AudiobookManifest,
    GenerateOptions, RunSummary, AUDIOBOOK_MANIFEST_VERSION,
};
pub use error::AppError;
pub use planner::{segments_from_cache, segments_to_generate, segments_with_style_change, CacheHit};
pub use ports::{SynthesisRequest, SynthesisResponse, TtsEnginePort, TtsError};
