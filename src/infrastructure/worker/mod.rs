//! Worker - 生成编排
//!
//! 限宽并发的分段合成、重试策略与时长异常检测

pub mod duration_check;
pub mod generate_worker;
pub mod retry;

pub use duration_check::{check_duration, DurationCheckConfig, DurationVerdict};
pub use generate_worker::{FailedSegment, GenerateWorker, GenerateWorkerConfig, GenerationReport};
pub use retry::{BackoffPolicy, MAX_SYNTHESIS_ATTEMPTS};
