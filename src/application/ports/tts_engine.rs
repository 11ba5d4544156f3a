//! TTS Engine Port - 远程 TTS 合成的抽象
//!
//! 缓存与编排把远程合成视为不透明函数
//! `(text, voice, seed) -> audio | error`；
//! 重试策略完全基于这里的错误分类定义

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::VoiceProfile;

/// TTS 错误分类
///
/// 三类处理方式：
/// - 瞬态（Network / Timeout / Service）：冷却后换种子重试
/// - 可换种子（IncompleteOther）：立即换种子重试
/// - 终态（其余）：换种子无意义，当次尝试序列直接结束
#[derive(Debug, Error)]
pub enum TtsError {
    /// 内容被安全策略拦截
    #[error("Content blocked by provider: {0}")]
    ContentBlocked(String),

    /// 生成未完成且无可用停止条件（提供方归类为 OTHER）
    #[error("Generation incomplete (no usable stop condition): {0}")]
    IncompleteOther(String),

    /// 生成未完成、原因为策略类（安全、长度上限等）
    #[error("Generation incomplete ({reason}): {message}")]
    IncompleteTerminal { reason: String, message: String },

    /// 网络错误（连接重置、无法连接等）
    #[error("Network error: {0}")]
    Network(String),

    /// 请求超时
    #[error("Request timeout")]
    Timeout,

    /// 服务端错误（限流、5xx）
    #[error("Service error: {0}")]
    Service(String),

    /// 响应不可解析
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 未知错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TtsError {
    /// 瞬态失败：重试前需要冷却
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TtsError::Network(_) | TtsError::Timeout | TtsError::Service(_)
        )
    }

    /// 换种子立即重试的失败类别
    pub fn is_seed_retryable(&self) -> bool {
        matches!(self, TtsError::IncompleteOther(_))
    }

    /// 终态失败：换种子也无意义
    pub fn is_terminal(&self) -> bool {
        !self.is_transient() && !self.is_seed_retryable()
    }
}

/// 合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceProfile,
    /// 本次尝试的种子（重试时被扰动）
    pub seed: i64,
}

/// 合成响应
#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    /// WAV 容器字节
    pub audio_data: Vec<u8>,
    /// 提供方报告的时长（毫秒），可能缺失
    pub duration_ms: Option<u64>,
    /// 提供方报告的采样率
    pub sample_rate: Option<u32>,
}

/// TTS Engine Port
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    /// 执行一次合成调用
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError>;

    /// 提供方标识（写入缓存条目与成品清单）
    fn provider(&self) -> &str;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
