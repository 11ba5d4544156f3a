//! Configuration Types
//!
//! 定义所有配置结构体

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::fingerprint::md5_hex;
use crate::domain::VoicesConfig;
use crate::infrastructure::adapters::audio::PcmSpec;

/// 应用主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// TTS 引擎配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 生成编排配置
    #[serde(default)]
    pub generation: GenerationConfig,

    /// 音频配置
    #[serde(default)]
    pub audio: AudioConfig,

    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,

    /// 音色配置
    #[serde(default)]
    pub voices: VoicesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tts: TtsConfig::default(),
            generation: GenerationConfig::default(),
            audio: AudioConfig::default(),
            output: OutputConfig::default(),
            log: LogConfig::default(),
            voices: VoicesConfig::default(),
        }
    }
}

impl AppConfig {
    /// 整个生效配置的内容哈希（写入缓存清单作诊断参考）
    pub fn content_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        md5_hex(json.as_bytes())
    }
}

/// TTS 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// TTS 服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 单次请求超时（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// 提供方标识（写入缓存条目与成品清单）
    #[serde(default = "default_tts_provider")]
    pub provider: String,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

fn default_tts_provider() -> String {
    "tts-http".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
            provider: default_tts_provider(),
        }
    }
}

/// 生成编排配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// 最大并发合成数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 每完成多少段持久化一次清单
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_save_every() -> usize {
    5
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            save_every: default_save_every(),
        }
    }
}

/// 音频配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// 采样率（Hz）
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 声道数
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// 位深
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,

    /// 相邻分段之间的静音时长（毫秒）
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_channels() -> u16 {
    1 // 单声道
}

fn default_bits_per_sample() -> u16 {
    16
}

fn default_silence_ms() -> u64 {
    500
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bits_per_sample: default_bits_per_sample(),
            silence_ms: default_silence_ms(),
        }
    }
}

impl AudioConfig {
    /// 成品与分段音频的 PCM 参数
    pub fn spec(&self) -> PcmSpec {
        PcmSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出根目录（成品、成品清单与各故事的缓存目录）
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
