//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（sonovel.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["sonovel", "sonovel.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `SONOVEL_`，层级分隔符 `__`）
/// 2. 配置文件（sonovel.toml 或 sonovel.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `SONOVEL_TTS__URL=http://tts-server:8000`
/// - `SONOVEL_GENERATION__MAX_CONCURRENT=8`
/// - `SONOVEL_OUTPUT__DIR=/data/audiobooks`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 120)?
        .set_default("tts.provider", "tts-http")?
        .set_default("generation.max_concurrent", 4)?
        .set_default("generation.save_every", 5)?
        .set_default("audio.sample_rate", 24000)?
        .set_default("audio.channels", 1)?
        .set_default("audio.bits_per_sample", 16)?
        .set_default("audio.silence_ms", 500)?
        .set_default("output.dir", "output")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 前缀: SONOVEL_
    // 层级分隔符: __ (双下划线)
    builder = builder.add_source(
        Environment::with_prefix("SONOVEL")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    // 4. 构建配置
    let config = builder.build()?;

    // 5. 反序列化为 AppConfig
    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    // 6. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.tts.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS URL cannot be empty".to_string(),
        ));
    }

    if config.generation.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "generation.max_concurrent cannot be 0".to_string(),
        ));
    }

    if config.generation.save_every == 0 {
        return Err(ConfigError::ValidationError(
            "generation.save_every cannot be 0".to_string(),
        ));
    }

    if config.audio.sample_rate == 0 {
        return Err(ConfigError::ValidationError(
            "audio.sample_rate cannot be 0".to_string(),
        ));
    }

    if !matches!(config.audio.bits_per_sample, 8 | 16 | 24 | 32) {
        return Err(ConfigError::ValidationError(format!(
            "audio.bits_per_sample must be 8/16/24/32, got {}",
            config.audio.bits_per_sample
        )));
    }

    if !matches!(config.audio.channels, 1 | 2) {
        return Err(ConfigError::ValidationError(format!(
            "audio.channels must be 1 or 2, got {}",
            config.audio.channels
        )));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("TTS URL: {}", config.tts.url);
    tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
    tracing::info!("Max Concurrent: {}", config.generation.max_concurrent);
    tracing::info!("Save Every: {} completions", config.generation.save_every);
    tracing::info!(
        "Audio: {} Hz, {} ch, {} bit, {}ms silence",
        config.audio.sample_rate,
        config.audio.channels,
        config.audio.bits_per_sample,
        config.audio.silence_ms
    );
    tracing::info!("Output Directory: {}", config.output.dir.display());
    tracing::info!("Configured Voices: {}", config.voices.speakers.len());
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_passes_for_default_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_tts_url() {
        let mut config = AppConfig::default();
        config.tts.url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_concurrency() {
        let mut config = AppConfig::default();
        config.generation.max_concurrent = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_odd_bit_depth() {
        let mut config = AppConfig::default();
        config.audio.bits_per_sample = 12;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_file_with_voices() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sonovel.toml");
        std::fs::write(
            &path,
            r#"
            [generation]
            max_concurrent = 2

            [voices.default]
            voice = "narrator_f02"

            [voices.speakers."药老"]
            voice = "old_male_01"
            speed = 0.95
            "#,
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.generation.max_concurrent, 2);
        assert_eq!(
            config.voices.default.as_ref().unwrap().voice.as_deref(),
            Some("narrator_f02")
        );
        assert_eq!(
            config.voices.speakers.get("药老").unwrap().speed,
            Some(0.95)
        );
    }
}
