//! HTTP TTS Client - 调用外部 TTS HTTP 服务
//!
//! 实现 TtsEnginePort trait，通过 HTTP 调用外部 TTS 服务
//!
//! 外部 TTS API:
//! POST {base_url}/api/tts/synthesize
//! Request: {"text", "voice", "style_prompt", "speed", "pitch", "seed", "extra"} (JSON)
//! Response: audio/wav binary，元数据在响应头；
//! 失败时为 JSON body {"code", "message"}，code 驱动错误分类

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::application::ports::{SynthesisRequest, SynthesisResponse, TtsEnginePort, TtsError};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest {
    text: String,
    voice: String,
    style_prompt: String,
    speed: f32,
    pitch: f32,
    seed: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, serde_json::Value>,
}

/// 失败响应体 (JSON)
#[derive(Debug, Deserialize)]
struct TtsHttpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 写入缓存条目与成品清单的提供方标识
    pub provider: String,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            provider: "tts-http".to_string(),
        }
    }
}

impl HttpTtsClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP TTS 客户端
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TtsError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    /// 将失败响应分类为重试策略可用的错误类别
    fn classify_failure(status: StatusCode, body: &str) -> TtsError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return TtsError::Service(format!("HTTP {}: {}", status, body));
        }

        let parsed: TtsHttpError = serde_json::from_str(body).unwrap_or(TtsHttpError {
            code: String::new(),
            message: body.to_string(),
        });

        match parsed.code.as_str() {
            "content_blocked" => TtsError::ContentBlocked(parsed.message),
            "incomplete_other" => TtsError::IncompleteOther(parsed.message),
            code if code.starts_with("incomplete_") => TtsError::IncompleteTerminal {
                reason: code.trim_start_matches("incomplete_").to_string(),
                message: parsed.message,
            },
            _ => TtsError::Unknown(format!("HTTP {}: {}", status, parsed.message)),
        }
    }
}

#[async_trait]
impl TtsEnginePort for HttpTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        let http_request = TtsHttpRequest {
            text: request.text.clone(),
            voice: request.voice.voice_name.clone(),
            style_prompt: request.voice.style_prompt.clone(),
            speed: request.voice.speed,
            pitch: request.voice.pitch,
            seed: request.seed,
            extra: request.voice.extra_params.clone(),
        };

        tracing::debug!(
            url = %self.synthesize_url(),
            text_len = http_request.text.len(),
            voice = %http_request.voice,
            seed = http_request.seed,
            "Sending TTS synthesize request"
        );

        let response = self
            .client
            .post(self.synthesize_url())
            .json(&http_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else if e.is_connect() {
                    TtsError::Network(format!("Cannot connect to TTS service: {}", e))
                } else {
                    TtsError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, &body));
        }

        // 从响应头提取元数据
        let headers = response.headers();
        let duration_ms = headers
            .get("X-TTS-Duration-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let sample_rate = headers
            .get("X-TTS-Sample-Rate")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        if audio_data.is_empty() {
            return Err(TtsError::InvalidResponse("Empty audio body".to_string()));
        }

        tracing::debug!(
            duration_ms = ?duration_ms,
            sample_rate = ?sample_rate,
            audio_size = audio_data.len(),
            "TTS synthesis completed"
        );

        Ok(SynthesisResponse {
            audio_data,
            duration_ms,
            sample_rate,
        })
    }

    fn provider(&self) -> &str {
        &self.config.provider
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpTtsClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_config_builder() {
        let config = HttpTtsClientConfig::new("http://example.com:9000").with_timeout(60);
        assert_eq!(config.base_url, "http://example.com:9000");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_classify_server_errors_as_transient_service() {
        let err = HttpTtsClient::classify_failure(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(err.is_transient());

        let err = HttpTtsClient::classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_content_blocked() {
        let body = r#"{"code":"content_blocked","message":"policy"}"#;
        let err = HttpTtsClient::classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, TtsError::ContentBlocked(_)));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_classify_incomplete_variants() {
        let body = r#"{"code":"incomplete_other","message":"no stop condition"}"#;
        let err = HttpTtsClient::classify_failure(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(err.is_seed_retryable());

        let body = r#"{"code":"incomplete_max_tokens","message":"too long"}"#;
        let err = HttpTtsClient::classify_failure(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert!(matches!(
            err,
            TtsError::IncompleteTerminal { ref reason, .. } if reason == "max_tokens"
        ));
    }

    #[test]
    fn test_classify_unknown_for_unstructured_body() {
        let err = HttpTtsClient::classify_failure(StatusCode::BAD_REQUEST, "plain text error");
        assert!(matches!(err, TtsError::Unknown(_)));
    }
}
