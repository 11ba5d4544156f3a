//! Fake TTS Client - 不访问网络的 TTS 客户端
//!
//! 按文本长度生成确定性的静音 WAV，用于 `--fake-tts` 试运行
//! 与测试，不实际调用 TTS 服务

use async_trait::async_trait;

use crate::application::ports::{SynthesisRequest, SynthesisResponse, TtsEnginePort, TtsError};
use crate::infrastructure::adapters::audio::{encode_wav, PcmSpec};

/// 每个字符折算的模拟时长（毫秒）
const MS_PER_CHAR: u64 = 60;
/// 模拟时长下限
const MIN_DURATION_MS: u64 = 200;
/// 模拟时长上限
const MAX_DURATION_MS: u64 = 3_000;

/// Fake TTS Client 配置
#[derive(Debug, Clone)]
pub struct FakeTtsClientConfig {
    /// 生成音频的 PCM 参数
    pub spec: PcmSpec,
    /// 模拟的单次调用延迟（毫秒）
    pub latency_ms: u64,
}

impl Default for FakeTtsClientConfig {
    fn default() -> Self {
        Self {
            spec: PcmSpec {
                sample_rate: 24000,
                channels: 1,
                bits_per_sample: 16,
            },
            latency_ms: 10,
        }
    }
}

/// Fake TTS Client
pub struct FakeTtsClient {
    config: FakeTtsClientConfig,
}

impl FakeTtsClient {
    pub fn new(config: FakeTtsClientConfig) -> Self {
        tracing::info!(
            sample_rate = config.spec.sample_rate,
            "FakeTtsClient initialized, no TTS service will be called"
        );
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeTtsClientConfig::default())
    }

    fn simulated_duration_ms(text: &str) -> u64 {
        (text.chars().count() as u64 * MS_PER_CHAR).clamp(MIN_DURATION_MS, MAX_DURATION_MS)
    }
}

#[async_trait]
impl TtsEnginePort for FakeTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        let session_id = uuid::Uuid::new_v4();
        tracing::debug!(
            session_id = %session_id,
            text_len = request.text.len(),
            voice = %request.voice.voice_name,
            seed = request.seed,
            "FakeTtsClient: generating silent audio"
        );

        // 模拟推理延迟
        tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;

        let duration_ms = Self::simulated_duration_ms(&request.text);
        let payload = vec![0u8; self.config.spec.silence_payload_len(duration_ms)];
        let audio_data = encode_wav(&self.config.spec, &payload);

        Ok(SynthesisResponse {
            audio_data,
            duration_ms: Some(duration_ms),
            sample_rate: Some(self.config.spec.sample_rate),
        })
    }

    fn provider(&self) -> &str {
        "fake-tts"
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VoiceProfile;
    use crate::infrastructure::adapters::audio::parse_wav;

    #[tokio::test]
    async fn test_produces_parseable_wav_with_expected_duration() {
        let client = FakeTtsClient::with_defaults();
        let request = SynthesisRequest {
            text: "十个字符的测试文本。".to_string(),
            voice: VoiceProfile::minimal("A"),
            seed: 42,
        };

        let response = client.synthesize(request).await.unwrap();
        let parsed = parse_wav(&response.audio_data).unwrap();
        assert_eq!(parsed.duration_ms(), 600);
        assert_eq!(response.duration_ms, Some(600));
    }

    #[tokio::test]
    async fn test_duration_clamped() {
        let client = FakeTtsClient::with_defaults();
        let request = SynthesisRequest {
            text: "嗯".to_string(),
            voice: VoiceProfile::minimal("A"),
            seed: 0,
        };
        let response = client.synthesize(request).await.unwrap();
        assert_eq!(response.duration_ms, Some(MIN_DURATION_MS));
    }
}
