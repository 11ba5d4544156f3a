//! 音色配置与解析
//!
//! 说话人 → 音色参数的解析链（纯函数，相同输入恒得相同结果）：
//! 1. 配置中的精确匹配
//! 2. 配置的默认音色
//! 3. 内置的按说话人名预设
//! 4. 兜底最小音色
//!
//! 解析永不失败：没有任何配置的说话人也能得到可用音色

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::script::NARRATOR_SPEAKER;

/// 默认语速
pub const DEFAULT_SPEED: f32 = 1.0;
/// 默认音调偏移
pub const DEFAULT_PITCH: f32 = 0.0;
/// 默认合成种子
pub const DEFAULT_SEED: i64 = 42;
/// 兜底音色名
const FALLBACK_VOICE_NAME: &str = "neutral_01";

/// 解析后的音色参数
///
/// 参与指纹计算的全部字段都在这里；
/// extra_params 用 BTreeMap 保证序列化顺序稳定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// 配置项名（通常等于说话人名）
    pub name: String,
    /// 提供方的音色标识
    pub voice_name: String,
    /// 风格提示（自由文本）
    #[serde(default)]
    pub style_prompt: String,
    pub speed: f32,
    pub pitch: f32,
    pub seed: i64,
    /// 提供方特定的附加参数
    #[serde(default)]
    pub extra_params: BTreeMap<String, serde_json::Value>,
}

impl VoiceProfile {
    /// 兜底最小音色
    pub fn minimal(speaker: &str) -> Self {
        Self {
            name: speaker.to_string(),
            voice_name: FALLBACK_VOICE_NAME.to_string(),
            style_prompt: String::new(),
            speed: DEFAULT_SPEED,
            pitch: DEFAULT_PITCH,
            seed: DEFAULT_SEED,
            extra_params: BTreeMap::new(),
        }
    }
}

/// 配置文件中单个说话人的音色条目（字段全部可选）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerVoice {
    pub voice: Option<String>,
    pub style_prompt: Option<String>,
    pub speed: Option<f32>,
    pub pitch: Option<f32>,
    pub seed: Option<i64>,
    #[serde(default)]
    pub extra_params: BTreeMap<String, serde_json::Value>,
}

impl SpeakerVoice {
    /// 以某个说话人名实例化为完整音色，缺省字段取默认值
    fn materialize(&self, speaker: &str) -> VoiceProfile {
        VoiceProfile {
            name: speaker.to_string(),
            voice_name: self
                .voice
                .clone()
                .unwrap_or_else(|| FALLBACK_VOICE_NAME.to_string()),
            style_prompt: self.style_prompt.clone().unwrap_or_default(),
            speed: self.speed.unwrap_or(DEFAULT_SPEED),
            pitch: self.pitch.unwrap_or(DEFAULT_PITCH),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            extra_params: self.extra_params.clone(),
        }
    }
}

/// 音色配置段（配置文件 `[voices]`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoicesConfig {
    /// 无精确匹配时使用的默认音色
    #[serde(default)]
    pub default: Option<SpeakerVoice>,
    /// 按说话人名的精确配置
    #[serde(default)]
    pub speakers: BTreeMap<String, SpeakerVoice>,
}

/// 解析说话人的音色
pub fn resolve_voice(voices: &VoicesConfig, speaker: &str) -> VoiceProfile {
    if let Some(entry) = voices.speakers.get(speaker) {
        return entry.materialize(speaker);
    }
    if let Some(default) = &voices.default {
        return default.materialize(speaker);
    }
    if let Some(builtin) = builtin_voice(speaker) {
        return builtin;
    }
    VoiceProfile::minimal(speaker)
}

/// 内置的按说话人名预设
fn builtin_voice(speaker: &str) -> Option<VoiceProfile> {
    let (voice_name, style_prompt) = match speaker {
        NARRATOR_SPEAKER | "旁白" => ("narrator_m01", "calm, steady narration"),
        _ => return None,
    };
    Some(VoiceProfile {
        name: speaker.to_string(),
        voice_name: voice_name.to_string(),
        style_prompt: style_prompt.to_string(),
        speed: DEFAULT_SPEED,
        pitch: DEFAULT_PITCH,
        seed: DEFAULT_SEED,
        extra_params: BTreeMap::new(),
    })
}
