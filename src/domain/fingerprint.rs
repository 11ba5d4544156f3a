//! 分段指纹
//!
//! 由分段文本与解析后的音色参数导出的内容指纹，
//! 是缓存有效性的唯一判据：combined_hash 变化当且仅当
//! text_hash 或 voice_hash 变化。
//!
//! 哈希使用 md5：定宽十六进制摘要，跨进程确定，
//! 缓存正确性只需抗碰撞、不需要密码学强度。

use serde::{Deserialize, Serialize};

use super::script::Segment;
use super::voice::{resolve_voice, VoiceProfile, VoicesConfig};

/// 分段指纹三元组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentHash {
    /// 仅依赖分段文本
    pub text_hash: String,
    /// 仅依赖解析后音色的合成相关字段
    pub voice_hash: String,
    /// text_hash 与 voice_hash 的组合
    pub combined_hash: String,
}

/// 定宽十六进制摘要
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// 计算分段指纹（纯函数，任意输入均可哈希）
pub fn fingerprint(segment: &Segment, voices: &VoicesConfig) -> SegmentHash {
    let voice = resolve_voice(voices, &segment.speaker);
    fingerprint_with_voice(&segment.text, &voice)
}

/// 以已解析音色计算指纹
pub fn fingerprint_with_voice(text: &str, voice: &VoiceProfile) -> SegmentHash {
    let text_hash = md5_hex(text.as_bytes());
    let voice_hash = md5_hex(canonical_voice_repr(voice).as_bytes());
    let combined_hash = md5_hex(format!("{}-{}", text_hash, voice_hash).as_bytes());
    SegmentHash {
        text_hash,
        voice_hash,
        combined_hash,
    }
}

/// 音色参数的规范化序列化
///
/// 字段顺序固定；extra_params 按 key 升序（BTreeMap 保证），
/// 与构造顺序无关
fn canonical_voice_repr(voice: &VoiceProfile) -> String {
    let mut repr = format!(
        "name={};seed={};style_prompt={};voice_name={};speed={};pitch={}",
        voice.name, voice.seed, voice.style_prompt, voice.voice_name, voice.speed, voice.pitch
    );
    for (key, value) in &voice.extra_params {
        repr.push_str(&format!(";{}={}", key, value));
    }
    repr
}
