//! 剧本解析
//!
//! 将带说话人标注的文本剧本解析为有序分段：
//! - `名字: 台词` / `名字：台词` 归属到对应说话人
//! - 未标注的行归属到旁白 (Narrator)
//! - 空行与 `#` 开头的行跳过

use serde::{Deserialize, Serialize};

/// 旁白说话人名（未标注行的归属）
pub const NARRATOR_SPEAKER: &str = "Narrator";

/// 说话人名最大字符数，超过则视为台词内部的冒号
const MAX_SPEAKER_NAME_CHARS: usize = 32;

/// 一条待合成的分段
///
/// 每次解析剧本时重新创建，创建后不可变；
/// 缓存条目仅通过 `id` 引用分段，不单独持久化分段本身
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 稳定 ID：相同内容 + 相同位置跨运行不变
    pub id: String,
    /// 在剧本中的序号（从 0 开始）
    pub index: usize,
    /// 说话人名（音色配置的查找键）
    pub speaker: String,
    /// 台词文本
    pub text: String,
    /// 源文件行号（仅用于诊断输出）
    pub line_number: usize,
}

impl Segment {
    pub fn new(
        index: usize,
        speaker: impl Into<String>,
        text: impl Into<String>,
        line_number: usize,
    ) -> Self {
        let text = text.into();
        Self {
            id: segment_id(index, &text),
            index,
            speaker: speaker.into(),
            text,
            line_number,
        }
    }
}

/// 生成稳定的分段 ID
///
/// 格式：`seg_{index:04}_{md5(text) 前 8 位}`
pub fn segment_id(index: usize, text: &str) -> String {
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    format!("seg_{:04}_{}", index, &digest[..8])
}

/// 解析剧本文本为分段列表
pub fn parse_script(content: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for (line_idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (speaker, text) = match split_speaker(line) {
            Some((name, rest)) => (name, rest.trim()),
            None => (NARRATOR_SPEAKER, line),
        };
        if text.is_empty() {
            continue;
        }

        let index = segments.len();
        segments.push(Segment::new(index, speaker, text, line_idx + 1));
    }

    segments
}

/// 按解析顺序收集去重后的说话人名
pub fn speakers(segments: &[Segment]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for seg in segments {
        if !seen.iter().any(|s| s == &seg.speaker) {
            seen.push(seg.speaker.clone());
        }
    }
    seen
}

/// 尝试从行首分离说话人标注
///
/// 名字须非空、不超过 MAX_SPEAKER_NAME_CHARS；
/// `http://` 这类冒号后紧跟 `//` 的不算标注
fn split_speaker(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once([':', '：'])?;
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_SPEAKER_NAME_CHARS {
        return None;
    }
    if rest.starts_with("//") {
        return None;
    }
    Some((name, rest))
}
