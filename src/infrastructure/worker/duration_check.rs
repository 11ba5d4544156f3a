//! 音频时长异常检测
//!
//! TTS 模型偶尔会对短小/含混的输入产出病态的长静音或复读输出；
//! 不做音频内容分析，仅凭输出时长即可廉价地抓住这类主要失败模式。
//!
//! 规则：
//! - 从计数文本中剔除尖括号风格指令（如 `<emotion>`）后按
//!   每秒字符数区间估算"期望"时长
//! - 实际时长超过 3 × 期望上限 且超过绝对下限（短文本容忍底线）
//!   判为异常
//! - 剔除后为空或过短的文本没有可靠的期望基准，改用更严的绝对上限
//! - 无论文本多长，绝对天花板兜底
//!
//! 阈值都是经验值，保留为可覆盖的具名常量，不做公式推导。

/// 语速下限（字符/秒），期望时长上限 = 字符数 / 此值
pub const MIN_CHARS_PER_SEC: f64 = 8.0;
/// 语速上限（字符/秒）
pub const MAX_CHARS_PER_SEC: f64 = 20.0;
/// 超出期望上限的倍数判为异常
pub const EXCESSIVE_MULTIPLIER: f64 = 3.0;
/// 乘法规则的绝对下限（毫秒）：短文本的轻微超时不误判
pub const ANOMALY_FLOOR_MS: u64 = 10_000;
/// 剔除指令后过短文本的严格绝对上限（毫秒）
pub const STRICT_CAP_MS: u64 = 5_000;
/// 视为"过短"的字符数阈值
pub const MIN_MEANINGFUL_CHARS: usize = 3;
/// 最后兜底的绝对天花板（毫秒）
pub const ABSOLUTE_CEILING_MS: u64 = 120_000;

/// 时长检测参数（默认取上面的经验常量，可按需覆盖）
#[derive(Debug, Clone)]
pub struct DurationCheckConfig {
    pub min_chars_per_sec: f64,
    pub excessive_multiplier: f64,
    pub anomaly_floor_ms: u64,
    pub strict_cap_ms: u64,
    pub min_meaningful_chars: usize,
    pub absolute_ceiling_ms: u64,
}

impl Default for DurationCheckConfig {
    fn default() -> Self {
        Self {
            min_chars_per_sec: MIN_CHARS_PER_SEC,
            excessive_multiplier: EXCESSIVE_MULTIPLIER,
            anomaly_floor_ms: ANOMALY_FLOOR_MS,
            strict_cap_ms: STRICT_CAP_MS,
            min_meaningful_chars: MIN_MEANINGFUL_CHARS,
            absolute_ceiling_ms: ABSOLUTE_CEILING_MS,
        }
    }
}

/// 检测结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationVerdict {
    /// 时长在合理范围内
    Ok,
    /// 时长异常，附带触发说明
    Excessive { reason: String },
}

impl DurationVerdict {
    pub fn is_excessive(&self) -> bool {
        matches!(self, DurationVerdict::Excessive { .. })
    }
}

/// 剔除尖括号风格指令后的文本
pub fn strip_style_directives(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_directive = false;
    for ch in text.chars() {
        match ch {
            '<' => in_directive = true,
            '>' if in_directive => in_directive = false,
            _ if !in_directive => stripped.push(ch),
            _ => {}
        }
    }
    stripped
}

/// 检测合成结果的时长是否异常
pub fn check_duration(
    config: &DurationCheckConfig,
    text: &str,
    actual_ms: u64,
) -> DurationVerdict {
    if actual_ms > config.absolute_ceiling_ms {
        return DurationVerdict::Excessive {
            reason: format!(
                "duration {}ms exceeds absolute ceiling {}ms",
                actual_ms, config.absolute_ceiling_ms
            ),
        };
    }

    let stripped = strip_style_directives(text);
    let char_count = stripped.trim().chars().count();

    // 风格指令/近空文本：没有可靠的期望基准，用严格上限
    if char_count < config.min_meaningful_chars {
        if actual_ms > config.strict_cap_ms {
            return DurationVerdict::Excessive {
                reason: format!(
                    "near-empty text ({} chars) produced {}ms, strict cap {}ms",
                    char_count, actual_ms, config.strict_cap_ms
                ),
            };
        }
        return DurationVerdict::Ok;
    }

    let expected_max_ms = char_count as f64 / config.min_chars_per_sec * 1000.0;
    let limit_ms = expected_max_ms * config.excessive_multiplier;

    if actual_ms as f64 > limit_ms && actual_ms > config.anomaly_floor_ms {
        return DurationVerdict::Excessive {
            reason: format!(
                "duration {}ms exceeds {:.0}ms ({}x expected max for {} chars)",
                actual_ms, limit_ms, config.excessive_multiplier, char_count
            ),
        };
    }

    DurationVerdict::Ok
}
