//! 增量计划
//!
//! 在当前剧本分段、生效配置与已加载清单之间计算分区：
//! 需要（重新）生成的分段 vs 可直接复用缓存的分段。
//! 三个查询都保持输入顺序，分区完整且互斥；
//! 清单缺失时一切视为未验证（全部需要生成）。

use crate::domain::{fingerprint, CacheManifest, CachedSegment, Segment, VoicesConfig};

/// 一次缓存命中：分段与其对应的缓存条目
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub segment: Segment,
    pub cached: CachedSegment,
}

/// 需要（重新）生成的分段
///
/// `is_cached` 返回缺失的每个分段；清单缺失时返回全部分段
pub fn segments_to_generate(
    manifest: Option<&CacheManifest>,
    segments: &[Segment],
    voices: &VoicesConfig,
) -> Vec<Segment> {
    let Some(manifest) = manifest else {
        return segments.to_vec();
    };
    segments
        .iter()
        .filter(|seg| manifest.is_cached(seg, voices).is_none())
        .cloned()
        .collect()
}

/// 可从缓存复用的分段（与 segments_to_generate 互补）
pub fn segments_from_cache(
    manifest: Option<&CacheManifest>,
    segments: &[Segment],
    voices: &VoicesConfig,
) -> Vec<CacheHit> {
    let Some(manifest) = manifest else {
        return Vec::new();
    };
    segments
        .iter()
        .filter_map(|seg| {
            manifest.is_cached(seg, voices).map(|cached| CacheHit {
                segment: seg.clone(),
                cached: cached.clone(),
            })
        })
        .collect()
}

/// 音色发生变化的分段（"只刷新改过的音色"工作流）
///
/// 判据：记录的 voice_hash 与现算指纹不一致。
/// 清单缺失时视为全部未验证，返回全部分段（按过滤器预筛）。
/// 给定说话人过滤器时，其他说话人即使音色有变也被排除；
/// 过滤器不区分大小写，与按说话人失效的语义一致。
pub fn segments_with_style_change(
    manifest: Option<&CacheManifest>,
    segments: &[Segment],
    voices: &VoicesConfig,
    speaker_filter: Option<&[String]>,
) -> Vec<Segment> {
    let filter: Option<Vec<String>> =
        speaker_filter.map(|names| names.iter().map(|n| n.to_lowercase()).collect());
    let passes_filter = |seg: &Segment| match &filter {
        Some(names) => names.contains(&seg.speaker.to_lowercase()),
        None => true,
    };

    let Some(manifest) = manifest else {
        return segments.iter().filter(|s| passes_filter(s)).cloned().collect();
    };

    segments
        .iter()
        .filter(|seg| passes_filter(seg))
        .filter(|seg| match manifest.entry(&seg.id) {
            Some(entry) => {
                let fresh = fingerprint(seg, voices);
                entry.hash.voice_hash != fresh.voice_hash
            }
            None => false,
        })
        .cloned()
        .collect()
}
