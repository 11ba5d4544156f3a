//! 缓存清单模型
//!
//! JSON 持久化的缓存根文档与其上的纯变换操作。
//! 所有变换按值消费并返回新清单，调用方必须使用返回值；
//! 失效类操作同时返回被移除的条目，供存储层删除音频文件。
//!
//! story_hash / config_hash 仅作诊断参考，不参与任何条目的
//! 有效性判定；每条目的有效性只由其 hash.combined_hash 与
//! 现算指纹的比对决定。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::fingerprint::{fingerprint, SegmentHash};
use super::script::Segment;
use super::voice::VoicesConfig;

/// 清单 schema 版本，持久化版本不匹配时整体重建
pub const MANIFEST_VERSION: u32 = 1;

/// 单个分段的缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSegment {
    pub segment_id: String,
    pub index: usize,
    pub speaker: String,
    /// segments 目录下的文件名（相对路径）
    pub audio_path: String,
    pub duration_ms: u64,
    pub file_size: u64,
    pub hash: SegmentHash,
    pub generated_at: DateTime<Utc>,
    pub provider: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 运行聚合统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub total_segments: usize,
    pub generated_segments: usize,
    pub cached_segments: usize,
    pub failed_segments: usize,
    pub total_time_ms: u64,
    pub total_audio_ms: u64,
}

/// 缓存清单根文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManifest {
    pub version: u32,
    pub story_path: String,
    pub story_hash: String,
    pub config_hash: String,
    /// 按 index 升序，segment_id 唯一
    pub segments: Vec<CachedSegment>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub stats: GenerationStats,
}

impl CacheManifest {
    /// 创建空清单
    pub fn new(
        story_path: impl Into<String>,
        story_hash: impl Into<String>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            story_path: story_path.into(),
            story_hash: story_hash.into(),
            config_hash: config_hash.into(),
            segments: Vec::new(),
            last_updated: Utc::now(),
            stats: GenerationStats::default(),
        }
    }

    /// 按分段 ID 查条目
    pub fn entry(&self, segment_id: &str) -> Option<&CachedSegment> {
        self.segments.iter().find(|s| s.segment_id == segment_id)
    }

    /// 缓存命中判定（唯一权威谓词，其余查询全部组合它）
    ///
    /// 命中条件：存在同 ID 条目、success 为真、
    /// 且存储的 combined_hash 与现算指纹一致
    pub fn is_cached(&self, segment: &Segment, voices: &VoicesConfig) -> Option<&CachedSegment> {
        let entry = self.entry(&segment.id)?;
        if !entry.success {
            return None;
        }
        let fresh = fingerprint(segment, voices);
        if entry.hash.combined_hash != fresh.combined_hash {
            return None;
        }
        Some(entry)
    }

    /// 插入或替换同 ID 条目，按 index 重排并更新 last_updated
    pub fn upsert(mut self, entry: CachedSegment) -> Self {
        self.segments.retain(|s| s.segment_id != entry.segment_id);
        self.segments.push(entry);
        self.segments.sort_by_key(|s| s.index);
        self.last_updated = Utc::now();
        self
    }

    /// 移除指定条目，返回 (新清单, 被移除的条目)
    pub fn remove_entry(mut self, segment_id: &str) -> (Self, Option<CachedSegment>) {
        let removed = self
            .segments
            .iter()
            .position(|s| s.segment_id == segment_id)
            .map(|pos| self.segments.remove(pos));
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        (self, removed)
    }

    /// 按说话人名移除条目（不区分大小写），返回 (新清单, 被移除的条目)
    pub fn invalidate_by_speaker(mut self, speakers: &[String]) -> (Self, Vec<CachedSegment>) {
        let lowered: HashSet<String> = speakers.iter().map(|s| s.to_lowercase()).collect();
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .segments
            .into_iter()
            .partition(|s| lowered.contains(&s.speaker.to_lowercase()));
        self.segments = kept;
        if !removed.is_empty() {
            self.last_updated = Utc::now();
        }
        (self, removed)
    }

    /// 移除不在当前剧本分段集合中的陈旧条目
    ///
    /// 处理剧本编辑导致分段被删除/重排的情况
    pub fn prune_stale(mut self, live_ids: &HashSet<String>) -> (Self, Vec<CachedSegment>) {
        let (kept, removed): (Vec<_>, Vec<_>) = self
            .segments
            .into_iter()
            .partition(|s| live_ids.contains(&s.segment_id));
        self.segments = kept;
        if !removed.is_empty() {
            self.last_updated = Utc::now();
        }
        (self, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fingerprint::fingerprint;
    use crate::domain::voice::SpeakerVoice;
    use std::collections::BTreeMap;

    fn voices() -> VoicesConfig {
        let mut speakers = BTreeMap::new();
        speakers.insert(
            "A".to_string(),
            SpeakerVoice {
                voice: Some("voice_a".to_string()),
                ..Default::default()
            },
        );
        VoicesConfig {
            default: None,
            speakers,
        }
    }

    fn entry_for(segment: &Segment, voices: &VoicesConfig, success: bool) -> CachedSegment {
        CachedSegment {
            segment_id: segment.id.clone(),
            index: segment.index,
            speaker: segment.speaker.clone(),
            audio_path: format!("{}.wav", segment.id),
            duration_ms: 1200,
            file_size: 57600,
            hash: fingerprint(segment, voices),
            generated_at: Utc::now(),
            provider: "test".to_string(),
            success,
            error: None,
        }
    }

    fn manifest() -> CacheManifest {
        CacheManifest::new("story.txt", "abc", "def")
    }

    #[test]
    fn test_is_cached_hit() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let m = manifest().upsert(entry_for(&seg, &voices, true));
        assert!(m.is_cached(&seg, &voices).is_some());
    }

    #[test]
    fn test_is_cached_absent_without_entry() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        assert!(manifest().is_cached(&seg, &voices).is_none());
    }

    #[test]
    fn test_is_cached_absent_for_failed_entry() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let m = manifest().upsert(entry_for(&seg, &voices, false));
        assert!(m.is_cached(&seg, &voices).is_none());
    }

    #[test]
    fn test_is_cached_absent_for_stale_hash() {
        let mut voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let m = manifest().upsert(entry_for(&seg, &voices, true));

        // 音色漂移后指纹不再一致
        voices.speakers.get_mut("A").unwrap().speed = Some(1.5);
        assert!(m.is_cached(&seg, &voices).is_none());
    }

    #[test]
    fn test_story_and_config_hash_do_not_invalidate() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let mut m = manifest().upsert(entry_for(&seg, &voices, true));

        m.story_hash = "changed".to_string();
        m.config_hash = "also-changed".to_string();
        assert!(m.is_cached(&seg, &voices).is_some());
    }

    #[test]
    fn test_upsert_idempotent_on_identity() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let mut second = entry_for(&seg, &voices, true);
        second.duration_ms = 999;

        let m = manifest()
            .upsert(entry_for(&seg, &voices, true))
            .upsert(second);

        assert_eq!(m.segments.len(), 1);
        assert_eq!(m.segments[0].duration_ms, 999);
    }

    #[test]
    fn test_upsert_keeps_index_order() {
        let voices = voices();
        let seg0 = Segment::new(0, "A", "一", 1);
        let seg1 = Segment::new(1, "A", "二", 2);
        let seg2 = Segment::new(2, "A", "三", 3);

        let m = manifest()
            .upsert(entry_for(&seg2, &voices, true))
            .upsert(entry_for(&seg0, &voices, true))
            .upsert(entry_for(&seg1, &voices, true));

        let indexes: Vec<usize> = m.segments.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalidate_by_speaker_case_insensitive() {
        let voices = voices();
        let seg0 = Segment::new(0, "Alice", "一", 1);
        let seg1 = Segment::new(1, "Bob", "二", 2);
        let m = manifest()
            .upsert(entry_for(&seg0, &voices, true))
            .upsert(entry_for(&seg1, &voices, true));

        let (m, removed) = m.invalidate_by_speaker(&["ALICE".to_string()]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].speaker, "Alice");
        assert_eq!(m.segments.len(), 1);
        assert_eq!(m.segments[0].speaker, "Bob");
    }

    #[test]
    fn test_prune_stale_removes_dead_ids() {
        let voices = voices();
        let seg0 = Segment::new(0, "A", "一", 1);
        let seg1 = Segment::new(1, "A", "二", 2);
        let m = manifest()
            .upsert(entry_for(&seg0, &voices, true))
            .upsert(entry_for(&seg1, &voices, true));

        let live: HashSet<String> = [seg0.id.clone()].into_iter().collect();
        let (m, removed) = m.prune_stale(&live);

        assert_eq!(m.segments.len(), 1);
        assert_eq!(m.segments[0].segment_id, seg0.id);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].segment_id, seg1.id);
    }

    #[test]
    fn test_manifest_json_round_trip() {
        let voices = voices();
        let seg = Segment::new(0, "A", "台词", 1);
        let m = manifest().upsert(entry_for(&seg, &voices, true));

        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"segmentId\""));
        assert!(json.contains("\"combinedHash\""));

        let parsed: CacheManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }
}
