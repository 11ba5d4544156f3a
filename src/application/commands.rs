//! 用例编排
//!
//! CLI 子命令背后的完整流程：
//! generate: 解析 → 恢复/加载清单 → 计划 → 生成 → 装配 → 成品清单
//! 以及 status / refresh-voices / invalidate / clear 缓存操作

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::error::AppError;
use crate::application::planner;
use crate::application::ports::TtsEnginePort;
use crate::config::AppConfig;
use crate::domain::fingerprint::md5_hex;
use crate::domain::{parse_script, speakers, CacheManifest, GenerationStats, Segment};
use crate::infrastructure::adapters::audio::{
    assemble, AssembleOptions, AssemblyInput, ManifestSegment,
};
use crate::infrastructure::persistence::{CacheStore, StoreError};
use crate::infrastructure::worker::{
    BackoffPolicy, DurationCheckConfig, FailedSegment, GenerateWorker, GenerateWorkerConfig,
};

/// 成品清单 schema 版本
pub const AUDIOBOOK_MANIFEST_VERSION: u32 = 1;

/// 成品清单（一次性写出的交付物，写后不再读取）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudiobookManifest {
    pub version: u32,
    pub title: String,
    pub source_file: String,
    pub output_file: String,
    pub total_duration_ms: u64,
    pub format: String,
    pub sample_rate: u32,
    pub speakers: Vec<String>,
    pub segments: Vec<ManifestSegment>,
    pub generated_at: DateTime<Utc>,
    pub provider: String,
}

/// generate 子命令的选项（CLI 合并配置后的结果）
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub script_path: PathBuf,
    /// 忽略缓存，全部重新生成
    pub force: bool,
    /// 只生成分段，跳过装配
    pub skip_assembly: bool,
}

/// 一次 generate 运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_segments: usize,
    pub cached: usize,
    pub generated: usize,
    pub failed: usize,
    pub kept_anomalies: usize,
    pub failed_segments: Vec<FailedSegment>,
    pub output_file: Option<PathBuf>,
    pub manifest_file: Option<PathBuf>,
    pub total_duration_ms: u64,
}

impl RunSummary {
    /// 完全干净的运行（无失败分段）
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::CacheStore(err.to_string())
    }
}

/// 故事标识后缀：文件名主干
fn story_suffix(script_path: &Path) -> String {
    script_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "story".to_string())
}

/// 读取并解析剧本
fn load_story(script_path: &Path) -> Result<(String, Vec<Segment>), AppError> {
    let content = std::fs::read_to_string(script_path).map_err(|e| AppError::StoryRead {
        path: script_path.to_path_buf(),
        source: e,
    })?;
    let segments = parse_script(&content);
    if segments.is_empty() {
        return Err(AppError::EmptyStory(script_path.to_path_buf()));
    }
    Ok((content, segments))
}

/// 加载清单；缺失或条目数偏少时用磁盘扫描补齐
///
/// 只补缺失的条目，绝不用 0 时长占位覆盖真实条目
async fn load_or_recover(
    store: &CacheStore,
    config: &AppConfig,
    story_path: &Path,
    story_hash: &str,
    config_hash: &str,
    segments: &[Segment],
) -> CacheManifest {
    let loaded = store.load().await;
    let needs_recovery = loaded
        .as_ref()
        .map(|m| m.segments.len() < segments.len())
        .unwrap_or(true);

    let mut manifest = loaded.unwrap_or_else(|| {
        CacheManifest::new(story_path.to_string_lossy(), story_hash, config_hash)
    });

    if needs_recovery {
        for entry in store.recover(segments, &config.voices).await {
            if manifest.entry(&entry.segment_id).is_none() {
                manifest = manifest.upsert(entry);
            }
        }
    }

    // 仅作诊断参考，不影响任何条目的有效性
    manifest.story_path = story_path.to_string_lossy().to_string();
    manifest.story_hash = story_hash.to_string();
    manifest.config_hash = config_hash.to_string();
    manifest
}

fn build_worker(config: &AppConfig, tts: Arc<dyn TtsEnginePort>, store: CacheStore) -> GenerateWorker {
    GenerateWorker::new(
        GenerateWorkerConfig {
            max_concurrent: config.generation.max_concurrent,
            save_every: config.generation.save_every,
        },
        tts,
        store,
        BackoffPolicy::default(),
        DurationCheckConfig::default(),
    )
}

/// generate：完整的剧本 → 有声书流程
pub async fn run_generate(
    config: &AppConfig,
    tts: Arc<dyn TtsEnginePort>,
    options: &GenerateOptions,
) -> Result<RunSummary, AppError> {
    let (content, segments) = load_story(&options.script_path)?;
    let suffix = story_suffix(&options.script_path);
    let store = CacheStore::new(&config.output.dir, &suffix);

    let story_hash = md5_hex(content.as_bytes());
    let config_hash = config.content_hash();

    let manifest = load_or_recover(
        &store,
        config,
        &options.script_path,
        &story_hash,
        &config_hash,
        &segments,
    )
    .await;

    // 剧本编辑后不再存在的分段连同音频一并清掉
    let live_ids: HashSet<String> = segments.iter().map(|s| s.id.clone()).collect();
    let (manifest, pruned) = store.prune_stale(manifest, &live_ids).await;
    if pruned > 0 {
        tracing::info!(pruned, "Pruned stale cache entries");
    }

    // 计划分区；--force 视同无清单
    let plan_manifest = if options.force { None } else { Some(&manifest) };
    let mut to_generate = planner::segments_to_generate(plan_manifest, &segments, &config.voices);
    let hits = planner::segments_from_cache(plan_manifest, &segments, &config.voices);

    // 元数据说有，盘上未必有：文件丢失的命中透明回到待生成集合
    let mut cached = 0usize;
    for hit in hits {
        if store.verify_file_exists(&hit.cached) {
            cached += 1;
        } else {
            tracing::warn!(
                segment_id = %hit.segment.id,
                "Cached audio file missing on disk, regenerating"
            );
            to_generate.push(hit.segment);
        }
    }
    to_generate.sort_by_key(|s| s.index);

    tracing::info!(
        total = segments.len(),
        cached,
        to_generate = to_generate.len(),
        "Incremental plan computed"
    );

    let worker = build_worker(config, tts.clone(), store.clone());
    let (mut manifest, report) = worker.run(manifest, to_generate, &config.voices).await?;

    // 聚合统计基于清单中当前剧本的最终状态
    let total_audio_ms: u64 = segments
        .iter()
        .filter_map(|seg| manifest.entry(&seg.id))
        .filter(|e| e.success)
        .map(|e| e.duration_ms)
        .sum();
    manifest.stats = GenerationStats {
        total_segments: segments.len(),
        generated_segments: report.generated,
        cached_segments: cached,
        failed_segments: report.failed,
        total_time_ms: report.elapsed_ms,
        total_audio_ms,
    };
    store.save(&mut manifest).await?;

    let mut summary = RunSummary {
        total_segments: segments.len(),
        cached,
        generated: report.generated,
        failed: report.failed,
        kept_anomalies: report.kept_anomalies,
        failed_segments: report.failed_segments.clone(),
        ..Default::default()
    };

    if !options.skip_assembly {
        let (output_file, manifest_file, total_duration_ms) =
            assemble_audiobook(config, tts.as_ref(), &store, &manifest, &segments, &suffix, &options.script_path)
                .await?;
        summary.output_file = Some(output_file);
        summary.manifest_file = Some(manifest_file);
        summary.total_duration_ms = total_duration_ms;
    }

    report_failures(&summary);
    Ok(summary)
}

/// 装配成品并写出成品清单
async fn assemble_audiobook(
    config: &AppConfig,
    tts: &dyn TtsEnginePort,
    store: &CacheStore,
    manifest: &CacheManifest,
    segments: &[Segment],
    suffix: &str,
    script_path: &Path,
) -> Result<(PathBuf, PathBuf, u64), AppError> {
    let inputs: Vec<AssemblyInput> = segments
        .iter()
        .filter_map(|seg| {
            manifest
                .entry(&seg.id)
                .filter(|e| e.success)
                .map(|e| AssemblyInput {
                    path: store.entry_audio_path(e),
                    index: seg.index,
                    speaker: seg.speaker.clone(),
                    text: seg.text.clone(),
                    duration_ms: Some(e.duration_ms),
                })
        })
        .collect();

    if inputs.is_empty() {
        return Err(AppError::NoUsableAudio);
    }

    let output_file = config.output.dir.join(format!("{}.wav", suffix));
    let options = AssembleOptions {
        silence_ms: config.audio.silence_ms,
        spec: config.audio.spec(),
    };
    let result = assemble(inputs, &output_file, &options)
        .await
        .map_err(|e| AppError::Assembly(e.to_string()))?;

    let audiobook = AudiobookManifest {
        version: AUDIOBOOK_MANIFEST_VERSION,
        title: suffix.to_string(),
        source_file: script_path.to_string_lossy().to_string(),
        output_file: output_file.to_string_lossy().to_string(),
        total_duration_ms: result.total_duration_ms,
        format: "wav".to_string(),
        sample_rate: config.audio.sample_rate,
        speakers: speakers(segments),
        segments: result.timings,
        generated_at: Utc::now(),
        provider: tts.provider().to_string(),
    };

    let manifest_file = config.output.dir.join(format!("{}_audiobook.json", suffix));
    let json = serde_json::to_string_pretty(&audiobook)
        .map_err(|e| AppError::ManifestWrite(e.to_string()))?;
    tokio::fs::write(&manifest_file, json)
        .await
        .map_err(|e| AppError::ManifestWrite(e.to_string()))?;

    Ok((output_file, manifest_file, result.total_duration_ms))
}

/// 运行结束时逐条告警失败分段
fn report_failures(summary: &RunSummary) {
    if summary.is_clean() {
        return;
    }
    tracing::warn!(
        failed = summary.failed,
        "Run completed with failed segments"
    );
    for failure in &summary.failed_segments {
        tracing::warn!(
            segment_id = %failure.segment_id,
            speaker = %failure.speaker,
            error = %failure.error,
            "Segment failed"
        );
    }
}

/// refresh-voices：只重新生成音色发生漂移的分段
pub async fn run_refresh_voices(
    config: &AppConfig,
    tts: Arc<dyn TtsEnginePort>,
    script_path: &Path,
    speaker_filter: Option<&[String]>,
) -> Result<RunSummary, AppError> {
    let (content, segments) = load_story(script_path)?;
    let suffix = story_suffix(script_path);
    let store = CacheStore::new(&config.output.dir, &suffix);

    let story_hash = md5_hex(content.as_bytes());
    let config_hash = config.content_hash();
    let manifest = load_or_recover(
        &store,
        config,
        script_path,
        &story_hash,
        &config_hash,
        &segments,
    )
    .await;

    let changed = planner::segments_with_style_change(
        Some(&manifest),
        &segments,
        &config.voices,
        speaker_filter,
    );
    tracing::info!(changed = changed.len(), "Voice drift detected");

    let worker = build_worker(config, tts, store.clone());
    let (mut manifest, report) = worker.run(manifest, changed, &config.voices).await?;
    store.save(&mut manifest).await?;

    let summary = RunSummary {
        total_segments: segments.len(),
        generated: report.generated,
        failed: report.failed,
        kept_anomalies: report.kept_anomalies,
        failed_segments: report.failed_segments.clone(),
        ..Default::default()
    };
    report_failures(&summary);
    Ok(summary)
}

/// status：打印计划分区与聚合统计
pub async fn run_status(config: &AppConfig, script_path: &Path) -> Result<(), AppError> {
    let (_content, segments) = load_story(script_path)?;
    let suffix = story_suffix(script_path);
    let store = CacheStore::new(&config.output.dir, &suffix);

    let manifest = store.load().await;
    let to_generate =
        planner::segments_to_generate(manifest.as_ref(), &segments, &config.voices);
    let hits = planner::segments_from_cache(manifest.as_ref(), &segments, &config.voices);
    let failed: Vec<&str> = manifest
        .as_ref()
        .map(|m| {
            m.segments
                .iter()
                .filter(|e| !e.success)
                .map(|e| e.segment_id.as_str())
                .collect()
        })
        .unwrap_or_default();

    tracing::info!("=== Cache Status: {} ===", suffix);
    tracing::info!("Manifest: {}", store.manifest_path().display());
    tracing::info!("Total segments: {}", segments.len());
    tracing::info!("Cached: {}", hits.len());
    tracing::info!("To generate: {}", to_generate.len());
    tracing::info!("Failed entries: {}", failed.len());
    for id in failed {
        tracing::warn!(segment_id = %id, "Failed entry in cache");
    }
    if let Some(m) = &manifest {
        tracing::info!(
            "Last run: generated={} cached={} failed={} audio={}ms",
            m.stats.generated_segments,
            m.stats.cached_segments,
            m.stats.failed_segments,
            m.stats.total_audio_ms,
        );
        tracing::info!("Last updated: {}", m.last_updated);
    }
    Ok(())
}

/// invalidate：按说话人移除缓存条目与音频
pub async fn run_invalidate(
    config: &AppConfig,
    script_path: &Path,
    speaker_names: &[String],
) -> Result<usize, AppError> {
    let suffix = story_suffix(script_path);
    let store = CacheStore::new(&config.output.dir, &suffix);

    let Some(manifest) = store.load().await else {
        tracing::info!("No cache manifest, nothing to invalidate");
        return Ok(0);
    };

    let (mut manifest, removed) = store.invalidate_by_speaker(manifest, speaker_names).await;
    store.save(&mut manifest).await?;
    tracing::info!(removed, speakers = ?speaker_names, "Cache entries invalidated");
    Ok(removed)
}

/// clear：删除整个故事的缓存目录
pub async fn run_clear(config: &AppConfig, script_path: &Path) -> Result<(), AppError> {
    let suffix = story_suffix(script_path);
    let store = CacheStore::new(&config.output.dir, &suffix);
    store.clear().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::infrastructure::adapters::tts::{FakeTtsClient, FakeTtsClientConfig};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.output.dir = dir.path().join("out");
        config.generation.max_concurrent = 2;
        config
    }

    fn write_script(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn fake_tts() -> Arc<dyn TtsEnginePort> {
        Arc::new(FakeTtsClient::new(FakeTtsClientConfig {
            latency_ms: 0,
            ..Default::default()
        }))
    }

    const SCRIPT: &str = "旁白内容在这里。\n萧炎: 三十年河东！\n药老: 醒来吧。";

    #[tokio::test]
    async fn test_generate_end_to_end_with_fake_tts() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);

        let options = GenerateOptions {
            script_path: script,
            force: false,
            skip_assembly: false,
        };
        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();

        assert_eq!(summary.total_segments, 3);
        assert_eq!(summary.generated, 3);
        assert_eq!(summary.cached, 0);
        assert!(summary.is_clean());

        let output = summary.output_file.unwrap();
        assert!(output.exists());

        let book: AudiobookManifest = serde_json::from_str(
            &std::fs::read_to_string(summary.manifest_file.unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(book.segments.len(), 3);
        assert_eq!(book.title, "story");
        // 时间线按 index 升序
        let indexes: Vec<usize> = book.segments.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(book.total_duration_ms > 0);
    }

    #[tokio::test]
    async fn test_second_run_is_fully_cached() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script,
            force: false,
            skip_assembly: true,
        };

        let first = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(first.generated, 3);

        let second = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(second.generated, 0);
        assert_eq!(second.cached, 3);
    }

    #[tokio::test]
    async fn test_edited_line_regenerates_only_that_segment() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script.clone(),
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        // 只改一行，别处的错字修正不应重做整本书
        write_script(&dir, "story.txt", "旁白内容在这里。\n萧炎: 莫欺少年穷！\n药老: 醒来吧。");
        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.cached, 2);
    }

    #[tokio::test]
    async fn test_force_regenerates_everything() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let mut options = GenerateOptions {
            script_path: script,
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        options.force = true;
        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(summary.generated, 3);
        assert_eq!(summary.cached, 0);
    }

    #[tokio::test]
    async fn test_missing_audio_file_regenerated() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script.clone(),
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        // 手工删掉一个分段音频，元数据仍声称成功
        let content = std::fs::read_to_string(&script).unwrap();
        let segments = parse_script(&content);
        let store = CacheStore::new(&config.output.dir, "story");
        std::fs::remove_file(store.segment_audio_path(&segments[1].id)).unwrap();

        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.cached, 2);
    }

    #[tokio::test]
    async fn test_lost_manifest_recovered_without_regeneration() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script,
            force: false,
            skip_assembly: false,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        // 清单丢了，但已付费的音频还在
        let store = CacheStore::new(&config.output.dir, "story");
        std::fs::remove_file(store.manifest_path()).unwrap();

        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(summary.generated, 0);
        assert_eq!(summary.cached, 3);
        // 恢复条目 durationMs=0，装配由负载现算，总时长不为 0
        assert!(summary.total_duration_ms > 0);
    }

    #[tokio::test]
    async fn test_empty_story_is_error() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "empty.txt", "# 只有注释\n\n");
        let options = GenerateOptions {
            script_path: script,
            force: false,
            skip_assembly: true,
        };
        let err = run_generate(&config, fake_tts(), &options).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyStory(_)));
    }

    #[tokio::test]
    async fn test_invalidate_by_speaker_then_regenerate() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script.clone(),
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        let removed = run_invalidate(&config, &script, &["萧炎".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let summary = run_generate(&config, fake_tts(), &options).await.unwrap();
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.cached, 2);
    }

    #[tokio::test]
    async fn test_refresh_voices_regenerates_drifted_speaker() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script.clone(),
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        // 调整萧炎的风格后只有他的一段漂移
        config.voices.speakers.insert(
            "萧炎".to_string(),
            crate::domain::SpeakerVoice {
                style_prompt: Some("fierce".to_string()),
                ..Default::default()
            },
        );
        let summary = run_refresh_voices(&config, fake_tts(), &script, None)
            .await
            .unwrap();
        assert_eq!(summary.generated, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_cache() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let script = write_script(&dir, "story.txt", SCRIPT);
        let options = GenerateOptions {
            script_path: script.clone(),
            force: false,
            skip_assembly: true,
        };
        run_generate(&config, fake_tts(), &options).await.unwrap();

        run_clear(&config, &script).await.unwrap();
        let store = CacheStore::new(&config.output.dir, "story");
        assert!(store.load().await.is_none());
        assert!(!store.cache_dir().exists());
    }
}
