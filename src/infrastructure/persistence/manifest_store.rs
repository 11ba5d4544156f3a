//! 缓存存储
//!
//! 缓存清单与分段音频的磁盘布局，按 (输出目录, 故事后缀) 定界，
//! 多个故事可共存于同一输出根目录：
//!
//! ```text
//! <output_dir>/cache_<suffix>/manifest.json
//! <output_dir>/cache_<suffix>/segments/<segment_id>.wav
//! ```
//!
//! 加载失败（文件缺失、JSON 损坏、schema 版本不符）一律视为
//! "无清单、整体重建"而不是错误，损坏的缓存不应阻断生成；
//! 保存失败则必须向上传播，丢失持久化能力不允许被掩盖。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::domain::{
    fingerprint, CacheManifest, CachedSegment, Segment, VoicesConfig, MANIFEST_VERSION,
};

/// 清单文件名
const MANIFEST_FILE: &str = "manifest.json";
/// 分段音频子目录名
const SEGMENTS_DIR: &str = "segments";

/// 存储错误（只有保存/写入类失败会出现）
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write manifest {path}: {source}")]
    WriteManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write segment audio {path}: {source}")]
    WriteAudio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 某个故事的缓存存储
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    /// 以 (输出目录, 故事后缀) 定界创建存储
    pub fn new(output_dir: impl AsRef<Path>, story_suffix: &str) -> Self {
        Self {
            cache_dir: output_dir.as_ref().join(format!("cache_{}", story_suffix)),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join(MANIFEST_FILE)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.cache_dir.join(SEGMENTS_DIR)
    }

    /// 分段音频文件名（清单中存储的相对路径）
    pub fn audio_file_name(segment_id: &str) -> String {
        format!("{}.wav", segment_id)
    }

    /// 分段音频的绝对路径
    pub fn segment_audio_path(&self, segment_id: &str) -> PathBuf {
        self.segments_dir().join(Self::audio_file_name(segment_id))
    }

    /// 缓存条目引用的音频绝对路径
    pub fn entry_audio_path(&self, entry: &CachedSegment) -> PathBuf {
        self.segments_dir().join(&entry.audio_path)
    }

    /// 加载清单
    ///
    /// 文件缺失、JSON 不可解析、版本不符都返回 None（重建）
    pub async fn load(&self) -> Option<CacheManifest> {
        let path = self.manifest_path();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "No manifest on disk");
                return None;
            }
        };

        let manifest: CacheManifest = match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Manifest unparsable, rebuilding cache"
                );
                return None;
            }
        };

        if manifest.version != MANIFEST_VERSION {
            tracing::warn!(
                found = manifest.version,
                expected = MANIFEST_VERSION,
                "Manifest schema version mismatch, rebuilding cache"
            );
            return None;
        }

        tracing::debug!(
            path = %path.display(),
            entries = manifest.segments.len(),
            "Manifest loaded"
        );
        Some(manifest)
    }

    /// 保存清单，更新 last_updated，按需创建目录
    pub async fn save(&self, manifest: &mut CacheManifest) -> Result<(), StoreError> {
        manifest.last_updated = chrono::Utc::now();

        fs::create_dir_all(&self.cache_dir).await?;
        let path = self.manifest_path();
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, json)
            .await
            .map_err(|e| StoreError::WriteManifest {
                path: path.clone(),
                source: e,
            })?;

        tracing::debug!(
            path = %path.display(),
            entries = manifest.segments.len(),
            "Manifest saved"
        );
        Ok(())
    }

    /// 写入分段音频，返回 (绝对路径, 字节数)
    pub async fn write_segment_audio(
        &self,
        segment_id: &str,
        audio: &[u8],
    ) -> Result<(PathBuf, u64), StoreError> {
        fs::create_dir_all(self.segments_dir()).await?;
        let path = self.segment_audio_path(segment_id);
        fs::write(&path, audio)
            .await
            .map_err(|e| StoreError::WriteAudio {
                path: path.clone(),
                source: e,
            })?;
        Ok((path, audio.len() as u64))
    }

    /// 缓存条目引用的音频文件是否真实存在
    ///
    /// 元数据与磁盘可能合法地不一致（手工删除、部分清理）
    pub fn verify_file_exists(&self, entry: &CachedSegment) -> bool {
        self.entry_audio_path(entry).exists()
    }

    /// 清单缺失时从磁盘恢复
    ///
    /// 扫描分段音频目录，对每个期望文件存在的当前分段
    /// 合成一条 success=true、指纹现算、duration_ms=0 占位的条目。
    /// 时长不重新解析音频即不可靠恢复，占位 0 不影响缓存有效性，
    /// 只在最终计时展示上不精确（装配时会现算）
    pub async fn recover(&self, segments: &[Segment], voices: &VoicesConfig) -> Vec<CachedSegment> {
        let mut recovered = Vec::new();

        for segment in segments {
            let path = self.segment_audio_path(&segment.id);
            let metadata = match fs::metadata(&path).await {
                Ok(m) => m,
                Err(_) => continue,
            };

            recovered.push(CachedSegment {
                segment_id: segment.id.clone(),
                index: segment.index,
                speaker: segment.speaker.clone(),
                audio_path: Self::audio_file_name(&segment.id),
                duration_ms: 0,
                file_size: metadata.len(),
                hash: fingerprint(segment, voices),
                generated_at: chrono::Utc::now(),
                provider: "recovered".to_string(),
                success: true,
                error: None,
            });
        }

        if !recovered.is_empty() {
            tracing::info!(
                recovered = recovered.len(),
                dir = %self.segments_dir().display(),
                "Recovered cache entries from disk scan"
            );
        }
        recovered
    }

    /// 移除单个条目并尽力删除其音频文件（文件不存在不报错）
    pub async fn remove_entry(
        &self,
        manifest: CacheManifest,
        segment_id: &str,
    ) -> CacheManifest {
        let (manifest, removed) = manifest.remove_entry(segment_id);
        if let Some(entry) = removed {
            self.delete_entry_audio(&entry).await;
        }
        manifest
    }

    /// 按说话人失效，返回 (新清单, 移除条目数)
    pub async fn invalidate_by_speaker(
        &self,
        manifest: CacheManifest,
        speakers: &[String],
    ) -> (CacheManifest, usize) {
        let (manifest, removed) = manifest.invalidate_by_speaker(speakers);
        for entry in &removed {
            self.delete_entry_audio(entry).await;
        }
        (manifest, removed.len())
    }

    /// 清理不属于当前剧本的陈旧条目，返回 (新清单, 移除条目数)
    pub async fn prune_stale(
        &self,
        manifest: CacheManifest,
        live_ids: &HashSet<String>,
    ) -> (CacheManifest, usize) {
        let (manifest, removed) = manifest.prune_stale(live_ids);
        for entry in &removed {
            self.delete_entry_audio(entry).await;
        }
        (manifest, removed.len())
    }

    /// 删除整个缓存目录
    pub async fn clear(&self) -> Result<(), StoreError> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir).await?;
            tracing::info!(dir = %self.cache_dir.display(), "Cache cleared");
        }
        Ok(())
    }

    async fn delete_entry_audio(&self, entry: &CachedSegment) {
        let path = self.entry_audio_path(entry);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Deleted cached audio");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete cached audio");
            }
        }
    }
}
