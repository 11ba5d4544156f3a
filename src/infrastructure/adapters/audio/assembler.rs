//! 音频装配
//!
//! 把分段 WAV 的 PCM 负载按 index 顺序拼接成单个成品 WAV，
//! 相邻分段之间插入配置时长的静音，同时产出时间线清单。
//! 绝对时间偏移只在这里计算，缓存元数据从不存储时间线位置。
//!
//! 任何输入缺失或容器损坏都是硬错误：
//! 跳过中间分段会破坏其后所有时间戳。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use super::wav::{encode_wav, parse_wav, PcmSpec, WavError};

/// 装配错误
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Segment audio file missing: {0}")]
    MissingInput(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed WAV container {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: WavError,
    },

    #[error("PCM spec mismatch in {path}: expected {expected:?}, found {found:?}")]
    SpecMismatch {
        path: PathBuf,
        expected: PcmSpec,
        found: PcmSpec,
    },

    #[error("Failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to assemble: empty input set")]
    EmptyInput,
}

/// 装配输入：一个分段的音频文件与元信息
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub path: PathBuf,
    pub index: usize,
    pub speaker: String,
    pub text: String,
    /// 缓存记录的时长；None 或 0 时由负载现算
    pub duration_ms: Option<u64>,
}

/// 装配参数
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// 相邻分段之间的静音时长（毫秒）
    pub silence_ms: u64,
    /// 成品 PCM 参数，所有输入必须一致
    pub spec: PcmSpec,
}

/// 成品时间线中的一个分段（成品清单的条目）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSegment {
    pub index: usize,
    pub speaker: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    /// 来源音频文件名（不含目录）
    pub audio_file: String,
}

/// 装配结果
#[derive(Debug, Clone)]
pub struct AssemblyResult {
    pub output_path: PathBuf,
    pub total_duration_ms: u64,
    pub segment_count: usize,
    pub file_size: u64,
    pub timings: Vec<ManifestSegment>,
}

/// 装配分段音频为单个成品 WAV
///
/// 输入先按 index 排序（不信任调用方顺序）；
/// 时间线以非取整的毫秒累计，避免逐段舍入漂移
pub async fn assemble(
    mut inputs: Vec<AssemblyInput>,
    output_path: &Path,
    options: &AssembleOptions,
) -> Result<AssemblyResult, AssembleError> {
    if inputs.is_empty() {
        return Err(AssembleError::EmptyInput);
    }
    inputs.sort_by_key(|input| input.index);

    let spec = options.spec;
    let silence = vec![0u8; spec.silence_payload_len(options.silence_ms)];

    let mut payload: Vec<u8> = Vec::new();
    let mut timings: Vec<ManifestSegment> = Vec::new();
    let mut cursor_ms: f64 = 0.0;

    for (pos, input) in inputs.iter().enumerate() {
        if !input.path.exists() {
            return Err(AssembleError::MissingInput(input.path.clone()));
        }
        let bytes = fs::read(&input.path).await.map_err(|e| AssembleError::Read {
            path: input.path.clone(),
            source: e,
        })?;
        let parsed = parse_wav(&bytes).map_err(|e| AssembleError::Parse {
            path: input.path.clone(),
            source: e,
        })?;
        if parsed.spec != spec {
            return Err(AssembleError::SpecMismatch {
                path: input.path.clone(),
                expected: spec,
                found: parsed.spec,
            });
        }

        let segment_payload = parsed.payload(&bytes);

        // 时长：调用方记录优先，0/缺失时由负载现算
        let duration_ms = match input.duration_ms {
            Some(d) if d > 0 => d as f64,
            _ => segment_payload.len() as f64 * 1000.0 / spec.byte_rate() as f64,
        };

        // 末段之后不再插入静音
        if pos > 0 {
            payload.extend_from_slice(&silence);
            cursor_ms += options.silence_ms as f64;
        }

        let start_ms = cursor_ms;
        cursor_ms += duration_ms;

        timings.push(ManifestSegment {
            index: input.index,
            speaker: input.speaker.clone(),
            text: input.text.clone(),
            start_ms: start_ms.round() as u64,
            end_ms: cursor_ms.round() as u64,
            duration_ms: duration_ms.round() as u64,
            audio_file: input
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        });

        payload.extend_from_slice(segment_payload);
    }

    let wav = encode_wav(&spec, &payload);
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| AssembleError::Write {
            path: output_path.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(output_path, &wav).await.map_err(|e| AssembleError::Write {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    tracing::info!(
        output = %output_path.display(),
        segments = timings.len(),
        total_ms = cursor_ms.round() as u64,
        size_bytes = wav.len(),
        "Audiobook assembled"
    );

    Ok(AssemblyResult {
        output_path: output_path.to_path_buf(),
        total_duration_ms: cursor_ms.round() as u64,
        segment_count: timings.len(),
        file_size: wav.len() as u64,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::audio::wav::test_support::silent_wav;
    use tempfile::TempDir;

    const SPEC: PcmSpec = PcmSpec {
        sample_rate: 24000,
        channels: 1,
        bits_per_sample: 16,
    };

    async fn write_segment(dir: &TempDir, name: &str, duration_ms: u64) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, silent_wav(&SPEC, duration_ms)).await.unwrap();
        path
    }

    fn input(path: PathBuf, index: usize, duration_ms: Option<u64>) -> AssemblyInput {
        AssemblyInput {
            path,
            index,
            speaker: "A".to_string(),
            text: format!("第{}句", index),
            duration_ms,
        }
    }

    #[tokio::test]
    async fn test_reverse_order_inputs_sorted_by_index() {
        let dir = TempDir::new().unwrap();
        let d = 1000u64;
        let silence = 500u64;
        let mut inputs = Vec::new();
        // 逆序提交
        for index in (0..3usize).rev() {
            let path = write_segment(&dir, &format!("seg_{}.wav", index), d).await;
            inputs.push(input(path, index, Some(d)));
        }

        let options = AssembleOptions {
            silence_ms: silence,
            spec: SPEC,
        };
        let out = dir.path().join("book.wav");
        let result = assemble(inputs, &out, &options).await.unwrap();

        let indexes: Vec<usize> = result.timings.iter().map(|t| t.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        let starts: Vec<u64> = result.timings.iter().map(|t| t.start_ms).collect();
        assert_eq!(starts, vec![0, d + silence, 2 * d + 2 * silence]);
    }

    #[tokio::test]
    async fn test_total_duration_sum_plus_gaps() {
        let dir = TempDir::new().unwrap();
        let durations = [800u64, 1200, 400];
        let silence = 300u64;
        let mut inputs = Vec::new();
        for (index, d) in durations.iter().enumerate() {
            let path = write_segment(&dir, &format!("seg_{}.wav", index), *d).await;
            inputs.push(input(path, index, Some(*d)));
        }

        let options = AssembleOptions {
            silence_ms: silence,
            spec: SPEC,
        };
        let result = assemble(inputs, &dir.path().join("book.wav"), &options)
            .await
            .unwrap();

        let expected: u64 = durations.iter().sum::<u64>() + (durations.len() as u64 - 1) * silence;
        assert_eq!(result.total_duration_ms, expected);
        assert_eq!(result.segment_count, 3);
    }

    #[tokio::test]
    async fn test_single_segment_no_silence() {
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, "only.wav", 600).await;
        let options = AssembleOptions {
            silence_ms: 500,
            spec: SPEC,
        };
        let result = assemble(
            vec![input(path, 0, Some(600))],
            &dir.path().join("book.wav"),
            &options,
        )
        .await
        .unwrap();
        assert_eq!(result.total_duration_ms, 600);
    }

    #[tokio::test]
    async fn test_zero_duration_recomputed_from_payload() {
        // 恢复出的缓存条目带 durationMs=0 占位，装配必须现算
        let dir = TempDir::new().unwrap();
        let path = write_segment(&dir, "seg_0.wav", 750).await;
        let options = AssembleOptions {
            silence_ms: 500,
            spec: SPEC,
        };
        let result = assemble(
            vec![input(path, 0, Some(0))],
            &dir.path().join("book.wav"),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(result.timings[0].duration_ms, 750);
        assert_eq!(result.total_duration_ms, 750);
    }

    #[tokio::test]
    async fn test_missing_input_is_hard_error() {
        let dir = TempDir::new().unwrap();
        let present = write_segment(&dir, "seg_0.wav", 500).await;
        let inputs = vec![
            input(present, 0, None),
            input(dir.path().join("ghost.wav"), 1, None),
        ];
        let options = AssembleOptions {
            silence_ms: 100,
            spec: SPEC,
        };
        let err = assemble(inputs, &dir.path().join("book.wav"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_malformed_input_is_hard_error() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.wav");
        fs::write(&bad, b"not a wav at all, definitely not").await.unwrap();
        let options = AssembleOptions {
            silence_ms: 100,
            spec: SPEC,
        };
        let err = assemble(
            vec![input(bad, 0, None)],
            &dir.path().join("book.wav"),
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AssembleError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_output_is_parseable_wav() {
        let dir = TempDir::new().unwrap();
        let mut inputs = Vec::new();
        for index in 0..2usize {
            let path = write_segment(&dir, &format!("seg_{}.wav", index), 500).await;
            inputs.push(input(path, index, None));
        }
        let options = AssembleOptions {
            silence_ms: 250,
            spec: SPEC,
        };
        let out = dir.path().join("book.wav");
        let result = assemble(inputs, &out, &options).await.unwrap();

        let bytes = fs::read(&out).await.unwrap();
        let parsed = parse_wav(&bytes).unwrap();
        assert_eq!(parsed.spec, SPEC);
        assert_eq!(parsed.duration_ms(), 1250);
        assert_eq!(result.file_size, bytes.len() as u64);
    }
}
