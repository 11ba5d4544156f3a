//! Generate Worker - 分段合成编排
//!
//! 把"待生成分段"变成"已生成或已记录失败的分段"：
//! - 信号量限宽的并发任务池，每个任务完整跑完一段的
//!   合成-重试序列再释放名额
//! - 结果经 mpsc 汇回单写者循环，清单变更全部串行，
//!   每 save_every 次完成持久化一次，结束时无条件再存一次；
//!   中途崩溃最多丢最后一批的持久化（音频文件已在盘上，
//!   可由磁盘扫描恢复），不丢正确性
//! - 单段失败不中止整个运行，终态失败记入缓存条目

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

use crate::application::ports::{SynthesisRequest, SynthesisResponse, TtsEnginePort, TtsError};
use crate::domain::fingerprint::fingerprint_with_voice;
use crate::domain::{resolve_voice, CacheManifest, CachedSegment, Segment, VoiceProfile, VoicesConfig};
use crate::infrastructure::adapters::audio::parse_wav;
use crate::infrastructure::persistence::{CacheStore, StoreError};

use super::duration_check::{check_duration, DurationCheckConfig, DurationVerdict};
use super::retry::{BackoffPolicy, MAX_SYNTHESIS_ATTEMPTS};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct GenerateWorkerConfig {
    /// 最大并发合成数
    pub max_concurrent: usize,
    /// 每完成多少段持久化一次清单
    pub save_every: usize,
}

impl Default for GenerateWorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            save_every: 5,
        }
    }
}

/// 一个终态失败的分段（运行结束时逐条告警）
#[derive(Debug, Clone)]
pub struct FailedSegment {
    pub segment_id: String,
    pub speaker: String,
    pub error: String,
}

/// 一次生成运行的汇总
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// 本次尝试生成的分段数
    pub attempted: usize,
    /// 成功生成（含保留的时长异常产物）
    pub generated: usize,
    /// 终态失败
    pub failed: usize,
    /// 重试耗尽后保留的时长异常产物数
    pub kept_anomalies: usize,
    /// 成功分段的音频总时长
    pub generated_audio_ms: u64,
    /// 运行耗时
    pub elapsed_ms: u64,
    pub failed_segments: Vec<FailedSegment>,
}

/// 生成编排器
pub struct GenerateWorker {
    config: GenerateWorkerConfig,
    tts: Arc<dyn TtsEnginePort>,
    store: CacheStore,
    backoff: BackoffPolicy,
    duration_check: DurationCheckConfig,
}

/// 单段任务汇回的结果
struct WorkerResult {
    entry: CachedSegment,
    duration_warning: Option<String>,
    audio_ms: u64,
}

impl GenerateWorker {
    pub fn new(
        config: GenerateWorkerConfig,
        tts: Arc<dyn TtsEnginePort>,
        store: CacheStore,
        backoff: BackoffPolicy,
        duration_check: DurationCheckConfig,
    ) -> Self {
        Self {
            config,
            tts,
            store,
            backoff,
            duration_check,
        }
    }

    /// 驱动一批分段的生成，返回更新后的清单与汇总
    ///
    /// 清单保存失败会向上传播；单段失败只记录不中止
    pub async fn run(
        &self,
        mut manifest: CacheManifest,
        pending: Vec<Segment>,
        voices: &VoicesConfig,
    ) -> Result<(CacheManifest, GenerationReport), StoreError> {
        let mut report = GenerationReport {
            attempted: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok((manifest, report));
        }

        let started = Instant::now();
        tracing::info!(
            pending = pending.len(),
            max_concurrent = self.config.max_concurrent,
            "Generation started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let (tx, mut rx) = mpsc::channel::<WorkerResult>(self.config.max_concurrent.max(1));

        for segment in pending {
            let semaphore = semaphore.clone();
            let tts = self.tts.clone();
            let store = self.store.clone();
            let backoff = self.backoff.clone();
            let duration_check = self.duration_check.clone();
            let voice = resolve_voice(voices, &segment.speaker);
            let tx = tx.clone();

            tokio::spawn(async move {
                // 名额在任务内获取并持有到本段结束，
                // 接收循环得以与任务并发运行
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return; // semaphore 只会在运行结束时关闭
                };
                let result =
                    process_segment(tts, store, backoff, duration_check, segment, voice).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        // 单写者循环：清单变更与持久化全部串行经过这里
        let mut completed = 0usize;
        while let Some(result) = rx.recv().await {
            if result.entry.success {
                report.generated += 1;
                report.generated_audio_ms += result.audio_ms;
                if result.duration_warning.is_some() {
                    report.kept_anomalies += 1;
                }
            } else {
                report.failed += 1;
                report.failed_segments.push(FailedSegment {
                    segment_id: result.entry.segment_id.clone(),
                    speaker: result.entry.speaker.clone(),
                    error: result
                        .entry
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }

            manifest = manifest.upsert(result.entry);
            completed += 1;
            if completed % self.config.save_every == 0 {
                self.store.save(&mut manifest).await?;
            }
        }

        self.store.save(&mut manifest).await?;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            generated = report.generated,
            failed = report.failed,
            kept_anomalies = report.kept_anomalies,
            elapsed_ms = report.elapsed_ms,
            "Generation finished"
        );
        Ok((manifest, report))
    }
}

/// 处理单个分段：合成（含重试）、落盘、构造缓存条目
async fn process_segment(
    tts: Arc<dyn TtsEnginePort>,
    store: CacheStore,
    backoff: BackoffPolicy,
    duration_check: DurationCheckConfig,
    segment: Segment,
    voice: VoiceProfile,
) -> WorkerResult {
    let hash = fingerprint_with_voice(&segment.text, &voice);
    let provider = tts.provider().to_string();
    let outcome = synthesize_with_retries(
        tts.as_ref(),
        &backoff,
        &duration_check,
        &segment,
        &voice,
    )
    .await;

    let (entry, audio_ms) = match outcome.response {
        Ok((response, actual_ms)) => {
            match store.write_segment_audio(&segment.id, &response.audio_data).await {
                Ok((_path, file_size)) => {
                    tracing::info!(
                        segment_id = %segment.id,
                        speaker = %segment.speaker,
                        attempts = outcome.attempts,
                        duration_ms = actual_ms,
                        "Segment generated"
                    );
                    (
                        CachedSegment {
                            segment_id: segment.id.clone(),
                            index: segment.index,
                            speaker: segment.speaker.clone(),
                            audio_path: CacheStore::audio_file_name(&segment.id),
                            duration_ms: actual_ms,
                            file_size,
                            hash,
                            generated_at: chrono::Utc::now(),
                            provider,
                            success: true,
                            error: None,
                        },
                        actual_ms,
                    )
                }
                Err(e) => {
                    tracing::error!(
                        segment_id = %segment.id,
                        error = %e,
                        "Failed to persist segment audio"
                    );
                    (
                        failed_entry(&segment, hash, provider, format!("storage: {}", e)),
                        0,
                    )
                }
            }
        }
        Err(e) => {
            tracing::error!(
                segment_id = %segment.id,
                speaker = %segment.speaker,
                attempts = outcome.attempts,
                error = %e,
                "Segment generation failed terminally"
            );
            (failed_entry(&segment, hash, provider, e.to_string()), 0)
        }
    };

    WorkerResult {
        entry,
        duration_warning: outcome.duration_warning,
        audio_ms,
    }
}

fn failed_entry(
    segment: &Segment,
    hash: crate::domain::SegmentHash,
    provider: String,
    error: String,
) -> CachedSegment {
    CachedSegment {
        segment_id: segment.id.clone(),
        index: segment.index,
        speaker: segment.speaker.clone(),
        audio_path: CacheStore::audio_file_name(&segment.id),
        duration_ms: 0,
        file_size: 0,
        hash,
        generated_at: chrono::Utc::now(),
        provider,
        success: false,
        error: Some(error),
    }
}

/// 单段合成尝试序列的结论
struct SynthesisOutcome {
    /// 成功时附带实际音频时长（毫秒）
    response: Result<(SynthesisResponse, u64), TtsError>,
    attempts: u32,
    /// 重试耗尽仍异常但被保留时的警告
    duration_warning: Option<String>,
}

/// 带种子扰动与瞬态冷却的合成尝试循环
///
/// 至多 MAX_SYNTHESIS_ATTEMPTS 次，第 n 次尝试使用
/// seed = voice.seed + n：
/// - incomplete-OTHER、时长异常：立即换种子重试
/// - 瞬态（网络/超时/5xx）：按退避策略冷却后换种子重试
/// - 其余：终态，序列立即结束
///
/// 时长异常耗尽重试时保留最后一次产物并告警，
/// 不完美的结果胜过没有结果；其余耗尽记录最后一个错误
async fn synthesize_with_retries(
    tts: &dyn TtsEnginePort,
    backoff: &BackoffPolicy,
    duration_check: &DurationCheckConfig,
    segment: &Segment,
    voice: &VoiceProfile,
) -> SynthesisOutcome {
    let mut attempts = 0u32;
    let mut transient_failures = 0u32;
    let mut last_error: Option<TtsError> = None;
    let mut last_anomalous: Option<(SynthesisResponse, u64, String)> = None;

    for attempt in 0..MAX_SYNTHESIS_ATTEMPTS {
        attempts = attempt + 1;
        let request = SynthesisRequest {
            text: segment.text.clone(),
            voice: voice.clone(),
            seed: voice.seed + attempt as i64,
        };

        match tts.synthesize(request).await {
            Ok(response) => {
                // 缓存里只进得去合法容器
                let parsed = match parse_wav(&response.audio_data) {
                    Ok(p) => p,
                    Err(e) => {
                        last_error =
                            Some(TtsError::InvalidResponse(format!("unparsable audio: {}", e)));
                        break;
                    }
                };
                let actual_ms = response.duration_ms.unwrap_or_else(|| parsed.duration_ms());

                match check_duration(duration_check, &segment.text, actual_ms) {
                    DurationVerdict::Ok => {
                        return SynthesisOutcome {
                            response: Ok((response, actual_ms)),
                            attempts,
                            duration_warning: None,
                        };
                    }
                    DurationVerdict::Excessive { reason } => {
                        tracing::warn!(
                            segment_id = %segment.id,
                            attempt = attempts,
                            actual_ms,
                            reason = %reason,
                            "Duration anomaly, retrying with perturbed seed"
                        );
                        last_anomalous = Some((response, actual_ms, reason));
                        continue;
                    }
                }
            }
            Err(e) if e.is_seed_retryable() => {
                tracing::warn!(
                    segment_id = %segment.id,
                    attempt = attempts,
                    error = %e,
                    "Generation incomplete, retrying with perturbed seed"
                );
                last_error = Some(e);
                continue;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    segment_id = %segment.id,
                    attempt = attempts,
                    error = %e,
                    "Transient failure, cooling down before retry"
                );
                last_error = Some(e);
                if attempt + 1 < MAX_SYNTHESIS_ATTEMPTS {
                    tokio::time::sleep(backoff.delay_for(transient_failures)).await;
                }
                transient_failures += 1;
                continue;
            }
            Err(e) => {
                last_error = Some(e);
                break;
            }
        }
    }

    // 重试耗尽：时长异常的产物保留，其余按最后错误记终态失败
    if let Some((response, actual_ms, reason)) = last_anomalous {
        tracing::warn!(
            segment_id = %segment.id,
            actual_ms,
            "Keeping anomalous audio after retry budget exhausted"
        );
        return SynthesisOutcome {
            response: Ok((response, actual_ms)),
            attempts,
            duration_warning: Some(reason),
        };
    }

    SynthesisOutcome {
        response: Err(last_error
            .unwrap_or_else(|| TtsError::Unknown("no attempt was made".to_string()))),
        attempts,
        duration_warning: None,
    }
}
