//! Sonovel - 剧本转有声书 TTS CLI
//!
//! 入口：加载配置 → 初始化日志 → 构建 TTS 引擎 → 分发子命令

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sonovel::application::ports::TtsEnginePort;
use sonovel::application::{
    run_clear, run_generate, run_invalidate, run_refresh_voices, run_status, GenerateOptions,
    RunSummary,
};
use sonovel::cli::{Cli, Command};
use sonovel::config::{load_config_from_path, print_config, AppConfig};
use sonovel::infrastructure::adapters::tts::{
    FakeTtsClient, HttpTtsClient, HttpTtsClientConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let mut config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    apply_cli_overrides(&mut config, &cli.command);

    // 初始化日志
    let log_filter = format!("{},sonovel={}", config.log.level, config.log.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));
    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("Sonovel - script-to-audiobook TTS generator");
    print_config(&config);

    match &cli.command {
        Command::Generate {
            script,
            force,
            fake_tts,
            skip_assembly,
            ..
        } => {
            let tts = build_tts_engine(&config, *fake_tts)?;
            if !tts.health_check().await {
                tracing::warn!(url = %config.tts.url, "TTS service health check failed, continuing anyway");
            }
            let options = GenerateOptions {
                script_path: script.clone(),
                force: *force,
                skip_assembly: *skip_assembly,
            };
            let summary = run_generate(&config, tts, &options).await?;
            finish(summary)
        }
        Command::Status { script, .. } => {
            run_status(&config, script).await?;
            Ok(())
        }
        Command::RefreshVoices {
            script,
            speakers,
            fake_tts,
            ..
        } => {
            let tts = build_tts_engine(&config, *fake_tts)?;
            let filter = (!speakers.is_empty()).then_some(speakers.as_slice());
            let summary = run_refresh_voices(&config, tts, script, filter).await?;
            finish(summary)
        }
        Command::Invalidate {
            script, speakers, ..
        } => {
            run_invalidate(&config, script, speakers).await?;
            Ok(())
        }
        Command::Clear { script, .. } => {
            run_clear(&config, script).await?;
            Ok(())
        }
    }
}

/// CLI 标志覆盖配置文件同名项
fn apply_cli_overrides(config: &mut AppConfig, command: &Command) {
    let (output_dir, concurrency): (&Option<PathBuf>, Option<usize>) = match command {
        Command::Generate {
            output_dir,
            concurrency,
            ..
        } => (output_dir, *concurrency),
        Command::Status { output_dir, .. }
        | Command::RefreshVoices { output_dir, .. }
        | Command::Invalidate { output_dir, .. }
        | Command::Clear { output_dir, .. } => (output_dir, None),
    };

    if let Some(dir) = output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(n) = concurrency {
        config.generation.max_concurrent = n.max(1);
    }
}

/// 构建 TTS 引擎（--fake-tts 时使用离线客户端）
fn build_tts_engine(config: &AppConfig, fake: bool) -> anyhow::Result<Arc<dyn TtsEnginePort>> {
    if fake {
        return Ok(Arc::new(FakeTtsClient::with_defaults()));
    }
    let tts_config = HttpTtsClientConfig {
        base_url: config.tts.url.clone(),
        timeout_secs: config.tts.timeout_secs,
        provider: config.tts.provider.clone(),
    };
    let client = HttpTtsClient::new(tts_config)
        .map_err(|e| anyhow::anyhow!("Failed to build TTS client: {}", e))?;
    Ok(Arc::new(client))
}

/// 汇总运行结果并决定退出状态
///
/// 有失败分段时整体视为失败（非零退出），
/// 即使成品已尽可能装配出来
fn finish(summary: RunSummary) -> anyhow::Result<()> {
    tracing::info!(
        total = summary.total_segments,
        generated = summary.generated,
        cached = summary.cached,
        failed = summary.failed,
        kept_anomalies = summary.kept_anomalies,
        total_duration_ms = summary.total_duration_ms,
        "Run summary"
    );
    if let Some(output) = &summary.output_file {
        tracing::info!(output = %output.display(), "Audiobook written");
    }
    if let Some(manifest) = &summary.manifest_file {
        tracing::info!(manifest = %manifest.display(), "Timing manifest written");
    }

    if summary.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} segment(s) failed to generate", summary.failed)
    }
}
