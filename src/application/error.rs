//! 应用层错误定义
//!
//! 只有真正不可恢复的条件才会到达这里并终止运行：
//! 读不到剧本、保存不了清单、装配失败、写不出成品。
//! 单段生成失败、缓存损坏、瞬态网络错误都在下层各自消化。

use std::path::PathBuf;
use thiserror::Error;

/// 应用层错误
#[derive(Debug, Error)]
pub enum AppError {
    /// 剧本文件读取失败
    #[error("Failed to read story file {path}: {source}")]
    StoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 剧本没有可合成的分段
    #[error("Story file {0} contains no synthesizable segments")]
    EmptyStory(PathBuf),

    /// 缓存清单持久化失败（保存失败不允许被掩盖）
    #[error("Cache store error: {0}")]
    CacheStore(String),

    /// 装配失败（缺失/损坏的分段音频会破坏后续所有时间戳）
    #[error("Assembly error: {0}")]
    Assembly(String),

    /// 成品清单写出失败
    #[error("Failed to write audiobook manifest: {0}")]
    ManifestWrite(String),

    /// 没有任何分段产出可用音频
    #[error("No segment produced usable audio")]
    NoUsableAudio,

    /// 其他 I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
