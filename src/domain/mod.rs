//! Domain Layer - 领域层
//!
//! 纯值与纯函数，无 I/O：
//! - script: 剧本解析与分段
//! - voice: 音色配置与解析链
//! - fingerprint: 分段指纹（缓存有效性判据）
//! - manifest: 缓存清单模型与纯变换

pub mod fingerprint;
pub mod manifest;
pub mod script;
pub mod voice;

pub use fingerprint::{fingerprint, SegmentHash};
pub use manifest::{CacheManifest, CachedSegment, GenerationStats, MANIFEST_VERSION};
pub use script::{parse_script, segment_id, speakers, Segment, NARRATOR_SPEAKER};
pub use voice::{resolve_voice, SpeakerVoice, VoiceProfile, VoicesConfig};
