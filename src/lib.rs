//! Sonovel - 剧本转有声书 TTS CLI
//!
//! 把带说话人标注的剧本增量地合成为完整有声书：
//! 逐段调用远程 TTS、按内容指纹缓存、拼接成品并产出时间线清单
//!
//! 领域层 (domain/):
//! - 剧本解析、音色解析链、分段指纹、缓存清单模型
//!
//! 应用层 (application/):
//! - Ports: TTS 引擎端口与错误分类
//! - Planner: 增量生成计划
//! - Commands: CLI 子命令用例
//!
//! 基础设施层 (infrastructure/):
//! - Persistence: 缓存清单与分段音频存储
//! - Worker: 限宽并发的生成编排、重试与时长异常策略
//! - Adapters: HTTP/Fake TTS 客户端、WAV 编解码与装配

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
