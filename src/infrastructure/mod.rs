//! Infrastructure Layer - 基础设施层
//!
//! 端口与存储的具体实现

pub mod adapters;
pub mod persistence;
pub mod worker;

pub use adapters::{FakeTtsClient, FakeTtsClientConfig, HttpTtsClient, HttpTtsClientConfig};
pub use persistence::{CacheStore, StoreError};
pub use worker::{GenerateWorker, GenerateWorkerConfig};
