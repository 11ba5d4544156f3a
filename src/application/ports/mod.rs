//! Application Ports - 出站端口定义
//!
//! 应用层对外部协作方的抽象接口

mod tts_engine;

pub use tts_engine::{SynthesisRequest, SynthesisResponse, TtsEnginePort, TtsError};
