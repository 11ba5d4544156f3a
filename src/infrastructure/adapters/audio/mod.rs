//! 音频适配器
//!
//! WAV 容器处理与成品装配

pub mod assembler;
pub mod wav;

pub use assembler::{
    assemble, AssembleError, AssembleOptions, AssemblyInput, AssemblyResult, ManifestSegment,
};
pub use wav::{encode_wav, parse_wav, ParsedWav, PcmSpec, WavError};
