//! WAV 容器解析与编码
//!
//! 仅处理未压缩 PCM：
//! - 解析按 chunk id/size 扫描，容忍 data chunk 不在第 44 字节
//!   （编码器变体会插入 LIST 等附加 chunk）
//! - 编码始终输出规范的 44 字节头布局

use thiserror::Error;

/// PCM format code
const WAVE_FORMAT_PCM: u16 = 1;

/// WAV 解析/编码错误
#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV data too short ({0} bytes)")]
    TooShort(usize),

    #[error("Invalid WAV: missing RIFF header")]
    MissingRiff,

    #[error("Invalid WAV: missing WAVE identifier")]
    MissingWave,

    #[error("Invalid WAV: missing fmt chunk")]
    MissingFmt,

    #[error("Invalid WAV: missing data chunk")]
    MissingData,

    #[error("Invalid fmt chunk size: {0}")]
    InvalidFmtSize(usize),

    #[error("Unsupported audio format code: {0} (PCM only)")]
    UnsupportedFormat(u16),

    #[error("Chunk {id} overruns file (offset {offset}, size {size}, file {file_len})")]
    TruncatedChunk {
        id: String,
        offset: usize,
        size: usize,
        file_len: usize,
    },
}

/// PCM 参数（fmt chunk 的合成相关字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmSpec {
    /// 每秒 PCM 字节数
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// 由负载字节数计算时长（毫秒，向下取整）
    pub fn duration_ms(&self, payload_len: usize) -> u64 {
        let byte_rate = self.byte_rate() as u64;
        if byte_rate == 0 {
            return 0;
        }
        payload_len as u64 * 1000 / byte_rate
    }

    /// 指定毫秒静音对应的负载字节数（对齐到整帧）
    pub fn silence_payload_len(&self, silence_ms: u64) -> usize {
        let frame = (self.channels * (self.bits_per_sample / 8)) as usize;
        if frame == 0 {
            return 0;
        }
        let bytes = (self.byte_rate() as u64 * silence_ms / 1000) as usize;
        bytes - bytes % frame
    }
}

/// 解析结果：PCM 参数与负载在原始字节中的范围
#[derive(Debug, Clone)]
pub struct ParsedWav {
    pub spec: PcmSpec,
    data_start: usize,
    data_len: usize,
}

impl ParsedWav {
    /// 原始 PCM 负载
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.data_start..self.data_start + self.data_len]
    }

    pub fn payload_len(&self) -> usize {
        self.data_len
    }

    pub fn duration_ms(&self) -> u64 {
        self.spec.duration_ms(self.data_len)
    }
}

/// 解析 WAV 容器
///
/// 按 chunk 扫描定位 fmt 与 data，不假设固定偏移；
/// 奇数大小的 chunk 按规范对齐到偶数字节
pub fn parse_wav(data: &[u8]) -> Result<ParsedWav, WavError> {
    if data.len() < 44 {
        return Err(WavError::TooShort(data.len()));
    }
    if &data[0..4] != b"RIFF" {
        return Err(WavError::MissingRiff);
    }
    if &data[8..12] != b"WAVE" {
        return Err(WavError::MissingWave);
    }

    let mut pos = 12;
    let mut spec: Option<PcmSpec> = None;
    let mut data_range: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size =
            u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                as usize;
        let body_start = pos + 8;

        if body_start + chunk_size > data.len() {
            return Err(WavError::TruncatedChunk {
                id: String::from_utf8_lossy(chunk_id).to_string(),
                offset: pos,
                size: chunk_size,
                file_len: data.len(),
            });
        }

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(WavError::InvalidFmtSize(chunk_size));
                }
                let fmt = &data[body_start..body_start + 16];
                let audio_format = u16::from_le_bytes([fmt[0], fmt[1]]);
                if audio_format != WAVE_FORMAT_PCM {
                    return Err(WavError::UnsupportedFormat(audio_format));
                }
                spec = Some(PcmSpec {
                    channels: u16::from_le_bytes([fmt[2], fmt[3]]),
                    sample_rate: u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]),
                    bits_per_sample: u16::from_le_bytes([fmt[14], fmt[15]]),
                });
            }
            b"data" => {
                data_range = Some((body_start, chunk_size));
                break;
            }
            _ => {}
        }

        pos = body_start + chunk_size;
        // 对齐到偶数字节
        if chunk_size % 2 != 0 {
            pos += 1;
        }
    }

    let spec = spec.ok_or(WavError::MissingFmt)?;
    let (data_start, data_len) = data_range.ok_or(WavError::MissingData)?;

    Ok(ParsedWav {
        spec,
        data_start,
        data_len,
    })
}

/// 将 PCM 负载包进规范的 44 字节头 WAV 容器
pub fn encode_wav(spec: &PcmSpec, payload: &[u8]) -> Vec<u8> {
    let data_size = payload.len();
    let file_size = 36 + data_size;
    let block_align = spec.channels * (spec.bits_per_sample / 8);

    let mut wav = Vec::with_capacity(44 + data_size);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(file_size as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    wav.extend_from_slice(&spec.channels.to_le_bytes());
    wav.extend_from_slice(&spec.sample_rate.to_le_bytes());
    wav.extend_from_slice(&spec.byte_rate().to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    wav.extend_from_slice(payload);

    wav
}
