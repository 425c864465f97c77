//! slot/compress — кодек payload на диске (none / zlib / zstd).
//!
//! Кодек хранится в младших битах header.flags. Распаковка потоковая, с
//! ограничением MAX_PAYLOAD_LEN: повреждённый поток или "бомба" → CorruptPayload.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::consts::{CODEC_NONE, CODEC_ZLIB, CODEC_ZSTD, MAX_PAYLOAD_LEN};
use crate::error::{SaveError, SaveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadCodec {
    None,
    #[default]
    Zlib,
    Zstd,
}

impl PayloadCodec {
    pub fn id(self) -> u8 {
        match self {
            PayloadCodec::None => CODEC_NONE,
            PayloadCodec::Zlib => CODEC_ZLIB,
            PayloadCodec::Zstd => CODEC_ZSTD,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            CODEC_NONE => Some(PayloadCodec::None),
            CODEC_ZLIB => Some(PayloadCodec::Zlib),
            CODEC_ZSTD => Some(PayloadCodec::Zstd),
            _ => None,
        }
    }

    pub fn compress(self, raw: &[u8]) -> SaveResult<Vec<u8>> {
        match self {
            PayloadCodec::None => Ok(raw.to_vec()),
            PayloadCodec::Zlib => {
                let mut enc = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2 + 16), Compression::default());
                enc.write_all(raw)?;
                Ok(enc.finish()?)
            }
            PayloadCodec::Zstd => Ok(zstd::bulk::compress(raw, 0)?),
        }
    }

    pub fn decompress(self, stored: &[u8]) -> SaveResult<Vec<u8>> {
        match self {
            PayloadCodec::None => Ok(stored.to_vec()),
            PayloadCodec::Zlib => read_bounded(ZlibDecoder::new(stored), "zlib"),
            PayloadCodec::Zstd => {
                let dec = zstd::stream::read::Decoder::new(stored)
                    .map_err(|e| SaveError::corrupt(format!("zstd decoder init: {e}")))?;
                read_bounded(dec, "zstd")
            }
        }
    }
}

fn read_bounded<R: Read>(r: R, what: &str) -> SaveResult<Vec<u8>> {
    let mut out = Vec::new();
    r.take(MAX_PAYLOAD_LEN + 1)
        .read_to_end(&mut out)
        .map_err(|e| SaveError::corrupt(format!("{what} stream: {e}")))?;
    if out.len() as u64 > MAX_PAYLOAD_LEN {
        return Err(SaveError::corrupt(format!(
            "{what} stream inflates beyond {MAX_PAYLOAD_LEN} bytes"
        )));
    }
    Ok(out)
}

impl fmt::Display for PayloadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadCodec::None => "none",
            PayloadCodec::Zlib => "zlib",
            PayloadCodec::Zstd => "zstd",
        })
    }
}

impl FromStr for PayloadCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "raw" | "off" => Ok(PayloadCodec::None),
            "zlib" | "deflate" => Ok(PayloadCodec::Zlib),
            "zstd" => Ok(PayloadCodec::Zstd),
            other => Err(format!("unknown payload codec '{other}' (none|zlib|zstd)")),
        }
    }
}
