// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Key blob extraction from a fixed-layout firmware dump.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Offset of the key blob inside the dump (0x2100_0000).
pub const KEY_BLOB_OFFSET: u64 = 553_648_128;
pub const KEY_BLOB_LEN: usize = 1024;
pub const SECRET_A: Range<usize> = 256..384;
pub const SECRET_B: Range<usize> = 512..768;
pub const LABEL_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("dump is {len} bytes, key blob needs {needed}")]
    Truncated { len: u64, needed: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct KeyBlob {
    bytes: [u8; KEY_BLOB_LEN],
}

impl KeyBlob {
    pub fn from_bytes(bytes: [u8; KEY_BLOB_LEN]) -> Self {
        Self { bytes }
    }

    /// Read the blob at `offset`, touching only that range.
    pub fn read_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Self, KeyError> {
        let len = reader.seek(SeekFrom::End(0))?;
        let needed = offset + KEY_BLOB_LEN as u64;
        if len < needed {
            return Err(KeyError::Truncated { len, needed });
        }
        reader.seek(SeekFrom::Start(offset))?;
        let mut bytes = [0u8; KEY_BLOB_LEN];
        reader.read_exact(&mut bytes)?;
        Ok(Self { bytes })
    }

    pub fn from_dump<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let mut file = File::open(path)?;
        Self::read_at(&mut file, KEY_BLOB_OFFSET)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn secret_a(&self) -> &[u8] {
        &self.bytes[SECRET_A]
    }

    pub fn secret_b(&self) -> &[u8] {
        &self.bytes[SECRET_B]
    }

    /// First 256 bytes as ASCII; trailing NULs dropped, other non-printables as '.'.
    pub fn label(&self) -> String {
        let raw = &self.bytes[..LABEL_LEN];
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        raw[..end]
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    /// Write `keys.bin`, `secret_a.bin` and `secret_b.bin` into `dir`.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>, KeyError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let outputs = [
            ("keys.bin", self.as_bytes()),
            ("secret_a.bin", self.secret_a()),
            ("secret_b.bin", self.secret_b()),
        ];
        let mut written = Vec::with_capacity(outputs.len());
        for (name, data) in outputs {
            let path = dir.join(name);
            std::fs::write(&path, data)?;
            tracing::info!("Wrote {} bytes to {:?}", data.len(), path);
            written.push(path);
        }
        Ok(written)
    }
}
