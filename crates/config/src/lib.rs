// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name the Ironic PPC backend binds inside the system temp directory.
pub const DEFAULT_SOCKET_NAME: &str = "ironic-ppc.sock";

/// Broadway reset vector, mapped onto the EXI boot stub.
pub const DEFAULT_RESET_VECTOR: u32 = 0xffff_0100;

const SCHEMA_VERSION: &str = "1.0";

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_reset_vector() -> u32 {
    DEFAULT_RESET_VECTOR
}

/// Byte order of read/write payloads on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    #[serde(alias = "be", alias = "big-endian")]
    Big,
    #[serde(alias = "le", alias = "little-endian")]
    Little,
}

/// A window size, either a plain integer or a human readable string ("8MiB", "0x1000").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(u64),
    Text(String),
}

impl SizeSpec {
    pub fn bytes(&self) -> Result<u64> {
        match self {
            SizeSpec::Bytes(n) => Ok(*n),
            SizeSpec::Text(s) => parse_size(s),
        }
    }
}

impl From<u32> for SizeSpec {
    fn from(value: u32) -> Self {
        SizeSpec::Bytes(value as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub name: String,
    /// Start address of the backing region on the remote side.
    pub base: u32,
    pub size: SizeSpec,
    /// Signed correction added to the translated address.
    #[serde(default)]
    pub offset: i32,
    /// CPU address the window is mapped at, when it aliases `base`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_at: Option<u32>,
}

impl WindowConfig {
    pub fn new(name: &str, base: u32, size: u32) -> Self {
        Self {
            name: name.to_string(),
            base,
            size: size.into(),
            offset: 0,
            mapped_at: None,
        }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn mapped_at(mut self, cpu_base: u32) -> Self {
        self.mapped_at = Some(cpu_base);
        self
    }

    /// Window extent in bytes. Must fit the 32-bit address space.
    pub fn size_bytes(&self) -> Result<u32> {
        let bytes = self
            .size
            .bytes()
            .with_context(|| format!("Invalid size for window '{}'", self.name))?;
        u32::try_from(bytes)
            .map_err(|_| anyhow::anyhow!("Window '{}' size {:#x} exceeds 32 bits", self.name, bytes))
    }
}

/// The physical map seen by the Broadway CPU.
pub fn default_windows() -> Vec<WindowConfig> {
    vec![
        WindowConfig::new("mem1", 0x0000_0000, 0x0180_0000),
        WindowConfig::new("mem2", 0x1000_0000, 0x0400_0000),
        WindowConfig::new("legacy", 0x0c00_0000, 0x0080_0000),
        WindowConfig::new("hollywood", 0x0d80_0000, 0x0080_0000),
        WindowConfig::new("hollywood-mirror", 0x0d00_0000, 0x0080_0000),
        WindowConfig::new("reset-vector", 0x0d80_6840, 0x1000)
            .with_offset(-256)
            .mapped_at(0xffff_0000),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Path of the Ironic PPC socket. Defaults to `<temp_dir>/ironic-ppc.sock`.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    #[serde(default)]
    pub wire_order: ByteOrder,
    #[serde(default = "default_reset_vector")]
    pub reset_vector: u32,
    /// Log every dispatched access at debug level.
    #[serde(default)]
    pub log_accesses: bool,
    #[serde(default)]
    pub max_steps: Option<u64>,
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            socket: None,
            wire_order: ByteOrder::default(),
            reset_vector: DEFAULT_RESET_VECTOR,
            log_accesses: false,
            max_steps: None,
            windows: default_windows(),
        }
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bridge config {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid bridge config {:?}", path))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bridge Config YAML")?;
        if config.schema_version != SCHEMA_VERSION {
            tracing::warn!(
                "Bridge config schema_version '{}' differs from supported '{}'",
                config.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(config)
    }

    pub fn resolved_socket(&self) -> PathBuf {
        match &self.socket {
            Some(path) => path.clone(),
            None => default_socket_path(),
        }
    }
}

pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_SOCKET_NAME)
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hex size '{}': {}", size_str, e));
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(n);
    }
    let s: Size = trimmed
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format '{}': {}", size_str, e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_forms() {
        assert_eq!(parse_size("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("8MiB").unwrap(), 0x0080_0000);
        assert_eq!(parse_size("64MiB").unwrap(), 0x0400_0000);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_default_map_matches_broadway() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.windows.len(), 6);
        assert_eq!(cfg.reset_vector, 0xffff_0100);
        assert_eq!(cfg.wire_order, ByteOrder::Big);

        let rvec = cfg
            .windows
            .iter()
            .find(|w| w.name == "reset-vector")
            .unwrap();
        assert_eq!(rvec.base, 0x0d80_6840);
        assert_eq!(rvec.offset, -256);
        assert_eq!(rvec.mapped_at, Some(0xffff_0000));
        assert_eq!(rvec.size_bytes().unwrap(), 0x1000);
    }

    #[test]
    fn test_size_overflowing_u32_is_rejected() {
        let w = WindowConfig {
            name: "huge".to_string(),
            base: 0,
            size: SizeSpec::Bytes(0x1_0000_0000),
            offset: 0,
            mapped_at: None,
        };
        assert!(w.size_bytes().is_err());
    }

    #[test]
    fn test_default_socket_lives_in_temp_dir() {
        let cfg = BridgeConfig::default();
        let path = cfg.resolved_socket();
        assert!(path.ends_with(DEFAULT_SOCKET_NAME));
        assert!(path.starts_with(std::env::temp_dir()));
    }
}
