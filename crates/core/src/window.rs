// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use ironic_bridge_config::WindowConfig;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("window '{0}' has zero size")]
    Empty(String),
    #[error("window name must not be empty")]
    Unnamed,
    #[error("window '{0}' is defined twice")]
    Duplicate(String),
    #[error("window '{a}' ({a_start:#x}..{a_end:#x}) overlaps '{b}' ({b_start:#x}..{b_end:#x})")]
    Overlap {
        a: String,
        a_start: u64,
        a_end: u64,
        b: String,
        b_start: u64,
        b_end: u64,
    },
    #[error("window '{name}' has invalid size: {reason}")]
    BadSize { name: String, reason: String },
    #[error("no window maps address {0:#x}")]
    Unmapped(u64),
}

/// One CPU-visible MMIO region routed to the remote process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AddressWindow {
    pub name: String,
    /// Start of the backing region as the remote process sees it.
    pub base: u32,
    pub size: u32,
    pub offset: i32,
    /// Where the CPU sees the window, if not at `base`.
    pub mapped_at: Option<u32>,
}

impl AddressWindow {
    pub fn new(name: &str, base: u32, size: u32, offset: i32) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            offset,
            mapped_at: None,
        }
    }

    pub fn mapped_at(mut self, cpu_base: u32) -> Self {
        self.mapped_at = Some(cpu_base);
        self
    }

    pub fn from_config(cfg: &WindowConfig) -> Result<Self, WindowError> {
        let size = cfg.size_bytes().map_err(|e| WindowError::BadSize {
            name: cfg.name.clone(),
            reason: format!("{:#}", e),
        })?;
        Ok(Self {
            name: cfg.name.clone(),
            base: cfg.base,
            size,
            offset: cfg.offset,
            mapped_at: cfg.mapped_at,
        })
    }

    pub fn cpu_base(&self) -> u32 {
        self.mapped_at.unwrap_or(self.base)
    }

    /// Exclusive end of the CPU range. 64-bit so a window may end at 4 GiB.
    pub fn cpu_end(&self) -> u64 {
        self.cpu_base() as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.cpu_base() as u64 && addr < self.cpu_end()
    }

    /// Remote address for a CPU address inside this window:
    /// the window-relative offset reapplied at `base`, shifted by `offset`.
    pub fn translate(&self, addr: u32) -> u32 {
        addr.wrapping_sub(self.cpu_base())
            .wrapping_add(self.base)
            .wrapping_add_signed(self.offset)
    }
}

impl fmt::Display for AddressWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18} cpu {:#010x}..{:#011x} -> remote {:#010x}",
            self.name,
            self.cpu_base(),
            self.cpu_end(),
            self.translate(self.cpu_base())
        )
    }
}

/// Immutable set of non-overlapping windows, built once at startup.
#[derive(Debug, Clone)]
pub struct WindowMap {
    windows: Vec<AddressWindow>,
}

impl WindowMap {
    pub fn new(mut windows: Vec<AddressWindow>) -> Result<Self, WindowError> {
        for (i, w) in windows.iter().enumerate() {
            if w.name.is_empty() {
                return Err(WindowError::Unnamed);
            }
            if w.size == 0 {
                return Err(WindowError::Empty(w.name.clone()));
            }
            if windows[..i].iter().any(|other| other.name == w.name) {
                return Err(WindowError::Duplicate(w.name.clone()));
            }
        }

        windows.sort_by_key(|w| w.cpu_base());
        for pair in windows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if (b.cpu_base() as u64) < a.cpu_end() {
                return Err(WindowError::Overlap {
                    a: a.name.clone(),
                    a_start: a.cpu_base() as u64,
                    a_end: a.cpu_end(),
                    b: b.name.clone(),
                    b_start: b.cpu_base() as u64,
                    b_end: b.cpu_end(),
                });
            }
        }

        Ok(Self { windows })
    }

    pub fn from_config(windows: &[WindowConfig]) -> Result<Self, WindowError> {
        let windows = windows
            .iter()
            .map(AddressWindow::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(windows)
    }

    /// The Broadway physical map.
    pub fn broadway() -> Self {
        Self::from_config(&ironic_bridge_config::default_windows())
            .unwrap_or_else(|e| unreachable!("built-in window map is invalid: {e}"))
    }

    /// Windows ordered by CPU address.
    pub fn windows(&self) -> &[AddressWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AddressWindow> {
        self.windows.iter().find(|w| w.name == name)
    }

    pub fn index_of(&self, addr: u64) -> Option<usize> {
        let idx = self
            .windows
            .partition_point(|w| (w.cpu_base() as u64) <= addr);
        let candidate = idx.checked_sub(1)?;
        self.windows[candidate].contains(addr).then_some(candidate)
    }

    pub fn resolve(&self, addr: u64) -> Option<&AddressWindow> {
        self.index_of(addr).map(|i| &self.windows[i])
    }

    /// Resolve `addr` and compute the address to send to the remote process.
    pub fn translate(&self, addr: u64) -> Result<(&AddressWindow, u32), WindowError> {
        let window = self.resolve(addr).ok_or(WindowError::Unmapped(addr))?;
        Ok((window, window.translate(addr as u32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_vector_alias_translation() {
        let map = WindowMap::new(vec![AddressWindow::new("rvec", 0x0d80_6840, 0x1000, -256)])
            .unwrap();
        let (w, remote) = map.translate(0x0d80_6840).unwrap();
        assert_eq!(w.name, "rvec");
        assert_eq!(remote, 0x0d80_6740);
    }

    #[test]
    fn test_mapped_alias_translation() {
        let map = WindowMap::broadway();
        let (w, remote) = map.translate(0xffff_0100).unwrap();
        assert_eq!(w.name, "reset-vector");
        assert_eq!(remote, 0x0d80_6840);

        let (_, last) = map.translate(0xffff_0fff).unwrap();
        assert_eq!(last, 0x0d80_6840 + 0xeff);
    }

    #[test]
    fn test_broadway_map_resolution() {
        let map = WindowMap::broadway();
        assert_eq!(map.len(), 6);
        assert_eq!(map.resolve(0x0).unwrap().name, "mem1");
        assert_eq!(map.resolve(0x017f_ffff).unwrap().name, "mem1");
        assert!(map.resolve(0x0180_0000).is_none());
        assert_eq!(map.resolve(0x0c00_0010).unwrap().name, "legacy");
        assert_eq!(map.resolve(0x0d00_0000).unwrap().name, "hollywood-mirror");
        assert_eq!(map.resolve(0x0d80_6840).unwrap().name, "hollywood");
        assert_eq!(map.resolve(0x13ff_fffc).unwrap().name, "mem2");
        assert!(map.resolve(0x1400_0000).is_none());
        assert!(map.resolve(0x1_0000_0000).is_none());
    }

    #[test]
    fn test_overlap_is_rejected() {
        let err = WindowMap::new(vec![
            AddressWindow::new("a", 0x1000, 0x1000, 0),
            AddressWindow::new("b", 0x1fff, 0x10, 0),
        ])
        .unwrap_err();
        assert!(matches!(err, WindowError::Overlap { .. }));

        // Alias windows are checked by their CPU range, not their base.
        let err = WindowMap::new(vec![
            AddressWindow::new("a", 0x1000, 0x1000, 0),
            AddressWindow::new("alias", 0x8000, 0x100, 0).mapped_at(0x1800),
        ])
        .unwrap_err();
        assert!(matches!(err, WindowError::Overlap { .. }));
    }

    #[test]
    fn test_adjacent_windows_are_fine() {
        let map = WindowMap::new(vec![
            AddressWindow::new("hi", 0x2000, 0x1000, 0),
            AddressWindow::new("lo", 0x1000, 0x1000, 0),
        ])
        .unwrap();
        assert_eq!(map.resolve(0x1fff).unwrap().name, "lo");
        assert_eq!(map.resolve(0x2000).unwrap().name, "hi");
    }

    #[test]
    fn test_invalid_windows_are_rejected() {
        assert_eq!(
            WindowMap::new(vec![AddressWindow::new("z", 0, 0, 0)]).unwrap_err(),
            WindowError::Empty("z".to_string())
        );
        assert_eq!(
            WindowMap::new(vec![AddressWindow::new("", 0, 4, 0)]).unwrap_err(),
            WindowError::Unnamed
        );
        assert_eq!(
            WindowMap::new(vec![
                AddressWindow::new("dup", 0, 4, 0),
                AddressWindow::new("dup", 0x100, 4, 0),
            ])
            .unwrap_err(),
            WindowError::Duplicate("dup".to_string())
        );
    }

    #[test]
    fn test_unmapped_address() {
        let map = WindowMap::broadway();
        assert_eq!(
            map.translate(0x2000_0000).unwrap_err(),
            WindowError::Unmapped(0x2000_0000)
        );
    }
}
