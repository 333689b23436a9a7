// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::engine::MmioHandler;
use crate::protocol::AccessWidth;
use crate::transport::Transport;
use crate::window::{WindowError, WindowMap};
use crate::{BridgeError, BridgeResult, Direction};
use ironic_bridge_config::ByteOrder;

/// Byte order of read/write payloads on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireOrder {
    #[default]
    Big,
    Little,
}

impl From<ByteOrder> for WireOrder {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Big => WireOrder::Big,
            ByteOrder::Little => WireOrder::Little,
        }
    }
}

/// Integers that can cross the wire.
pub trait WireValue: Copy {
    fn from_be(self) -> Self;
    fn from_le(self) -> Self;
    fn to_be(self) -> Self;
    fn to_le(self) -> Self;
}

macro_rules! impl_wire_value {
    ($($t:ty),*) => {
        $(impl WireValue for $t {
            fn from_be(self) -> Self { <$t>::from_be(self) }
            fn from_le(self) -> Self { <$t>::from_le(self) }
            fn to_be(self) -> Self { <$t>::to_be(self) }
            fn to_le(self) -> Self { <$t>::to_le(self) }
        })*
    };
}

impl_wire_value!(u8, u16, u32);

impl WireOrder {
    /// Wire-order value (payload bytes read verbatim) to CPU-native.
    pub fn from_wire<V: WireValue>(self, value: V) -> V {
        match self {
            WireOrder::Big => value.from_be(),
            WireOrder::Little => value.from_le(),
        }
    }

    /// CPU-native value to wire order.
    pub fn to_wire<V: WireValue>(self, value: V) -> V {
        match self {
            WireOrder::Big => value.to_be(),
            WireOrder::Little => value.to_le(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchStats {
    pub reads: u64,
    pub writes: u64,
    /// Accesses per window, in `WindowMap::windows()` order.
    pub per_window: Vec<u64>,
}

/// Routes CPU accesses to the remote process, one transport call per access.
pub struct RegionDispatcher<T: Transport> {
    windows: WindowMap,
    transport: T,
    order: WireOrder,
    log_accesses: bool,
    fault: Option<BridgeError>,
    stats: DispatchStats,
}

impl<T: Transport> RegionDispatcher<T> {
    pub fn new(windows: WindowMap, transport: T, order: WireOrder) -> Self {
        let stats = DispatchStats {
            per_window: vec![0; windows.len()],
            ..Default::default()
        };
        Self {
            windows,
            transport,
            order,
            log_accesses: false,
            fault: None,
            stats,
        }
    }

    pub fn with_access_log(mut self, enabled: bool) -> Self {
        self.log_accesses = enabled;
        self
    }

    pub fn windows(&self) -> &WindowMap {
        &self.windows
    }

    pub fn wire_order(&self) -> WireOrder {
        self.order
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// First fault recorded by an engine-facing access.
    pub fn fault(&self) -> Option<&BridgeError> {
        self.fault.as_ref()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn take_fault(&mut self) -> Option<BridgeError> {
        self.fault.take()
    }

    fn route(&mut self, addr: u64) -> BridgeResult<(usize, u32)> {
        let idx = self
            .windows
            .index_of(addr)
            .ok_or(WindowError::Unmapped(addr))?;
        let remote = self.windows.windows()[idx].translate(addr as u32);
        self.stats.per_window[idx] += 1;
        Ok((idx, remote))
    }

    fn log_access(&self, idx: usize, addr: u64, remote: u32, width: AccessWidth, direction: Direction, value: u32) {
        if self.log_accesses {
            tracing::debug!(
                "MMIO {} {} @ {:#010x} ({} -> {:#010x}) = {:#x}",
                direction,
                width,
                addr,
                self.windows.windows()[idx].name,
                remote,
                value
            );
        }
    }

    pub fn try_read(&mut self, addr: u64, width: AccessWidth) -> BridgeResult<u32> {
        let (idx, remote) = self.route(addr)?;
        let value = match width {
            AccessWidth::Byte => self.transport.read8(remote)? as u32,
            AccessWidth::Half => self.order.from_wire(self.transport.read16(remote)?) as u32,
            AccessWidth::Word => self.order.from_wire(self.transport.read32(remote)?),
        };
        self.stats.reads += 1;
        self.log_access(idx, addr, remote, width, Direction::Read, value);
        Ok(value)
    }

    /// Write the low `width` bytes of `value`.
    pub fn try_write(&mut self, addr: u64, width: AccessWidth, value: u32) -> BridgeResult<()> {
        let (idx, remote) = self.route(addr)?;
        self.log_access(idx, addr, remote, width, Direction::Write, value & width.mask() as u32);
        match width {
            AccessWidth::Byte => self.transport.write8(remote, value as u8)?,
            AccessWidth::Half => self.transport.write16(remote, self.order.to_wire(value as u16))?,
            AccessWidth::Word => self.transport.write32(remote, self.order.to_wire(value))?,
        }
        self.stats.writes += 1;
        Ok(())
    }

    fn latch(&mut self, err: BridgeError) {
        if self.fault.is_none() {
            tracing::error!("MMIO access failed, requesting halt: {}", err);
            self.fault = Some(err);
        } else {
            tracing::debug!("Dropping follow-up MMIO fault: {}", err);
        }
    }

    fn width_for(addr: u64, size: usize, direction: Direction) -> BridgeResult<AccessWidth> {
        AccessWidth::try_from(size).map_err(|size| BridgeError::BadWidth {
            addr,
            size,
            direction,
        })
    }
}

impl<T: Transport> MmioHandler for RegionDispatcher<T> {
    /// Returns zero on any fault; the caller must check `fault()`.
    fn mmio_read(&mut self, addr: u64, size: usize) -> u64 {
        if self.fault.is_some() {
            return 0;
        }
        let result =
            Self::width_for(addr, size, Direction::Read).and_then(|w| self.try_read(addr, w));
        match result {
            Ok(value) => value as u64,
            Err(err) => {
                self.latch(err);
                0
            }
        }
    }

    fn mmio_write(&mut self, addr: u64, size: usize, value: u64) {
        if self.fault.is_some() {
            return;
        }
        let result = Self::width_for(addr, size, Direction::Write)
            .and_then(|w| self.try_write(addr, w, value as u32));
        if let Err(err) = result {
            self.latch(err);
        }
    }
}
