// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod dispatch;
pub mod engine;
pub mod keys;
pub mod machine;
pub mod protocol;
pub mod transport;
pub mod window;

use std::fmt;

pub use dispatch::{RegionDispatcher, WireOrder};
pub use engine::{CpuState, ExecutionEngine, MmioHandler};
pub use machine::{Bridge, BridgeState, RunOutcome, StopReason};
pub use protocol::AccessWidth;
pub use transport::{IronicClient, Transport, TransportError};
pub use window::{AddressWindow, WindowError, WindowMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Short I/O or bad acknowledgment on the Ironic socket.
    Transport,
    /// Unmapped address or unsupported access width.
    Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("unsupported {direction} size {size} at {addr:#x}")]
    BadWidth {
        addr: u64,
        size: usize,
        direction: Direction,
    },
}

impl BridgeError {
    pub fn kind(&self) -> FaultKind {
        match self {
            BridgeError::Transport(_) => FaultKind::Transport,
            BridgeError::Window(_) | BridgeError::BadWidth { .. } => FaultKind::Configuration,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
