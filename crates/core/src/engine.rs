// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::window::AddressWindow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Callbacks the CPU emulation engine invokes for every access inside a mapped window.
pub trait MmioHandler {
    fn mmio_read(&mut self, addr: u64, size: usize) -> u64;
    fn mmio_write(&mut self, addr: u64, size: usize, value: u64);
}

/// Handler shared between the driving loop and the engine's callbacks.
/// The bridge runs on one thread, so `Rc<RefCell<_>>` is enough.
pub type SharedHandler = Rc<RefCell<dyn MmioHandler>>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to map window '{name}': {reason}")]
    Map { name: String, reason: String },
    #[error("invalid instruction {inst:#010x} at {pc:#010x}")]
    InvalidInstruction { pc: u32, inst: u32 },
    #[error("{reason}, occurred @ {pc:#010x}")]
    Fault { pc: u32, reason: String },
}

/// Trait representing the external CPU emulation engine
pub trait ExecutionEngine {
    /// Route every access inside `window`'s CPU range to `handler`.
    fn map_window(&mut self, window: &AddressWindow, handler: SharedHandler) -> Result<(), EngineError>;

    /// Execute exactly one instruction at `pc` and return the next PC.
    fn step(&mut self, pc: u32) -> Result<u32, EngineError>;

    fn cpu_state(&self) -> CpuState;

    /// Interrupt numbers raised since the last call.
    fn take_interrupts(&mut self) -> Vec<u32>;
}

/// Primary opcode of `psq_l`, the paired-single quantized load.
pub const PSQ_L_PRIMARY: u32 = 0x38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInstructionAction {
    /// Step over the instruction (PC + 4).
    Skip,
    Fault,
}

/// What to do with an instruction the engine cannot decode.
///
/// Paired-single loads are Broadway extensions the generic 750CL model does
/// not decode; they are stepped over.
pub fn invalid_instruction_action(inst: u32) -> InvalidInstructionAction {
    if inst >> 26 == PSQ_L_PRIMARY {
        InvalidInstructionAction::Skip
    } else {
        InvalidInstructionAction::Fault
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CpuState {
    pub gpr: [u32; 32],
    pub pc: u32,
    pub lr: u32,
}

impl fmt::Display for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registers:")?;
        for row in 0..8 {
            let first = row * 4;
            let label = format!("r{:<2} - r{:<2}", first, first + 3);
            write!(f, "{:<10}:", label)?;
            for reg in &self.gpr[first..first + 4] {
                write!(f, " {:#010x}", reg)?;
            }
            writeln!(f)?;
        }
        write!(f, "{:<10}: {:#010x} {:#010x}", "pc, lr", self.pc, self.lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psq_l_is_skipped() {
        // psq_l f1, 0(r3), 0, 0
        assert_eq!(
            invalid_instruction_action(0xe023_0000),
            InvalidInstructionAction::Skip
        );
        // psq_st has primary opcode 0x3c and is not covered
        assert_eq!(
            invalid_instruction_action(0xf023_0000),
            InvalidInstructionAction::Fault
        );
        assert_eq!(invalid_instruction_action(0), InvalidInstructionAction::Fault);
    }

    #[test]
    fn test_cpu_state_dump_layout() {
        let mut state = CpuState {
            pc: 0xfff0_0100,
            lr: 0x8000_1234,
            ..Default::default()
        };
        state.gpr[1] = 0x8000_0000;
        state.gpr[31] = 0xdead_beef;

        let dump = state.to_string();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[1], "r0  - r3  : 0x00000000 0x80000000 0x00000000 0x00000000");
        assert!(lines[8].starts_with("r28 - r31 :"));
        assert!(lines[8].ends_with("0xdeadbeef"));
        assert_eq!(lines[9], "pc, lr    : 0xfff00100 0x80001234");
    }
}
