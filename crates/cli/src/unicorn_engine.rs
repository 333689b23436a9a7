// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Unicorn PowerPC 750CL engine.

use ironic_bridge_core::engine::{
    invalid_instruction_action, CpuState, EngineError, ExecutionEngine, InvalidInstructionAction,
    SharedHandler,
};
use ironic_bridge_core::AddressWindow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use unicorn_engine::unicorn_const::{uc_error, Arch, Mode};
use unicorn_engine::{PpcCpuModel, RegisterPPC, Unicorn};

const GPRS: [RegisterPPC; 32] = [
    RegisterPPC::R0,
    RegisterPPC::R1,
    RegisterPPC::R2,
    RegisterPPC::R3,
    RegisterPPC::R4,
    RegisterPPC::R5,
    RegisterPPC::R6,
    RegisterPPC::R7,
    RegisterPPC::R8,
    RegisterPPC::R9,
    RegisterPPC::R10,
    RegisterPPC::R11,
    RegisterPPC::R12,
    RegisterPPC::R13,
    RegisterPPC::R14,
    RegisterPPC::R15,
    RegisterPPC::R16,
    RegisterPPC::R17,
    RegisterPPC::R18,
    RegisterPPC::R19,
    RegisterPPC::R20,
    RegisterPPC::R21,
    RegisterPPC::R22,
    RegisterPPC::R23,
    RegisterPPC::R24,
    RegisterPPC::R25,
    RegisterPPC::R26,
    RegisterPPC::R27,
    RegisterPPC::R28,
    RegisterPPC::R29,
    RegisterPPC::R30,
    RegisterPPC::R31,
];

pub struct UnicornEngine {
    uc: Unicorn<'static, ()>,
    interrupts: Rc<RefCell<Vec<u32>>>,
    last_invalid: Rc<Cell<Option<u32>>>,
}

fn uc_fault(pc: u32, err: uc_error) -> EngineError {
    EngineError::Fault {
        pc,
        reason: format!("{:?}", err),
    }
}

impl UnicornEngine {
    pub fn new() -> Result<Self, EngineError> {
        let mut uc = Unicorn::new(Arch::PPC, Mode::PPC32 | Mode::BIG_ENDIAN)
            .map_err(|e| uc_fault(0, e))?;
        uc.ctl_set_cpu_model(PpcCpuModel::UC_CPU_PPC32_750CL_V2_0 as i32)
            .map_err(|e| uc_fault(0, e))?;

        let interrupts = Rc::new(RefCell::new(Vec::new()));
        let last_invalid = Rc::new(Cell::new(None));

        let irqs = interrupts.clone();
        uc.add_intr_hook(move |_, intno| irqs.borrow_mut().push(intno))
            .map_err(|e| uc_fault(0, e))?;

        let invalid = last_invalid.clone();
        uc.add_insn_invalid_hook(move |uc| {
            let Ok(pc) = uc.reg_read(RegisterPPC::PC) else {
                return false;
            };
            let mut raw = [0u8; 4];
            if uc.mem_read(pc, &mut raw).is_err() {
                return false;
            }
            let inst = u32::from_be_bytes(raw);
            invalid.set(Some(inst));
            match invalid_instruction_action(inst) {
                InvalidInstructionAction::Skip => {
                    tracing::warn!("Skipping psq_l {:#010x} at {:#010x}", inst, pc);
                    uc.reg_write(RegisterPPC::PC, pc + 4).is_ok()
                }
                InvalidInstructionAction::Fault => false,
            }
        })
        .map_err(|e| uc_fault(0, e))?;

        Ok(Self {
            uc,
            interrupts,
            last_invalid,
        })
    }

    fn reg(&self, reg: RegisterPPC) -> u32 {
        self.uc.reg_read(reg).unwrap_or(0) as u32
    }
}

impl ExecutionEngine for UnicornEngine {
    fn map_window(&mut self, window: &AddressWindow, handler: SharedHandler) -> Result<(), EngineError> {
        let base = window.cpu_base() as u64;
        let reader = handler.clone();
        let writer = handler;
        self.uc
            .mmio_map(
                base,
                window.size as usize,
                Some(move |_: &mut Unicorn<'_, ()>, offset: u64, size: usize| {
                    reader.borrow_mut().mmio_read(base + offset, size)
                }),
                Some(move |_: &mut Unicorn<'_, ()>, offset: u64, size: usize, value: u64| {
                    writer.borrow_mut().mmio_write(base + offset, size, value)
                }),
            )
            .map_err(|e| EngineError::Map {
                name: window.name.clone(),
                reason: format!("{:?}", e),
            })
    }

    fn step(&mut self, pc: u32) -> Result<u32, EngineError> {
        self.last_invalid.set(None);
        match self.uc.emu_start(pc as u64, u32::MAX as u64, 0, 1) {
            Ok(()) => Ok(self.reg(RegisterPPC::PC)),
            Err(uc_error::INSN_INVALID) => Err(EngineError::InvalidInstruction {
                pc,
                inst: self.last_invalid.get().unwrap_or(0),
            }),
            Err(e) => Err(uc_fault(pc, e)),
        }
    }

    fn cpu_state(&self) -> CpuState {
        let mut gpr = [0u32; 32];
        for (slot, reg) in gpr.iter_mut().zip(GPRS) {
            *slot = self.reg(reg);
        }
        CpuState {
            gpr,
            pc: self.reg(RegisterPPC::PC),
            lr: self.reg(RegisterPPC::LR),
        }
    }

    fn take_interrupts(&mut self) -> Vec<u32> {
        std::mem::take(&mut *self.interrupts.borrow_mut())
    }
}
