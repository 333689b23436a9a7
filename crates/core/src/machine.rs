// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dispatch::RegionDispatcher;
use crate::engine::{CpuState, EngineError, ExecutionEngine, SharedHandler};
use crate::transport::Transport;
use crate::{BridgeError, FaultKind};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

const PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Running,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    MaxStepsReached,
    TransportFault(String),
    ConfigurationFault(String),
    EngineError(String),
}

impl StopReason {
    pub fn is_halt(&self) -> bool {
        !matches!(self, StopReason::MaxStepsReached)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    /// Instructions completed by this call to `run`.
    pub steps: u64,
    pub total_steps: u64,
    pub final_pc: u32,
    pub cpu: CpuState,
}

/// The driving loop: steps the engine one instruction at a time and halts
/// on the first fault reported by the dispatcher or the engine.
pub struct Bridge<E: ExecutionEngine, T: Transport + 'static> {
    engine: E,
    dispatcher: Rc<RefCell<RegionDispatcher<T>>>,
    pc: u32,
    total_steps: u64,
    halted: Option<StopReason>,
    last_fault: Option<BridgeError>,
}

impl<E: ExecutionEngine, T: Transport + 'static> Bridge<E, T> {
    pub fn new(engine: E, dispatcher: RegionDispatcher<T>, entry_pc: u32) -> Self {
        Self {
            engine,
            dispatcher: Rc::new(RefCell::new(dispatcher)),
            pc: entry_pc,
            total_steps: 0,
            halted: None,
            last_fault: None,
        }
    }

    /// Map every window into the engine, routed to the dispatcher.
    pub fn setup(&mut self) -> Result<(), EngineError> {
        let windows = self.dispatcher.borrow().windows().windows().to_vec();
        for window in &windows {
            tracing::info!("Mapping {}", window);
            let handler: SharedHandler = self.dispatcher.clone();
            self.engine.map_window(window, handler)?;
        }
        Ok(())
    }

    pub fn state(&self) -> BridgeState {
        if self.halted.is_some() {
            BridgeState::Halted
        } else {
            BridgeState::Running
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn dispatcher(&self) -> Ref<'_, RegionDispatcher<T>> {
        self.dispatcher.borrow()
    }

    pub fn dispatcher_mut(&self) -> RefMut<'_, RegionDispatcher<T>> {
        self.dispatcher.borrow_mut()
    }

    /// The bridge fault that halted the loop, if any.
    pub fn last_fault(&self) -> Option<&BridgeError> {
        self.last_fault.as_ref()
    }

    fn halt(&mut self, reason: StopReason) -> StopReason {
        tracing::error!("Halting at pc={:#010x} after {} steps: {:?}", self.pc, self.total_steps, reason);
        self.halted = Some(reason.clone());
        reason
    }

    /// One `RUNNING -> step -> check` transition. `HALTED` is terminal.
    pub fn step(&mut self) -> Result<(), StopReason> {
        if let Some(reason) = &self.halted {
            return Err(reason.clone());
        }

        let result = self.engine.step(self.pc);

        // A faulted access fed the engine a placeholder value, so its result is discarded.
        let fault = self.dispatcher.borrow_mut().take_fault();
        if let Some(fault) = fault {
            let reason = match fault.kind() {
                FaultKind::Transport => StopReason::TransportFault(fault.to_string()),
                FaultKind::Configuration => StopReason::ConfigurationFault(fault.to_string()),
            };
            self.last_fault = Some(fault);
            return Err(self.halt(reason));
        }

        match result {
            Ok(next_pc) => {
                self.pc = next_pc;
                self.total_steps += 1;
                tracing::trace!("Emulating @ {:#010x}", next_pc);
            }
            Err(e) => return Err(self.halt(StopReason::EngineError(e.to_string()))),
        }

        for irq in self.engine.take_interrupts() {
            tracing::info!("Interrupt {} fired!\n{}", irq, self.engine.cpu_state());
        }
        Ok(())
    }

    pub fn run(&mut self, max_steps: Option<u64>) -> RunOutcome {
        let start = self.total_steps;
        let stop_reason = loop {
            let done = self.total_steps - start;
            if max_steps.is_some_and(|max| done >= max) {
                break StopReason::MaxStepsReached;
            }
            if let Err(reason) = self.step() {
                break reason;
            }
            if self.total_steps % PROGRESS_INTERVAL == 0 {
                tracing::info!("Progress: {} steps, pc={:#010x}", self.total_steps, self.pc);
            }
        };

        RunOutcome {
            stop_reason,
            steps: self.total_steps - start,
            total_steps: self.total_steps,
            final_pc: self.pc,
            cpu: self.engine.cpu_state(),
        }
    }
}
