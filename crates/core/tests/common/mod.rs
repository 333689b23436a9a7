// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![allow(dead_code)]

use ironic_bridge_core::engine::{
    invalid_instruction_action, CpuState, EngineError, ExecutionEngine, InvalidInstructionAction,
    SharedHandler,
};
use ironic_bridge_core::protocol::{RequestHeader, ACK, HEADER_LEN};
use ironic_bridge_core::AddressWindow;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::thread::JoinHandle;

/// How the stub answers the next request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Serve reads from memory, store writes and acknowledge with "OK".
    Normal,
    /// Store the write but answer with these two bytes.
    Ack([u8; 2]),
    /// Send only the first `n` bytes of the normal answer, then hang up.
    Short(usize),
    /// Hang up without answering.
    Close,
}

#[derive(Debug, Default)]
pub struct StubReport {
    /// Every request, exactly as framed on the wire.
    pub requests: Vec<Vec<u8>>,
    /// Set if bytes of a following request arrived before the reply was sent.
    pub interleaved: bool,
    /// Final contents of the stub memory.
    pub memory: HashMap<u32, u8>,
}

impl StubReport {
    pub fn header(&self, i: usize) -> RequestHeader {
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.requests[i][..HEADER_LEN]);
        RequestHeader::parse(&header)
    }
}

pub struct StubRemote(JoinHandle<StubReport>);

impl StubRemote {
    /// Start a remote that stores the last value written to each byte.
    /// Returns the client end of the connection.
    pub fn spawn(memory: &[(u32, &[u8])], script: Vec<Reply>) -> (UnixStream, StubRemote) {
        let (client, server) = UnixStream::pair().expect("socket pair");
        let mut mem = HashMap::new();
        for (addr, bytes) in memory {
            for (i, b) in bytes.iter().enumerate() {
                mem.insert(addr + i as u32, *b);
            }
        }
        let handle = std::thread::spawn(move || serve(server, mem, script));
        (client, StubRemote(handle))
    }

    /// Wait for the client to hang up and collect what the stub saw.
    pub fn finish(self) -> StubReport {
        self.0.join().expect("stub remote panicked")
    }
}

fn serve(mut sock: UnixStream, mut memory: HashMap<u32, u8>, script: Vec<Reply>) -> StubReport {
    let mut report = StubReport::default();
    let mut script = script.into_iter();

    loop {
        let mut header = [0u8; HEADER_LEN];
        if sock.read_exact(&mut header).is_err() {
            break;
        }
        let parsed = RequestHeader::parse(&header);
        let mut payload = vec![0u8; parsed.payload_len()];
        sock.read_exact(&mut payload).expect("request payload");

        let mut request = header.to_vec();
        request.extend_from_slice(&payload);
        report.requests.push(request);

        // Nothing of the next request may be on the wire before this one is answered.
        sock.set_nonblocking(true).expect("nonblocking");
        let mut probe = [0u8; 1];
        match sock.read(&mut probe) {
            Ok(n) if n > 0 => report.interleaved = true,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => panic!("probe failed: {e}"),
        }
        sock.set_nonblocking(false).expect("blocking");

        let opcode = parsed.opcode.expect("known opcode");
        let width = opcode.width().expect("bridge opcode").bytes();
        let normal = if opcode.is_write() {
            for (i, b) in payload.iter().enumerate() {
                memory.insert(parsed.addr + i as u32, *b);
            }
            ACK.to_vec()
        } else {
            (0..width)
                .map(|i| memory.get(&(parsed.addr + i as u32)).copied().unwrap_or(0))
                .collect()
        };

        match script.next().unwrap_or(Reply::Normal) {
            Reply::Normal => sock.write_all(&normal).expect("reply"),
            Reply::Ack(bytes) => {
                assert!(opcode.is_write(), "Ack reply scripted for {:?}", opcode);
                sock.write_all(&bytes).expect("reply");
            }
            Reply::Short(n) => {
                sock.write_all(&normal[..n]).expect("reply");
                break;
            }
            Reply::Close => break,
        }
    }

    let _ = sock.shutdown(Shutdown::Both);
    report.memory = memory;
    report
}

/// One scripted memory access performed during an instruction.
#[derive(Debug, Clone, Copy)]
pub enum Access {
    Read(u64, usize),
    Write(u64, usize, u64),
}

#[derive(Debug, Clone)]
pub enum Instr {
    /// An instruction performing these accesses.
    Exec(Vec<Access>),
    /// An instruction raising an interrupt.
    Interrupt(u32),
    /// An instruction the engine cannot decode.
    Invalid(u32),
}

/// Stand-in for the CPU engine: instruction `n` lives at `entry + 4n`.
pub struct ScriptedEngine {
    entry: u32,
    program: Vec<Instr>,
    maps: Vec<(AddressWindow, SharedHandler)>,
    pending_irqs: Vec<u32>,
    pub reads: Vec<u64>,
    pub pc: u32,
}

impl ScriptedEngine {
    pub fn new(entry: u32, program: Vec<Instr>) -> Self {
        Self {
            entry,
            program,
            maps: Vec::new(),
            pending_irqs: Vec::new(),
            reads: Vec::new(),
            pc: entry,
        }
    }

    pub fn mapped(&self) -> Vec<String> {
        self.maps.iter().map(|(w, _)| w.name.clone()).collect()
    }

    fn handler_for(&self, addr: u64) -> Result<SharedHandler, EngineError> {
        self.maps
            .iter()
            .find(|(w, _)| w.contains(addr))
            .map(|(_, h)| h.clone())
            .ok_or_else(|| EngineError::Fault {
                pc: self.pc,
                reason: format!("unmapped access at {addr:#x}"),
            })
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn map_window(&mut self, window: &AddressWindow, handler: SharedHandler) -> Result<(), EngineError> {
        self.maps.push((window.clone(), handler));
        Ok(())
    }

    fn step(&mut self, pc: u32) -> Result<u32, EngineError> {
        self.pc = pc;
        let index = (pc.wrapping_sub(self.entry) / 4) as usize;
        let instr = self.program.get(index).cloned().ok_or(EngineError::Fault {
            pc,
            reason: "fell off the end of the program".to_string(),
        })?;

        match instr {
            Instr::Exec(accesses) => {
                for access in accesses {
                    match access {
                        Access::Read(addr, size) => {
                            let handler = self.handler_for(addr)?;
                            let value = handler.borrow_mut().mmio_read(addr, size);
                            self.reads.push(value);
                        }
                        Access::Write(addr, size, value) => {
                            let handler = self.handler_for(addr)?;
                            handler.borrow_mut().mmio_write(addr, size, value);
                        }
                    }
                }
            }
            Instr::Interrupt(irq) => self.pending_irqs.push(irq),
            Instr::Invalid(inst) => {
                if invalid_instruction_action(inst) == InvalidInstructionAction::Fault {
                    return Err(EngineError::InvalidInstruction { pc, inst });
                }
            }
        }

        self.pc = pc.wrapping_add(4);
        Ok(self.pc)
    }

    fn cpu_state(&self) -> CpuState {
        CpuState {
            pc: self.pc,
            ..Default::default()
        }
    }

    fn take_interrupts(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_irqs)
    }
}
