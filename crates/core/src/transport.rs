// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Transport client for the Ironic PPC socket.
//!
//! One call is one blocking exchange: the full request goes out, then exactly
//! the expected number of response bytes are read back. Nothing is buffered,
//! retried or reordered. The first fault poisons the client for good, since
//! the protocol has no way to find the next message boundary again.
//!
//! Values crossing this layer are in wire order: a returned `u32` is the four
//! payload bytes read verbatim into memory, and a written value is sent as its
//! in-memory bytes. Byte order conversion belongs to the dispatcher.

use crate::protocol::{self, AccessWidth, Opcode, ACK, ACK_LEN};
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to Ironic at {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to send {opcode:?} request for {addr:#010x}: {source}")]
    Send {
        opcode: Opcode,
        addr: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to receive {expected}-byte response to {opcode:?} for {addr:#010x}: {source}")]
    Receive {
        opcode: Opcode,
        addr: u32,
        expected: usize,
        #[source]
        source: io::Error,
    },
    #[error("{opcode:?} for {addr:#010x} acknowledged with {got:02x?} instead of \"OK\"")]
    BadAck { opcode: Opcode, addr: u32, got: [u8; 2] },
    #[error("connection unusable after earlier fault: {0}")]
    Poisoned(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// The six exchanges the bridge performs against the remote hardware model.
pub trait Transport {
    fn read8(&mut self, addr: u32) -> TransportResult<u8>;
    fn read16(&mut self, addr: u32) -> TransportResult<u16>;
    fn read32(&mut self, addr: u32) -> TransportResult<u32>;
    fn write8(&mut self, addr: u32, value: u8) -> TransportResult<()>;
    fn write16(&mut self, addr: u32, value: u16) -> TransportResult<()>;
    fn write32(&mut self, addr: u32, value: u32) -> TransportResult<()>;
}

pub struct IronicClient<S: Read + Write = UnixStream> {
    stream: S,
    poisoned: Option<String>,
    exchanges: u64,
}

impl IronicClient<UnixStream> {
    /// Connect to the remote process. Failing here must keep emulation from starting.
    pub fn connect<P: AsRef<Path>>(path: P) -> TransportResult<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Connected to Ironic at {:?}", path);
        Ok(Self::new(stream))
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

impl<S: Read + Write> IronicClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            poisoned: None,
            exchanges: 0,
        }
    }

    /// Description of the first fault, once the client is unusable.
    pub fn fault(&self) -> Option<&str> {
        self.poisoned.as_deref()
    }

    pub fn is_faulted(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Number of exchanges completed successfully.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn fail<T>(&mut self, err: TransportError) -> TransportResult<T> {
        if self.poisoned.is_none() {
            tracing::error!("Ironic transport fault: {}", err);
            self.poisoned = Some(err.to_string());
        }
        Err(err)
    }

    fn exchange<const N: usize>(
        &mut self,
        opcode: Opcode,
        addr: u32,
        request: &[u8],
    ) -> TransportResult<[u8; N]> {
        if let Some(reason) = &self.poisoned {
            return Err(TransportError::Poisoned(reason.clone()));
        }

        if let Err(source) = self.stream.write_all(request) {
            return self.fail(TransportError::Send {
                opcode,
                addr,
                source,
            });
        }

        let mut response = [0u8; N];
        if let Err(source) = self.stream.read_exact(&mut response) {
            return self.fail(TransportError::Receive {
                opcode,
                addr,
                expected: N,
                source,
            });
        }

        tracing::trace!(
            "{:?} {:#010x}: sent {:02x?}, got {:02x?}",
            opcode,
            addr,
            request,
            response
        );
        self.exchanges += 1;
        Ok(response)
    }

    fn read_value<const N: usize>(&mut self, width: AccessWidth, addr: u32) -> TransportResult<[u8; N]> {
        let request = protocol::encode_read(width, addr);
        self.exchange::<N>(width.read_opcode(), addr, &request)
    }

    fn write_value(&mut self, width: AccessWidth, addr: u32, payload: &[u8]) -> TransportResult<()> {
        let opcode = width.write_opcode();
        let request = protocol::encode_write(width, addr, payload);
        let got = self.exchange::<ACK_LEN>(opcode, addr, request.as_bytes())?;
        if got != ACK {
            return self.fail(TransportError::BadAck { opcode, addr, got });
        }
        Ok(())
    }
}

impl<S: Read + Write> Transport for IronicClient<S> {
    fn read8(&mut self, addr: u32) -> TransportResult<u8> {
        let [b] = self.read_value::<1>(AccessWidth::Byte, addr)?;
        Ok(b)
    }

    fn read16(&mut self, addr: u32) -> TransportResult<u16> {
        self.read_value::<2>(AccessWidth::Half, addr)
            .map(u16::from_ne_bytes)
    }

    fn read32(&mut self, addr: u32) -> TransportResult<u32> {
        self.read_value::<4>(AccessWidth::Word, addr)
            .map(u32::from_ne_bytes)
    }

    fn write8(&mut self, addr: u32, value: u8) -> TransportResult<()> {
        self.write_value(AccessWidth::Byte, addr, &[value])
    }

    fn write16(&mut self, addr: u32, value: u16) -> TransportResult<()> {
        self.write_value(AccessWidth::Half, addr, &value.to_ne_bytes())
    }

    fn write32(&mut self, addr: u32, value: u32) -> TransportResult<()> {
        self.write_value(AccessWidth::Word, addr, &value.to_ne_bytes())
    }
}
