//! The network-proxied adapter: just another adapter type, except its
//! transaction interpreter issues RPCs instead of wire pulses. A remote
//! bus runs its own complete core, so rather than shipping individual
//! `TransactionStep`s over the wire, the dispatcher forwards the whole
//! `read`/`write`/`dir`/`presence` call as one RPC.

use crate::error::{CoreError, CoreResult};
use onewire_proto::{Errno, Opcode, Request, Response, codec};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

pub struct RemoteAdapter {
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
}

impl RemoteAdapter {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: Mutex::new(None),
        }
    }

    async fn ensure_connected<'a>(&self, guard: &mut Option<TcpStream>) -> CoreResult<()> {
        if guard.is_none() {
            let stream = TcpStream::connect(self.addr)
                .await
                .map_err(|e| CoreError::Io(e.to_string()))?;
            *guard = Some(stream);
        }
        Ok(())
    }

    pub async fn call(&self, request: Request) -> CoreResult<Response> {
        let mut guard = self.stream.lock().await;
        self.ensure_connected(&mut guard).await?;
        let stream = guard.as_mut().expect("connected above");

        if codec::send_message(stream, &request).await.is_err() {
            // One reconnect-and-retry: the peer may have dropped an idle
            // connection between requests.
            *guard = None;
            self.ensure_connected(&mut guard).await?;
            let stream = guard.as_mut().expect("connected above");
            codec::send_message(stream, &request)
                .await
                .map_err(|e| CoreError::Io(e.to_string()))?;
        }

        let stream = guard.as_mut().expect("connected above");
        codec::receive_message(stream)
            .await
            .map_err(|e| CoreError::Io(e.to_string()))
    }

    pub async fn read(&self, path: &str, size: u32, offset: u32) -> CoreResult<Vec<u8>> {
        let response = self
            .call(Request {
                opcode: Opcode::Read,
                path: path.to_string(),
                size,
                offset,
                payload: Vec::new(),
            })
            .await?;
        to_result(response)
    }

    pub async fn write(&self, path: &str, data: &[u8], offset: u32) -> CoreResult<u32> {
        let response = self
            .call(Request {
                opcode: Opcode::Write,
                path: path.to_string(),
                size: data.len() as u32,
                offset,
                payload: data.to_vec(),
            })
            .await?;
        if response.status == Errno::Success {
            Ok(response.size)
        } else {
            Err(errno_to_core_error(response.status))
        }
    }

    pub async fn presence(&self, path: &str) -> CoreResult<bool> {
        let response = self
            .call(Request {
                opcode: Opcode::Present,
                path: path.to_string(),
                size: 0,
                offset: 0,
                payload: Vec::new(),
            })
            .await?;
        Ok(response.status == Errno::Success)
    }
}

fn to_result(response: Response) -> CoreResult<Vec<u8>> {
    if response.status == Errno::Success {
        Ok(response.payload)
    } else {
        Err(errno_to_core_error(response.status))
    }
}

fn errno_to_core_error(errno: Errno) -> CoreError {
    match errno {
        Errno::Success => CoreError::Io("unexpected success status".into()),
        Errno::NoEnt => CoreError::NotFound(String::new()),
        Errno::IsDir => CoreError::IsDirectory,
        Errno::NotDir => CoreError::NotFound(String::new()),
        Errno::NotSup => CoreError::NotSupported,
        Errno::RoFs => CoreError::ReadOnly,
        Errno::Inval => CoreError::BadFormat(String::new()),
        Errno::AddrNotAvail => CoreError::NoDevice,
        Errno::Range => CoreError::OutOfRange,
        Errno::NoMem => CoreError::NoMemory,
        Errno::NoDev => CoreError::NoDevice,
        Errno::ConnAborted => CoreError::BusBusy,
        Errno::TimedOut => CoreError::TimedOut,
        Errno::Io => CoreError::Io("remote I/O error".into()),
    }
}
