//! The remote-bus protocol server: accepts TCP connections and answers
//! each `onewire_proto::Request` against a shared [`Core`], so another
//! `onewire-fsd` (or any other collaborator speaking the same framing)
//! can treat this process as "just another adapter".

use onewire_core::Core;
use onewire_proto::{Errno, Opcode, Request, Response, codec};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

pub async fn serve(core: Arc<Core>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "remote-bus connection accepted");
        let core = Arc::clone(&core);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&core, stream).await {
                tracing::warn!(%peer, %err, "remote-bus connection closed");
            }
        });
    }
}

async fn handle_connection(core: &Core, mut stream: TcpStream) -> Result<(), codec::CodecError> {
    loop {
        let request: Request = match codec::receive_message(&mut stream).await {
            Ok(request) => request,
            Err(codec::CodecError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = handle_request(core, request).await;
        codec::send_message(&mut stream, &response).await?;
    }
}

/// Translates one wire request into a [`Core`] call and back. Split out
/// from [`handle_connection`] so it can be exercised without a socket.
pub async fn handle_request(core: &Core, request: Request) -> Response {
    match request.opcode {
        Opcode::Read => match core.read(&request.path, request.size, request.offset).await {
            Ok(bytes) => Response::ok(bytes),
            Err(e) => Response::err(e.errno()),
        },
        Opcode::Write => match core.write(&request.path, &request.payload, request.offset).await {
            Ok(n) => Response {
                status: Errno::Success,
                size: n,
                payload: Vec::new(),
            },
            Err(e) => Response::err(e.errno()),
        },
        Opcode::Dir => match core.dir(&request.path).await {
            Ok(entries) => Response::ok(entries.join(",").into_bytes()),
            Err(e) => Response::err(e.errno()),
        },
        // DIRALL is the same listing as DIR: owserver's distinction is
        // single-message vs. one-message-per-entry framing, which this
        // protocol doesn't have, so both opcodes answer identically.
        Opcode::DirAll => match core.dir(&request.path).await {
            Ok(entries) => Response::ok(entries.join(",").into_bytes()),
            Err(e) => Response::err(e.errno()),
        },
        Opcode::Present => match core.presence(&request.path).await {
            Ok(true) => Response::ok(Vec::new()),
            Ok(false) => Response::err(Errno::NoDev),
            Err(e) => Response::err(e.errno()),
        },
        // GET combines DIR and READ the way owserver's client library
        // does: a directory path lists its children, a property path
        // reads its value.
        Opcode::Get => match core.dir(&request.path).await {
            Ok(entries) => Response::ok(entries.join(",").into_bytes()),
            Err(_) => match core.read(&request.path, request.size, request.offset).await {
                Ok(bytes) => Response::ok(bytes),
                Err(e) => Response::err(e.errno()),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onewire_core::bus::adapter::simulated::SimDs2890;
    use onewire_core::bus::{AdapterKind, Chain, ConnectionIn, SimulatedAdapter};
    use onewire_core::path::RomId;
    use onewire_core::CoreConfig;
    use std::sync::Arc as StdArc;

    fn core_with_ds2890(rom: RomId) -> Core {
        let adapter = StdArc::new(SimulatedAdapter::new(vec![SimDs2890::new(rom, 0, false)]));
        let connection = StdArc::new(ConnectionIn::local(0, AdapterKind::Simulated, "sim0", adapter));
        Core::new(Chain::new(vec![connection]), CoreConfig::default())
    }

    #[tokio::test]
    async fn write_then_read_round_trips_over_the_request_handler() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_ds2890(rom);
        let path = format!("/{}/wiper", rom.to_canonical_string());

        let write_response = handle_request(
            &core,
            Request {
                opcode: Opcode::Write,
                path: path.clone(),
                size: 3,
                offset: 0,
                payload: b"128".to_vec(),
            },
        )
        .await;
        assert_eq!(write_response.status, Errno::Success);
        assert_eq!(write_response.size, 3);

        let read_response = handle_request(
            &core,
            Request {
                opcode: Opcode::Read,
                path,
                size: 16,
                offset: 0,
                payload: Vec::new(),
            },
        )
        .await;
        assert_eq!(read_response.status, Errno::Success);
        assert_eq!(read_response.payload, b"128");
    }

    #[tokio::test]
    async fn present_reports_no_dev_for_an_unknown_rom() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_ds2890(rom);
        let other = RomId([0x28, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let response = handle_request(
            &core,
            Request {
                opcode: Opcode::Present,
                path: format!("/{}", other.to_canonical_string()),
                size: 0,
                offset: 0,
                payload: Vec::new(),
            },
        )
        .await;
        assert_eq!(response.status, Errno::NoDev);
    }

    #[tokio::test]
    async fn dir_lists_the_device_filetypes() {
        let rom = RomId([0x2C, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let core = core_with_ds2890(rom);

        let response = handle_request(
            &core,
            Request {
                opcode: Opcode::Dir,
                path: format!("/{}", rom.to_canonical_string()),
                size: 0,
                offset: 0,
                payload: Vec::new(),
            },
        )
        .await;
        assert_eq!(response.status, Errno::Success);
        let listing = String::from_utf8(response.payload).unwrap();
        assert!(listing.split(',').any(|name| name == "wiper"));
    }
}
