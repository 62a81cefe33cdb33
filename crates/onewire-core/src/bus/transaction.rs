//! The transaction DSL interpreter.
//!
//! Device drivers describe a wire sequence as a `Vec<TransactionStep>`;
//! the interpreter walks it against whichever [`Adapter`] the router bound
//! the request to. A typed sequence of step variants replaces what would
//! otherwise be a sentinel-terminated command array.

use super::adapter::Adapter;
use crate::crc::{crc16, crc8};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub enum TransactionStep {
    Start,
    /// Like `Start`, but a missing presence pulse fails the transaction
    /// with `CoreError::NoDevice` instead of silently proceeding.
    StartCheckPresence,
    Match(Vec<u8>),
    Read(usize),
    /// Duplex transfer: send `bytes`, receive `bytes.len()` back.
    Modify(Vec<u8>),
    Delay(u64),
    ProgramPulse,
    /// Validate a trailing CRC-8 over the last `len` bytes transferred so
    /// far (the final byte of the window is the received checksum).
    Crc8(usize),
    /// As `Crc8`, but a 16-bit checksum carried in the trailing two bytes.
    Crc16(usize),
    End,
}

/// One invocation's outcome: every `Read`/`Modify` step's received bytes,
/// in program order, so the calling device handler can pull them back out
/// by position.
pub struct TransactionOutcome {
    pub reads: Vec<Vec<u8>>,
}

impl TransactionOutcome {
    pub fn nth(&self, i: usize) -> CoreResult<&[u8]> {
        self.reads
            .get(i)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::Io("transaction produced fewer reads than expected".into()))
    }
}

/// Executes `program` against `adapter` once, with no retry.
///
/// Retrying the whole sequence on transient errors — up to 3 attempts —
/// is the caller's responsibility (`crate::bus::run_device_transaction`).
pub async fn run(adapter: &dyn Adapter, program: &[TransactionStep]) -> CoreResult<TransactionOutcome> {
    run_with_compliance_delay(adapter, program, false).await
}

/// As [`run`], but inserts the DS2404-compliance inter-byte delay
/// (`ConnectionIn::ds2404_compliance`) after every step that
/// puts bytes on the wire. The DS2404's RAM/clock page needs extra
/// recovery time between byte transfers that most other chips don't.
pub async fn run_with_compliance_delay(
    adapter: &dyn Adapter,
    program: &[TransactionStep],
    ds2404_compliance: bool,
) -> CoreResult<TransactionOutcome> {
    const DS2404_INTER_BYTE_DELAY: std::time::Duration = std::time::Duration::from_millis(2);

    let mut reads = Vec::new();
    let mut window: Vec<u8> = Vec::new();

    for step in program {
        match step {
            TransactionStep::Start => {
                adapter.reset().await?;
            }
            TransactionStep::StartCheckPresence => {
                let present = adapter.reset().await?;
                if !present {
                    return Err(CoreError::NoDevice);
                }
            }
            TransactionStep::Match(bytes) => {
                adapter.write(bytes).await?;
                window.extend_from_slice(bytes);
                if ds2404_compliance {
                    tokio::time::sleep(DS2404_INTER_BYTE_DELAY).await;
                }
            }
            TransactionStep::Read(len) => {
                let bytes = adapter.read(*len).await?;
                window.extend_from_slice(&bytes);
                reads.push(bytes);
                if ds2404_compliance {
                    tokio::time::sleep(DS2404_INTER_BYTE_DELAY).await;
                }
            }
            TransactionStep::Modify(bytes) => {
                let recv = adapter.duplex(bytes).await?;
                window.extend_from_slice(&recv);
                reads.push(recv);
                if ds2404_compliance {
                    tokio::time::sleep(DS2404_INTER_BYTE_DELAY).await;
                }
            }
            TransactionStep::Delay(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
            }
            TransactionStep::ProgramPulse => {
                if !adapter.supports_program_pulse() {
                    return Err(CoreError::NotSupported);
                }
                adapter.program_pulse().await?;
            }
            TransactionStep::Crc8(len) => {
                verify_crc8_window(&window, *len)?;
            }
            TransactionStep::Crc16(len) => {
                verify_crc16_window(&window, *len)?;
            }
            TransactionStep::End => {}
        }
    }

    Ok(TransactionOutcome { reads })
}

fn verify_crc8_window(window: &[u8], len: usize) -> CoreResult<()> {
    if len == 0 || len > window.len() {
        return Err(CoreError::Io("CRC8 window out of range".into()));
    }
    let slice = &window[window.len() - len..];
    let (data, check) = slice.split_at(slice.len() - 1);
    if crc8(data) == check[0] {
        Ok(())
    } else {
        Err(CoreError::CrcError)
    }
}

fn verify_crc16_window(window: &[u8], len: usize) -> CoreResult<()> {
    if len < 2 || len > window.len() {
        return Err(CoreError::Io("CRC16 window out of range".into()));
    }
    let slice = &window[window.len() - len..];
    let (data, check) = slice.split_at(slice.len() - 2);
    let received = u16::from_le_bytes([check[0], check[1]]);
    if crc16(data) == received {
        Ok(())
    } else {
        Err(CoreError::CrcError)
    }
}
