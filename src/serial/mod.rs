//! Framed serial link to the host tool: `SOT | LEN | DATA[LEN] | EOT`.

pub mod messages;

use heapless::{Deque, Vec};

use crate::device::serial::SerialPort;
use messages::HostResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    /// All transmit buffers are in use, the message was dropped.
    RingFull,
    MessageTooLong,
    ForeignProtocol(u8),
    UnknownMessage(u8),
    Malformed,
}

/// Start of a frame.
pub const SOT: u8 = 0x01;
/// End of a frame.
pub const EOT: u8 = 0x04;
/// Number of transmit buffers.
pub const SIO_BUF_COUNT: usize = 3;
/// Size of the receive buffer, including the length byte.
pub const SIO_RX_BUF_SIZE: usize = 32;
/// Size of one transmit buffer, including `SOT`, length and `EOT`.
pub const SIO_TX_BUF_SIZE: usize = 156;

/// Complete message as stored by the receive parser: `[len, data...]`.
pub type RxMessage = Vec<u8, SIO_RX_BUF_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RxState {
    Sot,
    Length,
    Data,
    Eot,
}

/// Receive parser and transmit ring of one transceiver's host link.
pub struct SerialChannel {
    rx_state: RxState,
    rx_buf: RxMessage,
    data_remaining: u8,
    input: Vec<u8, SIO_RX_BUF_SIZE>,
    input_pos: usize,
    tx_ring: Deque<Vec<u8, SIO_TX_BUF_SIZE>, SIO_BUF_COUNT>,
    tx_cursor: usize,
}

impl Default for SerialChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialChannel {
    /// Creation.
    pub const fn new() -> Self {
        Self {
            rx_state: RxState::Sot,
            rx_buf: Vec::new(),
            data_remaining: 0,
            input: Vec::new(),
            input_pos: 0,
            tx_ring: Deque::new(),
            tx_cursor: 0,
        }
    }

    /// Unparsed input is waiting.
    pub fn has_input(&self) -> bool {
        self.input_pos < self.input.len()
    }

    /// Read a new chunk of input from `port`. Only valid once the previous chunk is consumed.
    pub fn fill_input<P: SerialPort>(&mut self, port: &mut P) -> Result<usize, P::Error> {
        self.input.clear();
        self.input_pos = 0;
        let mut chunk = [0u8; SIO_RX_BUF_SIZE];
        let n = port.rx(&mut chunk)?.min(SIO_RX_BUF_SIZE);
        // chunk never exceeds the capacity
        let _ = self.input.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Feed the next pending input byte to the parser.
    pub fn process_next_byte(&mut self) -> Option<RxMessage> {
        let byte = *self.input.get(self.input_pos)?;
        self.input_pos += 1;
        self.process_rx_byte(byte)
    }

    /// Advance the receive parser by one byte. Returns the message once its `EOT` arrives.
    pub fn process_rx_byte(&mut self, byte: u8) -> Option<RxMessage> {
        match self.rx_state {
            RxState::Sot => {
                if byte == SOT {
                    self.rx_state = RxState::Length;
                }
            }
            RxState::Length => {
                if byte == 0 || byte as usize >= SIO_RX_BUF_SIZE {
                    trace!("serial length {} rejected", byte);
                    self.rx_state = RxState::Sot;
                } else {
                    self.rx_buf.clear();
                    // length byte always fits
                    let _ = self.rx_buf.push(byte);
                    self.data_remaining = byte;
                    self.rx_state = RxState::Data;
                }
            }
            RxState::Data => {
                // bounded by the length check
                let _ = self.rx_buf.push(byte);
                self.data_remaining -= 1;
                if self.data_remaining == 0 {
                    self.rx_state = RxState::Eot;
                }
            }
            RxState::Eot => {
                self.rx_state = RxState::Sot;
                if byte == EOT {
                    return Some(self.rx_buf.clone());
                }
                trace!("serial frame without EOT dropped");
            }
        }
        None
    }

    /// Build `response` into a free transmit buffer. Fails when every buffer is taken.
    pub fn queue(&mut self, response: &HostResponse<'_>) -> Result<(), Error> {
        if self.tx_ring.is_full() {
            return Err(Error::RingFull);
        }
        let frame = response.encode()?;
        self.tx_ring.push_back(frame).map_err(|_| Error::RingFull)
    }

    /// Number of messages waiting to be written.
    pub fn pending_tx(&self) -> usize {
        self.tx_ring.len()
    }

    /// Write the oldest message to `port`, resuming after a partial write.
    pub fn drain<P: SerialPort>(&mut self, port: &mut P) -> Result<(), P::Error> {
        let Some(frame) = self.tx_ring.front() else {
            return Ok(());
        };
        let written = port.tx(&frame[self.tx_cursor..])?;
        if self.tx_cursor + written >= frame.len() {
            self.tx_ring.pop_front();
            self.tx_cursor = 0;
        } else {
            self.tx_cursor += written;
        }
        Ok(())
    }
}
