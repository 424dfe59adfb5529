//! IEEE 802.15.4 data frames carrying the analyzer's application payload.

pub mod app;

use crate::device::radio_buffer::{self, RadioBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    TooShort,
    UnsupportedFrame,
    UnknownCommand(u8),
    LengthMismatch,
    BufferFull,
    InvalidText,
}
impl From<radio_buffer::Error> for Error {
    fn from(_: radio_buffer::Error) -> Self {
        Error::BufferFull
    }
}

const FCF_FRAMETYPE_DATA: u16 = 0x0001;
const FCF_FRAMETYPE_MASK: u16 = 0x0007;
const FCF_ACK_REQUEST: u16 = 1 << 5;
const FCF_PAN_ID_COMPRESSION: u16 = 1 << 6;
const FCF_DEST_ADDR_SHIFT: u16 = 10;
const FCF_SOURCE_ADDR_SHIFT: u16 = 14;
const FCF_ADDR_MODE_SHORT: u16 = 0x02;
const FCF_ADDR_MODE_LONG: u16 = 0x03;

/// Frame control, sequence number and PAN id.
const FIXED_HEADER_LEN: usize = 5;
/// Header length of a short/short frame.
pub const FRAME_OVERHEAD: usize = FIXED_HEADER_LEN + 2 + 2;
/// Header length when one of the two addresses is extended.
pub const FRAME_OVERHEAD_IEEE_ADDR: usize = FIXED_HEADER_LEN + 2 + 8;
/// Offset of the sequence number in the MPDU.
pub const SEQ_NUM_POS: usize = 2;
/// Largest legacy PSDU.
pub const MAX_PSDU_LEGACY: usize = 127;
/// Largest SUN PSDU.
pub const MAX_PSDU: usize = 2047;
/// Broadcast short address.
pub const BROADCAST_ADDR: u16 = 0xFFFF;

/// Source or destination address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Address {
    Short(u16),
    Extended(u64),
}

impl Address {
    fn mode(&self) -> u16 {
        match self {
            Address::Short(_) => FCF_ADDR_MODE_SHORT,
            Address::Extended(_) => FCF_ADDR_MODE_LONG,
        }
    }

    /// Encoded length.
    pub fn len(&self) -> usize {
        match self {
            Address::Short(_) => 2,
            Address::Extended(_) => 8,
        }
    }

    fn encode<const N: usize>(&self, buf: &mut RadioBuffer<N>) -> Result<(), Error> {
        match *self {
            Address::Short(addr) => buf.push_u16(addr)?,
            Address::Extended(addr) => buf.push_u64(addr)?,
        }
        Ok(())
    }

    fn decode(mode: u16, bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        match mode {
            FCF_ADDR_MODE_SHORT => {
                let (addr, rest) = split::<2>(bytes)?;
                Ok((Address::Short(u16::from_le_bytes(addr)), rest))
            }
            FCF_ADDR_MODE_LONG => {
                let (addr, rest) = split::<8>(bytes)?;
                Ok((Address::Extended(u64::from_le_bytes(addr)), rest))
            }
            _ => Err(Error::UnsupportedFrame),
        }
    }
}

/// MAC header of an intra-PAN data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    /// Ask the receiver for an acknowledgment.
    pub ack_request: bool,
    /// Data sequence number.
    pub seq: u8,
    /// Destination PAN, the source PAN is compressed.
    pub pan_id: u16,
    #[allow(missing_docs)]
    pub dst: Address,
    #[allow(missing_docs)]
    pub src: Address,
}

impl Header {
    /// Encoded length.
    pub fn len(&self) -> usize {
        FIXED_HEADER_LEN + self.dst.len() + self.src.len()
    }

    fn frame_control(&self) -> u16 {
        let mut fcf = FCF_FRAMETYPE_DATA | FCF_PAN_ID_COMPRESSION;
        if self.ack_request {
            fcf |= FCF_ACK_REQUEST;
        }
        fcf | (self.dst.mode() << FCF_DEST_ADDR_SHIFT) | (self.src.mode() << FCF_SOURCE_ADDR_SHIFT)
    }

    /// Append the header to `buf`.
    pub fn encode<const N: usize>(&self, buf: &mut RadioBuffer<N>) -> Result<(), Error> {
        buf.push_u16(self.frame_control())?;
        buf.push(self.seq)?;
        buf.push_u16(self.pan_id)?;
        self.dst.encode(buf)?;
        self.src.encode(buf)
    }

    /// Split an MPDU into its header and payload.
    pub fn decode(mpdu: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (fcf, rest) = split::<2>(mpdu)?;
        let fcf = u16::from_le_bytes(fcf);
        if fcf & FCF_FRAMETYPE_MASK != FCF_FRAMETYPE_DATA || fcf & FCF_PAN_ID_COMPRESSION == 0 {
            return Err(Error::UnsupportedFrame);
        }
        let ([seq], rest) = split::<1>(rest)?;
        let (pan_id, rest) = split::<2>(rest)?;
        let (dst, rest) = Address::decode((fcf >> FCF_DEST_ADDR_SHIFT) & 0x03, rest)?;
        let (src, rest) = Address::decode((fcf >> FCF_SOURCE_ADDR_SHIFT) & 0x03, rest)?;
        let header = Header {
            ack_request: fcf & FCF_ACK_REQUEST != 0,
            seq,
            pan_id: u16::from_le_bytes(pan_id),
            dst,
            src,
        };
        Ok((header, rest))
    }
}

fn split_ref<const L: usize>(bytes: &[u8]) -> Result<(&[u8; L], &[u8]), Error> {
    if bytes.len() < L {
        return Err(Error::TooShort);
    }
    let (head, rest) = bytes.split_at(L);
    head.try_into().map(|head| (head, rest)).map_err(|_| Error::TooShort)
}

/// Take a fixed size prefix off `bytes`.
pub(crate) fn split<const L: usize>(bytes: &[u8]) -> Result<([u8; L], &[u8]), Error> {
    split_ref::<L>(bytes).map(|(head, rest)| (*head, rest))
}

/// Byte-swap a float. The host tool expects floats in the opposite byte order.
pub fn reverse_float(value: f32) -> f32 {
    f32::from_bits(value.to_bits().swap_bytes())
}
