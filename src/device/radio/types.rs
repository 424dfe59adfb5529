//! Values exchanged with the transceiver driver.

/// One of the two independent radio front ends.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverId {
    /// Sub-GHz front end.
    Rf09 = 0,
    /// 2.4 GHz front end.
    Rf24 = 1,
}

impl TransceiverId {
    /// Both front ends in dispatch order.
    pub const ALL: [TransceiverId; 2] = [TransceiverId::Rf09, TransceiverId::Rf24];

    /// Array index of the front end.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The other front end.
    pub fn other(self) -> Self {
        match self {
            TransceiverId::Rf09 => TransceiverId::Rf24,
            TransceiverId::Rf24 => TransceiverId::Rf09,
        }
    }
}

/// Outcome of a frame transmission as reported by the driver.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Sent, and acknowledged if an ack was requested.
    Success,
    /// No acknowledgment after all retries.
    NoAck,
    /// CSMA-CA gave up on a busy channel.
    ChannelAccessFailure,
    /// Any other failure.
    Failure,
}

impl TxStatus {
    /// Whether the frame made it.
    pub fn is_success(self) -> bool {
        self == TxStatus::Success
    }
}

/// Channel access used for a transmission.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmaMode {
    /// Transmit straight away.
    NoCsma,
    /// Unslotted CSMA-CA.
    Unslotted,
}

/// A received frame handed over by the driver.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    /// MAC header and payload, without the FCS.
    pub mpdu: &'a [u8],
    /// Link quality indicator.
    pub lqi: u8,
    /// Energy level in dBm.
    pub ed: i8,
    /// Whether the FCS matched. Frames with a bad FCS are only delivered in promiscuous mode.
    pub crc_ok: bool,
}

/// Transceiver power state as understood by the host tool.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrxState {
    /// Receiver listening.
    RxOn = 0x06,
    /// Reset the transceiver, ends in `TrxOff`.
    Reset = 0x07,
    /// Idle with the synthesizer off.
    TrxOff = 0x08,
    /// Synthesizer locked, ready to transmit.
    PllOn = 0x09,
    /// Deep sleep.
    Sleep = 0x0F,
}

impl TrxState {
    /// Decode the host's state byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x06 => Some(TrxState::RxOn),
            0x07 => Some(TrxState::Reset),
            0x08 => Some(TrxState::TrxOff),
            0x09 => Some(TrxState::PllOn),
            0x0F => Some(TrxState::Sleep),
            _ => None,
        }
    }
}

/// Test signal generated in continuous transmission.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousTxMode {
    /// Unmodulated carrier.
    Cw = 0,
    /// Modulated pseudo random sequence.
    Prbs = 1,
}

impl ContinuousTxMode {
    /// Decode the host's mode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ContinuousTxMode::Cw),
            1 => Some(ContinuousTxMode::Prbs),
            _ => None,
        }
    }
}

/// Modulation specific part of a SUN PHY page.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SunModulation {
    Ofdm { option: u8, mcs: u8, interleaving: u8 },
    Oqpsk { rate_mode: u8, chip_rate: u8 },
    Fsk { mod_type: u8, mod_idx: u8, sym_rate: u8, op_mode: u8, bt: u8, fec_enabled: u8 },
    LegacyOqpsk { data_rate: u8, chip_rate: u8 },
}

impl SunModulation {
    /// Modulation code used on the wire.
    pub const OFDM: u8 = 0;
    #[allow(missing_docs)]
    pub const OQPSK: u8 = 1;
    #[allow(missing_docs)]
    pub const FSK: u8 = 2;
    #[allow(missing_docs)]
    pub const LEG_OQPSK: u8 = 3;

    /// Wire code of this modulation.
    pub fn code(&self) -> u8 {
        match self {
            SunModulation::Ofdm { .. } => Self::OFDM,
            SunModulation::Oqpsk { .. } => Self::OQPSK,
            SunModulation::Fsk { .. } => Self::FSK,
            SunModulation::LegacyOqpsk { .. } => Self::LEG_OQPSK,
        }
    }
}

/// PHY configuration of a SUN channel page.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunPhyPage {
    /// Page number as seen by the host.
    pub page_no: u8,
    /// Regional frequency band code.
    pub freq_band: u8,
    /// Modulation and its options.
    pub modulation: SunModulation,
}

impl Default for SunPhyPage {
    fn default() -> Self {
        Self {
            page_no: 0,
            freq_band: 0,
            modulation: SunModulation::LegacyOqpsk { data_rate: 0, chip_rate: 0 },
        }
    }
}

/// Attributes of the driver's PAN information base.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PibAttribute {
    CurrentChannel,
    CurrentPage,
    TransmitPower,
    ShortAddress,
    IeeeAddress,
    PanId,
    ChannelsSupported,
    PhySetting,
    FcsLength,
    /// Read only: channel count of the active SUN page.
    SunChannelCount,
}

/// A typed PIB value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PibValue {
    CurrentChannel(u16),
    CurrentPage(u8),
    /// Output power in dBm.
    TransmitPower(i8),
    ShortAddress(u16),
    IeeeAddress(u64),
    PanId(u16),
    /// Bit mask of legacy channel numbers.
    ChannelsSupported(u32),
    PhySetting(SunPhyPage),
    FcsLength(u8),
    SunChannelCount(u16),
}

impl PibValue {
    /// Attribute this value belongs to.
    pub fn attribute(&self) -> PibAttribute {
        match self {
            PibValue::CurrentChannel(_) => PibAttribute::CurrentChannel,
            PibValue::CurrentPage(_) => PibAttribute::CurrentPage,
            PibValue::TransmitPower(_) => PibAttribute::TransmitPower,
            PibValue::ShortAddress(_) => PibAttribute::ShortAddress,
            PibValue::IeeeAddress(_) => PibAttribute::IeeeAddress,
            PibValue::PanId(_) => PibAttribute::PanId,
            PibValue::ChannelsSupported(_) => PibAttribute::ChannelsSupported,
            PibValue::PhySetting(_) => PibAttribute::PhySetting,
            PibValue::FcsLength(_) => PibAttribute::FcsLength,
            PibValue::SunChannelCount(_) => PibAttribute::SunChannelCount,
        }
    }
}
