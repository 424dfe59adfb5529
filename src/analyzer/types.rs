//! Properties shared by the state machines of one radio session.

pub use crate::device::radio::types::{SunModulation, SunPhyPage, TransceiverId, TrxState};

use crate::device::radio_buffer::RadioBuffer;
use crate::frame::app::PeerMode;
use crate::frame::MAX_PSDU;

/// Channel page number of the SUN PHYs.
pub const CH_PG_SUN: u8 = 9;
/// Channel pages accepted from the host.
pub const VALID_CHANNEL_PAGES: [u8; 8] = [0, 2, 5, CH_PG_SUN, 16, 17, 18, 19];

/// Top level operating mode of a radio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum MainState {
    #[default]
    Init,
    WaitForEvent,
    PeerSearchRangeTx,
    PeerSearchPerTx,
    PeerSearchRangeRx,
    PeerSearchPerRx,
    RangeTestTxOn,
    RangeTestTxOff,
    SingleNodeTests,
    PerTestInitiator,
    PerTestReceptor,
}

impl MainState {
    /// Peer search or pairing for a PER session, as opposed to a range session.
    pub fn is_per_mode(self) -> bool {
        matches!(self, MainState::PeerSearchPerTx | MainState::PeerSearchPerRx)
    }

    /// One of the stand-alone range measurement states.
    pub fn is_range_test(self) -> bool {
        matches!(self, MainState::RangeTestTxOn | MainState::RangeTestTxOff)
    }

    /// States in which the host may configure and run tests.
    pub fn is_initiator(self) -> bool {
        matches!(self, MainState::SingleNodeTests | MainState::PerTestInitiator)
    }
}

/// Status codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum Status {
    #[default]
    Success = 0x00,
    InvalidCmd = 0x80,
    InvalidArgument = 0x81,
    ValueOutOfRange = 0x82,
    UnableToContactPeer = 0x83,
    TransmissionFailure = 0x84,
    TransceiverInSleep = 0x85,
    EdScanUnderProgress = 0x86,
    CwTransmissionUnderProgress = 0x87,
    TransmissionUnderProgress = 0x88,
    RangeTestInProgress = 0x89,
    NoPeerFound = 0x8A,
    InvalidRegisterOrder = 0x8B,
    InvalidValue = 0x8C,
}

/// Durable state of one radio session.
pub struct NodeInfo {
    pub(crate) main_state: MainState,
    pub(crate) sub_state: u8,
    /// At most one frame is in flight.
    pub(crate) transmitting: bool,
    pub(crate) peer_short_addr: u16,
    pub(crate) peer_found: bool,
    /// Pairing at minimum power, restricted to a node close by.
    pub(crate) configure_mode: bool,
    /// MAC sequence number of the next frame.
    pub(crate) msg_seq_num: u8,
    /// MPDU of the frame last handed to the radio.
    pub(crate) tx_frame: RadioBuffer<MAX_PSDU>,
}

impl NodeInfo {
    /// Creation.
    pub const fn new() -> Self {
        Self {
            main_state: MainState::Init,
            sub_state: 0,
            transmitting: false,
            peer_short_addr: 0,
            peer_found: false,
            configure_mode: false,
            msg_seq_num: 0,
            tx_frame: RadioBuffer::new(),
        }
    }

    /// Current operating mode.
    pub fn main_state(&self) -> MainState {
        self.main_state
    }

    /// Sub-state within the current operating mode.
    pub fn sub_state(&self) -> u8 {
        self.sub_state
    }

    /// A frame is in flight.
    pub fn transmitting(&self) -> bool {
        self.transmitting
    }

    /// Address of the paired node.
    pub fn peer_short_addr(&self) -> u16 {
        self.peer_short_addr
    }

    /// Pairing completed.
    pub fn peer_found(&self) -> bool {
        self.peer_found
    }
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Board wide settings of the analyzer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalyzerConfig {
    pub(crate) pan_id: u16,
    pub(crate) default_channel_rf09: u16,
    pub(crate) default_channel_rf24: u16,
    pub(crate) default_page_rf09: u8,
    pub(crate) default_page_rf24: u8,
    pub(crate) default_tx_power_dbm: i8,
    pub(crate) firmware_version: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            pan_id: 0xCAFE,
            default_channel_rf09: 1,
            default_channel_rf24: 11,
            default_page_rf09: 0,
            default_page_rf24: 0,
            default_tx_power_dbm: 14,
            firmware_version: 1.0,
        }
    }
}

impl AnalyzerConfig {
    /// PAN both nodes of a pair operate in.
    pub fn with_pan_id(mut self, pan_id: u16) -> Self {
        self.pan_id = pan_id;
        self
    }

    /// Channel a session starts on.
    pub fn with_default_channel(mut self, trx: TransceiverId, channel: u16) -> Self {
        match trx {
            TransceiverId::Rf09 => self.default_channel_rf09 = channel,
            TransceiverId::Rf24 => self.default_channel_rf24 = channel,
        }
        self
    }

    /// Channel page a session starts on.
    pub fn with_default_page(mut self, trx: TransceiverId, page: u8) -> Self {
        match trx {
            TransceiverId::Rf09 => self.default_page_rf09 = page,
            TransceiverId::Rf24 => self.default_page_rf24 = page,
        }
        self
    }

    /// Output power used outside configure mode.
    pub fn with_default_tx_power_dbm(mut self, dbm: i8) -> Self {
        self.default_tx_power_dbm = dbm;
        self
    }

    /// Version reported to the host and to the peer.
    pub fn with_firmware_version(mut self, version: f32) -> Self {
        self.firmware_version = version;
        self
    }

    /// Get the PAN id.
    pub fn pan_id(&self) -> u16 {
        self.pan_id
    }

    /// Get the start channel of `trx`.
    pub fn default_channel(&self, trx: TransceiverId) -> u16 {
        match trx {
            TransceiverId::Rf09 => self.default_channel_rf09,
            TransceiverId::Rf24 => self.default_channel_rf24,
        }
    }

    /// Get the start channel page of `trx`.
    pub fn default_page(&self, trx: TransceiverId) -> u8 {
        match trx {
            TransceiverId::Rf09 => self.default_page_rf09,
            TransceiverId::Rf24 => self.default_page_rf24,
        }
    }

    /// Get the default output power.
    pub fn default_tx_power_dbm(&self) -> i8 {
        self.default_tx_power_dbm
    }

    /// Get the firmware version.
    pub fn firmware_version(&self) -> f32 {
        self.firmware_version
    }
}

/// Negotiable PER test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub struct TrxConfigParams {
    pub channel: u16,
    pub channel_page: u8,
    pub tx_power_reg: u8,
    pub tx_power_dbm: i8,
    pub csma_enabled: bool,
    pub retry_enabled: bool,
    pub ack_request: bool,
    pub rx_desensitize: bool,
    pub trx_state: TrxState,
    pub number_test_frames: u32,
    /// PSDU length including the FCS.
    pub phy_frame_length: u16,
    /// The peer counts frames with a bad FCS.
    pub crc_settings_on_peer: bool,
    /// Only meaningful when `channel_page` is [`CH_PG_SUN`].
    pub sun_page: SunPhyPage,
}

impl Default for TrxConfigParams {
    fn default() -> Self {
        Self {
            channel: 0,
            channel_page: 0,
            tx_power_reg: 0,
            tx_power_dbm: 0,
            csma_enabled: false,
            retry_enabled: false,
            ack_request: false,
            rx_desensitize: false,
            trx_state: TrxState::TrxOff,
            number_test_frames: 100,
            phy_frame_length: 20,
            crc_settings_on_peer: false,
            sun_page: SunPhyPage::default(),
        }
    }
}

impl TrxConfigParams {
    /// Placeholder block sent along with a failed confirm.
    pub fn zeroed() -> Self {
        Self { number_test_frames: 0, phy_frame_length: 0, ..Default::default() }
    }
}

/// Peer search request as handed to the receptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerRequestInfo {
    /// Mode the pair is going to run.
    pub op_mode: PeerMode,
    /// Short address offered to this node.
    pub nwk_addr: u16,
    /// Extended address of the requester.
    pub ieee_addr: u64,
}

/// Argument passed along a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateArg {
    #[default]
    #[allow(missing_docs)]
    None,
    /// The request that started a peer search on the receiving side.
    PeerRequest(PeerRequestInfo),
    /// Short address offered by the peer.
    ShortAddress(u16),
}
