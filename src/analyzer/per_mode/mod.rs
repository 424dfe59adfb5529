//! Packet error rate testing under host control.
//!
//! The initiator side is driven by host requests and runs the tests, the
//! receptor side counts what arrives and answers the initiator's commands.

mod diagnostics;
pub(crate) mod initiator;
mod params;
pub(crate) mod receptor;

use super::types::TransceiverId;
use super::{PerformanceAnalyzer, TxError};
use crate::device::radio::types::SunModulation;
use crate::device::{BoardInfo, Device};
use crate::frame::app::{truncated, AppMessage, PeerInfo};
use crate::frame::Address;

/// Time the peer has to answer a request.
pub(crate) const TIMEOUT_FOR_RESPONSE_US: u32 = 2_000_000;
/// Time the peer has to report the result of a test.
pub(crate) const RESULT_RSP_TIMEOUT_US: u32 = 300_000;
/// Result timeout on the 100 kchip/s O-QPSK PHY.
pub(crate) const RESULT_RSP_TIMEOUT_LDR_US: u32 = 500_000;
/// Delay before the first beacon of a host driven range test.
pub(crate) const RANGE_TX_BEACON_START_INTERVAL_US: u32 = 100_000;
/// Length of a continuous wave pulse.
pub(crate) const PULSE_CW_US: u32 = 50_000;
/// Features announced to the host and to the peer.
pub(crate) const FEATURE_MASK: u32 = 0x03;
/// Highest register address the host may access.
pub(crate) const MAX_REG_ADDRESS: u16 = 0x3FFE;
/// Largest ED scan duration exponent.
pub(crate) const MAX_SCAN_DURATION: u8 = 14;
/// Receiver desensitization level when enabled.
pub(crate) const RX_DESENSITIZE_LEVEL: u8 = 8;
/// Highest power amplifier register value.
pub(crate) const MAX_TX_PWR_REG: u8 = 0x1F;

/// What the initiator is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum OpMode {
    /// Idle, ready for a request.
    #[default]
    TxOpMode = 1,
    TestFramesSent = 2,
    WaitForTestRes = 3,
    SetParameter = 4,
    ContinuousTx = 7,
    IdentifyPeer = 8,
    CrcStatusReqWait = 9,
    CrcSetReqWait = 10,
    PeerInfoRspWait = 11,
    DisconnectPeer = 12,
    SetDefaultConfigPeer = 13,
    PerTestStart = 14,
    RangeTestStart = 15,
    RangeTestTx = 16,
    RangeTestStop = 17,
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Identity of this node as seen through `trx`.
    pub(crate) fn own_peer_info(&mut self, trx: TransceiverId) -> PeerInfo {
        let board = D::board_info();
        PeerInfo {
            ic_type: board.ic_type,
            soc_mcu_name: truncated(board.mcu_name),
            trx_name: truncated(BoardInfo::trx_name(trx)),
            board_name: truncated(board.board_name),
            mac_address: self.pib_ieee_addr(trx),
            fw_version: self.config.firmware_version,
            feature_mask: FEATURE_MASK,
        }
    }

    /// Unicast `msg` to the paired node with the next initiator sequence number.
    pub(crate) fn send_to_peer(&mut self, trx: TransceiverId, msg: &AppMessage) -> Result<(), TxError> {
        let session = self.session_mut(trx);
        session.initiator.seq_num = session.initiator.seq_num.wrapping_add(1);
        let seq = session.initiator.seq_num;
        let peer = session.node.peer_short_addr;
        self.app_transmit_frame(trx, Address::Short(peer), false, seq, msg, true)
    }

    fn result_timeout_us(&self, trx: TransceiverId) -> u32 {
        let params = &self.session(trx).initiator.current_params;
        match params.sun_page.modulation {
            SunModulation::Oqpsk { chip_rate: 0, .. } => RESULT_RSP_TIMEOUT_LDR_US,
            _ => RESULT_RSP_TIMEOUT_US,
        }
    }
}
