//! Pairing of two nodes: the initiator broadcasts requests, the receptor offers an address.

pub(crate) mod initiator;
pub(crate) mod receptor;

use super::types::{MainState, Status, TransceiverId, TrxConfigParams};
use super::PerformanceAnalyzer;
use crate::device::Device;
use crate::serial::messages::{HostResponse, START_MODE_PER};

/// Requests sent before the search is abandoned.
pub(crate) const MAX_NUMBER_PEER_REQ_RETRY: u8 = 0xFF;
/// Interval between two peer requests.
pub(crate) const PEER_REQUEST_SEND_INTERVAL_US: u32 = 50_000;
/// Time the receptor waits for the confirmation of its offered address.
pub(crate) const PEER_CONFIRM_TIMEOUT_US: u32 = 1_000_000;
/// Output power while pairing in configure mode, in dBm.
pub(crate) const CONFIG_MODE_TX_PWR: i8 = -17;

/// Ephemeral state of a running peer search.
#[derive(Debug, Default)]
pub(crate) struct PeerSearchSession {
    pub(crate) retry_count: u8,
    pub(crate) seq_num: u8,
    /// Extended address of the requesting node, receptor side.
    pub(crate) peer_ieee_addr: u64,
}

impl PeerSearchSession {
    pub(crate) const fn new() -> Self {
        Self { retry_count: 0, seq_num: 0, peer_ieee_addr: 0 }
    }

    pub(crate) fn next_seq(&mut self) -> u8 {
        self.seq_num = self.seq_num.wrapping_add(1);
        self.seq_num
    }
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Tell the host that a PER peer search failed, then idle.
    pub(crate) fn peer_search_failed(&mut self, trx: TransceiverId) -> Result<(), crate::Error<D>> {
        match self.session(trx).node.main_state {
            MainState::PeerSearchRangeTx => info!("{}: peer search failed", trx),
            MainState::PeerSearchPerTx => {
                let params = TrxConfigParams::zeroed();
                self.respond(
                    trx,
                    HostResponse::PerfStartConfirm {
                        status: Status::NoPeerFound,
                        start_mode: START_MODE_PER,
                        params: &params,
                        peer: None,
                    },
                );
            }
            _ => {}
        }
        self.set_main_state(trx, MainState::WaitForEvent, super::types::StateArg::None)
    }
}
