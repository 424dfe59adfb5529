//! Requesting side of the peer search.

use super::{
    CONFIG_MODE_TX_PWR, MAX_NUMBER_PEER_REQ_RETRY, PEER_REQUEST_SEND_INTERVAL_US,
};
use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::state::MainStateHandler;
use crate::analyzer::types::{MainState, StateArg, TransceiverId};
use crate::analyzer::{parse_app_frame, PerformanceAnalyzer};
use crate::device::radio::types::{PibValue, RxFrame, TxStatus};
use crate::device::{Device, LedEvent};
use crate::frame::app::{AppMessage, PeerMode, PeerRequest};
use crate::frame::{Address, BROADCAST_ADDR};
use crate::Error;

/// Broadcasting peer requests.
pub(crate) const PEER_REQ_SEND: u8 = 0;
/// A peer offered an address, confirming it.
pub(crate) const PEER_RSP_RCVD: u8 = 1;

pub(crate) struct PeerSearchInitiator;

impl<D: Device> MainStateHandler<D> for PeerSearchInitiator {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        pa.device.led_event(trx, LedEvent::PeerSearch);
        if pa.session(trx).node.main_state == MainState::PeerSearchRangeTx {
            info!("{}: peer search started", trx);
        }
        let seq = pa.random_u8()?;
        // offered to the peer, it becomes our view of its address
        let peer_addr = pa.random_short_address()?;
        let session = pa.session_mut(trx);
        session.peer_search.seq_num = seq;
        session.node.peer_short_addr = peer_addr;
        if session.node.configure_mode {
            pa.set_pib(trx, PibValue::TransmitPower(CONFIG_MODE_TX_PWR));
        }
        Ok(())
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        if pa.session(trx).node.sub_state != PEER_REQ_SEND
            || pa.session(trx).scheduler.is_running(Slot::PeerSearch)
        {
            return Ok(());
        }
        let session = pa.session_mut(trx);
        if session.peer_search.retry_count >= MAX_NUMBER_PEER_REQ_RETRY {
            session.peer_search.retry_count = 0;
            let next = match session.node.main_state {
                MainState::PeerSearchPerTx if session.node.configure_mode => MainState::WaitForEvent,
                MainState::PeerSearchPerTx => MainState::SingleNodeTests,
                _ => {
                    info!("{}: peer search failed", trx);
                    MainState::WaitForEvent
                }
            };
            return pa.set_main_state(trx, next, StateArg::None);
        }
        session.peer_search.retry_count += 1;
        let seq = session.peer_search.next_seq();
        let op_mode = match session.node.main_state {
            MainState::PeerSearchRangeTx => PeerMode::RangeMeasure,
            _ => PeerMode::PerTest,
        };
        let request = AppMessage::PeerRequest(PeerRequest {
            op_mode,
            nwk_addr: session.node.peer_short_addr,
            config_mode: session.node.configure_mode,
        });
        if op_mode == PeerMode::RangeMeasure {
            info!("{}: peer search in progress", trx);
        }
        if pa.app_transmit_frame(trx, Address::Short(BROADCAST_ADDR), true, seq, &request, true).is_ok()
        {
            pa.start_timer(
                trx,
                Slot::PeerSearch,
                PEER_REQUEST_SEND_INTERVAL_US,
                Continuation::PeerRequestInterval,
            )?;
        }
        Ok(())
    }

    fn tx_done(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        status: TxStatus,
    ) -> Result<(), Error<D>> {
        if pa.session(trx).node.sub_state != PEER_RSP_RCVD {
            return Ok(());
        }
        if !status.is_success() {
            return pa.peer_search_failed(trx);
        }
        pa.session_mut(trx).node.peer_found = true;
        pa.device.led_event(trx, LedEvent::PeerFound);
        let next = match pa.session(trx).node.main_state {
            MainState::PeerSearchRangeTx => {
                info!("{}: peer search succeeded", trx);
                MainState::RangeTestTxOn
            }
            _ => MainState::PerTestInitiator,
        };
        pa.set_main_state(trx, next, StateArg::None)
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        if pa.session(trx).node.sub_state != PEER_REQ_SEND {
            return Ok(());
        }
        let Some((header, _, AppMessage::PeerResponse { nwk_addr })) = parse_app_frame(frame) else {
            return Ok(());
        };
        if header.dst != Address::Extended(pa.pib_ieee_addr(trx)) {
            trace!("{}: peer response for another node", trx);
            return Ok(());
        }
        self.set_sub_state(pa, trx, PEER_RSP_RCVD, StateArg::ShortAddress(nwk_addr))
    }

    fn exit(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        let current = pa.session(trx).node.sub_state;
        exit_sub_state(pa, trx, current);
        Ok(())
    }

    fn set_sub_state(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        sub_state: u8,
        arg: StateArg,
    ) -> Result<(), Error<D>> {
        if sub_state != PEER_REQ_SEND {
            let current = pa.session(trx).node.sub_state;
            exit_sub_state(pa, trx, current);
        }
        pa.session_mut(trx).node.sub_state = sub_state;
        match sub_state {
            PEER_REQ_SEND => {
                pa.session_mut(trx).peer_search.retry_count = 0;
                Ok(())
            }
            _ => peer_rsp_rcvd_init(pa, trx, arg),
        }
    }

    fn has_sub_states(&self) -> bool {
        true
    }
}

fn exit_sub_state<D: Device>(pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId, sub_state: u8) {
    match sub_state {
        PEER_REQ_SEND => pa.stop_timer(trx, Slot::PeerSearch),
        _ => {
            let node = &mut pa.session_mut(trx).node;
            if node.configure_mode {
                node.configure_mode = false;
                let dbm = pa.config.default_tx_power_dbm;
                pa.set_pib(trx, PibValue::TransmitPower(dbm));
            }
        }
    }
}

fn peer_rsp_rcvd_init<D: Device>(
    pa: &mut PerformanceAnalyzer<D>,
    trx: TransceiverId,
    arg: StateArg,
) -> Result<(), Error<D>> {
    let StateArg::ShortAddress(own_addr) = arg else {
        return pa.peer_search_failed(trx);
    };
    pa.set_pib(trx, PibValue::ShortAddress(own_addr));
    let seq = pa.session_mut(trx).peer_search.next_seq();
    let peer = pa.session(trx).node.peer_short_addr;
    let confirm = AppMessage::PeerConfirm { nwk_addr: own_addr };
    if pa.app_transmit_frame(trx, Address::Short(peer), false, seq, &confirm, true).is_err() {
        return pa.peer_search_failed(trx);
    }
    Ok(())
}
