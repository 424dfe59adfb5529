//! Answering side of the peer search.

use super::PEER_CONFIRM_TIMEOUT_US;
use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::state::MainStateHandler;
use crate::analyzer::types::{MainState, StateArg, TransceiverId};
use crate::analyzer::{parse_app_frame, PerformanceAnalyzer};
use crate::device::radio::types::{PibValue, RxFrame, TxStatus};
use crate::device::{Device, LedEvent};
use crate::frame::app::{AppMessage, PeerMode};
use crate::frame::Address;
use crate::Error;

/// Offering an address to the requester.
pub(crate) const PEER_RSP_SEND: u8 = 0;
/// Waiting for the requester to take the offer.
pub(crate) const WAIT_FOR_PEER_CONF: u8 = 1;

pub(crate) struct PeerSearchReceptor;

impl<D: Device> MainStateHandler<D> for PeerSearchReceptor {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        arg: StateArg,
    ) -> Result<(), Error<D>> {
        let StateArg::PeerRequest(request) = arg else {
            warn!("{}: peer search without a request", trx);
            return pa.set_main_state(trx, MainState::WaitForEvent, StateArg::None);
        };
        pa.device.led_event(trx, LedEvent::PeerSearch);
        pa.set_pib(trx, PibValue::ShortAddress(request.nwk_addr));
        let seq = pa.random_u8()?;
        let peer_addr = loop {
            let addr = pa.random_short_address()?;
            if addr != request.nwk_addr {
                break addr;
            }
        };
        let session = pa.session_mut(trx);
        session.peer_search.seq_num = seq;
        session.peer_search.peer_ieee_addr = request.ieee_addr;
        session.node.peer_short_addr = peer_addr;
        Ok(())
    }

    fn tx_done(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        status: TxStatus,
    ) -> Result<(), Error<D>> {
        if pa.session(trx).node.sub_state != PEER_RSP_SEND {
            return Ok(());
        }
        if status.is_success() {
            self.set_sub_state(pa, trx, WAIT_FOR_PEER_CONF, StateArg::None)
        } else {
            pa.set_main_state(trx, MainState::WaitForEvent, StateArg::None)
        }
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        if pa.session(trx).node.sub_state != WAIT_FOR_PEER_CONF {
            return Ok(());
        }
        let Some((_, _, AppMessage::PeerConfirm { nwk_addr })) = parse_app_frame(frame) else {
            return Ok(());
        };
        if nwk_addr != pa.session(trx).node.peer_short_addr {
            trace!("{}: confirm for address {} ignored", trx, nwk_addr);
            return Ok(());
        }
        pa.stop_timer(trx, Slot::PeerSearch);
        pa.session_mut(trx).node.peer_found = true;
        pa.device.led_event(trx, LedEvent::PeerFound);
        let next = match peer_mode(pa.session(trx).node.main_state) {
            PeerMode::RangeMeasure => {
                info!("{}: paired for range measurement", trx);
                MainState::RangeTestTxOff
            }
            PeerMode::PerTest => MainState::PerTestReceptor,
        };
        pa.set_main_state(trx, next, StateArg::None)
    }

    fn exit(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        pa.stop_timer(trx, Slot::PeerSearch);
        Ok(())
    }

    fn set_sub_state(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        sub_state: u8,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        if sub_state != PEER_RSP_SEND {
            pa.stop_timer(trx, Slot::PeerSearch);
        }
        pa.session_mut(trx).node.sub_state = sub_state;
        match sub_state {
            PEER_RSP_SEND => send_peer_response(pa, trx),
            _ => pa.start_timer(
                trx,
                Slot::PeerSearch,
                PEER_CONFIRM_TIMEOUT_US,
                Continuation::PeerConfirmTimeout,
            ),
        }
    }

    fn has_sub_states(&self) -> bool {
        true
    }
}

fn send_peer_response<D: Device>(
    pa: &mut PerformanceAnalyzer<D>,
    trx: TransceiverId,
) -> Result<(), Error<D>> {
    let session = pa.session_mut(trx);
    let seq = session.peer_search.next_seq();
    let dst = Address::Extended(session.peer_search.peer_ieee_addr);
    let response = AppMessage::PeerResponse { nwk_addr: session.node.peer_short_addr };
    if pa.app_transmit_frame(trx, dst, false, seq, &response, true).is_err() {
        return pa.set_main_state(trx, MainState::WaitForEvent, StateArg::None);
    }
    Ok(())
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    pub(crate) fn peer_confirm_timeout(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        let node = &self.session(trx).node;
        let searching = matches!(node.main_state, MainState::PeerSearchPerRx | MainState::PeerSearchRangeRx);
        if searching && node.sub_state == WAIT_FOR_PEER_CONF {
            info!("{}: peer did not confirm", trx);
            return self.set_main_state(trx, MainState::WaitForEvent, StateArg::None);
        }
        Ok(())
    }
}

/// Mode a receiving peer search runs for.
pub(crate) fn peer_mode(state: MainState) -> PeerMode {
    match state {
        MainState::PeerSearchRangeRx | MainState::PeerSearchRangeTx => PeerMode::RangeMeasure,
        _ => PeerMode::PerTest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::PeerRequestInfo;
    use crate::frame::Header;
    use crate::test_utils::{analyzer, frame_bytes, last_sent, rx, MockDevice};

    const TRX: TransceiverId = TransceiverId::Rf24;
    const REQUESTER: u64 = 0x0004_25FF_FF00_0777;

    fn start(pa: &mut PerformanceAnalyzer<MockDevice>, op_mode: PeerMode) {
        let state = match op_mode {
            PeerMode::PerTest => MainState::PeerSearchPerRx,
            PeerMode::RangeMeasure => MainState::PeerSearchRangeRx,
        };
        let info = PeerRequestInfo { op_mode, nwk_addr: 0x0BEE, ieee_addr: REQUESTER };
        pa.set_main_state(TRX, state, StateArg::PeerRequest(info)).unwrap();
    }

    fn confirm(pa: &mut PerformanceAnalyzer<MockDevice>, nwk_addr: u16) {
        let header = Header {
            ack_request: true,
            seq: 1,
            pan_id: 0xCAFE,
            dst: Address::Short(0x0BEE),
            src: Address::Short(nwk_addr),
        };
        rx(pa, TRX, &frame_bytes(&header, 2, &AppMessage::PeerConfirm { nwk_addr }));
    }

    #[test]
    fn response_offers_an_address_to_the_requester() {
        let mut pa = analyzer();
        start(&mut pa, PeerMode::PerTest);
        assert_eq!(pa.device().radio.pib[TRX.index()].short_addr, 0x0BEE);
        let (header, _, msg) = last_sent(&mut pa, TRX);
        assert_eq!(header.dst, Address::Extended(REQUESTER));
        assert_eq!(header.src, Address::Short(0x0BEE));
        let offered = pa.node(TRX).peer_short_addr();
        assert_ne!(offered, 0x0BEE);
        assert_eq!(msg, AppMessage::PeerResponse { nwk_addr: offered });
    }

    #[test]
    fn matching_confirm_pairs_the_receptor() {
        let mut pa = analyzer();
        start(&mut pa, PeerMode::PerTest);
        pa.tx_frame_done(TRX, TxStatus::Success);
        assert_eq!(pa.node(TRX).sub_state(), WAIT_FOR_PEER_CONF);
        let addr = pa.node(TRX).peer_short_addr().wrapping_add(1);
        confirm(&mut pa, addr);
        assert_eq!(pa.main_state(TRX), MainState::PeerSearchPerRx);
        let addr = pa.node(TRX).peer_short_addr();
        confirm(&mut pa, addr);
        assert!(pa.node(TRX).peer_found());
        assert_eq!(pa.main_state(TRX), MainState::PerTestReceptor);
    }

    #[test]
    fn range_pairing_ends_in_tx_off() {
        let mut pa = analyzer();
        start(&mut pa, PeerMode::RangeMeasure);
        pa.tx_frame_done(TRX, TxStatus::Success);
        let addr = pa.node(TRX).peer_short_addr();
        confirm(&mut pa, addr);
        assert_eq!(pa.main_state(TRX), MainState::RangeTestTxOff);
    }

    #[test]
    fn missing_confirm_times_out() {
        let mut pa = analyzer();
        start(&mut pa, PeerMode::PerTest);
        pa.tx_frame_done(TRX, TxStatus::Success);
        pa.device_mut().timer.advance(PEER_CONFIRM_TIMEOUT_US - 1);
        pa.task().unwrap();
        assert_eq!(pa.main_state(TRX), MainState::PeerSearchPerRx);
        pa.device_mut().timer.advance(1);
        pa.task().unwrap();
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);
    }

    #[test]
    fn unacknowledged_response_gives_up() {
        let mut pa = analyzer();
        start(&mut pa, PeerMode::PerTest);
        pa.tx_frame_done(TRX, TxStatus::NoAck);
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);
    }

    #[test]
    fn mode_follows_search_state() {
        assert_eq!(peer_mode(MainState::PeerSearchRangeRx), PeerMode::RangeMeasure);
        assert_eq!(peer_mode(MainState::PeerSearchPerRx), PeerMode::PerTest);
    }
}
