//! Main state handlers and their dispatch.

use super::types::{MainState, PeerRequestInfo, StateArg, TransceiverId};
use super::PerformanceAnalyzer;
use crate::device::radio::types::{PibValue, RxFrame, TxStatus};
use crate::device::{Device, LedEvent};
use crate::frame::app::{AppMessage, PeerMode};
use crate::frame::{Address, BROADCAST_ADDR};
use crate::Error;

/// Callbacks of one main state. Every handler defaults to doing nothing.
pub(crate) trait MainStateHandler<D: Device> {
    fn init(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        _trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        Ok(())
    }

    fn task(&self, _pa: &mut PerformanceAnalyzer<D>, _trx: TransceiverId) -> Result<(), Error<D>> {
        Ok(())
    }

    /// The frame that completed is still in the session's `tx_frame`.
    fn tx_done(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        _trx: TransceiverId,
        _status: TxStatus,
    ) -> Result<(), Error<D>> {
        Ok(())
    }

    fn rx(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        _trx: TransceiverId,
        _frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        Ok(())
    }

    fn ed_scan_done(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        _trx: TransceiverId,
        _level: i8,
    ) -> Result<(), Error<D>> {
        Ok(())
    }

    /// Stop every timer the state owns.
    fn exit(&self, _pa: &mut PerformanceAnalyzer<D>, _trx: TransceiverId) -> Result<(), Error<D>> {
        Ok(())
    }

    fn set_sub_state(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        _trx: TransceiverId,
        _sub_state: u8,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        Ok(())
    }

    fn has_sub_states(&self) -> bool {
        false
    }
}

/// Run `$body` with `$h` bound to the handler of `$state`.
macro_rules! on_state {
    ($state:expr, |$h:ident| $body:expr) => {{
        use $crate::analyzer::types::MainState;
        match $state {
            MainState::Init => {
                let $h = $crate::analyzer::state::InitState;
                $body
            }
            MainState::WaitForEvent => {
                let $h = $crate::analyzer::state::WaitForEvent;
                $body
            }
            MainState::PeerSearchRangeTx | MainState::PeerSearchPerTx => {
                let $h = $crate::analyzer::peer_search::initiator::PeerSearchInitiator;
                $body
            }
            MainState::PeerSearchRangeRx | MainState::PeerSearchPerRx => {
                let $h = $crate::analyzer::peer_search::receptor::PeerSearchReceptor;
                $body
            }
            MainState::RangeTestTxOn => {
                let $h = $crate::analyzer::range::RangeTestTxOn;
                $body
            }
            MainState::RangeTestTxOff => {
                let $h = $crate::analyzer::range::RangeTestTxOff;
                $body
            }
            MainState::SingleNodeTests | MainState::PerTestInitiator => {
                let $h = $crate::analyzer::per_mode::initiator::PerInitiatorState;
                $body
            }
            MainState::PerTestReceptor => {
                let $h = $crate::analyzer::per_mode::receptor::PerReceptorState;
                $body
            }
        }
    }};
}
pub(crate) use on_state;

/// Power-up state.
pub(crate) struct InitState;

impl<D: Device> MainStateHandler<D> for InitState {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        pa.config_node_ib(trx)?;
        pa.reset_radio(trx);
        let pan_id = pa.config.pan_id;
        pa.set_pib(trx, PibValue::PanId(pan_id));
        if pa.device.button_pressed(trx) {
            info!("{}: configure mode", trx);
            pa.session_mut(trx).node.configure_mode = true;
        }
        Ok(())
    }
}

/// Idle, waiting for the host, the button or a peer request.
pub(crate) struct WaitForEvent;

impl<D: Device> MainStateHandler<D> for WaitForEvent {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        pa.device.led_event(trx, LedEvent::Idle);
        Ok(())
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        if pa.device.button_pressed(trx) {
            pa.set_main_state(trx, MainState::PeerSearchRangeTx, StateArg::None)?;
        }
        Ok(())
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        let Some((header, _, AppMessage::PeerRequest(req))) = super::parse_app_frame(frame) else {
            return Ok(());
        };
        let (Address::Short(BROADCAST_ADDR), Address::Extended(ieee_addr)) = (header.dst, header.src)
        else {
            trace!("peer request with unexpected addressing");
            return Ok(());
        };
        let next = match req.op_mode {
            PeerMode::PerTest => MainState::PeerSearchPerRx,
            PeerMode::RangeMeasure => MainState::PeerSearchRangeRx,
        };
        let info = PeerRequestInfo { op_mode: req.op_mode, nwk_addr: req.nwk_addr, ieee_addr };
        pa.set_main_state(trx, next, StateArg::PeerRequest(info))
    }
}

#[cfg(test)]
mod tests {
    use crate::analyzer::types::{MainState, StateArg, TransceiverId};
    use crate::device::radio::types::TxStatus;
    use crate::frame::app::{AppMessage, PeerMode, PeerRequest};
    use crate::frame::{Address, Header, BROADCAST_ADDR};
    use crate::test_utils::{analyzer, frame_bytes, rx};

    const TRX: TransceiverId = TransceiverId::Rf24;

    #[test]
    fn init_leaves_both_sessions_waiting() {
        let pa = analyzer();
        for trx in TransceiverId::ALL {
            assert_eq!(pa.main_state(trx), MainState::WaitForEvent);
            assert!(!pa.node(trx).transmitting());
        }
    }

    #[test]
    fn transition_clears_transmitting_and_enters_first_sub_state() {
        let mut pa = analyzer();
        pa.set_main_state(TRX, MainState::PeerSearchPerTx, StateArg::None).unwrap();
        pa.task().unwrap();
        assert!(pa.node(TRX).transmitting());
        pa.set_main_state(TRX, MainState::PeerSearchRangeTx, StateArg::None).unwrap();
        assert!(!pa.node(TRX).transmitting());
        assert_eq!(pa.node(TRX).sub_state(), 0);
    }

    #[test]
    fn stale_tx_done_is_dropped() {
        let mut pa = analyzer();
        pa.set_main_state(TRX, MainState::PeerSearchPerTx, StateArg::None).unwrap();
        // a confirm pending with nothing in flight must not move the sub-state
        pa.session_mut(TRX).node.sub_state = 1;
        pa.tx_frame_done(TRX, TxStatus::Success);
        assert_eq!(pa.main_state(TRX), MainState::PeerSearchPerTx);
        assert!(!pa.node(TRX).peer_found());
    }

    #[test]
    fn broadcast_peer_request_starts_receptor_search() {
        let mut pa = analyzer();
        let header = Header {
            ack_request: true,
            seq: 3,
            pan_id: 0xCAFE,
            dst: Address::Short(BROADCAST_ADDR),
            src: Address::Extended(0x1122_3344_5566_7788),
        };
        let msg = AppMessage::PeerRequest(PeerRequest {
            op_mode: PeerMode::PerTest,
            nwk_addr: 0x4321,
            config_mode: false,
        });
        rx(&mut pa, TRX, &frame_bytes(&header, 1, &msg));
        assert_eq!(pa.main_state(TRX), MainState::PeerSearchPerRx);
        // the other session is untouched
        assert_eq!(pa.main_state(TransceiverId::Rf09), MainState::WaitForEvent);
    }

    #[test]
    fn unicast_peer_request_is_ignored() {
        let mut pa = analyzer();
        let header = Header {
            ack_request: true,
            seq: 3,
            pan_id: 0xCAFE,
            dst: Address::Short(0x0001),
            src: Address::Extended(0x1122_3344_5566_7788),
        };
        let msg = AppMessage::PeerRequest(PeerRequest {
            op_mode: PeerMode::RangeMeasure,
            nwk_addr: 0x4321,
            config_mode: false,
        });
        rx(&mut pa, TRX, &frame_bytes(&header, 1, &msg));
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);
    }

    #[test]
    fn button_starts_range_peer_search() {
        let mut pa = analyzer();
        pa.device_mut().press_button(TRX);
        pa.task().unwrap();
        assert_eq!(pa.main_state(TRX), MainState::PeerSearchRangeTx);
    }
}
