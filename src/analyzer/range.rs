//! Stand-alone range measurement between two nodes paired by button.
//!
//! The node in `RANGE_TEST_TX_ON` sends a beacon every few seconds, both nodes
//! answer beacons of the other one. A button press toggles the sending side.

use super::scheduler::{Continuation, Slot};
use super::state::MainStateHandler;
use super::types::{MainState, StateArg, TransceiverId};
use super::{parse_app_frame, PerformanceAnalyzer};
use crate::device::radio::types::RxFrame;
use crate::device::{Device, LedEvent};
use crate::frame::app::{AppMessage, RangeReport};
use crate::frame::Address;
use crate::Error;

/// Interval between two range test beacons.
pub(crate) const RANGE_TX_BEACON_INTERVAL_US: u32 = 3_000_000;

/// Counters of the stand-alone range test.
#[derive(Debug, Default)]
pub(crate) struct RangeSession {
    /// Beacons sent.
    pub(crate) tx_count: u32,
    /// Responses received to our beacons.
    pub(crate) rx_count: u32,
    /// Beacons of the peer answered.
    pub(crate) answered: u32,
    pub(crate) seq: u8,
}

impl RangeSession {
    pub(crate) const fn new() -> Self {
        Self { tx_count: 0, rx_count: 0, answered: 0, seq: 0 }
    }
}

/// Sending beacons.
pub(crate) struct RangeTestTxOn;

impl<D: Device> MainStateHandler<D> for RangeTestTxOn {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        info!("{}: range test transmitting", trx);
        pa.device.led_event(trx, LedEvent::PeerFound);
        pa.start_timer(trx, Slot::Range, RANGE_TX_BEACON_INTERVAL_US, Continuation::LegacyRangeBeacon)
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        if pa.device.button_pressed(trx) {
            pa.set_main_state(trx, MainState::RangeTestTxOff, StateArg::None)?;
        }
        Ok(())
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        pa.range_test_rx(trx, frame);
        Ok(())
    }

    fn exit(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        pa.stop_timer(trx, Slot::Range);
        Ok(())
    }
}

/// Answering beacons only.
pub(crate) struct RangeTestTxOff;

impl<D: Device> MainStateHandler<D> for RangeTestTxOff {
    fn init(
        &self,
        _pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        info!("{}: range test receiving", trx);
        Ok(())
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        if pa.device.button_pressed(trx) {
            pa.set_main_state(trx, MainState::RangeTestTxOn, StateArg::None)?;
        }
        Ok(())
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        pa.range_test_rx(trx, frame);
        Ok(())
    }
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Beacon of the stand-alone range test is due.
    pub(crate) fn legacy_range_beacon_due(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if self.session(trx).node.main_state != MainState::RangeTestTxOn {
            return Ok(());
        }
        let session = self.session_mut(trx);
        let range = &mut session.range;
        range.seq = range.seq.wrapping_add(1);
        let seq = range.seq;
        let beacon = AppMessage::RangeTestPkt(RangeReport {
            frame_count: range.tx_count.wrapping_add(1),
            ed: 0,
            lqi: 0,
        });
        let peer = session.node.peer_short_addr;
        match self.app_transmit_frame(trx, Address::Short(peer), false, seq, &beacon, true) {
            Ok(()) => {
                let range = &mut self.session_mut(trx).range;
                range.tx_count = range.tx_count.wrapping_add(1);
                info!("{}: range beacons sent {}, answered {}", trx, range.tx_count, range.rx_count);
            }
            Err(e) => warn!("{}: range beacon not sent: {}", trx, e),
        }
        self.start_timer(trx, Slot::Range, RANGE_TX_BEACON_INTERVAL_US, Continuation::LegacyRangeBeacon)
    }

    fn range_test_rx(&mut self, trx: TransceiverId, frame: &RxFrame<'_>) {
        if !frame.crc_ok {
            return;
        }
        let Some((_, seq, msg)) = parse_app_frame(frame) else {
            return;
        };
        match msg {
            AppMessage::RangeTestPkt(beacon) => {
                let report =
                    RangeReport { frame_count: beacon.frame_count, ed: frame.ed, lqi: frame.lqi };
                let peer = self.session(trx).node.peer_short_addr;
                let rsp = AppMessage::RangeTestRsp(report);
                match self.app_transmit_frame(trx, Address::Short(peer), false, seq, &rsp, true) {
                    Ok(()) => {
                        let range = &mut self.session_mut(trx).range;
                        range.answered = range.answered.wrapping_add(1);
                        info!(
                            "{}: range frame {} answered, lqi {}, ed {}",
                            trx,
                            beacon.frame_count,
                            frame.lqi,
                            frame.ed
                        );
                    }
                    Err(e) => warn!("{}: range response not sent: {}", trx, e),
                }
            }
            AppMessage::RangeTestRsp(report) => {
                let range = &mut self.session_mut(trx).range;
                range.rx_count = range.rx_count.wrapping_add(1);
                info!(
                    "{}: range frame {} reached the peer, remote lqi {}, remote ed {}, local lqi {}, local ed {}",
                    trx,
                    report.frame_count,
                    report.lqi,
                    report.ed,
                    frame.lqi,
                    frame.ed
                );
            }
            other => trace!("{}: {} ignored in range test", trx, other.command()),
        }
    }
}
