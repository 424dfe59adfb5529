//! Receptor of a PER session: counts test frames and answers the initiator.

use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::state::MainStateHandler;
use crate::analyzer::types::{StateArg, TransceiverId};
use crate::analyzer::PerformanceAnalyzer;
use crate::device::radio::types::{PibValue, RxFrame};
use crate::device::radio::Radio;
use crate::device::{Device, LedEvent};
use crate::frame::app::{AppMessage, Command, RangeReport, RemoteParam, ResultRsp};
use crate::frame::{Address, Header};
use crate::Error;

/// Delay between a disconnect command and the reset, so the ack goes out first.
pub(crate) const DISCONNECT_RESET_DELAY_US: u32 = 5_000;
/// RSSI values are accumulated with this offset to keep the sum positive.
const RSSI_BASE_VAL_DBM: i32 = 127;

/// Receptor side state of one radio session.
#[derive(Debug, Default)]
pub(crate) struct PerReceptor {
    pub(crate) seq_num: u8,
    pub(crate) number_rx_frames: u32,
    pub(crate) aver_lqi: u32,
    pub(crate) aver_rssi: u32,
    /// MAC sequence number of the last counted test frame.
    pub(crate) prev_seq: u8,
    pub(crate) wrong_crc: u32,
    /// The receptor checks the FCS itself and counts bad frames.
    pub(crate) manual_crc: bool,
    pub(crate) range_in_progress: bool,
    pub(crate) marker_seq: u8,
}

impl PerReceptor {
    pub(crate) const fn new() -> Self {
        Self {
            seq_num: 0,
            number_rx_frames: 0,
            aver_lqi: 0,
            aver_rssi: 0,
            prev_seq: 0,
            wrong_crc: 0,
            manual_crc: false,
            range_in_progress: false,
            marker_seq: 0,
        }
    }

    fn reset_counters(&mut self) {
        self.number_rx_frames = 0;
        self.aver_lqi = 0;
        self.aver_rssi = 0;
    }

    fn count(&mut self, dsn: u8, frame: &RxFrame<'_>) {
        if self.number_rx_frames == 0 {
            self.wrong_crc = 0;
        } else if dsn == self.prev_seq {
            return;
        }
        self.number_rx_frames += 1;
        self.prev_seq = dsn;
        self.aver_lqi += frame.lqi as u32;
        self.aver_rssi += (frame.ed as i32 + RSSI_BASE_VAL_DBM) as u32;
    }

    /// Averages of the run so far, in the layout the initiator expects.
    fn result(&self) -> ResultRsp {
        let n = self.number_rx_frames;
        let (lqi, rssi) = if n > 0 {
            let rssi = (self.aver_rssi / n) as i32 - RSSI_BASE_VAL_DBM;
            (self.aver_lqi / n, rssi as i8 as u32)
        } else {
            (0, 0)
        };
        ResultRsp {
            num_of_frames_rx: n,
            lqi_avrg_rx: lqi,
            rssi_avrg_rx: rssi,
            frames_with_wrong_crc: if self.manual_crc { self.wrong_crc } else { u32::MAX },
        }
    }
}

/// `PER_TEST_RECEPTOR`.
pub(crate) struct PerReceptorState;

impl<D: Device> MainStateHandler<D> for PerReceptorState {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        let seq = pa.random_u8()?;
        pa.session_mut(trx).receptor = PerReceptor { seq_num: seq, ..PerReceptor::new() };
        let dbm = pa.config.default_tx_power_dbm();
        pa.set_pib(trx, PibValue::TransmitPower(dbm));
        info!("{}: waiting for the initiator", trx);
        Ok(())
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        if !pa.session(trx).receptor.range_in_progress || !pa.device.button_pressed(trx) {
            return Ok(());
        }
        let receptor = &mut pa.session_mut(trx).receptor;
        receptor.marker_seq = receptor.marker_seq.wrapping_add(1);
        let seq = receptor.marker_seq;
        receptor.seq_num = receptor.seq_num.wrapping_add(1);
        let peer = pa.session(trx).node.peer_short_addr;
        let marker = AppMessage::RangeTestMarkerCmd;
        match pa.app_transmit_frame(trx, Address::Short(peer), false, seq, &marker, true) {
            Ok(()) => info!("{}: marker {} sent", trx, seq),
            Err(e) => warn!("{}: marker not sent: {}", trx, e),
        }
        Ok(())
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        let Ok((header, payload)) = Header::decode(frame.mpdu) else {
            return Ok(());
        };
        if header.dst != Address::Short(pa.pib_short_addr(trx)) {
            return Ok(());
        }
        if !frame.crc_ok {
            let receptor = &mut pa.session_mut(trx).receptor;
            if receptor.manual_crc && payload.first() == Some(&(Command::PerTestPkt as u8)) {
                receptor.wrong_crc = receptor.wrong_crc.wrapping_add(1);
            }
            return Ok(());
        }
        let (seq, msg) = match AppMessage::decode(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!("{}: payload dropped: {}", trx, e);
                return Ok(());
            }
        };
        pa.receptor_command(trx, header.seq, seq, msg, frame)
    }
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    fn receptor_command(
        &mut self,
        trx: TransceiverId,
        dsn: u8,
        seq: u8,
        msg: AppMessage,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        match msg {
            AppMessage::PerTestPkt { .. } => self.session_mut(trx).receptor.count(dsn, frame),
            AppMessage::ResultReq => {
                let result = self.session(trx).receptor.result();
                info!(
                    "{}: {} frames received, lqi {}, rssi {}",
                    trx,
                    result.num_of_frames_rx,
                    result.lqi_avrg_rx,
                    result.rssi_avrg_rx as i8
                );
                self.send_reply(trx, &AppMessage::ResultRsp(result));
                self.session_mut(trx).receptor.reset_counters();
                self.device.led_event(trx, LedEvent::PeerFound);
            }
            AppMessage::PerTestStartPkt => {
                let receptor = &mut self.session_mut(trx).receptor;
                receptor.reset_counters();
                receptor.wrong_crc = 0;
            }
            AppMessage::SetParam { param_type, value } => {
                self.set_param_on_receptor(trx, param_type, value)
            }
            AppMessage::SetSunPage(page) => {
                if !self.set_pib(trx, PibValue::PhySetting(page)) {
                    warn!("{}: sun page {} refused", trx, page.page_no);
                }
            }
            AppMessage::CrcStatReq => {
                let manual = self.session(trx).receptor.manual_crc;
                let enabled = self.device.radio().promiscuous_mode(trx).unwrap_or(manual);
                self.send_reply(trx, &AppMessage::CrcStatRsp { enabled });
            }
            AppMessage::CrcSetReq { enabled } => {
                if let Err(e) = self.device.radio().set_promiscuous_mode(trx, enabled) {
                    warn!("{}: promiscuous mode not changed: {}", trx, e);
                }
                self.session_mut(trx).receptor.manual_crc = enabled;
            }
            AppMessage::IdentifyNode => {
                info!("{}: identify", trx);
                self.device.led_event(trx, LedEvent::Identify);
            }
            AppMessage::DisconnectNode => {
                info!("{}: disconnected by the initiator", trx);
                self.start_timer(trx, Slot::App, DISCONNECT_RESET_DELAY_US, Continuation::AppReset)?;
            }
            AppMessage::SetDefaultReq => self.set_default_configuration_receptor(trx),
            AppMessage::PeerInfoReq => {
                let info = self.own_peer_info(trx);
                self.send_reply(trx, &AppMessage::PeerInfoRsp(info));
            }
            AppMessage::RangeTestStartPkt => {
                info!("{}: range test started", trx);
                self.session_mut(trx).receptor.range_in_progress = true;
            }
            AppMessage::RangeTestStopPkt => {
                info!("{}: range test stopped", trx);
                let receptor = &mut self.session_mut(trx).receptor;
                receptor.range_in_progress = false;
                receptor.marker_seq = 0;
                self.device.led_event(trx, LedEvent::PeerFound);
            }
            AppMessage::RangeTestPkt(beacon) => {
                info!("{}: range frame {}, lqi {}, ed {}", trx, beacon.frame_count, frame.lqi, frame.ed);
                let report = RangeReport { frame_count: beacon.frame_count, ed: frame.ed, lqi: frame.lqi };
                let receptor = &mut self.session_mut(trx).receptor;
                receptor.seq_num = receptor.seq_num.wrapping_add(1);
                let peer = self.session(trx).node.peer_short_addr;
                let rsp = AppMessage::RangeTestRsp(report);
                if let Err(e) = self.app_transmit_frame(trx, Address::Short(peer), false, seq, &rsp, true) {
                    warn!("{}: range response not sent: {}", trx, e);
                }
            }
            AppMessage::RangeTestMarkerRsp => {
                info!("{}: marker {} acknowledged, lqi {}, ed {}", trx, seq, frame.lqi, frame.ed);
            }
            other => trace!("{}: {} ignored by the receptor", trx, other.command()),
        }
        Ok(())
    }

    /// Send `msg` to the initiator with the next receptor sequence number.
    fn send_reply(&mut self, trx: TransceiverId, msg: &AppMessage) {
        let session = self.session_mut(trx);
        session.receptor.seq_num = session.receptor.seq_num.wrapping_add(1);
        let seq = session.receptor.seq_num;
        let peer = session.node.peer_short_addr;
        if let Err(e) = self.app_transmit_frame(trx, Address::Short(peer), false, seq, msg, true) {
            warn!("{}: {} not sent: {}", trx, msg.command(), e);
        }
    }

    fn set_param_on_receptor(&mut self, trx: TransceiverId, param_type: u8, value: u16) {
        let pib = match RemoteParam::from_u8(param_type) {
            Some(RemoteParam::Channel) => PibValue::CurrentChannel(value),
            Some(RemoteParam::ChannelPage) => PibValue::CurrentPage(value as u8),
            Some(RemoteParam::TxPowerDbm) => PibValue::TransmitPower(value as u8 as i8),
            Some(RemoteParam::TxPowerReg) => PibValue::TransmitPower(self.reg_to_dbm(trx, value as u8)),
            None => {
                trace!("{}: unknown parameter {}", trx, param_type);
                return;
            }
        };
        debug!("{}: peer sets {}", trx, pib);
        self.set_pib(trx, pib);
    }

    fn set_default_configuration_receptor(&mut self, trx: TransceiverId) {
        let channel = self.config.default_channel(trx);
        let page = self.config.default_page(trx);
        let dbm = self.config.default_tx_power_dbm();
        self.set_pib(trx, PibValue::CurrentChannel(channel));
        self.set_pib(trx, PibValue::CurrentPage(page));
        self.set_pib(trx, PibValue::TransmitPower(dbm));
        self.session_mut(trx).receptor.manual_crc = false;
        if let Err(e) = self.device.radio().set_promiscuous_mode(trx, false) {
            warn!("{}: promiscuous mode not changed: {}", trx, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::types::MainState;
    use crate::device::radio::types::TxStatus;
    use crate::test_utils::{analyzer, frame_bytes, last_sent, rx, rx_with, MockDevice};

    const TRX: TransceiverId = TransceiverId::Rf09;
    const OWN: u16 = 0x0BEE;
    const PEER: u16 = 0x1234;

    fn receptor() -> PerformanceAnalyzer<MockDevice> {
        let mut pa = analyzer();
        pa.device_mut().radio.pib[TRX.index()].short_addr = OWN;
        let node = &mut pa.session_mut(TRX).node;
        node.peer_found = true;
        node.peer_short_addr = PEER;
        pa.set_main_state(TRX, MainState::PerTestReceptor, StateArg::None).unwrap();
        pa
    }

    fn header(dsn: u8) -> Header {
        Header {
            ack_request: true,
            seq: dsn,
            pan_id: 0xCAFE,
            dst: Address::Short(OWN),
            src: Address::Short(PEER),
        }
    }

    fn test_frame(pa: &mut PerformanceAnalyzer<MockDevice>, dsn: u8, lqi: u8, ed: i8, crc_ok: bool) {
        let bytes = frame_bytes(&header(dsn), 0, &AppMessage::PerTestPkt { filler: 8 });
        rx_with(pa, TRX, &bytes, lqi, ed, crc_ok);
    }

    fn command(pa: &mut PerformanceAnalyzer<MockDevice>, seq: u8, msg: &AppMessage) {
        rx(pa, TRX, &frame_bytes(&header(seq), seq, msg));
    }

    #[test]
    fn repeated_sequence_numbers_are_counted_once() {
        let mut pa = receptor();
        test_frame(&mut pa, 10, 200, -50, true);
        test_frame(&mut pa, 10, 200, -50, true);
        test_frame(&mut pa, 11, 100, -70, true);
        let receptor = &pa.session(TRX).receptor;
        assert_eq!(receptor.number_rx_frames, 2);
        assert_eq!(receptor.aver_lqi, 300);
        assert_eq!(receptor.aver_rssi, (127 - 50) + (127 - 70));
    }

    #[test]
    fn result_request_reports_averages_and_resets() {
        let mut pa = receptor();
        test_frame(&mut pa, 1, 200, -50, true);
        test_frame(&mut pa, 2, 100, -70, true);
        command(&mut pa, 9, &AppMessage::ResultReq);
        let (hdr, _, msg) = last_sent(&mut pa, TRX);
        assert_eq!(hdr.dst, Address::Short(PEER));
        assert_eq!(
            msg,
            AppMessage::ResultRsp(ResultRsp {
                num_of_frames_rx: 2,
                lqi_avrg_rx: 150,
                rssi_avrg_rx: (-60i8) as u32,
                frames_with_wrong_crc: u32::MAX,
            })
        );
        assert_eq!(pa.session(TRX).receptor.number_rx_frames, 0);
    }

    #[test]
    fn manual_crc_counts_corrupted_test_frames() {
        let mut pa = receptor();
        command(&mut pa, 3, &AppMessage::CrcSetReq { enabled: true });
        assert!(pa.device().radio.promiscuous[TRX.index()]);
        test_frame(&mut pa, 1, 200, -50, true);
        test_frame(&mut pa, 2, 200, -50, false);
        test_frame(&mut pa, 3, 200, -50, false);
        pa.tx_frame_done(TRX, TxStatus::Success);
        command(&mut pa, 4, &AppMessage::ResultReq);
        let AppMessage::ResultRsp(rsp) = last_sent(&mut pa, TRX).2 else {
            panic!("no result response");
        };
        assert_eq!(rsp.num_of_frames_rx, 1);
        assert_eq!(rsp.frames_with_wrong_crc, 2);
    }

    #[test]
    fn corrupted_frames_are_ignored_without_manual_crc() {
        let mut pa = receptor();
        test_frame(&mut pa, 1, 200, -50, false);
        assert_eq!(pa.session(TRX).receptor.number_rx_frames, 0);
        assert_eq!(pa.session(TRX).receptor.wrong_crc, 0);
    }

    #[test]
    fn crc_status_reflects_promiscuous_mode() {
        let mut pa = receptor();
        command(&mut pa, 3, &AppMessage::CrcStatReq);
        assert_eq!(last_sent(&mut pa, TRX).2, AppMessage::CrcStatRsp { enabled: false });
    }

    #[test]
    fn disconnect_resets_after_a_delay() {
        let mut pa = receptor();
        command(&mut pa, 5, &AppMessage::DisconnectNode);
        pa.device_mut().timer.advance(DISCONNECT_RESET_DELAY_US - 1);
        pa.task().unwrap();
        assert_eq!(pa.main_state(TRX), MainState::PerTestReceptor);
        pa.device_mut().timer.advance(1);
        pa.task().unwrap();
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);
        assert!(!pa.node(TRX).peer_found());
    }

    #[test]
    fn range_beacon_is_answered_with_link_quality() {
        let mut pa = receptor();
        command(&mut pa, 1, &AppMessage::RangeTestStartPkt);
        assert!(pa.session(TRX).receptor.range_in_progress);
        let beacon = AppMessage::RangeTestPkt(RangeReport { frame_count: 7, ed: 0, lqi: 0 });
        rx_with(&mut pa, TRX, &frame_bytes(&header(2), 42, &beacon), 180, -45, true);
        let (_, seq, msg) = last_sent(&mut pa, TRX);
        assert_eq!(seq, 42);
        assert_eq!(msg, AppMessage::RangeTestRsp(RangeReport { frame_count: 7, ed: -45, lqi: 180 }));
    }

    #[test]
    fn button_sends_marker_during_range_test() {
        let mut pa = receptor();
        let sent = pa.device().radio.sent.len();
        command(&mut pa, 1, &AppMessage::RangeTestStartPkt);
        pa.device_mut().press_button(TRX);
        pa.task().unwrap();
        assert_eq!(pa.device().radio.sent.len(), sent + 1);
        let (_, seq, msg) = last_sent(&mut pa, TRX);
        assert_eq!((seq, msg), (1, AppMessage::RangeTestMarkerCmd));
    }

    #[test]
    fn remote_parameters_reach_the_radio() {
        let mut pa = receptor();
        command(&mut pa, 1, &AppMessage::SetParam { param_type: RemoteParam::Channel as u8, value: 5 });
        command(&mut pa, 2, &AppMessage::SetParam { param_type: RemoteParam::TxPowerReg as u8, value: 20 });
        let pib = &pa.device().radio.pib[TRX.index()];
        assert_eq!(pib.channel, 5);
        assert_eq!(pib.tx_power_dbm, 3);
        command(&mut pa, 3, &AppMessage::SetDefaultReq);
        let pib = &pa.device().radio.pib[TRX.index()];
        assert_eq!(pib.channel, pa.config().default_channel(TRX));
        assert_eq!(pib.tx_power_dbm, pa.config().default_tx_power_dbm());
    }
}
