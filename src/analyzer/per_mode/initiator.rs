//! Initiator of a PER session, the node attached to the host tool.

use super::diagnostics::EdScan;
use super::{OpMode, RANGE_TX_BEACON_START_INTERVAL_US, TIMEOUT_FOR_RESPONSE_US};
use crate::analyzer::range::RANGE_TX_BEACON_INTERVAL_US;
use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::state::MainStateHandler;
use crate::analyzer::types::{MainState, StateArg, Status, TransceiverId, TrxConfigParams};
use crate::analyzer::{parse_app_frame, PerformanceAnalyzer};
use crate::device::radio::types::{CsmaMode, RxFrame, SunPhyPage, TxStatus};
use crate::device::Device;
use crate::frame::app::{AppMessage, Command, RangeReport, RemoteParam, ResultRsp};
use crate::frame::{Address, Header, FRAME_OVERHEAD, SEQ_NUM_POS};
use crate::serial::messages::{
    HostResponse, MessageId, ParamBytes, ParamType, PerTestResult, START_MODE_PER,
    START_MODE_SINGLE_NODE,
};
use crate::Error;

/// Failure counters of a test run. A counter that cannot apply starts at `u32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TxCounters {
    pub(crate) no_ack: u32,
    pub(crate) access_failure: u32,
    pub(crate) failure: u32,
}

/// A parameter change waiting for the peer to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum PendingParam {
    Remote { param: RemoteParam, value: u16 },
    SunPage { page: SunPhyPage, echo: ParamBytes },
    Crc { enabled: bool },
}

/// Initiator side state of one radio session.
#[derive(Debug)]
pub(crate) struct PerInitiator {
    pub(crate) op_mode: OpMode,
    pub(crate) seq_num: u8,
    pub(crate) peer_found: bool,
    pub(crate) default_params: TrxConfigParams,
    pub(crate) current_params: TrxConfigParams,
    pub(crate) frames_to_transmit: u32,
    pub(crate) counters: TxCounters,
    pub(crate) start_time: u32,
    pub(crate) last_time: u32,
    pub(crate) end_time: u32,
    /// Wraps of the microsecond clock seen during the run.
    pub(crate) rollovers: u32,
    pub(crate) pending: Option<PendingParam>,
    pub(crate) sleeping: bool,
    pub(crate) ed_scan: Option<EdScan>,
    pub(crate) range_in_progress: bool,
    pub(crate) range_frame_count: u32,
    pub(crate) last_range_seq: Option<u8>,
    /// Mode byte of the running `CONT_WAVE_TX_REQ`, a pulse leaves it empty.
    pub(crate) cw_tx_mode: Option<u8>,
}

impl PerInitiator {
    pub(crate) fn new() -> Self {
        Self {
            op_mode: OpMode::TxOpMode,
            seq_num: 0,
            peer_found: false,
            default_params: TrxConfigParams::default(),
            current_params: TrxConfigParams::default(),
            frames_to_transmit: 0,
            counters: TxCounters::default(),
            start_time: 0,
            last_time: 0,
            end_time: 0,
            rollovers: 0,
            pending: None,
            sleeping: false,
            ed_scan: None,
            range_in_progress: false,
            range_frame_count: 0,
            last_range_seq: None,
            cw_tx_mode: None,
        }
    }

    /// The operation that blocks a new request, in order of precedence.
    pub(crate) fn check_error_conditions(&self) -> Status {
        if self.sleeping {
            Status::TransceiverInSleep
        } else if self.ed_scan.is_some() {
            Status::EdScanUnderProgress
        } else if self.op_mode == OpMode::ContinuousTx {
            Status::CwTransmissionUnderProgress
        } else if self.frames_to_transmit > 0 {
            Status::TransmissionUnderProgress
        } else if self.range_in_progress {
            Status::RangeTestInProgress
        } else {
            Status::Success
        }
    }

    /// Seconds from the first to the last test frame.
    pub(crate) fn test_duration_s(&self) -> f32 {
        let wraps = if self.end_time < self.start_time {
            self.rollovers.saturating_sub(1)
        } else {
            self.rollovers
        };
        let elapsed = ((wraps as u64) << 32) + self.end_time.wrapping_sub(self.start_time) as u64;
        elapsed as f32 / 1_000_000.0
    }
}

impl Default for PerInitiator {
    fn default() -> Self {
        Self::new()
    }
}

fn peer_status(status: TxStatus) -> Status {
    if status.is_success() {
        Status::Success
    } else {
        Status::UnableToContactPeer
    }
}

/// `SINGLE_NODE_TESTS` and `PER_TEST_INITIATOR`.
pub(crate) struct PerInitiatorState;

impl<D: Device> MainStateHandler<D> for PerInitiatorState {
    fn init(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        _arg: StateArg,
    ) -> Result<(), Error<D>> {
        let seq = pa.random_u8()?;
        let session = pa.session_mut(trx);
        let sleeping = session.initiator.sleeping;
        session.initiator = PerInitiator {
            seq_num: seq,
            peer_found: session.node.peer_found,
            sleeping,
            ..PerInitiator::new()
        };
        pa.config_per_test_parameters(trx);
        if pa.session(trx).node.main_state != MainState::PerTestInitiator {
            let params = pa.session(trx).initiator.default_params;
            pa.respond(
                trx,
                HostResponse::PerfStartConfirm {
                    status: Status::Success,
                    start_mode: START_MODE_SINGLE_NODE,
                    params: &params,
                    peer: None,
                },
            );
            return Ok(());
        }
        if pa.send_to_peer(trx, &AppMessage::PeerInfoReq).is_err() {
            pa.session_mut(trx).initiator.op_mode = OpMode::PeerInfoRspWait;
            return pa.reply_timeout(trx);
        }
        pa.start_timer(trx, Slot::ReplyWait, TIMEOUT_FOR_RESPONSE_US, Continuation::ReplyTimeout)?;
        pa.session_mut(trx).initiator.op_mode = OpMode::PeerInfoRspWait;
        Ok(())
    }

    fn task(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        let session = pa.session_mut(trx);
        if session.initiator.frames_to_transmit > 0 {
            if session.node.transmitting {
                return Ok(());
            }
            let params = session.initiator.current_params;
            let frame = &mut session.node.tx_frame;
            if let Some(dsn) = frame.get(SEQ_NUM_POS) {
                // the frame is at least a header long, the index exists
                let _ = frame.set(SEQ_NUM_POS, dsn.wrapping_add(1));
            }
            let csma = if params.csma_enabled { CsmaMode::Unslotted } else { CsmaMode::NoCsma };
            if pa.transmit_prepared(trx, csma, params.retry_enabled).is_err() {
                pa.count_test_frame(trx, TxStatus::Failure)?;
            }
            return Ok(());
        }
        if session.initiator.op_mode != OpMode::TestFramesSent {
            return Ok(());
        }
        if pa.send_to_peer(trx, &AppMessage::ResultReq).is_ok() {
            let timeout = pa.result_timeout_us(trx);
            pa.start_timer(trx, Slot::ReplyWait, timeout, Continuation::ReplyTimeout)?;
            pa.session_mut(trx).initiator.op_mode = OpMode::WaitForTestRes;
        } else {
            pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
        }
        Ok(())
    }

    fn tx_done(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        status: TxStatus,
    ) -> Result<(), Error<D>> {
        let op_mode = pa.session(trx).initiator.op_mode;
        match op_mode {
            OpMode::SetParameter => pa.set_parameter_done(trx, status),
            OpMode::CrcSetReqWait => pa.crc_set_done(trx, status),
            OpMode::WaitForTestRes if !status.is_success() => {
                pa.stop_timer(trx, Slot::ReplyWait);
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                pa.respond(
                    trx,
                    HostResponse::PerTestEndIndication(PerTestResult {
                        status: Status::UnableToContactPeer,
                        ..Default::default()
                    }),
                );
            }
            OpMode::IdentifyPeer => {
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                pa.confirm(trx, MessageId::IdentifyPeerNodeConfirm, peer_status(status));
            }
            OpMode::DisconnectPeer => {
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                pa.confirm(trx, MessageId::PeerDisconnectConfirm, peer_status(status));
                if status.is_success() {
                    return pa.app_reset(trx);
                }
            }
            OpMode::SetDefaultConfigPeer => {
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                if status.is_success() {
                    pa.config_per_test_parameters(trx);
                }
                let params = pa.session(trx).initiator.default_params;
                pa.respond(
                    trx,
                    HostResponse::SetDefaultConfigConfirm {
                        status: peer_status(status),
                        params: &params,
                    },
                );
            }
            OpMode::PerTestStart => {
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                return pa.start_test(trx);
            }
            OpMode::RangeTestStart if status.is_success() => return pa.start_range_test(trx),
            OpMode::RangeTestStart => {
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                pa.confirm(trx, MessageId::RangeTestStartConfirm, Status::UnableToContactPeer);
            }
            OpMode::RangeTestStop => {
                pa.stop_timer(trx, Slot::Range);
                let initiator = &mut pa.session_mut(trx).initiator;
                initiator.range_in_progress = false;
                initiator.range_frame_count = 0;
                initiator.op_mode = OpMode::TxOpMode;
                pa.confirm(trx, MessageId::RangeTestStopConfirm, Status::Success);
            }
            OpMode::RangeTestTx => pa.report_beacon(trx),
            OpMode::TxOpMode => return pa.count_test_frame(trx, status),
            _ => {}
        }
        Ok(())
    }

    fn rx(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        frame: &RxFrame<'_>,
    ) -> Result<(), Error<D>> {
        if !frame.crc_ok {
            return Ok(());
        }
        let Some((_, seq, msg)) = parse_app_frame(frame) else {
            return Ok(());
        };
        let op_mode = pa.session(trx).initiator.op_mode;
        match msg {
            AppMessage::ResultRsp(rsp) if op_mode == OpMode::WaitForTestRes => {
                pa.per_test_result(trx, &rsp);
            }
            AppMessage::CrcStatRsp { enabled } if op_mode == OpMode::CrcStatusReqWait => {
                pa.stop_timer(trx, Slot::ReplyWait);
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                pa.respond(
                    trx,
                    HostResponse::PerfGetConfirm {
                        status: Status::Success,
                        param_type: ParamType::CrcOnPeer as u8,
                        value: &[enabled as u8],
                    },
                );
            }
            AppMessage::PeerInfoRsp(info) if op_mode == OpMode::PeerInfoRspWait => {
                pa.stop_timer(trx, Slot::ReplyWait);
                pa.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                let params = pa.session(trx).initiator.default_params;
                pa.respond(
                    trx,
                    HostResponse::PerfStartConfirm {
                        status: Status::Success,
                        start_mode: START_MODE_PER,
                        params: &params,
                        peer: Some(&info),
                    },
                );
            }
            AppMessage::RangeTestRsp(report) if op_mode == OpMode::RangeTestTx => {
                let initiator = &mut pa.session_mut(trx).initiator;
                if initiator.last_range_seq == Some(seq) {
                    trace!("{}: repeated range response {}", trx, seq);
                    return Ok(());
                }
                initiator.last_range_seq = Some(seq);
                let fcs_len = pa.pib_fcs_len(trx);
                pa.respond(
                    trx,
                    HostResponse::RangeTestBeaconResponse {
                        mpdu: frame.mpdu,
                        fcs_len,
                        lqi_remote: report.lqi,
                        ed_remote: report.ed,
                        lqi_host: frame.lqi,
                        ed_host: frame.ed,
                    },
                );
            }
            AppMessage::RangeTestMarkerCmd if op_mode == OpMode::RangeTestTx => {
                if let Err(e) = pa.send_to_peer(trx, &AppMessage::RangeTestMarkerRsp) {
                    warn!("{}: marker response not sent: {}", trx, e);
                }
                let fcs_len = pa.pib_fcs_len(trx);
                pa.respond(
                    trx,
                    HostResponse::RangeTestMarkerIndication {
                        mpdu: frame.mpdu,
                        fcs_len,
                        lqi: frame.lqi,
                        ed: frame.ed,
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn ed_scan_done(
        &self,
        pa: &mut PerformanceAnalyzer<D>,
        trx: TransceiverId,
        level: i8,
    ) -> Result<(), Error<D>> {
        pa.ed_scan_step(trx, level);
        Ok(())
    }

    fn exit(&self, pa: &mut PerformanceAnalyzer<D>, trx: TransceiverId) -> Result<(), Error<D>> {
        pa.stop_timer(trx, Slot::ReplyWait);
        pa.stop_timer(trx, Slot::Range);
        Ok(())
    }
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Account for one completed test frame.
    pub(crate) fn count_test_frame(
        &mut self,
        trx: TransceiverId,
        status: TxStatus,
    ) -> Result<(), Error<D>> {
        let now = self.now()?;
        let initiator = &mut self.session_mut(trx).initiator;
        if initiator.frames_to_transmit == 0 {
            return Ok(());
        }
        let counters = &mut initiator.counters;
        match status {
            TxStatus::Success => {}
            TxStatus::NoAck => counters.no_ack = counters.no_ack.wrapping_add(1),
            TxStatus::ChannelAccessFailure => {
                counters.access_failure = counters.access_failure.wrapping_add(1)
            }
            TxStatus::Failure => counters.failure = counters.failure.wrapping_add(1),
        }
        initiator.frames_to_transmit -= 1;
        if now < initiator.last_time {
            initiator.rollovers += 1;
        }
        initiator.last_time = now;
        if initiator.frames_to_transmit == 0 {
            initiator.end_time = now;
            initiator.op_mode = OpMode::TestFramesSent;
            debug!("{}: all test frames sent", trx);
        }
        Ok(())
    }

    fn per_test_result(&mut self, trx: TransceiverId, rsp: &ResultRsp) {
        self.stop_timer(trx, Slot::ReplyWait);
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.op_mode = OpMode::TxOpMode;
        let params = initiator.current_params;
        let duration = initiator.test_duration_s();
        let net_data_rate = if duration > 0.0 {
            let volume = params.phy_frame_length as f32 * params.number_test_frames as f32 * 8.0;
            volume / duration / 1000.0
        } else {
            0.0
        };
        let result = PerTestResult {
            status: Status::Success,
            rssi_avg: rsp.rssi_avrg_rx as i8,
            lqi_avg: rsp.lqi_avrg_rx as u8,
            frames_transmitted: params.number_test_frames,
            frames_received: rsp.num_of_frames_rx,
            frames_failure: initiator.counters.failure,
            frames_no_ack: initiator.counters.no_ack,
            frames_access_failure: initiator.counters.access_failure,
            frames_with_wrong_crc: rsp.frames_with_wrong_crc,
            test_duration: duration,
            net_data_rate,
        };
        info!("{}: {} of {} frames received", trx, rsp.num_of_frames_rx, params.number_test_frames);
        self.respond(trx, HostResponse::PerTestEndIndication(result));
    }

    /// A request sent to the peer was not answered in time.
    pub(crate) fn reply_timeout(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if !self.session(trx).node.main_state.is_initiator() {
            return Ok(());
        }
        match self.session(trx).initiator.op_mode {
            OpMode::WaitForTestRes => self.respond(
                trx,
                HostResponse::PerTestEndIndication(PerTestResult {
                    status: Status::UnableToContactPeer,
                    ..Default::default()
                }),
            ),
            OpMode::CrcStatusReqWait => self.respond(
                trx,
                HostResponse::PerfGetConfirm {
                    status: Status::UnableToContactPeer,
                    param_type: ParamType::CrcOnPeer as u8,
                    value: &[0],
                },
            ),
            OpMode::PeerInfoRspWait => {
                let params = self.session(trx).initiator.default_params;
                self.respond(
                    trx,
                    HostResponse::PerfStartConfirm {
                        status: Status::NoPeerFound,
                        start_mode: START_MODE_PER,
                        params: &params,
                        peer: None,
                    },
                );
                self.app_reset(trx)?;
            }
            other => trace!("{}: reply timeout in {} ignored", trx, other),
        }
        self.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
        Ok(())
    }

    /// Build the test frame and arm the run.
    pub(crate) fn start_test(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if self.session(trx).initiator.op_mode != OpMode::TxOpMode {
            self.confirm(trx, MessageId::PerTestStartConfirm, Status::InvalidCmd);
            return Ok(());
        }
        let params = self.session(trx).initiator.current_params;
        let fcs_len = self.pib_fcs_len(trx) as usize;
        let filler = (params.phy_frame_length as usize).saturating_sub(FRAME_OVERHEAD + fcs_len + 1);
        let node = &self.session(trx).node;
        let (peer, dsn) = (node.peer_short_addr, node.msg_seq_num);
        let msg = AppMessage::PerTestPkt { filler };
        if self
            .prepare_frame(trx, Address::Short(peer), false, dsn, 0, &msg, params.ack_request)
            .is_err()
        {
            self.confirm(trx, MessageId::PerTestStartConfirm, Status::TransmissionFailure);
            return Ok(());
        }
        let now = self.now()?;
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.frames_to_transmit = params.number_test_frames;
        initiator.counters = TxCounters {
            no_ack: if params.ack_request { 0 } else { u32::MAX },
            access_failure: if params.csma_enabled { 0 } else { u32::MAX },
            failure: 0,
        };
        initiator.start_time = now;
        initiator.last_time = now;
        initiator.end_time = now;
        initiator.rollovers = 0;
        info!("{}: sending {} test frames", trx, params.number_test_frames);
        self.confirm(trx, MessageId::PerTestStartConfirm, Status::Success);
        Ok(())
    }

    /// `PER_TEST_START_REQ`: tell the peer to reset its counters, then start.
    pub(crate) fn initiate_per_test(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        let initiator = &self.session(trx).initiator;
        if initiator.op_mode != OpMode::TxOpMode {
            self.confirm(trx, MessageId::PerTestStartConfirm, Status::InvalidCmd);
            return Ok(());
        }
        if !initiator.peer_found {
            return self.start_test(trx);
        }
        if self.send_to_peer(trx, &AppMessage::PerTestStartPkt).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::PerTestStart;
        } else {
            self.confirm(trx, MessageId::PerTestStartConfirm, Status::UnableToContactPeer);
        }
        Ok(())
    }

    pub(crate) fn identify_peer_node(&mut self, trx: TransceiverId) {
        if self.send_to_peer(trx, &AppMessage::IdentifyNode).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::IdentifyPeer;
        } else {
            self.confirm(trx, MessageId::IdentifyPeerNodeConfirm, Status::TransmissionFailure);
        }
    }

    /// Release the peer. Without one the session restarts straight away.
    pub(crate) fn disconnect_peer_node(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if !self.session(trx).initiator.peer_found {
            self.confirm(trx, MessageId::PeerDisconnectConfirm, Status::Success);
            return self.app_reset(trx);
        }
        if self.send_to_peer(trx, &AppMessage::DisconnectNode).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::DisconnectPeer;
        } else {
            self.confirm(trx, MessageId::PeerDisconnectConfirm, Status::TransmissionFailure);
        }
        Ok(())
    }

    pub(crate) fn initiate_range_test(&mut self, trx: TransceiverId) {
        if self.session(trx).initiator.op_mode != OpMode::TxOpMode {
            self.confirm(trx, MessageId::RangeTestStartConfirm, Status::InvalidCmd);
            return;
        }
        if self.send_to_peer(trx, &AppMessage::RangeTestStartPkt).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::RangeTestStart;
        } else {
            self.confirm(trx, MessageId::RangeTestStartConfirm, Status::TransmissionFailure);
        }
    }

    fn start_range_test(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.range_in_progress = true;
        initiator.range_frame_count = 0;
        initiator.last_range_seq = None;
        initiator.op_mode = OpMode::RangeTestTx;
        self.confirm(trx, MessageId::RangeTestStartConfirm, Status::Success);
        self.start_timer(trx, Slot::Range, RANGE_TX_BEACON_START_INTERVAL_US, Continuation::RangeBeacon)
    }

    pub(crate) fn stop_range_test(&mut self, trx: TransceiverId) {
        let initiator = &self.session(trx).initiator;
        let running = initiator.op_mode == OpMode::RangeTestTx && initiator.range_in_progress;
        if running && self.send_to_peer(trx, &AppMessage::RangeTestStopPkt).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::RangeTestStop;
        } else {
            self.confirm(trx, MessageId::RangeTestStopConfirm, Status::InvalidCmd);
        }
    }

    /// Periodic beacon of a host driven range test.
    pub(crate) fn range_beacon_due(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if self.session(trx).initiator.op_mode != OpMode::RangeTestTx {
            return Ok(());
        }
        if !self.session(trx).node.transmitting {
            let session = self.session_mut(trx);
            let initiator = &mut session.initiator;
            initiator.seq_num = initiator.seq_num.wrapping_add(1);
            initiator.range_frame_count = initiator.range_frame_count.wrapping_add(1);
            let seq = initiator.seq_num;
            let report = RangeReport { frame_count: initiator.range_frame_count, ed: 0, lqi: 0 };
            let params = initiator.current_params;
            let peer = session.node.peer_short_addr;
            let dsn = session.node.msg_seq_num;
            session.node.msg_seq_num = dsn.wrapping_add(1);
            let msg = AppMessage::RangeTestPkt(report);
            let sent = self
                .prepare_frame(trx, Address::Short(peer), false, dsn, seq, &msg, params.ack_request)
                .and_then(|_| self.transmit_prepared(trx, CsmaMode::Unslotted, params.retry_enabled));
            if let Err(e) = sent {
                warn!("{}: range beacon not sent: {}", trx, e);
            }
        }
        self.start_timer(trx, Slot::Range, RANGE_TX_BEACON_INTERVAL_US, Continuation::RangeBeacon)
    }

    /// Forward a beacon that went out to the host.
    fn report_beacon(&mut self, trx: TransceiverId) {
        let fcs_len = self.pib_fcs_len(trx);
        let session = &mut self.sessions[trx.index()];
        let is_beacon = Header::decode(session.node.tx_frame.as_ref())
            .map(|(_, payload)| payload.first() == Some(&(Command::RangeTestPkt as u8)))
            .unwrap_or(false);
        if !is_beacon {
            return;
        }
        let beacon = HostResponse::RangeTestBeacon { mpdu: session.node.tx_frame.as_ref(), fcs_len };
        if let Err(e) = session.serial.queue(&beacon) {
            trace!("{}: beacon report dropped: {}", trx, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::per_mode::{RESULT_RSP_TIMEOUT_LDR_US, RESULT_RSP_TIMEOUT_US};
    use crate::analyzer::types::CH_PG_SUN;
    use crate::device::radio::types::SunModulation;
    use crate::frame::app::{PeerInfo, RangeReport};
    use crate::serial::messages::HostRequest;
    use crate::test_utils::{
        analyzer, frame_bytes, host_messages, host_request, last_sent, rx, MockDevice,
    };

    const TRX: TransceiverId = TransceiverId::Rf24;
    const PEER: u16 = 0x0BEE;

    fn from_peer(pa: &mut PerformanceAnalyzer<MockDevice>, seq: u8, msg: &AppMessage) {
        let header = Header {
            ack_request: true,
            seq: 1,
            pan_id: 0xCAFE,
            dst: Address::Short(0x0001),
            src: Address::Short(PEER),
        };
        rx(pa, TRX, &frame_bytes(&header, seq, msg));
    }

    fn paired() -> PerformanceAnalyzer<MockDevice> {
        let mut pa = analyzer();
        let node = &mut pa.session_mut(TRX).node;
        node.peer_found = true;
        node.peer_short_addr = PEER;
        pa.set_main_state(TRX, MainState::PerTestInitiator, StateArg::None).unwrap();
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::PeerInfoRspWait);
        pa.tx_frame_done(TRX, TxStatus::Success);
        from_peer(&mut pa, 1, &AppMessage::PeerInfoRsp(PeerInfo::default()));
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::TxOpMode);
        host_messages(&mut pa, TRX);
        pa
    }

    fn word(body: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
    }

    #[test]
    fn peer_info_response_confirms_the_start() {
        let mut pa = analyzer();
        let node = &mut pa.session_mut(TRX).node;
        node.peer_found = true;
        node.peer_short_addr = PEER;
        pa.set_main_state(TRX, MainState::PerTestInitiator, StateArg::None).unwrap();
        let (header, _, msg) = last_sent(&mut pa, TRX);
        assert_eq!(header.dst, Address::Short(PEER));
        assert_eq!(msg, AppMessage::PeerInfoReq);
        pa.tx_frame_done(TRX, TxStatus::Success);
        from_peer(&mut pa, 1, &AppMessage::PeerInfoRsp(PeerInfo::default()));
        let messages = host_messages(&mut pa, TRX);
        assert_eq!(messages[0][1], MessageId::PerfStartConfirm as u8);
        assert_eq!(messages[0][2], Status::Success as u8);
        assert_eq!(messages[0][3], START_MODE_PER);
    }

    #[test]
    fn unanswered_peer_info_request_resets_the_session() {
        let mut pa = analyzer();
        let node = &mut pa.session_mut(TRX).node;
        node.peer_found = true;
        node.peer_short_addr = PEER;
        pa.set_main_state(TRX, MainState::PerTestInitiator, StateArg::None).unwrap();
        pa.tx_frame_done(TRX, TxStatus::Success);
        pa.device_mut().timer.advance(TIMEOUT_FOR_RESPONSE_US);
        pa.task().unwrap();
        let messages = host_messages(&mut pa, TRX);
        assert_eq!(messages[0][1], MessageId::PerfStartConfirm as u8);
        assert_eq!(messages[0][2], Status::NoPeerFound as u8);
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);
        assert!(!pa.node(TRX).peer_found());
    }

    #[test]
    fn acknowledged_run_reports_clean_results() {
        let mut pa = paired();
        let ack_on = HostRequest::PerfSet(crate::serial::messages::ParamRequest {
            param_type: ParamType::AckRequest as u8,
            value: ParamBytes::from_slice(&[1]).unwrap(),
        });
        host_request(&mut pa, TRX, &ack_on);
        host_request(&mut pa, TRX, &HostRequest::PerTestStart);
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::PerTestStart);
        pa.tx_frame_done(TRX, TxStatus::Success);
        assert_eq!(pa.session(TRX).initiator.frames_to_transmit, 100);

        let sent_before = pa.device().radio.sent.len();
        for _ in 0..100 {
            pa.task().unwrap();
            assert!(pa.node(TRX).transmitting());
            pa.device_mut().timer.advance(1_000);
            pa.tx_frame_done(TRX, TxStatus::Success);
        }
        assert_eq!(pa.device().radio.sent.len(), sent_before + 100);
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::TestFramesSent);
        pa.task().unwrap();
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::WaitForTestRes);
        assert_eq!(last_sent(&mut pa, TRX).2, AppMessage::ResultReq);

        let rsp = ResultRsp {
            num_of_frames_rx: 100,
            lqi_avrg_rx: 250,
            rssi_avrg_rx: (-60i8) as u32,
            frames_with_wrong_crc: u32::MAX,
        };
        from_peer(&mut pa, 7, &AppMessage::ResultRsp(rsp));
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::TxOpMode);
        let messages = host_messages(&mut pa, TRX);
        let end = messages
            .iter()
            .find(|m| m[1] == MessageId::PerTestEndIndication as u8)
            .expect("end indication");
        assert_eq!(end[2], Status::Success as u8);
        assert_eq!(end[3] as i8, -60);
        assert_eq!(end[4], 250);
        assert_eq!(word(end, 5), 100);
        assert_eq!(word(end, 9), 100);
        // failures, no-acks
        assert_eq!(word(end, 13), 0);
        assert_eq!(word(end, 17), 0);
        // no CSMA, the access failure counter does not apply
        assert_eq!(word(end, 21), u32::MAX);
    }

    /// Send a one frame run and leave the initiator waiting for the result.
    fn await_result(pa: &mut PerformanceAnalyzer<MockDevice>) {
        pa.session_mut(TRX).initiator.current_params.number_test_frames = 1;
        host_request(pa, TRX, &HostRequest::PerTestStart);
        pa.tx_frame_done(TRX, TxStatus::Success);
        pa.task().unwrap();
        pa.tx_frame_done(TRX, TxStatus::Success);
        pa.task().unwrap();
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::WaitForTestRes);
        pa.tx_frame_done(TRX, TxStatus::Success);
        host_messages(pa, TRX);
    }

    fn result_timed_out(pa: &mut PerformanceAnalyzer<MockDevice>) -> bool {
        pa.task().unwrap();
        host_messages(pa, TRX).iter().any(|m| {
            m[1] == MessageId::PerTestEndIndication as u8
                && m[2] == Status::UnableToContactPeer as u8
        })
    }

    #[test]
    fn result_wait_uses_default_timeout() {
        let mut pa = paired();
        await_result(&mut pa);
        pa.device_mut().timer.advance(RESULT_RSP_TIMEOUT_US - 1);
        assert!(!result_timed_out(&mut pa));
        pa.device_mut().timer.advance(1);
        assert!(result_timed_out(&mut pa));
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::TxOpMode);
    }

    #[test]
    fn result_wait_is_longer_on_low_chip_rate_oqpsk() {
        let mut pa = paired();
        let params = &mut pa.session_mut(TRX).initiator.current_params;
        params.channel_page = CH_PG_SUN;
        params.sun_page.modulation = SunModulation::Oqpsk { rate_mode: 0, chip_rate: 0 };
        await_result(&mut pa);
        pa.device_mut().timer.advance(RESULT_RSP_TIMEOUT_US);
        assert!(!result_timed_out(&mut pa));
        pa.device_mut().timer.advance(RESULT_RSP_TIMEOUT_LDR_US - RESULT_RSP_TIMEOUT_US);
        assert!(result_timed_out(&mut pa));
    }

    #[test]
    fn test_frames_carry_consecutive_sequence_numbers() {
        let mut pa = analyzer();
        pa.set_main_state(TRX, MainState::SingleNodeTests, StateArg::None).unwrap();
        pa.start_test(TRX).unwrap();
        pa.task().unwrap();
        pa.tx_frame_done(TRX, TxStatus::Success);
        pa.task().unwrap();
        let sent = &pa.device().radio.sent;
        let (a, b) = (&sent[sent.len() - 2].mpdu, &sent[sent.len() - 1].mpdu);
        assert_eq!(b[SEQ_NUM_POS], a[SEQ_NUM_POS].wrapping_add(1));
        // 20 byte PHY frame minus the 2 byte FCS
        assert_eq!(b.len(), 18);
    }

    #[test]
    fn refused_test_frame_counts_as_failure() {
        let mut pa = analyzer();
        pa.set_main_state(TRX, MainState::SingleNodeTests, StateArg::None).unwrap();
        pa.session_mut(TRX).initiator.current_params.number_test_frames = 3;
        pa.start_test(TRX).unwrap();
        pa.device_mut().radio.refuse_tx = true;
        for _ in 0..3 {
            pa.task().unwrap();
        }
        let initiator = &pa.session(TRX).initiator;
        assert_eq!(initiator.counters.failure, 3);
        assert_eq!(initiator.op_mode, OpMode::TestFramesSent);
    }

    #[test]
    fn start_outside_idle_mode_is_rejected() {
        let mut pa = paired();
        pa.session_mut(TRX).initiator.op_mode = OpMode::WaitForTestRes;
        pa.initiate_per_test(TRX).unwrap();
        let messages = host_messages(&mut pa, TRX);
        assert_eq!(messages[0][1], MessageId::PerTestStartConfirm as u8);
        assert_eq!(messages[0][2], Status::InvalidCmd as u8);
    }

    #[test]
    fn duration_survives_clock_wrap() {
        let mut initiator = PerInitiator::new();
        initiator.start_time = u32::MAX - 499_999;
        initiator.end_time = 1_500_000;
        initiator.rollovers = 1;
        assert_eq!(initiator.test_duration_s(), 2.0);

        initiator.start_time = 1_000;
        initiator.end_time = 1_000;
        initiator.rollovers = 1;
        let full_wrap = (1u64 << 32) as f32 / 1_000_000.0;
        assert_eq!(initiator.test_duration_s(), full_wrap);
    }

    #[test]
    fn error_conditions_follow_precedence() {
        let mut initiator = PerInitiator::new();
        initiator.range_in_progress = true;
        initiator.frames_to_transmit = 1;
        assert_eq!(initiator.check_error_conditions(), Status::TransmissionUnderProgress);
        initiator.op_mode = OpMode::ContinuousTx;
        assert_eq!(initiator.check_error_conditions(), Status::CwTransmissionUnderProgress);
        initiator.sleeping = true;
        assert_eq!(initiator.check_error_conditions(), Status::TransceiverInSleep);
    }

    #[test]
    fn range_test_beacons_and_responses_reach_the_host() {
        let mut pa = paired();
        host_request(&mut pa, TRX, &HostRequest::RangeTestStart);
        assert_eq!(last_sent(&mut pa, TRX).2, AppMessage::RangeTestStartPkt);
        pa.tx_frame_done(TRX, TxStatus::Success);
        assert_eq!(pa.session(TRX).initiator.op_mode, OpMode::RangeTestTx);

        pa.device_mut().timer.advance(RANGE_TX_BEACON_START_INTERVAL_US);
        pa.task().unwrap();
        let (_, seq, msg) = last_sent(&mut pa, TRX);
        assert_eq!(msg, AppMessage::RangeTestPkt(RangeReport { frame_count: 1, ed: 0, lqi: 0 }));
        pa.tx_frame_done(TRX, TxStatus::Success);

        let report = RangeReport { frame_count: 1, ed: -40, lqi: 255 };
        from_peer(&mut pa, seq, &AppMessage::RangeTestRsp(report));
        from_peer(&mut pa, seq, &AppMessage::RangeTestRsp(report));
        let ids: std::vec::Vec<u8> = host_messages(&mut pa, TRX).iter().map(|m| m[1]).collect();
        assert_eq!(
            ids,
            [
                MessageId::RangeTestStartConfirm as u8,
                MessageId::RangeTestBeacon as u8,
                MessageId::RangeTestBeaconResponse as u8,
            ]
        );

        host_request(&mut pa, TRX, &HostRequest::RangeTestStop);
        pa.tx_frame_done(TRX, TxStatus::Success);
        assert!(!pa.session(TRX).initiator.range_in_progress);
        let messages = host_messages(&mut pa, TRX);
        assert_eq!(messages.last().unwrap()[1], MessageId::RangeTestStopConfirm as u8);
    }
}
