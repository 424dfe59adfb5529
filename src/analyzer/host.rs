//! Host link: serial polling and dispatch of host requests.

use super::types::{MainState, StateArg, Status, TransceiverId, TrxConfigParams, TrxState, CH_PG_SUN};
use super::PerformanceAnalyzer;
use crate::device::{self, Device};
use crate::serial::messages::{
    param_bytes, unknown_param_bytes, HostRequest, HostResponse, MessageId, ParamBytes, ParamType,
    START_MODE_PER, START_MODE_SINGLE_NODE, STOP_CWT,
};
use crate::Error;

fn zero_value(param_type: u8) -> ParamBytes {
    match ParamType::from_u8(param_type) {
        Some(param) => param_bytes(param, 0),
        None => unknown_param_bytes(),
    }
}

/// States in which the host link is read but requests are dropped.
fn ignores_host(state: MainState) -> bool {
    matches!(
        state,
        MainState::PeerSearchPerRx
            | MainState::PeerSearchRangeRx
            | MainState::PeerSearchRangeTx
            | MainState::PerTestReceptor
            | MainState::RangeTestTxOn
            | MainState::RangeTestTxOff
    )
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Read a chunk or parse one byte, then push out pending host messages.
    pub(crate) fn serial_task(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if self.session(trx).node.main_state.is_range_test() {
            return Ok(());
        }
        let serial = &mut self.sessions[trx.index()].serial;
        let msg = if serial.has_input() {
            serial.process_next_byte()
        } else {
            serial.fill_input(self.device.serial(trx)).map_err(device::Error::Serial)?;
            None
        };
        if let Some(msg) = msg {
            self.handle_incoming_msg(trx, &msg)?;
        }
        self.sessions[trx.index()]
            .serial
            .drain(self.device.serial(trx))
            .map_err(device::Error::Serial)?;
        Ok(())
    }

    /// Decode `msg` (`[len, PROTOCOL_ID, id, fields...]`) and act on it if the session allows.
    pub(crate) fn handle_incoming_msg(&mut self, trx: TransceiverId, msg: &[u8]) -> Result<(), Error<D>> {
        let state = self.session(trx).node.main_state;
        if ignores_host(state) {
            trace!("{}: host message ignored in {}", trx, state);
            return Ok(());
        }
        let request = match HostRequest::decode(msg) {
            Ok(request) => request,
            Err(e) => {
                trace!("{}: host message dropped: {}", trx, e);
                return Ok(());
            }
        };
        debug!("{}: host request {}", trx, request);

        let busy = self.session(trx).initiator.check_error_conditions();
        let initiator = state.is_initiator();
        // busy conditions win over a request made in the wrong state
        let refusal = |allowed: bool| {
            if busy != Status::Success {
                Some(busy)
            } else if !allowed {
                Some(Status::InvalidCmd)
            } else {
                None
            }
        };
        let per_initiator = state == MainState::PerTestInitiator;

        match request {
            HostRequest::IdentifyBoard => self.get_board_details(trx),
            HostRequest::PerfStart { start_mode } => self.perf_start(trx, state, start_mode)?,
            HostRequest::PerfSet(req) => {
                let wakeup = req.param_type == ParamType::TrxState as u8
                    && req.value.first() == Some(&(TrxState::Sleep as u8));
                let status =
                    refusal(initiator).filter(|s| !(wakeup && *s == Status::TransceiverInSleep));
                match status {
                    Some(status) => {
                        let echo = req.echo();
                        self.respond(
                            trx,
                            HostResponse::PerfSetConfirm { status, param_type: req.param_type, value: &echo },
                        );
                    }
                    None => self.perf_set_req(trx, &req)?,
                }
            }
            HostRequest::PerfGet { param_type } => match refusal(initiator) {
                Some(status) => {
                    let value = zero_value(param_type);
                    self.respond(trx, HostResponse::PerfGetConfirm { status, param_type, value: &value });
                }
                None => self.perf_get_req(trx, param_type)?,
            },
            HostRequest::IdentifyPeerNode => match refusal(per_initiator) {
                Some(status) => self.confirm(trx, MessageId::IdentifyPeerNodeConfirm, status),
                None => self.identify_peer_node(trx),
            },
            HostRequest::PerTestStart => match refusal(per_initiator) {
                Some(status) => self.confirm(trx, MessageId::PerTestStartConfirm, status),
                None => self.initiate_per_test(trx)?,
            },
            HostRequest::RangeTestStart => match refusal(per_initiator) {
                Some(status) => self.confirm(trx, MessageId::RangeTestStartConfirm, status),
                None => self.initiate_range_test(trx),
            },
            HostRequest::RangeTestStop => self.stop_range_test(trx),
            HostRequest::ContPulseTx => match refusal(initiator) {
                Some(status) => self.confirm(trx, MessageId::ContPulseTxConfirm, status),
                None => self.pulse_cw_transmission(trx)?,
            },
            HostRequest::ContWaveTx { start_stop, tx_mode } => {
                let matching_stop = start_stop == STOP_CWT
                    && self.session(trx).initiator.cw_tx_mode == Some(tx_mode);
                let status = refusal(initiator)
                    .filter(|s| !(matching_stop && *s == Status::CwTransmissionUnderProgress));
                match status {
                    Some(status) => self.respond(
                        trx,
                        HostResponse::ContWaveTxConfirm { status, start_stop, tx_mode },
                    ),
                    None => self.cont_wave_tx(trx, start_stop, tx_mode),
                }
            }
            HostRequest::RegisterRead { addr } => match refusal(initiator) {
                Some(status) => {
                    self.respond(trx, HostResponse::RegisterReadConfirm { status, addr, value: 0 })
                }
                None => self.read_trx_registers(trx, addr)?,
            },
            HostRequest::RegisterWrite { addr, value } => match refusal(initiator) {
                Some(status) => {
                    self.respond(trx, HostResponse::RegisterWriteConfirm { status, addr, value })
                }
                None => self.write_trx_registers(trx, addr, value)?,
            },
            HostRequest::RegisterDump { start, end } => match refusal(initiator) {
                Some(status) => self.respond(
                    trx,
                    HostResponse::RegisterDumpConfirm { status, start, end, values: &[] },
                ),
                None => self.dump_trx_register_values(trx, start, end),
            },
            HostRequest::EdScanStart { scan_duration, channel_mask } => {
                let status = if self.pib_page(trx) == CH_PG_SUN {
                    Some(Status::InvalidCmd)
                } else {
                    refusal(initiator)
                };
                match status {
                    Some(status) => self.respond(
                        trx,
                        HostResponse::EdScanStartConfirm { status, scan_time_min: 0, scan_time_sec: 0.0 },
                    ),
                    None => self.start_ed_scan(trx, scan_duration, channel_mask),
                }
            }
            HostRequest::SensorData => match refusal(initiator) {
                Some(status) => self.respond(
                    trx,
                    HostResponse::SensorDataConfirm { status, battery_voltage: 0.0, temperature: 0.0 },
                ),
                None => self.get_sensor_data(trx),
            },
            HostRequest::SetDefaultConfig => match refusal(initiator) {
                Some(status) => {
                    let params = TrxConfigParams::zeroed();
                    self.respond(trx, HostResponse::SetDefaultConfigConfirm { status, params: &params });
                }
                None => self.set_default_configuration(trx),
            },
            HostRequest::GetCurrentConfig => match refusal(initiator) {
                Some(status) => {
                    let params = TrxConfigParams::zeroed();
                    self.respond(trx, HostResponse::GetCurrentConfigConfirm { status, params: &params });
                }
                None => self.get_current_configuration(trx),
            },
            HostRequest::PeerDisconnect => match refusal(true) {
                Some(status) => self.confirm(trx, MessageId::PeerDisconnectConfirm, status),
                None => self.disconnect_peer_node(trx)?,
            },
        }
        Ok(())
    }

    fn perf_start(&mut self, trx: TransceiverId, state: MainState, start_mode: u8) -> Result<(), Error<D>> {
        let status = match (state, start_mode) {
            (MainState::WaitForEvent, START_MODE_PER) => {
                return self.set_main_state(trx, MainState::PeerSearchPerTx, StateArg::None);
            }
            (MainState::WaitForEvent, START_MODE_SINGLE_NODE) => {
                return self.set_main_state(trx, MainState::SingleNodeTests, StateArg::None);
            }
            (MainState::WaitForEvent, _) => Status::InvalidArgument,
            _ => Status::InvalidCmd,
        };
        let params = TrxConfigParams::zeroed();
        self.respond(
            trx,
            HostResponse::PerfStartConfirm { status, start_mode, params: &params, peer: None },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::messages::{ParamRequest, START_CWT};
    use crate::serial::{EOT, SOT};
    use crate::test_utils::{analyzer, host_bytes, host_messages, host_request, MockDevice};

    const TRX: TransceiverId = TransceiverId::Rf09;

    fn single_node() -> PerformanceAnalyzer<MockDevice> {
        let mut pa = analyzer();
        host_request(&mut pa, TRX, &HostRequest::PerfStart { start_mode: START_MODE_SINGLE_NODE });
        assert_eq!(pa.main_state(TRX), MainState::SingleNodeTests);
        host_messages(&mut pa, TRX);
        pa
    }

    fn reply(pa: &mut PerformanceAnalyzer<MockDevice>, request: &HostRequest) -> std::vec::Vec<u8> {
        host_request(pa, TRX, request);
        host_messages(pa, TRX).pop().expect("reply")
    }

    #[test]
    fn board_identity_is_answered_while_idle() {
        let mut pa = analyzer();
        let confirm = reply(&mut pa, &HostRequest::IdentifyBoard);
        assert_eq!(confirm[1..3], [MessageId::IdentifyBoardConfirm as u8, Status::Success as u8]);
    }

    #[test]
    fn start_modes() {
        let mut pa = analyzer();
        let confirm = reply(&mut pa, &HostRequest::PerfStart { start_mode: 7 });
        assert_eq!(confirm[1..4], [MessageId::PerfStartConfirm as u8, Status::InvalidArgument as u8, 7]);
        assert_eq!(pa.main_state(TRX), MainState::WaitForEvent);

        let confirm = reply(&mut pa, &HostRequest::PerfStart { start_mode: START_MODE_SINGLE_NODE });
        assert_eq!(confirm[2], Status::Success as u8);
        assert_eq!(pa.main_state(TRX), MainState::SingleNodeTests);

        let confirm = reply(&mut pa, &HostRequest::PerfStart { start_mode: START_MODE_SINGLE_NODE });
        assert_eq!(confirm[2], Status::InvalidCmd as u8);
    }

    #[test]
    fn configuration_needs_a_started_session() {
        let mut pa = analyzer();
        let req = ParamRequest { param_type: ParamType::Csma as u8, value: ParamBytes::from_slice(&[1]).unwrap() };
        let confirm = reply(&mut pa, &HostRequest::PerfSet(req));
        assert_eq!(confirm[1..6], [MessageId::PerfSetConfirm as u8, Status::InvalidCmd as u8, 0x04, 1, 1]);
        let confirm = reply(&mut pa, &HostRequest::RegisterRead { addr: 0x0105 });
        assert_eq!(confirm[1..3], [MessageId::RegisterReadConfirm as u8, Status::InvalidCmd as u8]);
    }

    #[test]
    fn peer_commands_need_a_peer_session() {
        let mut pa = single_node();
        for (request, id) in [
            (HostRequest::IdentifyPeerNode, MessageId::IdentifyPeerNodeConfirm),
            (HostRequest::PerTestStart, MessageId::PerTestStartConfirm),
            (HostRequest::RangeTestStart, MessageId::RangeTestStartConfirm),
        ] {
            let confirm = reply(&mut pa, &request);
            assert_eq!(confirm[1..3], [id as u8, Status::InvalidCmd as u8]);
        }
    }

    #[test]
    fn receptor_ignores_the_host() {
        let mut pa = analyzer();
        pa.set_main_state(TRX, MainState::PerTestReceptor, StateArg::None).unwrap();
        host_request(&mut pa, TRX, &HostRequest::IdentifyBoard);
        assert!(host_messages(&mut pa, TRX).is_empty());
    }

    #[test]
    fn foreign_protocol_is_dropped() {
        let mut pa = analyzer();
        host_bytes(&mut pa, TRX, &[SOT, 2, 0x01, MessageId::IdentifyBoardReq as u8, EOT]);
        assert!(host_messages(&mut pa, TRX).is_empty());
        // the parser resynchronises on the next frame
        host_request(&mut pa, TRX, &HostRequest::IdentifyBoard);
        assert_eq!(host_messages(&mut pa, TRX).len(), 1);
    }

    #[test]
    fn only_the_matching_stop_ends_a_carrier() {
        let mut pa = single_node();
        let confirm = reply(&mut pa, &HostRequest::ContWaveTx { start_stop: START_CWT, tx_mode: 1 });
        assert_eq!(confirm[2], Status::Success as u8);

        let confirm = reply(&mut pa, &HostRequest::RegisterRead { addr: 0x0105 });
        assert_eq!(confirm[2], Status::CwTransmissionUnderProgress as u8);
        let confirm = reply(&mut pa, &HostRequest::ContWaveTx { start_stop: STOP_CWT, tx_mode: 0 });
        assert_eq!(confirm[2], Status::CwTransmissionUnderProgress as u8);
        assert!(pa.device().radio.continuous[TRX.index()].is_some());

        let confirm = reply(&mut pa, &HostRequest::ContWaveTx { start_stop: STOP_CWT, tx_mode: 1 });
        assert_eq!(confirm[1..5], [MessageId::ContWaveTxConfirm as u8, Status::Success as u8, STOP_CWT, 1]);
        assert!(pa.device().radio.continuous[TRX.index()].is_none());
    }

    #[test]
    fn sleeping_radio_only_accepts_the_wakeup() {
        let mut pa = single_node();
        let sleep = |state: TrxState| {
            HostRequest::PerfSet(ParamRequest {
                param_type: ParamType::TrxState as u8,
                value: ParamBytes::from_slice(&[state as u8]).unwrap(),
            })
        };
        assert_eq!(reply(&mut pa, &sleep(TrxState::Sleep))[2], Status::Success as u8);
        let confirm = reply(&mut pa, &HostRequest::SensorData);
        assert_eq!(confirm[1..3], [MessageId::SensorDataConfirm as u8, Status::TransceiverInSleep as u8]);
        let confirm = reply(&mut pa, &HostRequest::PeerDisconnect);
        assert_eq!(confirm[1..3], [MessageId::PeerDisconnectConfirm as u8, Status::TransceiverInSleep as u8]);
        assert_eq!(reply(&mut pa, &sleep(TrxState::Sleep))[2], Status::Success as u8);
        assert_eq!(reply(&mut pa, &HostRequest::SensorData)[2], Status::Success as u8);
    }

    #[test]
    fn running_scan_blocks_configuration() {
        let mut pa = single_node();
        let confirm = reply(&mut pa, &HostRequest::EdScanStart { scan_duration: 2, channel_mask: None });
        assert_eq!(confirm[2], Status::Success as u8);
        let channel = pa.current_params(TRX).channel;
        let req = ParamRequest {
            param_type: ParamType::Channel as u8,
            value: ParamBytes::from_slice(&[channel as u8 + 1, 0]).unwrap(),
        };
        let confirm = reply(&mut pa, &HostRequest::PerfSet(req));
        assert_eq!(confirm[1..3], [MessageId::PerfSetConfirm as u8, Status::EdScanUnderProgress as u8]);
        assert_eq!(pa.current_params(TRX).channel, channel);
    }

    #[test]
    fn energy_scan_is_refused_on_sun_pages() {
        let mut pa = single_node();
        pa.device_mut().radio.pib[TRX.index()].page = CH_PG_SUN;
        let confirm = reply(&mut pa, &HostRequest::EdScanStart { scan_duration: 2, channel_mask: None });
        assert_eq!(confirm[1..3], [MessageId::EdScanStartConfirm as u8, Status::InvalidCmd as u8]);
        assert!(pa.device().radio.ed_scans.is_empty());
    }

    #[test]
    fn sensor_readings_are_reported() {
        let mut pa = single_node();
        pa.device_mut().battery = 3.25;
        let confirm = reply(&mut pa, &HostRequest::SensorData);
        let volts = crate::frame::reverse_float(f32::from_le_bytes([confirm[3], confirm[4], confirm[5], confirm[6]]));
        assert_eq!(volts, 3.25);
    }

    #[test]
    fn serial_driver_failure_reaches_the_caller() {
        let mut pa = analyzer();
        pa.device_mut().serial[TRX.index()].broken = true;
        let err = pa.task().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Device(device::Error::Serial(crate::test_utils::MockError::Refused))
        ));
    }
}
