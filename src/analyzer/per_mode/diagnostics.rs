//! Radio diagnostics under host control: energy scan, carrier transmission,
//! register access and board sensors.

use heapless::Vec;

use super::{OpMode, MAX_REG_ADDRESS, MAX_SCAN_DURATION, PULSE_CW_US};
use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::types::{Status, TransceiverId};
use crate::analyzer::PerformanceAnalyzer;
use crate::device::radio::types::{ContinuousTxMode, PibValue};
use crate::device::radio::Radio;
use crate::device::{self, Device};
use crate::serial::messages::{HostResponse, MessageId, START_CWT, STOP_CWT};
use crate::serial::SIO_TX_BUF_SIZE;
use crate::Error;

/// Symbols per base scan period.
const ED_SCAN_BASE_SYMBOLS: f32 = 960.0;
/// Framing, status, both addresses and the count byte of a dump confirm.
const MAX_REG_DUMP: usize = SIO_TX_BUF_SIZE - 10;

/// An energy scan walking the channels of a mask.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EdScan {
    remaining: u32,
    current: u8,
    duration: u8,
    channel_before: u16,
    results: Vec<(u8, i8), 32>,
}

fn first_channel(mask: u32) -> Option<u8> {
    (mask != 0).then(|| mask.trailing_zeros() as u8)
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// `ED_SCAN_START_REQ`. Without a mask every supported channel is scanned.
    pub(crate) fn start_ed_scan(&mut self, trx: TransceiverId, duration: u8, mask: Option<u32>) {
        let supported = self.pib_channels_supported(trx);
        let channels = mask.unwrap_or(supported) & supported;
        let Some(first) = first_channel(channels).filter(|_| duration <= MAX_SCAN_DURATION) else {
            self.respond(
                trx,
                HostResponse::EdScanStartConfirm {
                    status: Status::ValueOutOfRange,
                    scan_time_min: 0,
                    scan_time_sec: 0.0,
                },
            );
            return;
        };
        let symbol_us = self.symbol_duration_us(trx) as f32;
        let periods = ((1u32 << duration) + 1) as f32;
        let seconds = ED_SCAN_BASE_SYMBOLS * periods * symbol_us * channels.count_ones() as f32 / 1_000_000.0;
        let (scan_time_min, scan_time_sec) = if seconds >= 60.0 {
            let minutes = (seconds / 60.0) as u8;
            (minutes, seconds - minutes as f32 * 60.0)
        } else {
            (0, seconds)
        };
        self.respond(
            trx,
            HostResponse::EdScanStartConfirm { status: Status::Success, scan_time_min, scan_time_sec },
        );
        info!("{}: scanning {} channels", trx, channels.count_ones());
        let channel_before = self.pib_channel(trx);
        self.session_mut(trx).initiator.ed_scan = Some(EdScan {
            remaining: channels,
            current: first,
            duration,
            channel_before,
            results: Vec::new(),
        });
        self.scan_channel(trx, first, duration);
    }

    fn scan_channel(&mut self, trx: TransceiverId, channel: u8, duration: u8) {
        self.set_pib(trx, PibValue::CurrentChannel(channel as u16));
        if let Err(e) = self.device.radio().start_ed_scan(trx, duration) {
            warn!("{}: scan of channel {} refused: {}", trx, channel, e);
            self.finish_ed_scan(trx);
        }
    }

    /// Record the level of the channel just scanned and move on.
    pub(crate) fn ed_scan_step(&mut self, trx: TransceiverId, level: i8) {
        let Some(scan) = self.session_mut(trx).initiator.ed_scan.as_mut() else {
            trace!("{}: unexpected scan result", trx);
            return;
        };
        if scan.results.push((scan.current, level)).is_err() {
            warn!("{}: scan result of channel {} dropped", trx, scan.current);
        }
        scan.remaining &= !(1u32 << scan.current);
        match first_channel(scan.remaining) {
            Some(next) => {
                scan.current = next;
                let duration = scan.duration;
                self.scan_channel(trx, next, duration);
            }
            None => self.finish_ed_scan(trx),
        }
    }

    fn finish_ed_scan(&mut self, trx: TransceiverId) {
        let Some(scan) = self.session_mut(trx).initiator.ed_scan.take() else {
            return;
        };
        self.set_pib(trx, PibValue::CurrentChannel(scan.channel_before));
        self.respond(trx, HostResponse::EdScanEndIndication { results: &scan.results });
    }

    /// `CONT_PULSE_TX_REQ`: a short burst of unmodulated carrier.
    pub(crate) fn pulse_cw_transmission(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if let Err(e) = self.device.radio().start_continuous_tx(trx, ContinuousTxMode::Cw) {
            warn!("{}: carrier refused: {}", trx, e);
            self.confirm(trx, MessageId::ContPulseTxConfirm, Status::TransmissionFailure);
            return Ok(());
        }
        self.session_mut(trx).initiator.op_mode = OpMode::ContinuousTx;
        self.start_timer(trx, Slot::App, PULSE_CW_US, Continuation::StopPulse)
    }

    pub(crate) fn stop_pulse_cw(&mut self, trx: TransceiverId) -> Result<(), Error<D>> {
        if self.session(trx).initiator.op_mode != OpMode::ContinuousTx {
            return Ok(());
        }
        self.stop_continuous(trx);
        self.confirm(trx, MessageId::ContPulseTxConfirm, Status::Success);
        Ok(())
    }

    fn stop_continuous(&mut self, trx: TransceiverId) {
        if let Err(e) = self.device.radio().stop_continuous_tx(trx) {
            warn!("{}: carrier not stopped: {}", trx, e);
        }
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.op_mode = OpMode::TxOpMode;
        initiator.cw_tx_mode = None;
        self.recover_settings(trx);
    }

    /// `CONT_WAVE_TX_REQ`: start or stop a carrier until told otherwise.
    pub(crate) fn cont_wave_tx(&mut self, trx: TransceiverId, start_stop: u8, tx_mode: u8) {
        let status = match (start_stop, ContinuousTxMode::from_u8(tx_mode)) {
            (START_CWT, Some(mode)) => match self.device.radio().start_continuous_tx(trx, mode) {
                Ok(()) => {
                    let initiator = &mut self.session_mut(trx).initiator;
                    initiator.op_mode = OpMode::ContinuousTx;
                    initiator.cw_tx_mode = Some(tx_mode);
                    Status::Success
                }
                Err(e) => {
                    warn!("{}: continuous transmission refused: {}", trx, e);
                    Status::TransmissionFailure
                }
            },
            (STOP_CWT, _) => {
                self.stop_continuous(trx);
                Status::Success
            }
            _ => Status::InvalidArgument,
        };
        self.respond(trx, HostResponse::ContWaveTxConfirm { status, start_stop, tx_mode });
    }

    pub(crate) fn read_trx_registers(&mut self, trx: TransceiverId, addr: u16) -> Result<(), Error<D>> {
        let (status, value) = if addr > MAX_REG_ADDRESS {
            (Status::ValueOutOfRange, 0)
        } else {
            let value = self.device.radio().read_register(addr).map_err(device::Error::Radio)?;
            (Status::Success, value)
        };
        self.respond(trx, HostResponse::RegisterReadConfirm { status, addr, value });
        Ok(())
    }

    pub(crate) fn write_trx_registers(
        &mut self,
        trx: TransceiverId,
        addr: u16,
        value: u8,
    ) -> Result<(), Error<D>> {
        let status = if addr > MAX_REG_ADDRESS {
            Status::ValueOutOfRange
        } else {
            self.device.radio().write_register(addr, value).map_err(device::Error::Radio)?;
            Status::Success
        };
        self.respond(trx, HostResponse::RegisterWriteConfirm { status, addr, value });
        Ok(())
    }

    pub(crate) fn dump_trx_register_values(&mut self, trx: TransceiverId, start: u16, end: u16) {
        let mut values = [0u8; MAX_REG_DUMP];
        let status = if end < start {
            Status::InvalidRegisterOrder
        } else if end > MAX_REG_ADDRESS || (end - start) as usize >= MAX_REG_DUMP {
            Status::ValueOutOfRange
        } else {
            let count = (end - start) as usize + 1;
            match self.device.radio().dump_registers(start, end, &mut values[..count]) {
                Ok(()) => {
                    self.respond(
                        trx,
                        HostResponse::RegisterDumpConfirm {
                            status: Status::Success,
                            start,
                            end,
                            values: &values[..count],
                        },
                    );
                    return;
                }
                Err(e) => {
                    warn!("{}: register dump failed: {}", trx, e);
                    Status::ValueOutOfRange
                }
            }
        };
        self.respond(trx, HostResponse::RegisterDumpConfirm { status, start, end, values: &[] });
    }

    pub(crate) fn get_sensor_data(&mut self, trx: TransceiverId) {
        let battery_voltage = self.device.battery_voltage();
        let temperature = self.device.temperature();
        self.respond(
            trx,
            HostResponse::SensorDataConfirm { status: Status::Success, battery_voltage, temperature },
        );
    }

    pub(crate) fn get_board_details(&mut self, trx: TransceiverId) {
        let info = self.own_peer_info(trx);
        self.respond(trx, HostResponse::IdentifyBoardConfirm { status: Status::Success, info: &info });
    }
}
