//! Test configuration: `PERF_SET_REQ`, `PERF_GET_REQ` and the default set.

use super::initiator::PendingParam;
use super::{OpMode, MAX_TX_PWR_REG, RX_DESENSITIZE_LEVEL, TIMEOUT_FOR_RESPONSE_US};
use crate::analyzer::scheduler::{Continuation, Slot};
use crate::analyzer::types::{Status, TransceiverId, TrxConfigParams, CH_PG_SUN, VALID_CHANNEL_PAGES};
use crate::analyzer::PerformanceAnalyzer;
use crate::device::radio::types::{PibValue, SunModulation, SunPhyPage, TrxState, TxStatus};
use crate::device::radio::Radio;
use crate::device::Device;
use crate::frame::app::{parse_sun_page, sun_page_bytes, AppMessage, RemoteParam};
use crate::frame::{FRAME_OVERHEAD, MAX_PSDU, MAX_PSDU_LEGACY};
use crate::serial::messages::{param_bytes, HostResponse, ParamRequest, ParamType};
use crate::Error;

const MAX_LEGACY_CHANNEL: u16 = 32;

// SUN PHY option limits
const OFDM_OPT_3: u8 = 2;
const OFDM_OPT_4: u8 = 3;
const MCS1: u8 = 1;
const MCS2: u8 = 2;
const MCS6: u8 = 6;
const OQPSK_RATE_MOD_3: u8 = 3;
const OQPSK_RATE_MOD_4: u8 = 4;
const CHIP_RATE_2000: u8 = 3;
const FSK_OP_MOD_3: u8 = 2;
const OQPSK_DATA_RATE_1000: u8 = 2;
const CHINA_470: u8 = 2;
const JAPAN_920: u8 = 9;

fn host_param(param: RemoteParam) -> ParamType {
    match param {
        RemoteParam::Channel => ParamType::Channel,
        RemoteParam::ChannelPage => ParamType::ChannelPage,
        RemoteParam::TxPowerReg => ParamType::TxPowerReg,
        RemoteParam::TxPowerDbm => ParamType::TxPowerDbm,
    }
}

/// Whether the radio accepts this SUN PHY combination.
pub(crate) fn sun_page_supported(page: &SunPhyPage) -> bool {
    match page.modulation {
        SunModulation::Ofdm { option, mcs, .. } => {
            !(mcs > MCS6
                || option > OFDM_OPT_4
                || (option == OFDM_OPT_3 && mcs < MCS1)
                || (option == OFDM_OPT_4 && mcs < MCS2)
                || (page.freq_band == CHINA_470 && option < OFDM_OPT_4))
        }
        SunModulation::Oqpsk { rate_mode, chip_rate } => {
            !((rate_mode > OQPSK_RATE_MOD_4 && chip_rate > CHIP_RATE_2000)
                || (rate_mode > OQPSK_RATE_MOD_3 && chip_rate < CHIP_RATE_2000))
        }
        SunModulation::Fsk { op_mode, .. } => !(op_mode > FSK_OP_MOD_3 && page.freq_band != JAPAN_920),
        SunModulation::LegacyOqpsk { data_rate, chip_rate } => {
            !(chip_rate > CHIP_RATE_2000 && data_rate > OQPSK_DATA_RATE_1000)
        }
    }
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    /// Reset default and current test parameters and push them to the radio.
    pub(crate) fn config_per_test_parameters(&mut self, trx: TransceiverId) {
        let channel = self.config.default_channel(trx);
        let page = self.config.default_page(trx);
        let dbm = self.config.default_tx_power_dbm();
        self.set_pib(trx, PibValue::CurrentPage(page));
        self.set_pib(trx, PibValue::CurrentChannel(channel));
        self.set_pib(trx, PibValue::TransmitPower(dbm));
        let tx_power_reg = self.tx_power_reg(trx);
        let sun_page = if page == CH_PG_SUN { self.pib_phy_setting(trx) } else { SunPhyPage::default() };
        let trx_state = if self.session(trx).node.peer_found { TrxState::RxOn } else { TrxState::TrxOff };
        let params = TrxConfigParams {
            channel,
            channel_page: page,
            tx_power_reg,
            tx_power_dbm: dbm,
            trx_state,
            sun_page,
            ..Default::default()
        };
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.default_params = params;
        initiator.current_params = params;
    }

    fn set_confirm(&mut self, trx: TransceiverId, status: Status, param: ParamType, value: u32) {
        let value = param_bytes(param, value);
        self.respond(trx, HostResponse::PerfSetConfirm { status, param_type: param as u8, value: &value });
    }

    fn get_confirm(&mut self, trx: TransceiverId, status: Status, param: ParamType, value: u32) {
        let value = param_bytes(param, value);
        self.respond(trx, HostResponse::PerfGetConfirm { status, param_type: param as u8, value: &value });
    }

    /// Legacy O-QPSK rules apply to channel and frame length.
    fn legacy_phy(&mut self, trx: TransceiverId) -> bool {
        self.pib_page(trx) != CH_PG_SUN
            || matches!(self.pib_phy_setting(trx).modulation, SunModulation::LegacyOqpsk { .. })
    }

    pub(crate) fn perf_set_req(
        &mut self,
        trx: TransceiverId,
        req: &ParamRequest,
    ) -> Result<(), Error<D>> {
        let Some(param) = ParamType::from_u8(req.param_type) else {
            let echo = req.echo();
            self.respond(
                trx,
                HostResponse::PerfSetConfirm {
                    status: Status::InvalidArgument,
                    param_type: req.param_type,
                    value: &echo,
                },
            );
            return Ok(());
        };
        let value = req.value_u32();
        let flag = value & 0xFF != 0;
        match param {
            ParamType::Channel => self.set_channel(trx, value as u16),
            ParamType::ChannelPage if req.value.len() > 1 => self.perf_set_sun_page(trx, req),
            ParamType::ChannelPage => self.set_channel_page(trx, value as u8),
            ParamType::TxPowerReg => self.set_tx_power_reg(trx, value as u8),
            ParamType::TxPowerDbm => self.set_tx_power_dbm(trx, value as u8 as i8),
            ParamType::Csma => {
                self.session_mut(trx).initiator.current_params.csma_enabled = flag;
                self.set_confirm(trx, Status::Success, param, flag as u32);
            }
            ParamType::FrameRetry => {
                self.session_mut(trx).initiator.current_params.retry_enabled = flag;
                self.set_confirm(trx, Status::Success, param, flag as u32);
            }
            ParamType::AckRequest => {
                self.session_mut(trx).initiator.current_params.ack_request = flag;
                self.set_confirm(trx, Status::Success, param, flag as u32);
            }
            ParamType::Desensitization => {
                let level = if flag { RX_DESENSITIZE_LEVEL } else { 0 };
                if let Err(e) = self.device.radio().set_rx_sensitivity(trx, level) {
                    warn!("{}: sensitivity not changed: {}", trx, e);
                }
                self.session_mut(trx).initiator.current_params.rx_desensitize = flag;
                self.set_confirm(trx, Status::Success, param, flag as u32);
            }
            ParamType::CrcOnPeer => self.config_crc_peer_node(trx, flag),
            ParamType::TrxState => self.set_transceiver_state(trx, value as u8),
            ParamType::NoOfTestFrames if value == 0 => {
                self.set_confirm(trx, Status::ValueOutOfRange, param, value)
            }
            ParamType::NoOfTestFrames => {
                self.session_mut(trx).initiator.current_params.number_test_frames = value;
                self.set_confirm(trx, Status::Success, param, value);
            }
            ParamType::PhyFrameLength => self.set_phy_frame_length(trx, value as u16),
            ParamType::Rpc | ParamType::IsmFrequency => {
                self.set_confirm(trx, Status::Success, param, value)
            }
            ParamType::AntennaDiversity | ParamType::AntennaDiversityOnPeer => {
                self.set_confirm(trx, Status::InvalidArgument, param, value)
            }
        }
        Ok(())
    }

    /// Ask the peer to change `param` first. The local change follows its acknowledgement.
    fn set_on_peer(&mut self, trx: TransceiverId, param: RemoteParam, value: u16) {
        let msg = AppMessage::SetParam { param_type: param as u8, value };
        if self.send_to_peer(trx, &msg).is_ok() {
            let initiator = &mut self.session_mut(trx).initiator;
            initiator.pending = Some(PendingParam::Remote { param, value });
            initiator.op_mode = OpMode::SetParameter;
        } else {
            self.set_confirm(trx, Status::TransmissionFailure, host_param(param), value as u32);
        }
    }

    fn set_channel(&mut self, trx: TransceiverId, channel: u16) {
        let valid = if self.legacy_phy(trx) {
            let supported = self.pib_channels_supported(trx);
            channel < MAX_LEGACY_CHANNEL && supported & (1 << channel) != 0
        } else {
            channel < self.pib_sun_channel_count(trx)
        };
        if !valid {
            self.set_confirm(trx, Status::ValueOutOfRange, ParamType::Channel, channel as u32);
        } else if self.session(trx).node.peer_found {
            self.set_on_peer(trx, RemoteParam::Channel, channel);
        } else {
            self.apply_channel(trx, channel);
            self.set_confirm(trx, Status::Success, ParamType::Channel, channel as u32);
        }
    }

    fn set_channel_page(&mut self, trx: TransceiverId, page: u8) {
        if !VALID_CHANNEL_PAGES.contains(&page) {
            self.set_confirm(trx, Status::ValueOutOfRange, ParamType::ChannelPage, page as u32);
        } else if self.session(trx).node.peer_found {
            self.set_on_peer(trx, RemoteParam::ChannelPage, page as u16);
        } else {
            self.apply_channel_page(trx, page);
            self.set_confirm(trx, Status::Success, ParamType::ChannelPage, page as u32);
        }
    }

    fn set_tx_power_reg(&mut self, trx: TransceiverId, reg: u8) {
        if reg > MAX_TX_PWR_REG {
            self.set_confirm(trx, Status::ValueOutOfRange, ParamType::TxPowerReg, reg as u32);
        } else if self.session(trx).node.peer_found {
            self.set_on_peer(trx, RemoteParam::TxPowerReg, reg as u16);
        } else {
            self.apply_tx_power_reg(trx, reg);
            self.set_confirm(trx, Status::Success, ParamType::TxPowerReg, reg as u32);
        }
    }

    fn set_tx_power_dbm(&mut self, trx: TransceiverId, dbm: i8) {
        let min = self.reg_to_dbm(trx, 0);
        let max = self.reg_to_dbm(trx, MAX_TX_PWR_REG);
        let raw = dbm as u8 as u32;
        if !(min..=max).contains(&dbm) {
            self.set_confirm(trx, Status::ValueOutOfRange, ParamType::TxPowerDbm, raw);
        } else if self.session(trx).node.peer_found {
            self.set_on_peer(trx, RemoteParam::TxPowerDbm, dbm as u8 as u16);
        } else {
            self.apply_tx_power_dbm(trx, dbm);
            self.set_confirm(trx, Status::Success, ParamType::TxPowerDbm, raw);
        }
    }

    fn apply_channel(&mut self, trx: TransceiverId, channel: u16) {
        self.set_pib(trx, PibValue::CurrentChannel(channel));
        let dbm = self.pib_tx_power_dbm(trx);
        let params = &mut self.session_mut(trx).initiator.current_params;
        params.channel = channel;
        params.tx_power_dbm = dbm;
    }

    fn apply_channel_page(&mut self, trx: TransceiverId, page: u8) {
        self.set_pib(trx, PibValue::CurrentPage(page));
        let channel = self.pib_channel(trx);
        let params = &mut self.session_mut(trx).initiator.current_params;
        params.channel_page = page;
        params.channel = channel;
        if page != CH_PG_SUN && params.phy_frame_length as usize > MAX_PSDU_LEGACY {
            params.phy_frame_length = MAX_PSDU_LEGACY as u16;
        }
    }

    fn apply_tx_power_reg(&mut self, trx: TransceiverId, reg: u8) {
        let dbm = self.reg_to_dbm(trx, reg);
        self.set_pib(trx, PibValue::TransmitPower(dbm));
        let params = &mut self.session_mut(trx).initiator.current_params;
        params.tx_power_reg = reg;
        params.tx_power_dbm = dbm;
    }

    fn apply_tx_power_dbm(&mut self, trx: TransceiverId, dbm: i8) {
        self.set_pib(trx, PibValue::TransmitPower(dbm));
        let reg = self.tx_power_reg(trx);
        let params = &mut self.session_mut(trx).initiator.current_params;
        params.tx_power_dbm = dbm;
        params.tx_power_reg = reg;
    }

    fn apply_sun_page(&mut self, trx: TransceiverId, page: SunPhyPage) -> bool {
        if !self.set_pib(trx, PibValue::PhySetting(page)) {
            return false;
        }
        self.set_pib(trx, PibValue::CurrentPage(CH_PG_SUN));
        let channel = self.pib_channel(trx);
        let params = &mut self.session_mut(trx).initiator.current_params;
        params.channel_page = CH_PG_SUN;
        params.channel = channel;
        params.sun_page = page;
        true
    }

    /// Channel page request carrying a full SUN PHY descriptor.
    fn perf_set_sun_page(&mut self, trx: TransceiverId, req: &ParamRequest) {
        let echo = req.value.clone();
        let page = match parse_sun_page(&req.value) {
            Ok(page) if sun_page_supported(&page) => page,
            _ => {
                self.respond(
                    trx,
                    HostResponse::PerfSetConfirm {
                        status: Status::InvalidValue,
                        param_type: ParamType::ChannelPage as u8,
                        value: &echo,
                    },
                );
                return;
            }
        };
        if self.session(trx).node.peer_found {
            if self.send_to_peer(trx, &AppMessage::SetSunPage(page)).is_ok() {
                let initiator = &mut self.session_mut(trx).initiator;
                initiator.pending = Some(PendingParam::SunPage { page, echo });
                initiator.op_mode = OpMode::SetParameter;
                return;
            }
            self.respond(
                trx,
                HostResponse::PerfSetConfirm {
                    status: Status::TransmissionFailure,
                    param_type: ParamType::ChannelPage as u8,
                    value: &echo,
                },
            );
            return;
        }
        let status = if self.apply_sun_page(trx, page) { Status::Success } else { Status::InvalidValue };
        self.respond(
            trx,
            HostResponse::PerfSetConfirm { status, param_type: ParamType::ChannelPage as u8, value: &echo },
        );
    }

    /// The peer acknowledged, or failed to acknowledge, a parameter change.
    pub(crate) fn set_parameter_done(&mut self, trx: TransceiverId, status: TxStatus) {
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.op_mode = OpMode::TxOpMode;
        match initiator.pending.take() {
            Some(PendingParam::Remote { param, value }) => {
                let confirm = if status.is_success() {
                    match param {
                        RemoteParam::Channel => self.apply_channel(trx, value),
                        RemoteParam::ChannelPage => self.apply_channel_page(trx, value as u8),
                        RemoteParam::TxPowerReg => self.apply_tx_power_reg(trx, value as u8),
                        RemoteParam::TxPowerDbm => self.apply_tx_power_dbm(trx, value as u8 as i8),
                    }
                    Status::Success
                } else {
                    Status::UnableToContactPeer
                };
                self.set_confirm(trx, confirm, host_param(param), value as u32);
            }
            Some(PendingParam::SunPage { page, echo }) => {
                let confirm = if !status.is_success() {
                    Status::UnableToContactPeer
                } else if self.apply_sun_page(trx, page) {
                    Status::Success
                } else {
                    Status::InvalidValue
                };
                self.respond(
                    trx,
                    HostResponse::PerfSetConfirm {
                        status: confirm,
                        param_type: ParamType::ChannelPage as u8,
                        value: &echo,
                    },
                );
            }
            other => warn!("{}: parameter acknowledged without a change pending: {}", trx, other),
        }
    }

    fn config_crc_peer_node(&mut self, trx: TransceiverId, enabled: bool) {
        if !self.session(trx).node.peer_found {
            self.set_confirm(trx, Status::InvalidCmd, ParamType::CrcOnPeer, enabled as u32);
            return;
        }
        if self.send_to_peer(trx, &AppMessage::CrcSetReq { enabled }).is_ok() {
            let initiator = &mut self.session_mut(trx).initiator;
            initiator.pending = Some(PendingParam::Crc { enabled });
            initiator.op_mode = OpMode::CrcSetReqWait;
        } else {
            self.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
            self.set_confirm(trx, Status::TransmissionFailure, ParamType::CrcOnPeer, enabled as u32);
        }
    }

    pub(crate) fn crc_set_done(&mut self, trx: TransceiverId, status: TxStatus) {
        let initiator = &mut self.session_mut(trx).initiator;
        initiator.op_mode = OpMode::TxOpMode;
        let requested = match initiator.pending.take() {
            Some(PendingParam::Crc { enabled }) => enabled,
            _ => initiator.current_params.crc_settings_on_peer,
        };
        if status.is_success() {
            initiator.current_params.crc_settings_on_peer = requested;
            self.set_confirm(trx, Status::Success, ParamType::CrcOnPeer, requested as u32);
        } else {
            self.stop_timer(trx, Slot::ReplyWait);
            let current = self.session(trx).initiator.current_params.crc_settings_on_peer;
            self.set_confirm(trx, Status::UnableToContactPeer, ParamType::CrcOnPeer, current as u32);
        }
    }

    fn set_phy_frame_length(&mut self, trx: TransceiverId, len: u16) {
        let fcs_len = self.pib_fcs_len(trx) as u16;
        let overhead = FRAME_OVERHEAD as u16;
        let len = if self.legacy_phy(trx) {
            if len > MAX_PSDU_LEGACY as u16 {
                MAX_PSDU_LEGACY as u16
            } else if len < overhead + 1 + fcs_len {
                overhead + 1
            } else {
                len
            }
        } else if len > MAX_PSDU as u16 {
            MAX_PSDU as u16
        } else if len < overhead + fcs_len {
            overhead + 1
        } else {
            len
        };
        self.session_mut(trx).initiator.current_params.phy_frame_length = len;
        self.set_confirm(trx, Status::Success, ParamType::PhyFrameLength, len as u32);
    }

    fn set_transceiver_state(&mut self, trx: TransceiverId, raw: u8) {
        let requested = TrxState::from_u8(raw);
        if self.session(trx).initiator.sleeping && requested != Some(TrxState::Sleep) {
            self.set_confirm(trx, Status::TransceiverInSleep, ParamType::TrxState, raw as u32);
            return;
        }
        match requested {
            Some(TrxState::Reset) => {
                self.reset_radio(trx);
                if let Err(e) = self.device.radio().set_trx_state(trx, TrxState::TrxOff) {
                    warn!("{}: state after reset not set: {}", trx, e);
                }
                self.recover_settings(trx);
            }
            Some(state @ (TrxState::TrxOff | TrxState::PllOn | TrxState::RxOn)) => {
                if let Err(e) = self.device.radio().set_trx_state(trx, state) {
                    warn!("{}: state {} not set: {}", trx, state, e);
                }
            }
            Some(TrxState::Sleep) => self.toggle_sleep(trx),
            None => trace!("{}: unknown state {} requested", trx, raw),
        }
        let current = match self.device.radio().trx_state(trx) {
            Ok(state) => state,
            Err(e) => {
                warn!("{}: state not readable: {}", trx, e);
                self.session(trx).initiator.current_params.trx_state
            }
        };
        self.session_mut(trx).initiator.current_params.trx_state = current;
        self.set_confirm(trx, Status::Success, ParamType::TrxState, current as u32);
    }

    /// Sleep, or wake up. Waking one front end wakes both, the other goes back to sleep.
    fn toggle_sleep(&mut self, trx: TransceiverId) {
        if !self.session(trx).initiator.sleeping {
            match self.device.radio().sleep(trx) {
                Ok(()) => self.session_mut(trx).initiator.sleeping = true,
                Err(e) => warn!("{}: sleep refused: {}", trx, e),
            }
            return;
        }
        if let Err(e) = self.device.radio().wakeup(trx) {
            warn!("{}: wakeup refused: {}", trx, e);
            return;
        }
        self.session_mut(trx).initiator.sleeping = false;
        let other = trx.other();
        if self.session(other).initiator.sleeping {
            if let Err(e) = self.device.radio().sleep(other) {
                warn!("{}: sleep refused: {}", other, e);
            }
        }
    }

    /// Restore what a reset or continuous transmission loses.
    pub(crate) fn recover_settings(&mut self, trx: TransceiverId) {
        let params = self.session(trx).initiator.current_params;
        if params.rx_desensitize {
            if let Err(e) = self.device.radio().set_rx_sensitivity(trx, RX_DESENSITIZE_LEVEL) {
                warn!("{}: sensitivity not restored: {}", trx, e);
            }
        }
        self.set_pib(trx, PibValue::TransmitPower(params.tx_power_dbm));
    }

    pub(crate) fn perf_get_req(&mut self, trx: TransceiverId, param_type: u8) -> Result<(), Error<D>> {
        let params = self.session(trx).initiator.current_params;
        let Some(param) = ParamType::from_u8(param_type) else {
            self.respond(
                trx,
                HostResponse::PerfGetConfirm { status: Status::InvalidArgument, param_type, value: &[0] },
            );
            return Ok(());
        };
        let value = match param {
            ParamType::Channel => self.pib_channel(trx) as u32,
            ParamType::ChannelPage => {
                let page = self.pib_page(trx);
                if page == CH_PG_SUN {
                    let phy = SunPhyPage { page_no: CH_PG_SUN, ..self.pib_phy_setting(trx) };
                    let bytes = sun_page_bytes(&phy);
                    self.respond(
                        trx,
                        HostResponse::PerfGetConfirm { status: Status::Success, param_type, value: &bytes },
                    );
                    return Ok(());
                }
                page as u32
            }
            ParamType::TxPowerReg => self.tx_power_reg(trx) as u32,
            ParamType::TxPowerDbm => self.pib_tx_power_dbm(trx) as u8 as u32,
            ParamType::Csma => params.csma_enabled as u32,
            ParamType::FrameRetry => params.retry_enabled as u32,
            ParamType::AckRequest => params.ack_request as u32,
            ParamType::Desensitization => params.rx_desensitize as u32,
            ParamType::CrcOnPeer => {
                if self.send_to_peer(trx, &AppMessage::CrcStatReq).is_ok() {
                    self.start_timer(trx, Slot::ReplyWait, TIMEOUT_FOR_RESPONSE_US, Continuation::ReplyTimeout)?;
                    self.session_mut(trx).initiator.op_mode = OpMode::CrcStatusReqWait;
                } else {
                    self.session_mut(trx).initiator.op_mode = OpMode::TxOpMode;
                    self.get_confirm(trx, Status::TransmissionFailure, param, 0);
                }
                return Ok(());
            }
            ParamType::TrxState => match self.device.radio().trx_state(trx) {
                Ok(state) => state as u32,
                Err(e) => {
                    warn!("{}: state not readable: {}", trx, e);
                    params.trx_state as u32
                }
            },
            ParamType::NoOfTestFrames => params.number_test_frames,
            ParamType::PhyFrameLength => params.phy_frame_length as u32,
            ParamType::Rpc
            | ParamType::IsmFrequency
            | ParamType::AntennaDiversity
            | ParamType::AntennaDiversityOnPeer => {
                self.respond(
                    trx,
                    HostResponse::PerfGetConfirm { status: Status::InvalidArgument, param_type, value: &[0] },
                );
                return Ok(());
            }
        };
        self.get_confirm(trx, Status::Success, param, value);
        Ok(())
    }

    /// `SET_DEFAULT_CONFIG_REQ`. With a peer the defaults apply once it acknowledges.
    pub(crate) fn set_default_configuration(&mut self, trx: TransceiverId) {
        if !self.session(trx).node.peer_found {
            self.config_per_test_parameters(trx);
            let params = self.session(trx).initiator.default_params;
            self.respond(trx, HostResponse::SetDefaultConfigConfirm { status: Status::Success, params: &params });
            return;
        }
        if self.send_to_peer(trx, &AppMessage::SetDefaultReq).is_ok() {
            self.session_mut(trx).initiator.op_mode = OpMode::SetDefaultConfigPeer;
        } else {
            let params = TrxConfigParams::zeroed();
            self.respond(
                trx,
                HostResponse::SetDefaultConfigConfirm { status: Status::TransmissionFailure, params: &params },
            );
        }
    }

    pub(crate) fn get_current_configuration(&mut self, trx: TransceiverId) {
        let params = self.session(trx).initiator.current_params;
        self.respond(trx, HostResponse::GetCurrentConfigConfirm { status: Status::Success, params: &params });
    }
}
