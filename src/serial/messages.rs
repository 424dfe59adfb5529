//! Messages exchanged with the host tool.
//!
//! A message body is `[PROTOCOL_ID, message id, fields...]`. Multi-byte
//! integers are little endian, floats are sent byte reversed, strings are
//! prefixed with their length and `0xFF` marks fields this hardware lacks.

use heapless::Vec;

use super::{Error, EOT, SIO_RX_BUF_SIZE, SIO_TX_BUF_SIZE, SOT};
use crate::analyzer::types::{Status, TrxConfigParams};
use crate::frame::app::{sun_page_bytes, PeerInfo, SUN_PAGE_FIELD_LEN};
use crate::frame::reverse_float;

/// Guard byte leading every message body.
pub const PROTOCOL_ID: u8 = 0x00;
/// Marker for a configuration field this hardware does not have.
pub const NOT_SUPPORTED: u8 = 0xFF;
/// Length byte of an ED scan request that carries a channel mask.
pub const MSG_LEN_ED_SCAN_REQ: u8 = 7;

/// Host message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum MessageId {
    PerfStartReq = 0x00,
    PerfSetReq = 0x01,
    PerfGetReq = 0x02,
    IdentifyPeerNodeReq = 0x03,
    ContPulseTxReq = 0x04,
    ContWaveTxReq = 0x05,
    RegisterReadReq = 0x06,
    RegisterWriteReq = 0x07,
    RegisterDumpReq = 0x08,
    EdScanStartReq = 0x09,
    SensorDataReq = 0x0A,
    PerTestStartReq = 0x0B,
    PeerDisconnectReq = 0x0C,
    SetDefaultConfigReq = 0x0D,
    GetCurrentConfigReq = 0x0E,
    IdentifyBoardReq = 0x0F,
    PerfStartConfirm = 0x10,
    PerfSetConfirm = 0x11,
    PerfGetConfirm = 0x12,
    IdentifyPeerNodeConfirm = 0x13,
    ContPulseTxConfirm = 0x14,
    ContWaveTxConfirm = 0x15,
    RegisterReadConfirm = 0x16,
    RegisterWriteConfirm = 0x17,
    RegisterDumpConfirm = 0x18,
    EdScanStartConfirm = 0x19,
    SensorDataConfirm = 0x1A,
    PerTestStartConfirm = 0x1B,
    PeerDisconnectConfirm = 0x1C,
    SetDefaultConfigConfirm = 0x1D,
    GetCurrentConfigConfirm = 0x1E,
    IdentifyBoardConfirm = 0x1F,
    EdScanEndIndication = 0x29,
    PerTestEndIndication = 0x2B,
    RangeTestStartReq = 0x50,
    RangeTestStopReq = 0x52,
    RangeTestStartConfirm = 0x60,
    RangeTestStopConfirm = 0x62,
    RangeTestBeaconResponse = 0x63,
    RangeTestBeacon = 0x64,
    RangeTestMarkerIndication = 0x66,
}

/// `start_mode` of a `PERF_START_REQ` for tests without a peer.
pub const START_MODE_SINGLE_NODE: u8 = 0x00;
/// `start_mode` asking for a PER session with a peer.
pub const START_MODE_PER: u8 = 0x01;
/// `start_stop` of a `CONT_WAVE_TX_REQ` starting a carrier.
pub const START_CWT: u8 = 0x01;
/// `start_stop` ending a running carrier.
pub const STOP_CWT: u8 = 0x00;

/// Parameter ids used by `PERF_SET_REQ` and `PERF_GET_REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum ParamType {
    Channel = 0x00,
    ChannelPage = 0x01,
    TxPowerReg = 0x02,
    TxPowerDbm = 0x03,
    Csma = 0x04,
    FrameRetry = 0x05,
    AckRequest = 0x06,
    AntennaDiversity = 0x07,
    AntennaDiversityOnPeer = 0x08,
    Desensitization = 0x09,
    TrxState = 0x0A,
    CrcOnPeer = 0x0B,
    NoOfTestFrames = 0x0C,
    PhyFrameLength = 0x0D,
    Rpc = 0x0E,
    IsmFrequency = 0x0F,
}

const PARAM_SIZES: [u8; 16] = [2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 4, 2, 1, 4];

impl ParamType {
    /// Decode a parameter id.
    pub fn from_u8(value: u8) -> Option<Self> {
        use ParamType::*;
        const ALL: [ParamType; 16] = [
            Channel,
            ChannelPage,
            TxPowerReg,
            TxPowerDbm,
            Csma,
            FrameRetry,
            AckRequest,
            AntennaDiversity,
            AntennaDiversityOnPeer,
            Desensitization,
            TrxState,
            CrcOnPeer,
            NoOfTestFrames,
            PhyFrameLength,
            Rpc,
            IsmFrequency,
        ];
        ALL.get(value as usize).copied()
    }

    /// Width of the parameter value on the wire.
    pub fn len(self) -> usize {
        PARAM_SIZES[self as usize] as usize
    }
}

/// Encoded parameter value, at most a SUN page descriptor wide.
pub type ParamBytes = Vec<u8, SUN_PAGE_FIELD_LEN>;

/// Little-endian value of a parameter, cut to the parameter's width.
pub fn param_bytes(param: ParamType, value: u32) -> ParamBytes {
    value.to_le_bytes().into_iter().take(param.len()).collect()
}

/// Value bytes of an unknown parameter.
pub fn unknown_param_bytes() -> ParamBytes {
    core::iter::once(0).collect()
}

/// A `PERF_SET_REQ` as received.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamRequest {
    /// Raw parameter id, it may be unknown.
    pub param_type: u8,
    /// Raw value bytes.
    pub value: ParamBytes,
}

impl ParamRequest {
    /// The value as a little-endian integer, missing bytes read as zero.
    pub fn value_u32(&self) -> u32 {
        let mut word = [0u8; 4];
        for (dst, src) in word.iter_mut().zip(self.value.iter()) {
            *dst = *src;
        }
        u32::from_le_bytes(word)
    }

    /// Echo of the request value for a confirm, cut or padded to the parameter's width.
    pub fn echo(&self) -> ParamBytes {
        match ParamType::from_u8(self.param_type) {
            Some(ParamType::ChannelPage) if self.value.len() > 1 => self.value.clone(),
            Some(param) => param_bytes(param, self.value_u32()),
            None => unknown_param_bytes(),
        }
    }
}

/// Decoded host request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum HostRequest {
    PerfStart { start_mode: u8 },
    PerfSet(ParamRequest),
    PerfGet { param_type: u8 },
    IdentifyPeerNode,
    ContPulseTx,
    ContWaveTx { start_stop: u8, tx_mode: u8 },
    RegisterRead { addr: u16 },
    RegisterWrite { addr: u16, value: u8 },
    RegisterDump { start: u16, end: u16 },
    /// Without a mask all supported channels are scanned.
    EdScanStart { scan_duration: u8, channel_mask: Option<u32> },
    SensorData,
    PerTestStart,
    PeerDisconnect,
    SetDefaultConfig,
    GetCurrentConfig,
    IdentifyBoard,
    RangeTestStart,
    RangeTestStop,
}

struct Fields<'a>(&'a [u8]);

impl<'a> Fields<'a> {
    fn u8(&mut self) -> Result<u8, Error> {
        let (&first, rest) = self.0.split_first().ok_or(Error::Malformed)?;
        self.0 = rest;
        Ok(first)
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes([self.u8()?, self.u8()?, self.u8()?, self.u8()?]))
    }
}

impl HostRequest {
    /// Decode a message as stored by the receive parser: `[len, PROTOCOL_ID, id, fields...]`.
    pub fn decode(msg: &[u8]) -> Result<Self, Error> {
        let mut fields = Fields(msg);
        let len = fields.u8()?;
        let protocol = fields.u8()?;
        if protocol != PROTOCOL_ID {
            return Err(Error::ForeignProtocol(protocol));
        }
        let id = fields.u8()?;
        let request = match id {
            x if x == MessageId::PerfStartReq as u8 => {
                HostRequest::PerfStart { start_mode: fields.u8()? }
            }
            x if x == MessageId::PerfSetReq as u8 => {
                let param_type = fields.u8()?;
                let param_len = fields.u8()? as usize;
                let raw = fields.0.get(..param_len).ok_or(Error::Malformed)?;
                let value = ParamBytes::from_slice(raw).map_err(|_| Error::Malformed)?;
                HostRequest::PerfSet(ParamRequest { param_type, value })
            }
            x if x == MessageId::PerfGetReq as u8 => {
                HostRequest::PerfGet { param_type: fields.u8()? }
            }
            x if x == MessageId::IdentifyPeerNodeReq as u8 => HostRequest::IdentifyPeerNode,
            x if x == MessageId::ContPulseTxReq as u8 => HostRequest::ContPulseTx,
            x if x == MessageId::ContWaveTxReq as u8 => {
                HostRequest::ContWaveTx { start_stop: fields.u8()?, tx_mode: fields.u8()? }
            }
            x if x == MessageId::RegisterReadReq as u8 => {
                HostRequest::RegisterRead { addr: fields.u16()? }
            }
            x if x == MessageId::RegisterWriteReq as u8 => {
                HostRequest::RegisterWrite { addr: fields.u16()?, value: fields.u8()? }
            }
            x if x == MessageId::RegisterDumpReq as u8 => {
                HostRequest::RegisterDump { start: fields.u16()?, end: fields.u16()? }
            }
            x if x == MessageId::EdScanStartReq as u8 => {
                let scan_duration = fields.u8()?;
                let channel_mask =
                    if len == MSG_LEN_ED_SCAN_REQ { Some(fields.u32()?) } else { None };
                HostRequest::EdScanStart { scan_duration, channel_mask }
            }
            x if x == MessageId::SensorDataReq as u8 => HostRequest::SensorData,
            x if x == MessageId::PerTestStartReq as u8 => HostRequest::PerTestStart,
            x if x == MessageId::PeerDisconnectReq as u8 => HostRequest::PeerDisconnect,
            x if x == MessageId::SetDefaultConfigReq as u8 => HostRequest::SetDefaultConfig,
            x if x == MessageId::GetCurrentConfigReq as u8 => HostRequest::GetCurrentConfig,
            x if x == MessageId::IdentifyBoardReq as u8 => HostRequest::IdentifyBoard,
            x if x == MessageId::RangeTestStartReq as u8 => HostRequest::RangeTestStart,
            x if x == MessageId::RangeTestStopReq as u8 => HostRequest::RangeTestStop,
            other => return Err(Error::UnknownMessage(other)),
        };
        Ok(request)
    }

    /// Frame the request the way the host tool sends it.
    pub fn encode(&self) -> Result<Vec<u8, { SIO_RX_BUF_SIZE + 2 }>, Error> {
        let mut body: Vec<u8, SIO_RX_BUF_SIZE> = Vec::new();
        let mut put = |bytes: &[u8]| body.extend_from_slice(bytes).map_err(|_| Error::MessageTooLong);
        put(&[PROTOCOL_ID])?;
        match self {
            HostRequest::PerfStart { start_mode } => {
                put(&[MessageId::PerfStartReq as u8, *start_mode])?
            }
            HostRequest::PerfSet(req) => {
                put(&[MessageId::PerfSetReq as u8, req.param_type, req.value.len() as u8])?;
                put(&req.value)?;
            }
            HostRequest::PerfGet { param_type } => put(&[MessageId::PerfGetReq as u8, *param_type])?,
            HostRequest::IdentifyPeerNode => put(&[MessageId::IdentifyPeerNodeReq as u8, 0])?,
            HostRequest::ContPulseTx => put(&[MessageId::ContPulseTxReq as u8, 0])?,
            HostRequest::ContWaveTx { start_stop, tx_mode } => {
                put(&[MessageId::ContWaveTxReq as u8, *start_stop, *tx_mode])?
            }
            HostRequest::RegisterRead { addr } => {
                put(&[MessageId::RegisterReadReq as u8])?;
                put(&addr.to_le_bytes())?;
            }
            HostRequest::RegisterWrite { addr, value } => {
                put(&[MessageId::RegisterWriteReq as u8])?;
                put(&addr.to_le_bytes())?;
                put(&[*value])?;
            }
            HostRequest::RegisterDump { start, end } => {
                put(&[MessageId::RegisterDumpReq as u8])?;
                put(&start.to_le_bytes())?;
                put(&end.to_le_bytes())?;
            }
            HostRequest::EdScanStart { scan_duration, channel_mask } => {
                put(&[MessageId::EdScanStartReq as u8, *scan_duration])?;
                if let Some(mask) = channel_mask {
                    put(&mask.to_le_bytes())?;
                }
            }
            HostRequest::SensorData => put(&[MessageId::SensorDataReq as u8, 0])?,
            HostRequest::PerTestStart => put(&[MessageId::PerTestStartReq as u8, 0])?,
            HostRequest::PeerDisconnect => put(&[MessageId::PeerDisconnectReq as u8, 0])?,
            HostRequest::SetDefaultConfig => put(&[MessageId::SetDefaultConfigReq as u8, 0])?,
            HostRequest::GetCurrentConfig => put(&[MessageId::GetCurrentConfigReq as u8, 0])?,
            HostRequest::IdentifyBoard => put(&[MessageId::IdentifyBoardReq as u8, 0])?,
            HostRequest::RangeTestStart => put(&[MessageId::RangeTestStartReq as u8, 0])?,
            HostRequest::RangeTestStop => put(&[MessageId::RangeTestStopReq as u8, 0])?,
        }
        let mut framed = Vec::new();
        let overflow = |_| Error::MessageTooLong;
        framed.push(SOT).map_err(overflow)?;
        framed.push(body.len() as u8).map_err(overflow)?;
        framed.extend_from_slice(&body).map_err(|_| Error::MessageTooLong)?;
        framed.push(EOT).map_err(overflow)?;
        Ok(framed)
    }
}

/// Figures reported at the end of a PER test.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct PerTestResult {
    pub status: Status,
    pub rssi_avg: i8,
    pub lqi_avg: u8,
    pub frames_transmitted: u32,
    pub frames_received: u32,
    pub frames_failure: u32,
    pub frames_no_ack: u32,
    pub frames_access_failure: u32,
    pub frames_with_wrong_crc: u32,
    /// Seconds.
    pub test_duration: f32,
    /// kbit/s.
    pub net_data_rate: f32,
}

/// Confirmations and indications sent to the host.
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub enum HostResponse<'a> {
    /// Confirms that carry nothing but a status byte.
    Status { id: MessageId, status: Status },
    PerfStartConfirm {
        status: Status,
        start_mode: u8,
        params: &'a TrxConfigParams,
        peer: Option<&'a PeerInfo>,
    },
    PerfSetConfirm { status: Status, param_type: u8, value: &'a [u8] },
    PerfGetConfirm { status: Status, param_type: u8, value: &'a [u8] },
    ContWaveTxConfirm { status: Status, start_stop: u8, tx_mode: u8 },
    RegisterReadConfirm { status: Status, addr: u16, value: u8 },
    RegisterWriteConfirm { status: Status, addr: u16, value: u8 },
    RegisterDumpConfirm { status: Status, start: u16, end: u16, values: &'a [u8] },
    PerTestEndIndication(PerTestResult),
    EdScanStartConfirm { status: Status, scan_time_min: u8, scan_time_sec: f32 },
    EdScanEndIndication { results: &'a [(u8, i8)] },
    SensorDataConfirm { status: Status, battery_voltage: f32, temperature: f32 },
    SetDefaultConfigConfirm { status: Status, params: &'a TrxConfigParams },
    GetCurrentConfigConfirm { status: Status, params: &'a TrxConfigParams },
    IdentifyBoardConfirm { status: Status, info: &'a PeerInfo },
    RangeTestBeacon { mpdu: &'a [u8], fcs_len: u8 },
    RangeTestBeaconResponse {
        mpdu: &'a [u8],
        fcs_len: u8,
        lqi_remote: u8,
        ed_remote: i8,
        lqi_host: u8,
        ed_host: i8,
    },
    RangeTestMarkerIndication { mpdu: &'a [u8], fcs_len: u8, lqi: u8, ed: i8 },
}

/// Outgoing message under construction: `[SOT, len, PROTOCOL_ID, id, ...]`.
pub(crate) struct TxFrame(Vec<u8, SIO_TX_BUF_SIZE>);

impl TxFrame {
    fn new(id: MessageId) -> Self {
        let mut buf = Vec::new();
        // four bytes always fit
        let _ = buf.extend_from_slice(&[SOT, 0, PROTOCOL_ID, id as u8]);
        TxFrame(buf)
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, Error> {
        self.0.extend_from_slice(bytes).map_err(|_| Error::MessageTooLong)?;
        Ok(self)
    }

    fn u8(&mut self, value: u8) -> Result<&mut Self, Error> {
        self.bytes(&[value])
    }

    fn u16(&mut self, value: u16) -> Result<&mut Self, Error> {
        self.bytes(&value.to_le_bytes())
    }

    fn u32(&mut self, value: u32) -> Result<&mut Self, Error> {
        self.bytes(&value.to_le_bytes())
    }

    fn u64(&mut self, value: u64) -> Result<&mut Self, Error> {
        self.bytes(&value.to_le_bytes())
    }

    fn float(&mut self, value: f32) -> Result<&mut Self, Error> {
        self.bytes(&reverse_float(value).to_le_bytes())
    }

    fn text(&mut self, text: &str) -> Result<&mut Self, Error> {
        self.u8(text.len() as u8)?.bytes(text.as_bytes())
    }

    fn status(&mut self, status: Status) -> Result<&mut Self, Error> {
        self.u8(status as u8)
    }

    fn identity(&mut self, info: &PeerInfo) -> Result<&mut Self, Error> {
        self.u8(info.ic_type)?
            .text(&info.soc_mcu_name)?
            .text(&info.trx_name)?
            .text(&info.board_name)?
            .u64(info.mac_address)?
            .float(info.fw_version)?
            .u32(info.feature_mask)
    }

    fn config_head(&mut self, params: &TrxConfigParams) -> Result<&mut Self, Error> {
        self.u16(params.channel)
    }

    fn config_tail(&mut self, params: &TrxConfigParams) -> Result<&mut Self, Error> {
        self.u8(params.tx_power_dbm as u8)?
            .u8(params.tx_power_reg)?
            .u8(params.csma_enabled as u8)?
            .u8(params.retry_enabled as u8)?
            .u8(params.ack_request as u8)?
            .u8(params.rx_desensitize as u8)?
            // rpc, antenna diversity
            .bytes(&[NOT_SUPPORTED, NOT_SUPPORTED])?
            .u8(params.trx_state as u8)?
            .u32(params.number_test_frames)?
            .u16(params.phy_frame_length)?
            // antenna diversity on peer
            .u8(NOT_SUPPORTED)?
            .u8(params.crc_settings_on_peer as u8)
    }

    fn config_block(&mut self, params: &TrxConfigParams) -> Result<&mut Self, Error> {
        self.config_head(params)?.u8(params.channel_page)?.config_tail(params)
    }

    fn mpdu(&mut self, mpdu: &[u8], fcs_len: u8) -> Result<&mut Self, Error> {
        self.u8((mpdu.len() + fcs_len as usize) as u8)?.bytes(mpdu)
    }

    fn finish(mut self) -> Result<Vec<u8, SIO_TX_BUF_SIZE>, Error> {
        // the length byte counts the protocol id, the message id and the fields
        let len = self.0.len() - 2;
        if len > u8::MAX as usize {
            return Err(Error::MessageTooLong);
        }
        self.0[1] = len as u8;
        self.0.push(EOT).map_err(|_| Error::MessageTooLong)?;
        Ok(self.0)
    }
}

impl HostResponse<'_> {
    /// Message id on the wire.
    pub fn id(&self) -> MessageId {
        match self {
            HostResponse::Status { id, .. } => *id,
            HostResponse::PerfStartConfirm { .. } => MessageId::PerfStartConfirm,
            HostResponse::PerfSetConfirm { .. } => MessageId::PerfSetConfirm,
            HostResponse::PerfGetConfirm { .. } => MessageId::PerfGetConfirm,
            HostResponse::ContWaveTxConfirm { .. } => MessageId::ContWaveTxConfirm,
            HostResponse::RegisterReadConfirm { .. } => MessageId::RegisterReadConfirm,
            HostResponse::RegisterWriteConfirm { .. } => MessageId::RegisterWriteConfirm,
            HostResponse::RegisterDumpConfirm { .. } => MessageId::RegisterDumpConfirm,
            HostResponse::PerTestEndIndication(_) => MessageId::PerTestEndIndication,
            HostResponse::EdScanStartConfirm { .. } => MessageId::EdScanStartConfirm,
            HostResponse::EdScanEndIndication { .. } => MessageId::EdScanEndIndication,
            HostResponse::SensorDataConfirm { .. } => MessageId::SensorDataConfirm,
            HostResponse::SetDefaultConfigConfirm { .. } => MessageId::SetDefaultConfigConfirm,
            HostResponse::GetCurrentConfigConfirm { .. } => MessageId::GetCurrentConfigConfirm,
            HostResponse::IdentifyBoardConfirm { .. } => MessageId::IdentifyBoardConfirm,
            HostResponse::RangeTestBeacon { .. } => MessageId::RangeTestBeacon,
            HostResponse::RangeTestBeaconResponse { .. } => MessageId::RangeTestBeaconResponse,
            HostResponse::RangeTestMarkerIndication { .. } => MessageId::RangeTestMarkerIndication,
        }
    }

    /// Build the complete frame including `SOT`, length and `EOT`.
    pub fn encode(&self) -> Result<Vec<u8, SIO_TX_BUF_SIZE>, Error> {
        let mut f = TxFrame::new(self.id());
        match *self {
            HostResponse::Status { status, .. } => {
                f.status(status)?;
            }
            HostResponse::PerfStartConfirm { status, start_mode, params, peer } => {
                f.status(status)?.u8(start_mode)?.config_block(params)?;
                match peer {
                    Some(info) => {
                        f.identity(info)?;
                    }
                    None => {
                        // no ic type and three empty names, unknown address, no version, no features
                        f.bytes(&[0; 4])?.bytes(&[0xFF; 8])?.bytes(&[0; 4])?.u32(0)?;
                    }
                }
            }
            HostResponse::PerfSetConfirm { status, param_type, value }
            | HostResponse::PerfGetConfirm { status, param_type, value } => {
                f.status(status)?.u8(param_type)?.u8(value.len() as u8)?.bytes(value)?;
            }
            HostResponse::ContWaveTxConfirm { status, start_stop, tx_mode } => {
                f.status(status)?.u8(start_stop)?.u8(tx_mode)?;
            }
            HostResponse::RegisterReadConfirm { status, addr, value }
            | HostResponse::RegisterWriteConfirm { status, addr, value } => {
                f.status(status)?.u16(addr)?.u8(value)?;
            }
            HostResponse::RegisterDumpConfirm { status, start, end, values } => {
                f.status(status)?.u16(start)?.u16(end)?.u8(values.len() as u8)?.bytes(values)?;
            }
            HostResponse::PerTestEndIndication(r) => {
                f.status(r.status)?
                    .u8(r.rssi_avg as u8)?
                    .u8(r.lqi_avg)?
                    .u32(r.frames_transmitted)?
                    .u32(r.frames_received)?
                    .u32(r.frames_failure)?
                    .u32(r.frames_no_ack)?
                    .u32(r.frames_access_failure)?
                    .u32(r.frames_with_wrong_crc)?
                    .float(r.test_duration)?
                    .float(r.net_data_rate)?;
            }
            HostResponse::EdScanStartConfirm { status, scan_time_min, scan_time_sec } => {
                f.status(status)?.u8(scan_time_min)?.float(scan_time_sec)?;
            }
            HostResponse::EdScanEndIndication { results } => {
                f.u8(results.len() as u8)?;
                for (channel, p_in) in results {
                    f.u8(*channel)?.u8(*p_in as u8)?;
                }
            }
            HostResponse::SensorDataConfirm { status, battery_voltage, temperature } => {
                f.status(status)?.float(battery_voltage)?.float(temperature)?;
            }
            HostResponse::SetDefaultConfigConfirm { status, params } => {
                f.status(status)?.config_block(params)?;
            }
            HostResponse::GetCurrentConfigConfirm { status, params } => {
                f.status(status)?.config_head(params)?;
                if params.channel_page == crate::analyzer::types::CH_PG_SUN {
                    let mut page = params.sun_page;
                    page.page_no = params.channel_page;
                    f.bytes(&sun_page_bytes(&page))?;
                } else {
                    f.u8(params.channel_page)?;
                }
                // ISM frequency is not supported
                f.config_tail(params)?.bytes(&0f32.to_le_bytes())?;
            }
            HostResponse::IdentifyBoardConfirm { status, info } => {
                f.status(status)?.identity(info)?;
            }
            HostResponse::RangeTestBeacon { mpdu, fcs_len } => {
                f.mpdu(mpdu, fcs_len)?;
            }
            HostResponse::RangeTestBeaconResponse {
                mpdu,
                fcs_len,
                lqi_remote,
                ed_remote,
                lqi_host,
                ed_host,
            } => {
                f.mpdu(mpdu, fcs_len)?
                    .u8(lqi_remote)?
                    .u8(ed_remote as u8)?
                    .u8(lqi_host)?
                    .u8(ed_host as u8)?;
            }
            HostResponse::RangeTestMarkerIndication { mpdu, fcs_len, lqi, ed } => {
                f.mpdu(mpdu, fcs_len)?.u8(lqi)?.u8(ed as u8)?;
            }
        }
        f.finish()
    }
}
