//! Application payload exchanged between two analyzer nodes.
//!
//! Every payload starts with a command id and an application sequence number,
//! followed by command specific fields. Test frames are the exception: they
//! carry the command id followed by filler bytes only.

use heapless::{String, Vec};

use super::{split, Error};
use crate::device::radio::types::{SunModulation, SunPhyPage};
use crate::device::radio_buffer::RadioBuffer;

/// Filler byte for commands without arguments.
pub const DUMMY_PAYLOAD: u8 = 0xAA;
/// Command id and sequence number.
pub const GENERAL_HEADER_LEN: usize = 2;
/// Total payload length of a range test beacon.
pub const RANGE_TEST_PAYLOAD_LENGTH: usize = 20;
/// Fixed width of the name fields in a peer info response.
pub const NAME_FIELD_LEN: usize = 16;
/// Width of a SUN page descriptor in a `SET_SUN_PAGE` command.
pub const SUN_PAGE_FIELD_LEN: usize = 9;

/// Over the air command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum Command {
    PeerRequest = 0x01,
    PeerResponse = 0x02,
    PeerConfirm = 0x03,
    PerTestPkt = 0x04,
    SetParam = 0x05,
    ResultReq = 0x06,
    ResultRsp = 0x07,
    IdentifyNode = 0x08,
    DisconnectNode = 0x09,
    SetDefaultReq = 0x0A,
    PerTestStartPkt = 0x0B,
    CrcStatReq = 0x0C,
    CrcStatRsp = 0x0D,
    CrcSetReq = 0x0E,
    PeerInfoReq = 0x0F,
    PeerInfoRsp = 0x10,
    RangeTestStartPkt = 0x11,
    RangeTestStopPkt = 0x12,
    RangeTestPkt = 0x13,
    RangeTestRsp = 0x14,
    RangeTestMarkerCmd = 0x15,
    RangeTestMarkerRsp = 0x16,
    SetSunPage = 0x17,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Command::*;
        const ALL: [Command; 23] = [
            PeerRequest,
            PeerResponse,
            PeerConfirm,
            PerTestPkt,
            SetParam,
            ResultReq,
            ResultRsp,
            IdentifyNode,
            DisconnectNode,
            SetDefaultReq,
            PerTestStartPkt,
            CrcStatReq,
            CrcStatRsp,
            CrcSetReq,
            PeerInfoReq,
            PeerInfoRsp,
            RangeTestStartPkt,
            RangeTestStopPkt,
            RangeTestPkt,
            RangeTestRsp,
            RangeTestMarkerCmd,
            RangeTestMarkerRsp,
            SetSunPage,
        ];
        ALL.into_iter().find(|cmd| *cmd as u8 == value).ok_or(Error::UnknownCommand(value))
    }
}

/// Operating mode requested during peer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerMode {
    /// Stand-alone range measurement.
    RangeMeasure = 0x01,
    /// PER test under host control.
    PerTest = 0x02,
}

/// Parameter carried by a `SET_PARAM` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum RemoteParam {
    Channel = 0x00,
    ChannelPage = 0x01,
    TxPowerReg = 0x02,
    TxPowerDbm = 0x03,
}

impl RemoteParam {
    /// Decode a parameter id received from the peer.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(RemoteParam::Channel),
            0x01 => Some(RemoteParam::ChannelPage),
            0x02 => Some(RemoteParam::TxPowerReg),
            0x03 => Some(RemoteParam::TxPowerDbm),
            _ => None,
        }
    }
}

/// Broadcast by a node looking for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerRequest {
    /// Mode the pair is going to run.
    pub op_mode: PeerMode,
    /// Short address offered to the responder.
    pub nwk_addr: u16,
    /// The requester runs at minimum power to pair with a close node only.
    pub config_mode: bool,
}

/// PER test summary computed by the receptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct ResultRsp {
    pub num_of_frames_rx: u32,
    pub lqi_avrg_rx: u32,
    pub rssi_avrg_rx: u32,
    pub frames_with_wrong_crc: u32,
}

/// Identity of a node as exchanged at the start of a PER session.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct PeerInfo {
    pub ic_type: u8,
    pub soc_mcu_name: String<NAME_FIELD_LEN>,
    pub trx_name: String<NAME_FIELD_LEN>,
    pub board_name: String<NAME_FIELD_LEN>,
    pub mac_address: u64,
    pub fw_version: f32,
    pub feature_mask: u32,
}

/// Link quality record of the range test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub struct RangeReport {
    pub frame_count: u32,
    pub ed: i8,
    pub lqi: u8,
}

/// Decoded application payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum AppMessage {
    PeerRequest(PeerRequest),
    PeerResponse { nwk_addr: u16 },
    PeerConfirm { nwk_addr: u16 },
    /// Test frame with `filler` dummy bytes after the command id.
    PerTestPkt { filler: usize },
    SetParam { param_type: u8, value: u16 },
    SetSunPage(SunPhyPage),
    ResultReq,
    ResultRsp(ResultRsp),
    IdentifyNode,
    DisconnectNode,
    SetDefaultReq,
    PerTestStartPkt,
    CrcStatReq,
    CrcStatRsp { enabled: bool },
    CrcSetReq { enabled: bool },
    PeerInfoReq,
    PeerInfoRsp(PeerInfo),
    RangeTestStartPkt,
    RangeTestStopPkt,
    RangeTestPkt(RangeReport),
    RangeTestRsp(RangeReport),
    RangeTestMarkerCmd,
    RangeTestMarkerRsp,
}

impl AppMessage {
    /// Command id of the message.
    pub fn command(&self) -> Command {
        match self {
            AppMessage::PeerRequest(_) => Command::PeerRequest,
            AppMessage::PeerResponse { .. } => Command::PeerResponse,
            AppMessage::PeerConfirm { .. } => Command::PeerConfirm,
            AppMessage::PerTestPkt { .. } => Command::PerTestPkt,
            AppMessage::SetParam { .. } => Command::SetParam,
            AppMessage::SetSunPage(_) => Command::SetSunPage,
            AppMessage::ResultReq => Command::ResultReq,
            AppMessage::ResultRsp(_) => Command::ResultRsp,
            AppMessage::IdentifyNode => Command::IdentifyNode,
            AppMessage::DisconnectNode => Command::DisconnectNode,
            AppMessage::SetDefaultReq => Command::SetDefaultReq,
            AppMessage::PerTestStartPkt => Command::PerTestStartPkt,
            AppMessage::CrcStatReq => Command::CrcStatReq,
            AppMessage::CrcStatRsp { .. } => Command::CrcStatRsp,
            AppMessage::CrcSetReq { .. } => Command::CrcSetReq,
            AppMessage::PeerInfoReq => Command::PeerInfoReq,
            AppMessage::PeerInfoRsp(_) => Command::PeerInfoRsp,
            AppMessage::RangeTestStartPkt => Command::RangeTestStartPkt,
            AppMessage::RangeTestStopPkt => Command::RangeTestStopPkt,
            AppMessage::RangeTestPkt(_) => Command::RangeTestPkt,
            AppMessage::RangeTestRsp(_) => Command::RangeTestRsp,
            AppMessage::RangeTestMarkerCmd => Command::RangeTestMarkerCmd,
            AppMessage::RangeTestMarkerRsp => Command::RangeTestMarkerRsp,
        }
    }

    /// Append the payload for application sequence number `seq` to `buf`.
    pub fn encode<const N: usize>(&self, seq: u8, buf: &mut RadioBuffer<N>) -> Result<(), Error> {
        buf.push(self.command() as u8)?;
        if let AppMessage::PerTestPkt { filler } = *self {
            for i in 0..filler {
                buf.push(i as u8)?;
            }
            return Ok(());
        }
        buf.push(seq)?;
        match self {
            AppMessage::PeerRequest(req) => {
                buf.push(req.op_mode as u8)?;
                buf.push_u16(req.nwk_addr)?;
                buf.push(req.config_mode as u8)?;
            }
            AppMessage::PeerResponse { nwk_addr } | AppMessage::PeerConfirm { nwk_addr } => {
                buf.push_u16(*nwk_addr)?;
            }
            AppMessage::SetParam { param_type, value } => {
                buf.push(*param_type)?;
                buf.push_u16(*value)?;
            }
            AppMessage::SetSunPage(page) => {
                let mut field = [0u8; SUN_PAGE_FIELD_LEN];
                let bytes = sun_page_bytes(page);
                field[..bytes.len()].copy_from_slice(&bytes);
                buf.extend_from_slice(&field)?;
            }
            AppMessage::ResultRsp(rsp) => {
                buf.push_u32(rsp.num_of_frames_rx)?;
                buf.push_u32(rsp.lqi_avrg_rx)?;
                buf.push_u32(rsp.rssi_avrg_rx)?;
                buf.push_u32(rsp.frames_with_wrong_crc)?;
            }
            AppMessage::CrcStatRsp { enabled } | AppMessage::CrcSetReq { enabled } => {
                buf.push(*enabled as u8)?;
            }
            AppMessage::PeerInfoRsp(info) => {
                buf.push(info.ic_type)?;
                push_name(buf, &info.soc_mcu_name)?;
                push_name(buf, &info.trx_name)?;
                push_name(buf, &info.board_name)?;
                buf.push_u64(info.mac_address)?;
                buf.extend_from_slice(&info.fw_version.to_be_bytes())?;
                buf.push_u32(info.feature_mask)?;
            }
            AppMessage::RangeTestPkt(report) => {
                push_range_report(buf, report)?;
                let filler = RANGE_TEST_PAYLOAD_LENGTH - GENERAL_HEADER_LEN - 6;
                for i in 0..filler {
                    buf.push(i as u8)?;
                }
            }
            AppMessage::RangeTestRsp(report) => push_range_report(buf, report)?,
            AppMessage::PerTestPkt { .. } => {}
            AppMessage::ResultReq
            | AppMessage::IdentifyNode
            | AppMessage::DisconnectNode
            | AppMessage::SetDefaultReq
            | AppMessage::PerTestStartPkt
            | AppMessage::CrcStatReq
            | AppMessage::PeerInfoReq
            | AppMessage::RangeTestStartPkt
            | AppMessage::RangeTestStopPkt
            | AppMessage::RangeTestMarkerCmd
            | AppMessage::RangeTestMarkerRsp => buf.push(DUMMY_PAYLOAD)?,
        }
        Ok(())
    }

    /// Parse a payload. Returns the application sequence number (zero for test
    /// frames, which carry none) and the message.
    pub fn decode(payload: &[u8]) -> Result<(u8, Self), Error> {
        let ([cmd], rest) = split::<1>(payload)?;
        let cmd = Command::try_from(cmd)?;
        if cmd == Command::PerTestPkt {
            return Ok((0, AppMessage::PerTestPkt { filler: rest.len() }));
        }
        let ([seq], body) = split::<1>(rest)?;
        let message = match cmd {
            Command::PeerRequest => {
                let [mode, lo, hi, config] = exact::<4>(body)?;
                let op_mode = match mode {
                    0x01 => PeerMode::RangeMeasure,
                    0x02 => PeerMode::PerTest,
                    _ => return Err(Error::LengthMismatch),
                };
                AppMessage::PeerRequest(PeerRequest {
                    op_mode,
                    nwk_addr: u16::from_le_bytes([lo, hi]),
                    config_mode: config != 0,
                })
            }
            Command::PeerResponse => {
                AppMessage::PeerResponse { nwk_addr: u16::from_le_bytes(exact::<2>(body)?) }
            }
            Command::PeerConfirm => {
                AppMessage::PeerConfirm { nwk_addr: u16::from_le_bytes(exact::<2>(body)?) }
            }
            Command::SetParam => {
                let [param_type, lo, hi] = exact::<3>(body)?;
                AppMessage::SetParam { param_type, value: u16::from_le_bytes([lo, hi]) }
            }
            Command::SetSunPage => {
                let field = exact::<SUN_PAGE_FIELD_LEN>(body)?;
                AppMessage::SetSunPage(parse_sun_page(&field)?)
            }
            Command::ResultRsp => {
                let bytes = exact::<16>(body)?;
                let word = |i: usize| {
                    u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                };
                AppMessage::ResultRsp(ResultRsp {
                    num_of_frames_rx: word(0),
                    lqi_avrg_rx: word(4),
                    rssi_avrg_rx: word(8),
                    frames_with_wrong_crc: word(12),
                })
            }
            Command::CrcStatRsp => AppMessage::CrcStatRsp { enabled: exact::<1>(body)?[0] != 0 },
            Command::CrcSetReq => AppMessage::CrcSetReq { enabled: exact::<1>(body)?[0] != 0 },
            Command::PeerInfoRsp => AppMessage::PeerInfoRsp(parse_peer_info(body)?),
            Command::RangeTestPkt => AppMessage::RangeTestPkt(parse_range_report(body)?),
            Command::RangeTestRsp => {
                exact::<6>(body)?;
                AppMessage::RangeTestRsp(parse_range_report(body)?)
            }
            Command::ResultReq => dummy(body, AppMessage::ResultReq)?,
            Command::IdentifyNode => dummy(body, AppMessage::IdentifyNode)?,
            Command::DisconnectNode => dummy(body, AppMessage::DisconnectNode)?,
            Command::SetDefaultReq => dummy(body, AppMessage::SetDefaultReq)?,
            Command::PerTestStartPkt => dummy(body, AppMessage::PerTestStartPkt)?,
            Command::CrcStatReq => dummy(body, AppMessage::CrcStatReq)?,
            Command::PeerInfoReq => dummy(body, AppMessage::PeerInfoReq)?,
            Command::RangeTestStartPkt => dummy(body, AppMessage::RangeTestStartPkt)?,
            Command::RangeTestStopPkt => dummy(body, AppMessage::RangeTestStopPkt)?,
            Command::RangeTestMarkerCmd => dummy(body, AppMessage::RangeTestMarkerCmd)?,
            Command::RangeTestMarkerRsp => dummy(body, AppMessage::RangeTestMarkerRsp)?,
            Command::PerTestPkt => AppMessage::PerTestPkt { filler: body.len() },
        };
        Ok((seq, message))
    }
}

fn exact<const L: usize>(body: &[u8]) -> Result<[u8; L], Error> {
    if body.len() != L {
        return Err(Error::LengthMismatch);
    }
    split::<L>(body).map(|(bytes, _)| bytes)
}

fn dummy(body: &[u8], message: AppMessage) -> Result<AppMessage, Error> {
    exact::<1>(body).map(|_| message)
}

fn push_name<const N: usize>(buf: &mut RadioBuffer<N>, name: &str) -> Result<(), Error> {
    let mut field = [0u8; NAME_FIELD_LEN];
    let len = name.len().min(NAME_FIELD_LEN);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf.extend_from_slice(&field)?;
    Ok(())
}

fn push_range_report<const N: usize>(
    buf: &mut RadioBuffer<N>,
    report: &RangeReport,
) -> Result<(), Error> {
    buf.push_u32(report.frame_count)?;
    buf.push(report.ed as u8)?;
    buf.push(report.lqi)?;
    Ok(())
}

fn parse_range_report(body: &[u8]) -> Result<RangeReport, Error> {
    let (count, rest) = split::<4>(body)?;
    let ([ed, lqi], _) = split::<2>(rest)?;
    Ok(RangeReport { frame_count: u32::from_le_bytes(count), ed: ed as i8, lqi })
}

fn parse_name(field: &[u8]) -> Result<String<NAME_FIELD_LEN>, Error> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    let text = core::str::from_utf8(&field[..end]).map_err(|_| Error::InvalidText)?;
    Ok(truncated(text))
}

fn parse_peer_info(body: &[u8]) -> Result<PeerInfo, Error> {
    if body.len() != 1 + 3 * NAME_FIELD_LEN + 8 + 4 + 4 {
        return Err(Error::LengthMismatch);
    }
    let ([ic_type], rest) = split::<1>(body)?;
    let (mcu, rest) = split::<NAME_FIELD_LEN>(rest)?;
    let (trx, rest) = split::<NAME_FIELD_LEN>(rest)?;
    let (board, rest) = split::<NAME_FIELD_LEN>(rest)?;
    let (mac, rest) = split::<8>(rest)?;
    let (fw, rest) = split::<4>(rest)?;
    let (mask, _) = split::<4>(rest)?;
    Ok(PeerInfo {
        ic_type,
        soc_mcu_name: parse_name(&mcu)?,
        trx_name: parse_name(&trx)?,
        board_name: parse_name(&board)?,
        mac_address: u64::from_le_bytes(mac),
        fw_version: f32::from_be_bytes(fw),
        feature_mask: u32::from_le_bytes(mask),
    })
}

/// Copy as much of `text` as fits, never splitting a character.
pub fn truncated<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Compact SUN page descriptor: page, band, modulation, then the modulation
/// specific bytes (3 for OFDM, 2 for O-QPSK, 6 for FSK, 2 for legacy O-QPSK).
pub fn sun_page_bytes(page: &SunPhyPage) -> Vec<u8, SUN_PAGE_FIELD_LEN> {
    let mut out = Vec::new();
    let mut put = |bytes: &[u8]| {
        for b in bytes {
            // capacity covers the largest variant
            let _ = out.push(*b);
        }
    };
    put(&[page.page_no, page.freq_band, page.modulation.code()]);
    match page.modulation {
        SunModulation::Ofdm { option, mcs, interleaving } => put(&[option, mcs, interleaving]),
        SunModulation::Oqpsk { rate_mode, chip_rate } => put(&[rate_mode, chip_rate]),
        SunModulation::Fsk { mod_type, mod_idx, sym_rate, op_mode, bt, fec_enabled } => {
            put(&[mod_type, mod_idx, sym_rate, op_mode, bt, fec_enabled])
        }
        SunModulation::LegacyOqpsk { data_rate, chip_rate } => put(&[data_rate, chip_rate]),
    }
    out
}

/// Inverse of [`sun_page_bytes`]. Trailing bytes are ignored.
pub fn parse_sun_page(bytes: &[u8]) -> Result<SunPhyPage, Error> {
    let ([page_no, freq_band, code], mode) = split::<3>(bytes)?;
    let modulation = match code {
        SunModulation::OFDM => {
            let ([option, mcs, interleaving], _) = split::<3>(mode)?;
            SunModulation::Ofdm { option, mcs, interleaving }
        }
        SunModulation::OQPSK => {
            let ([rate_mode, chip_rate], _) = split::<2>(mode)?;
            SunModulation::Oqpsk { rate_mode, chip_rate }
        }
        SunModulation::FSK => {
            let ([mod_type, mod_idx, sym_rate, op_mode, bt, fec_enabled], _) = split::<6>(mode)?;
            SunModulation::Fsk { mod_type, mod_idx, sym_rate, op_mode, bt, fec_enabled }
        }
        SunModulation::LEG_OQPSK => {
            let ([data_rate, chip_rate], _) = split::<2>(mode)?;
            SunModulation::LegacyOqpsk { data_rate, chip_rate }
        }
        _ => return Err(Error::LengthMismatch),
    };
    Ok(SunPhyPage { page_no, freq_band, modulation })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(seq: u8, message: &AppMessage) -> RadioBuffer<128> {
        let mut buf = RadioBuffer::new();
        message.encode(seq, &mut buf).unwrap();
        buf
    }

    #[test]
    fn peer_request_layout() {
        let req = AppMessage::PeerRequest(PeerRequest {
            op_mode: PeerMode::PerTest,
            nwk_addr: 0x1234,
            config_mode: true,
        });
        let buf = encoded(9, &req);
        assert_eq!(buf.as_ref(), &[0x01, 9, 0x02, 0x34, 0x12, 0x01]);
        assert_eq!(AppMessage::decode(buf.as_ref()), Ok((9, req)));
    }

    #[test]
    fn per_test_frame_has_no_sequence_byte() {
        let buf = encoded(0x55, &AppMessage::PerTestPkt { filler: 4 });
        assert_eq!(buf.as_ref(), &[Command::PerTestPkt as u8, 0, 1, 2, 3]);
        assert_eq!(AppMessage::decode(buf.as_ref()), Ok((0, AppMessage::PerTestPkt { filler: 4 })));
    }

    #[test]
    fn range_beacon_is_padded_to_fixed_length() {
        let report = RangeReport { frame_count: 3, ed: 0, lqi: 0 };
        let buf = encoded(1, &AppMessage::RangeTestPkt(report));
        assert_eq!(buf.len(), RANGE_TEST_PAYLOAD_LENGTH);
        let (_, decoded) = AppMessage::decode(buf.as_ref()).unwrap();
        assert_eq!(decoded, AppMessage::RangeTestPkt(report));
    }

    #[test]
    fn result_response_with_wrong_length_is_rejected() {
        let rsp = AppMessage::ResultRsp(ResultRsp { num_of_frames_rx: 100, ..Default::default() });
        let buf = encoded(2, &rsp);
        assert_eq!(buf.len(), GENERAL_HEADER_LEN + 16);
        assert_eq!(AppMessage::decode(&buf.as_ref()[..17]), Err(Error::LengthMismatch));
    }

    #[test]
    fn peer_info_names_survive_padding() {
        let info = PeerInfo {
            ic_type: 0x34,
            soc_mcu_name: truncated("ATSAMR30"),
            trx_name: truncated("AT86RF215-RF24"),
            board_name: truncated("REB215-XPRO"),
            mac_address: 0x0004_25FF_FF17_9A3B,
            fw_version: 2.5,
            feature_mask: 0x03,
        };
        let buf = encoded(4, &AppMessage::PeerInfoRsp(info.clone()));
        assert_eq!(AppMessage::decode(buf.as_ref()), Ok((4, AppMessage::PeerInfoRsp(info))));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(AppMessage::decode(&[0x7F, 0, 0]), Err(Error::UnknownCommand(0x7F)));
    }

    #[test]
    fn sun_page_lengths_follow_modulation() {
        let fsk = SunPhyPage {
            page_no: 9,
            freq_band: 7,
            modulation: SunModulation::Fsk {
                mod_type: 0,
                mod_idx: 1,
                sym_rate: 2,
                op_mode: 1,
                bt: 1,
                fec_enabled: 0,
            },
        };
        assert_eq!(sun_page_bytes(&fsk).len(), 9);
        let ofdm = SunPhyPage {
            page_no: 9,
            freq_band: 7,
            modulation: SunModulation::Ofdm { option: 1, mcs: 3, interleaving: 0 },
        };
        assert_eq!(sun_page_bytes(&ofdm).len(), 6);
        assert_eq!(parse_sun_page(&sun_page_bytes(&ofdm)), Ok(ofdm));
    }
}
