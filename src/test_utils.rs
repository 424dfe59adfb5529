//! In-memory board used by the unit tests.

use std::collections::BTreeMap;
use std::vec::Vec;

use crate::analyzer::types::{AnalyzerConfig, TransceiverId, TrxState};
use crate::analyzer::PerformanceAnalyzer;
use crate::device::radio::types::{
    ContinuousTxMode, CsmaMode, PibAttribute, PibValue, RxFrame, SunPhyPage,
};
use crate::device::radio::Radio;
use crate::device::radio_buffer::RadioBuffer;
use crate::device::rng::Rng;
use crate::device::serial::SerialPort;
use crate::device::timer::Timer;
use crate::device::{BoardInfo, Device, LedEvent};
use crate::frame::app::AppMessage;
use crate::frame::{Header, MAX_PSDU};
use crate::serial::messages::HostRequest;
use crate::serial::{EOT, SOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum MockError {
    Refused,
}

#[derive(Debug, Default)]
pub(crate) struct MockTimer {
    pub(crate) now: u32,
}

impl MockTimer {
    pub(crate) fn advance(&mut self, us: u32) {
        self.now = self.now.wrapping_add(us);
    }
}

impl Timer for MockTimer {
    type Error = MockError;

    fn now_us(&mut self) -> Result<u32, Self::Error> {
        Ok(self.now)
    }
}

/// Linear congruential generator, deterministic across runs.
#[derive(Debug)]
pub(crate) struct MockRng(u32);

impl Rng for MockRng {
    type Error = MockError;

    fn next_u32(&mut self) -> Result<u32, Self::Error> {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Ok(self.0 >> 8)
    }
}

#[derive(Debug)]
pub(crate) struct MockSerial {
    /// Bytes the host has sent, consumed from the front.
    pub(crate) input: Vec<u8>,
    /// Bytes written towards the host.
    pub(crate) output: Vec<u8>,
    /// Fail every read.
    pub(crate) broken: bool,
    tx_chunk: usize,
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::with_tx_chunk(usize::MAX)
    }
}

impl MockSerial {
    /// A port accepting at most `chunk` bytes per write.
    pub(crate) fn with_tx_chunk(chunk: usize) -> Self {
        Self { input: Vec::new(), output: Vec::new(), broken: false, tx_chunk: chunk }
    }
}

impl SerialPort for MockSerial {
    type Error = MockError;

    fn rx(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.broken {
            return Err(MockError::Refused);
        }
        let n = buf.len().min(self.input.len());
        for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn tx(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.tx_chunk);
        self.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockPib {
    pub(crate) channel: u16,
    pub(crate) page: u8,
    pub(crate) tx_power_dbm: i8,
    pub(crate) short_addr: u16,
    pub(crate) ieee_addr: u64,
    pub(crate) pan_id: u16,
    pub(crate) phy_setting: SunPhyPage,
    pub(crate) fcs_len: u8,
    pub(crate) sun_channel_count: u16,
}

impl MockPib {
    fn new(trx: TransceiverId) -> Self {
        Self {
            channel: match trx {
                TransceiverId::Rf09 => 1,
                TransceiverId::Rf24 => 11,
            },
            page: 0,
            tx_power_dbm: 14,
            short_addr: 0xFFFF,
            ieee_addr: 0x0004_25FF_FF18_0000 | trx.index() as u64,
            pan_id: 0xFFFF,
            phy_setting: SunPhyPage::default(),
            fcs_len: 2,
            sun_channel_count: 34,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SentFrame {
    pub(crate) trx: TransceiverId,
    pub(crate) mpdu: Vec<u8>,
    pub(crate) csma: CsmaMode,
    pub(crate) retry: bool,
}

#[derive(Debug)]
pub(crate) struct MockRadio {
    pub(crate) pib: [MockPib; 2],
    pub(crate) sent: Vec<SentFrame>,
    /// Refuse every transmission.
    pub(crate) refuse_tx: bool,
    pub(crate) ed_scans: Vec<(TransceiverId, u8)>,
    pub(crate) continuous: [Option<ContinuousTxMode>; 2],
    pub(crate) trx_state: [TrxState; 2],
    pub(crate) sleeping: [bool; 2],
    pub(crate) promiscuous: [bool; 2],
    pub(crate) rx_sensitivity: [u8; 2],
    pub(crate) registers: BTreeMap<u16, u8>,
    pub(crate) resets: usize,
}

impl MockRadio {
    fn new() -> Self {
        Self {
            pib: [MockPib::new(TransceiverId::Rf09), MockPib::new(TransceiverId::Rf24)],
            sent: Vec::new(),
            refuse_tx: false,
            ed_scans: Vec::new(),
            continuous: [None; 2],
            trx_state: [TrxState::RxOn; 2],
            sleeping: [false; 2],
            promiscuous: [false; 2],
            rx_sensitivity: [0; 2],
            registers: BTreeMap::new(),
            resets: 0,
        }
    }
}

impl Radio for MockRadio {
    type Error = MockError;

    fn transmit(
        &mut self,
        trx: TransceiverId,
        mpdu: &[u8],
        csma: CsmaMode,
        retry: bool,
    ) -> Result<(), Self::Error> {
        if self.refuse_tx {
            return Err(MockError::Refused);
        }
        self.sent.push(SentFrame { trx, mpdu: mpdu.to_vec(), csma, retry });
        Ok(())
    }

    fn set_pib(&mut self, trx: TransceiverId, value: PibValue) -> Result<(), Self::Error> {
        let pib = &mut self.pib[trx.index()];
        match value {
            PibValue::CurrentChannel(channel) => pib.channel = channel,
            PibValue::CurrentPage(page) => pib.page = page,
            PibValue::TransmitPower(dbm) => pib.tx_power_dbm = dbm,
            PibValue::ShortAddress(addr) => pib.short_addr = addr,
            PibValue::IeeeAddress(addr) => pib.ieee_addr = addr,
            PibValue::PanId(pan_id) => pib.pan_id = pan_id,
            PibValue::PhySetting(page) => pib.phy_setting = page,
            PibValue::FcsLength(len) => pib.fcs_len = len,
            PibValue::ChannelsSupported(_) | PibValue::SunChannelCount(_) => {
                return Err(MockError::Refused)
            }
        }
        Ok(())
    }

    fn pib(&mut self, trx: TransceiverId, attribute: PibAttribute) -> Result<PibValue, Self::Error> {
        let pib = &self.pib[trx.index()];
        Ok(match attribute {
            PibAttribute::CurrentChannel => PibValue::CurrentChannel(pib.channel),
            PibAttribute::CurrentPage => PibValue::CurrentPage(pib.page),
            PibAttribute::TransmitPower => PibValue::TransmitPower(pib.tx_power_dbm),
            PibAttribute::ShortAddress => PibValue::ShortAddress(pib.short_addr),
            PibAttribute::IeeeAddress => PibValue::IeeeAddress(pib.ieee_addr),
            PibAttribute::PanId => PibValue::PanId(pib.pan_id),
            PibAttribute::ChannelsSupported => PibValue::ChannelsSupported(match trx {
                TransceiverId::Rf09 => 0x0000_07FF,
                TransceiverId::Rf24 => 0x07FF_F800,
            }),
            PibAttribute::PhySetting => PibValue::PhySetting(pib.phy_setting),
            PibAttribute::FcsLength => PibValue::FcsLength(pib.fcs_len),
            PibAttribute::SunChannelCount => PibValue::SunChannelCount(pib.sun_channel_count),
        })
    }

    fn start_ed_scan(&mut self, trx: TransceiverId, scan_duration: u8) -> Result<(), Self::Error> {
        self.ed_scans.push((trx, scan_duration));
        Ok(())
    }

    fn set_trx_state(&mut self, trx: TransceiverId, state: TrxState) -> Result<(), Self::Error> {
        self.trx_state[trx.index()] = match state {
            TrxState::Reset => TrxState::TrxOff,
            other => other,
        };
        Ok(())
    }

    fn trx_state(&mut self, trx: TransceiverId) -> Result<TrxState, Self::Error> {
        if self.sleeping[trx.index()] {
            return Ok(TrxState::Sleep);
        }
        Ok(self.trx_state[trx.index()])
    }

    fn sleep(&mut self, trx: TransceiverId) -> Result<(), Self::Error> {
        self.sleeping[trx.index()] = true;
        Ok(())
    }

    fn wakeup(&mut self, trx: TransceiverId) -> Result<(), Self::Error> {
        self.sleeping[trx.index()] = false;
        Ok(())
    }

    fn reset(&mut self, trx: TransceiverId) -> Result<(), Self::Error> {
        let idx = trx.index();
        self.pib[idx] = MockPib::new(trx);
        self.continuous[idx] = None;
        self.promiscuous[idx] = false;
        self.rx_sensitivity[idx] = 0;
        self.trx_state[idx] = TrxState::RxOn;
        self.resets += 1;
        Ok(())
    }

    fn set_rx_sensitivity(&mut self, trx: TransceiverId, level: u8) -> Result<(), Self::Error> {
        self.rx_sensitivity[trx.index()] = level;
        Ok(())
    }

    fn set_promiscuous_mode(&mut self, trx: TransceiverId, enabled: bool) -> Result<(), Self::Error> {
        self.promiscuous[trx.index()] = enabled;
        Ok(())
    }

    fn promiscuous_mode(&mut self, trx: TransceiverId) -> Result<bool, Self::Error> {
        Ok(self.promiscuous[trx.index()])
    }

    fn tx_power_reg(&mut self, trx: TransceiverId) -> Result<u8, Self::Error> {
        Ok((self.pib[trx.index()].tx_power_dbm as i16 + 17) as u8)
    }

    fn reg_to_dbm(&mut self, _trx: TransceiverId, reg: u8) -> Result<i8, Self::Error> {
        Ok((reg as i8).wrapping_sub(17))
    }

    fn symbol_duration_us(&mut self, _trx: TransceiverId) -> Result<u32, Self::Error> {
        Ok(16)
    }

    fn start_continuous_tx(
        &mut self,
        trx: TransceiverId,
        mode: ContinuousTxMode,
    ) -> Result<(), Self::Error> {
        self.continuous[trx.index()] = Some(mode);
        Ok(())
    }

    fn stop_continuous_tx(&mut self, trx: TransceiverId) -> Result<(), Self::Error> {
        self.continuous[trx.index()] = None;
        Ok(())
    }

    fn read_register(&mut self, addr: u16) -> Result<u8, Self::Error> {
        Ok(self.registers.get(&addr).copied().unwrap_or(0))
    }

    fn write_register(&mut self, addr: u16, value: u8) -> Result<(), Self::Error> {
        self.registers.insert(addr, value);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MockDevice {
    pub(crate) timer: MockTimer,
    pub(crate) radio: MockRadio,
    pub(crate) rng: MockRng,
    pub(crate) serial: [MockSerial; 2],
    buttons: [bool; 2],
    pub(crate) leds: Vec<(TransceiverId, LedEvent)>,
    pub(crate) battery: f32,
    pub(crate) temperature: f32,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self {
            timer: MockTimer::default(),
            radio: MockRadio::new(),
            rng: MockRng(0x1234_5678),
            serial: [MockSerial::default(), MockSerial::default()],
            buttons: [false; 2],
            leds: Vec::new(),
            battery: 3.0,
            temperature: 25.0,
        }
    }

    /// The next `button_pressed` poll for `trx` reports a press.
    pub(crate) fn press_button(&mut self, trx: TransceiverId) {
        self.buttons[trx.index()] = true;
    }
}

impl Device for MockDevice {
    type Timer = MockTimer;
    type Radio = MockRadio;
    type Rng = MockRng;
    type Serial = MockSerial;

    fn timer(&mut self) -> &mut Self::Timer {
        &mut self.timer
    }

    fn radio(&mut self) -> &mut Self::Radio {
        &mut self.radio
    }

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn serial(&mut self, trx: TransceiverId) -> &mut Self::Serial {
        &mut self.serial[trx.index()]
    }

    fn board_info() -> BoardInfo {
        BoardInfo { ic_type: 0x34, mcu_name: "SAMR21", board_name: "REB215 test board" }
    }

    fn button_pressed(&mut self, trx: TransceiverId) -> bool {
        core::mem::take(&mut self.buttons[trx.index()])
    }

    fn led_event(&mut self, trx: TransceiverId, event: LedEvent) {
        self.leds.push((trx, event));
    }

    fn battery_voltage(&mut self) -> f32 {
        self.battery
    }

    fn temperature(&mut self) -> f32 {
        self.temperature
    }
}

/// An analyzer on a fresh mock board with both sessions in `WAIT_FOR_EVENT`.
pub(crate) fn analyzer() -> PerformanceAnalyzer<MockDevice> {
    let mut pa = PerformanceAnalyzer::new(MockDevice::new(), AnalyzerConfig::default());
    pa.init().unwrap();
    pa
}

/// MPDU of `msg` behind `header`, without FCS.
pub(crate) fn frame_bytes(header: &Header, seq: u8, msg: &AppMessage) -> Vec<u8> {
    let mut buf: RadioBuffer<MAX_PSDU> = RadioBuffer::new();
    header.encode(&mut buf).unwrap();
    msg.encode(seq, &mut buf).unwrap();
    buf.as_ref().to_vec()
}

/// Deliver a good frame with strong signal.
pub(crate) fn rx(pa: &mut PerformanceAnalyzer<MockDevice>, trx: TransceiverId, mpdu: &[u8]) {
    rx_with(pa, trx, mpdu, 255, -50, true);
}

pub(crate) fn rx_with(
    pa: &mut PerformanceAnalyzer<MockDevice>,
    trx: TransceiverId,
    mpdu: &[u8],
    lqi: u8,
    ed: i8,
    crc_ok: bool,
) {
    pa.rx_frame(trx, &RxFrame { mpdu, lqi, ed, crc_ok });
}

/// Push raw host bytes and run the loop until all of them are parsed.
pub(crate) fn host_bytes(pa: &mut PerformanceAnalyzer<MockDevice>, trx: TransceiverId, bytes: &[u8]) {
    pa.device_mut().serial[trx.index()].input.extend_from_slice(bytes);
    for _ in 0..256 {
        if pa.device().serial[trx.index()].input.is_empty() && !pa.session(trx).serial.has_input() {
            return;
        }
        pa.task().unwrap();
    }
    panic!("host input not consumed");
}

pub(crate) fn host_request(
    pa: &mut PerformanceAnalyzer<MockDevice>,
    trx: TransceiverId,
    request: &HostRequest,
) {
    host_bytes(pa, trx, &request.encode().unwrap());
}

/// Flush everything queued for the host and split it into message bodies `[PROTOCOL_ID, id, ...]`.
pub(crate) fn host_messages(pa: &mut PerformanceAnalyzer<MockDevice>, trx: TransceiverId) -> Vec<Vec<u8>> {
    let idx = trx.index();
    while pa.sessions[idx].serial.pending_tx() > 0 {
        pa.sessions[idx].serial.drain(&mut pa.device.serial[idx]).unwrap();
    }
    let output = core::mem::take(&mut pa.device.serial[idx].output);
    let mut messages = Vec::new();
    let mut rest = output.as_slice();
    while let [SOT, len, tail @ ..] = rest {
        let len = *len as usize;
        assert_eq!(tail[len], EOT, "host frame not terminated");
        messages.push(tail[..len].to_vec());
        rest = &tail[len + 1..];
    }
    assert!(rest.is_empty(), "stray bytes towards the host");
    messages
}

/// Header, application sequence number and message of the last frame sent on `trx`.
pub(crate) fn last_sent(pa: &mut PerformanceAnalyzer<MockDevice>, trx: TransceiverId) -> (Header, u8, AppMessage) {
    let frame = pa.device().radio.sent.iter().rev().find(|f| f.trx == trx).expect("nothing sent");
    let (header, payload) = Header::decode(&frame.mpdu).unwrap();
    let (seq, msg) = AppMessage::decode(payload).unwrap();
    (header, seq, msg)
}
