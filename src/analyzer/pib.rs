//! Driver access that must not fail a callback. Failures are logged and a neutral value is used.

use super::types::TransceiverId;
use super::PerformanceAnalyzer;
use crate::device::radio::types::{PibAttribute, PibValue, SunPhyPage};
use crate::device::radio::Radio;
use crate::device::Device;

macro_rules! pib_getter {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty, $fallback:expr) => {
        $(#[$doc])*
        pub(crate) fn $name(&mut self, trx: TransceiverId) -> $ty {
            match self.device.radio().pib(trx, PibAttribute::$variant) {
                Ok(PibValue::$variant(value)) => value,
                Ok(other) => {
                    warn!("{}: unexpected {} for {}", trx, other, PibAttribute::$variant);
                    $fallback
                }
                Err(e) => {
                    warn!("{}: reading {} failed: {}", trx, PibAttribute::$variant, e);
                    $fallback
                }
            }
        }
    };
}

impl<D> PerformanceAnalyzer<D>
where
    D: Device,
{
    pib_getter!(pib_channel, CurrentChannel, u16, 0);
    pib_getter!(pib_page, CurrentPage, u8, 0);
    pib_getter!(pib_tx_power_dbm, TransmitPower, i8, 0);
    pib_getter!(pib_short_addr, ShortAddress, u16, 0);
    pib_getter!(pib_ieee_addr, IeeeAddress, u64, 0);
    pib_getter!(
        /// Legacy channels the front end supports.
        pib_channels_supported,
        ChannelsSupported,
        u32,
        0
    );
    pib_getter!(pib_phy_setting, PhySetting, SunPhyPage, SunPhyPage::default());
    pib_getter!(pib_fcs_len, FcsLength, u8, 2);
    pib_getter!(
        /// Channel count of the active SUN page.
        pib_sun_channel_count,
        SunChannelCount,
        u16,
        0
    );

    /// Write a PIB attribute. Returns whether the driver took it.
    pub(crate) fn set_pib(&mut self, trx: TransceiverId, value: PibValue) -> bool {
        match self.device.radio().set_pib(trx, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: writing {} failed: {}", trx, value.attribute(), e);
                false
            }
        }
    }

    pub(crate) fn reset_radio(&mut self, trx: TransceiverId) {
        if let Err(e) = self.device.radio().reset(trx) {
            warn!("{}: reset failed: {}", trx, e);
        }
    }

    pub(crate) fn tx_power_reg(&mut self, trx: TransceiverId) -> u8 {
        self.device.radio().tx_power_reg(trx).unwrap_or_else(|e| {
            warn!("{}: reading power register failed: {}", trx, e);
            0
        })
    }

    pub(crate) fn reg_to_dbm(&mut self, trx: TransceiverId, reg: u8) -> i8 {
        self.device.radio().reg_to_dbm(trx, reg).unwrap_or_else(|e| {
            warn!("{}: power conversion failed: {}", trx, e);
            0
        })
    }

    pub(crate) fn symbol_duration_us(&mut self, trx: TransceiverId) -> u32 {
        self.device.radio().symbol_duration_us(trx).unwrap_or_else(|e| {
            warn!("{}: symbol duration unknown: {}", trx, e);
            16
        })
    }
}
