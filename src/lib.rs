#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

// This must go first so the logging macros are visible to every module below.
mod fmt;

use device::Device;

pub mod analyzer;
pub mod device;
pub mod frame;
pub mod serial;

#[cfg(test)]
pub(crate) mod test_utils;

pub use analyzer::types::{
    AnalyzerConfig, MainState, Status, SunModulation, SunPhyPage, TransceiverId, TrxConfigParams,
};
pub use analyzer::PerformanceAnalyzer;

/// Failure reported by the engine. Malformed frames and host messages are
/// dropped where they arrive, so only the board's drivers can fail a call.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error<D>
where
    D: Device,
{
    Device(device::Error<D>),
}
