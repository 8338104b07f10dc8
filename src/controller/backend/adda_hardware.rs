use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::Duration;
use thiserror::Error;

use crate::channel::{ChannelId, ChannelSet};
use crate::converter::OutputCode;

/// Settle time between multiplexing an input and reading its conversion
pub const CHANNEL_SETTLE_DELAY: Duration = Duration::from_micros(25);

/// Identifier reported by the ADC status register after initialization
pub type ChipId = u8;

/// Programmable gain of the ADC input amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gain {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
}

impl Gain {
    pub fn multiplier(self) -> u8 {
        1 << self.register_bits()
    }

    /// Value of the PGA bits in the ADCON register
    pub fn register_bits(self) -> u8 {
        match self {
            Gain::X1 => 0,
            Gain::X2 => 1,
            Gain::X4 => 2,
            Gain::X8 => 3,
            Gain::X16 => 4,
            Gain::X32 => 5,
            Gain::X64 => 6,
        }
    }
}

/// ADC output data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleRate {
    Sps30000,
    Sps15000,
    Sps7500,
    Sps3750,
    Sps2000,
    Sps1000,
    Sps500,
    #[default]
    Sps100,
    Sps60,
    Sps50,
    Sps30,
    Sps25,
    Sps15,
    Sps10,
    Sps5,
    Sps2_5,
}

impl SampleRate {
    pub fn samples_per_second(self) -> f64 {
        match self {
            SampleRate::Sps30000 => 30_000.0,
            SampleRate::Sps15000 => 15_000.0,
            SampleRate::Sps7500 => 7_500.0,
            SampleRate::Sps3750 => 3_750.0,
            SampleRate::Sps2000 => 2_000.0,
            SampleRate::Sps1000 => 1_000.0,
            SampleRate::Sps500 => 500.0,
            SampleRate::Sps100 => 100.0,
            SampleRate::Sps60 => 60.0,
            SampleRate::Sps50 => 50.0,
            SampleRate::Sps30 => 30.0,
            SampleRate::Sps25 => 25.0,
            SampleRate::Sps15 => 15.0,
            SampleRate::Sps10 => 10.0,
            SampleRate::Sps5 => 5.0,
            SampleRate::Sps2_5 => 2.5,
        }
    }

    /// Value of the DRATE register
    pub fn register_value(self) -> u8 {
        match self {
            SampleRate::Sps30000 => 0xF0,
            SampleRate::Sps15000 => 0xE0,
            SampleRate::Sps7500 => 0xD0,
            SampleRate::Sps3750 => 0xC0,
            SampleRate::Sps2000 => 0xB0,
            SampleRate::Sps1000 => 0xA1,
            SampleRate::Sps500 => 0x92,
            SampleRate::Sps100 => 0x82,
            SampleRate::Sps60 => 0x72,
            SampleRate::Sps50 => 0x63,
            SampleRate::Sps30 => 0x53,
            SampleRate::Sps25 => 0x43,
            SampleRate::Sps15 => 0x33,
            SampleRate::Sps10 => 0x23,
            SampleRate::Sps5 => 0x13,
            SampleRate::Sps2_5 => 0x03,
        }
    }

    /// Time a single conversion takes at this rate
    pub fn conversion_time(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.samples_per_second())
    }
}

/// Output of the dual channel DAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputChannel {
    A,
    B,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 2] = [OutputChannel::A, OutputChannel::B];
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::A => write!(f, "dac_a"),
            OutputChannel::B => write!(f, "dac_b"),
        }
    }
}

/// Failure reported by the hardware abstraction layer, carrying its status code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hardware returned code {code}: {reason}")]
pub struct HardwareError {
    pub code: i32,
    pub reason: String,
}

impl HardwareError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A channel read that failed partway through a batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reading {channel} failed: {source}")]
pub struct ChannelFault {
    pub channel: ChannelId,
    pub source: HardwareError,
}

/// SPI attached ADC/DAC board.
///
/// Every call blocks until the transport responds. Implementations are driven
/// exclusively by the lifecycle manager, which enforces call ordering.
pub trait AddaHardware: Debug {
    /// Open and validate the SPI bus
    fn transport_open(&mut self) -> Result<(), HardwareError>;

    /// Configure chip selects and the ADC, returning the chip id
    fn device_init(
        &mut self,
        gain: Gain,
        sample_rate: SampleRate,
    ) -> Result<ChipId, HardwareError>;

    /// Multiplex `channel` and return its raw conversion in microvolt counts
    fn read_channel(&mut self, channel: ChannelId) -> Result<i32, HardwareError>;

    fn device_write_output(
        &mut self,
        channel: OutputChannel,
        code: OutputCode,
    ) -> Result<(), HardwareError>;

    fn device_close(&mut self) -> Result<(), HardwareError>;

    /// Blocking wait
    fn delay(&mut self, duration: Duration);

    /// Read every channel of `channels` in order into `codes`.
    ///
    /// `codes` is cleared first. On failure its content is unspecified.
    fn device_read_channels(
        &mut self,
        channels: &ChannelSet,
        codes: &mut Vec<i32>,
    ) -> Result<(), ChannelFault> {
        read_channels_in_order(self, channels, codes)
    }
}

/// Settle then read each channel of `channels` in order, stopping at the first fault
pub fn read_channels_in_order<H: AddaHardware + ?Sized>(
    hardware: &mut H,
    channels: &ChannelSet,
    codes: &mut Vec<i32>,
) -> Result<(), ChannelFault> {
    codes.clear();
    for channel in channels.iter() {
        hardware.delay(CHANNEL_SETTLE_DELAY);
        let code = hardware
            .read_channel(channel)
            .map_err(|source| ChannelFault { channel, source })?;
        codes.push(code);
    }
    Ok(())
}
