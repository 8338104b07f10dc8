use rand::random_range;
use std::thread;
use std::time::Duration;
use uom::si::{electric_potential::volt, f64::ElectricPotential};

use crate::channel::ChannelId;
use crate::controller::backend::adda_hardware::{
    AddaHardware, ChipId, Gain, HardwareError, OutputChannel, SampleRate,
};
use crate::converter::{OutputCode, code_to_voltage};

/// Chip id of the simulated ADS1256
const SIM_CHIP_ID: ChipId = 3;
/// Input range of the ADC at unity gain, in microvolts
const FULL_SCALE_MICROVOLTS: i32 = 5_000_000;
/// Simulated potentiometer wired to input 0
const POTENTIOMETER_MICROVOLTS: i32 = 2_500_000;
/// Spacing of the synthetic ramp on the remaining inputs
const RAMP_STEP_MICROVOLTS: i32 = 500_000;
/// Peak conversion noise
const NOISE_MICROVOLTS: i32 = 50;

/// Simulated converter pair.
///
/// Input 0 reads a potentiometer, input 7 is looped back from DAC output A,
/// the others read a fixed ramp. All readings carry a little noise.
#[derive(Debug)]
pub struct SimBoard {
    transport_open: bool,
    config: Option<(Gain, SampleRate)>,
    /// DRATE register image written on init
    drate: u8,
    outputs: [OutputCode; 2],
    output_reference: ElectricPotential,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            transport_open: false,
            config: None,
            drate: 0,
            outputs: [OutputCode::ZERO; 2],
            output_reference: ElectricPotential::new::<volt>(5.0),
        }
    }

    /// Last value written to the DRATE register
    pub fn drate_register(&self) -> u8 {
        self.drate
    }

    /// Code currently held by a DAC output
    pub fn output(&self, channel: OutputChannel) -> OutputCode {
        self.outputs[Self::output_index(channel)]
    }

    fn output_index(channel: OutputChannel) -> usize {
        match channel {
            OutputChannel::A => 0,
            OutputChannel::B => 1,
        }
    }

    fn input_microvolts(&self, channel: ChannelId) -> i32 {
        match channel.index() {
            0 => POTENTIOMETER_MICROVOLTS,
            7 => {
                let loopback =
                    code_to_voltage(self.output_reference, self.output(OutputChannel::A));
                (loopback.get::<volt>() * 1_000_000.0).round() as i32
            }
            n => i32::from(n) * RAMP_STEP_MICROVOLTS,
        }
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl AddaHardware for SimBoard {
    fn transport_open(&mut self) -> Result<(), HardwareError> {
        tracing::info!("Simulated SPI bus opened");
        self.transport_open = true;
        Ok(())
    }

    fn device_init(
        &mut self,
        gain: Gain,
        sample_rate: SampleRate,
    ) -> Result<ChipId, HardwareError> {
        if !self.transport_open {
            return Err(HardwareError::new(-1, "SPI bus is not open"));
        }
        tracing::info!("Simulated ADC configured: gain {:?}, rate {:?}", gain, sample_rate);
        self.drate = sample_rate.register_value();
        tracing::debug!(
            "ADCON PGA bits {:#05b}, DRATE {:#04x}",
            gain.register_bits(),
            self.drate
        );
        self.config = Some((gain, sample_rate));
        Ok(SIM_CHIP_ID)
    }

    fn read_channel(&mut self, channel: ChannelId) -> Result<i32, HardwareError> {
        let Some((gain, sample_rate)) = self.config else {
            return Err(HardwareError::new(-3, "ADC is not configured"));
        };

        // One conversion per read at the configured data rate
        thread::sleep(sample_rate.conversion_time());

        let limit = FULL_SCALE_MICROVOLTS / i32::from(gain.multiplier());
        let noisy =
            self.input_microvolts(channel) + random_range(-NOISE_MICROVOLTS..=NOISE_MICROVOLTS);
        Ok(noisy.clamp(-limit, limit))
    }

    fn device_write_output(
        &mut self,
        channel: OutputChannel,
        code: OutputCode,
    ) -> Result<(), HardwareError> {
        if self.config.is_none() {
            return Err(HardwareError::new(-4, "DAC chip select is not configured"));
        }
        tracing::debug!("Simulated DAC {channel} set to {code}");
        self.outputs[Self::output_index(channel)] = code;
        Ok(())
    }

    fn device_close(&mut self) -> Result<(), HardwareError> {
        if self.config.take().is_none() {
            return Err(HardwareError::new(-2, "converters are not initialized"));
        }
        self.outputs = [OutputCode::ZERO; 2];
        tracing::info!("Simulated converters released");
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
