use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::*;
use uom::si::{electric_potential::volt, f64::ElectricPotential};

use crate::channel::{ChannelId, ChannelSet, INPUT_CHANNEL_COUNT};
use crate::controller::backend::adda_hardware::{AddaHardware, Gain, OutputChannel, SampleRate};
use crate::converter::{MICROVOLTS_TO_VOLTS, OutputCode, VoltageBatch, voltage_to_code};
use crate::error::AddaError;
use crate::lifecycle::LifecycleManager;

pub mod backend;

/// Batches acquired per session
pub const DEFAULT_ITERATIONS: u32 = 10;
/// Wait after each output write before the next batch
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_micros(1000);
/// Reference voltage of the DAC output stage
pub const DEFAULT_OUTPUT_REFERENCE_VOLTS: f64 = 5.0;

/// Configuration of a feedback run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Number of open/sample/close rounds
    pub repeat_count: u32,
    /// Batches per round
    pub iterations: u32,
    pub gain: Gain,
    pub sample_rate: SampleRate,
    /// Inputs to sample, in order
    pub channels: Vec<u8>,
    /// Input whose voltage is reproduced on `output_channel`
    pub feedback_channel: u8,
    pub output_channel: OutputChannel,
    pub settle_delay: Duration,
    /// Scale from raw ADC codes to volts
    pub raw_scale: f64,
    pub output_reference: ElectricPotential,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            iterations: DEFAULT_ITERATIONS,
            gain: Gain::X1,
            sample_rate: SampleRate::Sps100,
            channels: (0..INPUT_CHANNEL_COUNT as u8).collect(),
            feedback_channel: 0,
            output_channel: OutputChannel::A,
            settle_delay: DEFAULT_SETTLE_DELAY,
            raw_scale: MICROVOLTS_TO_VOLTS,
            output_reference: ElectricPotential::new::<volt>(DEFAULT_OUTPUT_REFERENCE_VOLTS),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleSummary {
    pub rounds_completed: u32,
    pub batches_acquired: u32,
    /// Feedback voltage of the last batch, copied out of it
    pub last_feedback: Option<ElectricPotential>,
    pub last_output: Option<OutputCode>,
}

/// Top level read-convert-write loop, responsible for:
/// * Preparing the channel set and opening the SPI transport
/// * Running `repeat_count` sessions of `iterations` batches each
///     - Converting every batch to voltages
///     - Reproducing the feedback channel on the output stage
/// * Closing any open session exactly once when a stage fails
#[derive(Debug)]
pub struct CycleController<H: AddaHardware> {
    manager: LifecycleManager<H>,
    config: CycleConfig,
}

impl<H: AddaHardware> CycleController<H> {
    pub fn new(hardware: H, config: CycleConfig) -> Self {
        Self {
            manager: LifecycleManager::new(hardware),
            config,
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn manager(&self) -> &LifecycleManager<H> {
        &self.manager
    }

    pub fn into_hardware(self) -> H {
        self.manager.into_hardware()
    }

    /// Run every configured round, stopping at the first failure
    pub fn run(&mut self) -> Result<CycleSummary, AddaError> {
        let channels = ChannelSet::try_new(&self.config.channels)?;
        let feedback = ChannelId::new(self.config.feedback_channel)?;
        let feedback_index = channels.position(feedback).ok_or_else(|| {
            AddaError::InvalidChannelSet(format!("feedback channel {feedback} is not sampled"))
        })?;
        info!("Channels array ready: {channels}");

        self.manager.open_transport()?;

        let mut summary = CycleSummary::default();
        for round in 0..self.config.repeat_count {
            info!("[Round {round}] Opening converters...");
            self.manager.open(self.config.gain, self.config.sample_rate)?;

            if let Err(primary) = self.sample_round(&channels, feedback_index, &mut summary) {
                error!("Round aborted: {primary}");
                return Err(self.manager.close_after(primary));
            }

            info!("[Round {round}] Closing converters...");
            self.manager.close()?;
            summary.rounds_completed += 1;
        }

        Ok(summary)
    }

    fn sample_round(
        &mut self,
        channels: &ChannelSet,
        feedback_index: usize,
        summary: &mut CycleSummary,
    ) -> Result<(), AddaError> {
        for iteration in 0..self.config.iterations {
            let raw = self.manager.sample_batch(channels)?;
            let volts = VoltageBatch::from_raw(raw, self.config.raw_scale)?;
            info!("Sample {iteration}: {volts}");

            let target = volts.get(feedback_index).ok_or(AddaError::ShortBatch {
                expected: channels.len(),
                received: volts.len(),
            })?;
            let code = voltage_to_code(self.config.output_reference, target);
            self.manager.write_output(self.config.output_channel, code)?;

            summary.batches_acquired += 1;
            summary.last_feedback = Some(target);
            summary.last_output = Some(code);
            drop(volts);

            self.manager.delay(self.config.settle_delay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backend::mock::MockBoard;
    use crate::lifecycle::LifecycleState;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn default_config_matches_demo_harness() {
        let config = CycleConfig::default();
        assert_eq!(config.repeat_count, 1);
        assert_eq!(config.iterations, 10);
        assert_eq!(config.channels, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(config.settle_delay, Duration::from_micros(1000));
        assert_eq!(config.output_reference.get::<volt>(), 5.0);
    }

    #[test]
    fn config_fills_missing_fields_from_defaults() {
        let config: CycleConfig =
            serde_json::from_str(r#"{ "iterations": 3, "gain": "X8" }"#).unwrap();
        assert_eq!(config.iterations, 3);
        assert_eq!(config.gain, Gain::X8);
        assert_eq!(config.repeat_count, 1);
        assert_eq!(config.sample_rate, SampleRate::Sps100);
    }

    #[test]
    fn feedback_channel_must_be_sampled() {
        init_test_logging();
        let config = CycleConfig {
            channels: vec![1, 2],
            feedback_channel: 0,
            ..Default::default()
        };
        let mut controller = CycleController::new(MockBoard::new(), config);

        let err = controller.run().unwrap_err();

        assert_eq!(err.exit_code(), -56);
        assert!(controller.manager().hardware().journal().is_empty());
    }

    #[test]
    fn feedback_follows_channel_position() {
        init_test_logging();
        let board = MockBoard::new().with_codes([0, 0, 0, 1_250_000, 0, 0, 0, 0]);
        let config = CycleConfig {
            channels: vec![5, 3],
            feedback_channel: 3,
            iterations: 1,
            ..Default::default()
        };
        let mut controller = CycleController::new(board, config);

        let summary = controller.run().unwrap();

        // 1.25 V of 5 V is a quarter of the DAC range
        assert_eq!(summary.last_output, Some(OutputCode(0x4000)));
        let feedback = summary.last_feedback.unwrap().get::<volt>();
        assert!((feedback - 1.25).abs() < 1e-9);
        assert_eq!(controller.manager().state(), LifecycleState::Closed);
    }

    #[test]
    fn write_failure_closes_session() {
        init_test_logging();
        // Writes 0 and 1 zero the outputs, write 2 is the first feedback write
        let board = MockBoard::new().failing_write_on(2, -30);
        let mut controller = CycleController::new(board, CycleConfig::default());

        let err = controller.run().unwrap_err();

        assert_eq!(err.exit_code(), -4);
        assert_eq!(controller.manager().hardware().close_calls(), 1);
        assert_eq!(controller.manager().state(), LifecycleState::Closed);
    }
}
