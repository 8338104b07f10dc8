use serde::Serialize;
use std::time::Duration;
use tracing::*;

use crate::channel::ChannelSet;
use crate::controller::backend::adda_hardware::{
    AddaHardware, ChipId, Gain, HardwareError, OutputChannel, SampleRate,
};
use crate::converter::OutputCode;
use crate::error::AddaError;
use crate::sampler::{self, RawSampleBatch};

/// Identifies one open session of a manager
pub type SessionId = u32;

/// Lifecycle of the converter pair. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Closed,
    Initializing,
    Open,
    Closing,
    Failed,
}

/// Configuration of the live session, valid between `open` and `close`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSession {
    id: SessionId,
    chip_id: ChipId,
    gain: Gain,
    sample_rate: SampleRate,
}

impl DeviceSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn chip_id(&self) -> ChipId {
        self.chip_id
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }
}

/// Owns the hardware and mediates every call to it.
///
/// Holding the board by value means one manager is the only path to it, so a
/// second session can only be requested through this state machine, which
/// rejects it.
#[derive(Debug)]
pub struct LifecycleManager<H: AddaHardware> {
    hardware: H,
    state: LifecycleState,
    transport_ready: bool,
    session: Option<DeviceSession>,
    next_session_id: SessionId,
}

impl<H: AddaHardware> LifecycleManager<H> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            state: LifecycleState::Closed,
            transport_ready: false,
            session: None,
            next_session_id: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn into_hardware(self) -> H {
        self.hardware
    }

    /// Open the SPI bus. Only the first successful call reaches the hardware.
    pub fn open_transport(&mut self) -> Result<(), AddaError> {
        if self.transport_ready {
            debug!("SPI transport already open");
            return Ok(());
        }

        self.hardware.transport_open().map_err(|err| {
            error!("SPI init failed: {err}");
            AddaError::Transport(err)
        })?;
        self.transport_ready = true;
        info!("SPI initialized");
        Ok(())
    }

    /// Initialize the converters and drive both outputs to zero.
    ///
    /// Outputs are only driven after initialization configured the chip select
    /// lines, and before this returns, so nothing can sample or write earlier.
    pub fn open(&mut self, gain: Gain, sample_rate: SampleRate) -> Result<SessionId, AddaError> {
        self.require(LifecycleState::Closed, "open a session")?;
        if !self.transport_ready {
            return Err(AddaError::InvalidState {
                operation: "open a session before the SPI transport",
                state: self.state,
            });
        }

        self.state = LifecycleState::Initializing;
        info!("Initializing converters: gain {:?}, rate {:?}", gain, sample_rate);

        let chip_id = match self.hardware.device_init(gain, sample_rate) {
            Ok(chip_id) => chip_id,
            Err(err) => {
                error!("Converter init failed: {err}");
                self.state = LifecycleState::Failed;
                return Err(AddaError::Init(err));
            }
        };

        let session = DeviceSession {
            id: self.next_session_id,
            chip_id,
            gain,
            sample_rate,
        };
        self.next_session_id = self.next_session_id.wrapping_add(1);
        self.session = Some(session);
        self.state = LifecycleState::Open;
        info!("Converters initialized, chip ID={chip_id}, session {}", session.id);

        if let Err(primary) = self.zero_outputs() {
            error!("Unable to zero outputs of a fresh session: {primary}");
            self.state = LifecycleState::Failed;
            self.session = None;

            // The chip is configured at this point, release it before reporting
            return Err(match self.hardware.device_close() {
                Ok(()) => primary,
                Err(close) => AddaError::Compound {
                    primary: Box::new(primary),
                    close,
                },
            });
        }

        Ok(session.id)
    }

    fn zero_outputs(&mut self) -> Result<(), AddaError> {
        for channel in OutputChannel::ALL {
            self.write_output(channel, OutputCode::ZERO)?;
        }
        Ok(())
    }

    /// Acquire one batch. A failed batch leaves the session open.
    pub fn sample_batch(&mut self, channels: &ChannelSet) -> Result<RawSampleBatch, AddaError> {
        self.require(LifecycleState::Open, "sample")?;
        let session = self.session.ok_or(AddaError::InvalidState {
            operation: "sample without a session",
            state: self.state,
        })?;

        sampler::sample_batch(&mut self.hardware, &session, channels)
    }

    /// Drive one DAC output. A rejected write leaves the session open.
    pub fn write_output(&mut self, channel: OutputChannel, code: OutputCode) -> Result<(), AddaError> {
        self.require(LifecycleState::Open, "drive an output")?;
        self.hardware
            .device_write_output(channel, code)
            .map_err(|source| AddaError::Write {
                channel,
                code,
                source,
            })
    }

    /// Blocking settle wait on the hardware
    pub fn delay(&mut self, duration: Duration) {
        self.hardware.delay(duration);
    }

    /// Tear the converters down. Only valid while `Open`.
    pub fn close(&mut self) -> Result<(), AddaError> {
        self.require(LifecycleState::Open, "close")?;
        self.teardown().map_err(AddaError::Close)
    }

    /// Close the session `primary` aborted, folding a teardown failure into the report.
    ///
    /// Without an open session nothing is released and `primary` is returned as is.
    pub fn close_after(&mut self, primary: AddaError) -> AddaError {
        if self.state != LifecycleState::Open {
            warn!("No open session to release after: {primary}");
            return primary;
        }
        match self.teardown() {
            Ok(()) => primary,
            Err(close) => AddaError::Compound {
                primary: Box::new(primary),
                close,
            },
        }
    }

    fn teardown(&mut self) -> Result<(), HardwareError> {
        self.state = LifecycleState::Closing;
        self.session = None;

        match self.hardware.device_close() {
            Ok(()) => {
                self.state = LifecycleState::Closed;
                info!("Converters closed");
                Ok(())
            }
            Err(err) => {
                error!("Converter close failed: {err}");
                self.state = LifecycleState::Failed;
                Err(err)
            }
        }
    }

    fn require(&self, expected: LifecycleState, operation: &'static str) -> Result<(), AddaError> {
        if self.state == expected {
            Ok(())
        } else {
            warn!("Rejected attempt to {operation} while {:?}", self.state);
            Err(AddaError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
