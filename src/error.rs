use thiserror::Error;

use crate::controller::backend::adda_hardware::{HardwareError, OutputChannel};
use crate::channel::ChannelId;
use crate::converter::OutputCode;
use crate::lifecycle::LifecycleState;

/// Stage of the sampling cycle an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Channel array and batch buffer preparation
    Allocation,
    Transport,
    Open,
    Sample,
    Write,
    Close,
    /// A lifecycle precondition was violated by the caller
    Lifecycle,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddaError {
    #[error("unable to allocate {0}")]
    Resource(String),

    #[error("invalid channel set: {0}")]
    InvalidChannelSet(String),

    #[error("SPI transport failed to open: {0}")]
    Transport(#[source] HardwareError),

    #[error("device refused configuration: {0}")]
    Init(#[source] HardwareError),

    #[error("batch acquisition failed on channel {channel}: {source}")]
    Sample {
        channel: ChannelId,
        source: HardwareError,
    },

    #[error("batch acquisition returned {received} codes for {expected} channels")]
    ShortBatch { expected: usize, received: usize },

    #[error("output stage rejected code {code} on channel {channel}: {source}")]
    Write {
        channel: OutputChannel,
        code: OutputCode,
        source: HardwareError,
    },

    #[error("device teardown failed: {0}")]
    Close(#[source] HardwareError),

    /// Teardown after an earlier failure failed as well
    #[error("{primary}; teardown afterwards also failed: {close}")]
    Compound {
        primary: Box<AddaError>,
        close: HardwareError,
    },

    #[error("cannot {operation} while the device is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
}

impl AddaError {
    /// The stage that failed first
    pub fn stage(&self) -> Stage {
        match self {
            AddaError::Resource(_) | AddaError::InvalidChannelSet(_) => Stage::Allocation,
            AddaError::Transport(_) => Stage::Transport,
            AddaError::Init(_) => Stage::Open,
            AddaError::Sample { .. } | AddaError::ShortBatch { .. } => Stage::Sample,
            AddaError::Write { .. } => Stage::Write,
            AddaError::Close(_) => Stage::Close,
            AddaError::Compound { primary, .. } => primary.stage(),
            AddaError::InvalidState { .. } => Stage::Lifecycle,
        }
    }

    /// Process exit status reported by the binary for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AddaError::Init(_) => -1,
            AddaError::Close(_) => -2,
            AddaError::Sample { .. } | AddaError::ShortBatch { .. } => -3,
            AddaError::Write { .. } => -4,
            AddaError::Compound { .. } => -5,
            AddaError::InvalidState { .. } => -6,
            AddaError::Transport(_) => -55,
            AddaError::Resource(_) | AddaError::InvalidChannelSet(_) => -56,
        }
    }
}
