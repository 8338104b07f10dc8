use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AddaError;

/// Number of single ended inputs on the ADC
pub const INPUT_CHANNEL_COUNT: usize = 8;

/// Physical ADC input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn new(id: u8) -> Result<Self, AddaError> {
        if usize::from(id) < INPUT_CHANNEL_COUNT {
            Ok(Self(id))
        } else {
            Err(AddaError::InvalidChannelSet(format!(
                "channel {id} is out of range 0..{INPUT_CHANNEL_COUNT}"
            )))
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ain{}", self.0)
    }
}

/// Ordered set of distinct inputs, sampled in wiring order.
///
/// Immutable once built: the sampler relies on its length to validate every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSet {
    channels: Vec<ChannelId>,
}

impl ChannelSet {
    /// Build a set from raw ids, rejecting empty lists, duplicates and unknown inputs
    pub fn try_new(ids: &[u8]) -> Result<Self, AddaError> {
        if ids.is_empty() {
            return Err(AddaError::InvalidChannelSet(
                "at least one channel is required".to_string(),
            ));
        }

        let mut channels = Vec::new();
        channels.try_reserve_exact(ids.len()).map_err(|err| {
            AddaError::Resource(format!("channel set of {} entries: {err}", ids.len()))
        })?;

        for &id in ids {
            let channel = ChannelId::new(id)?;
            if channels.contains(&channel) {
                return Err(AddaError::InvalidChannelSet(format!(
                    "channel {channel} is listed twice"
                )));
            }
            channels.push(channel);
        }

        Ok(Self { channels })
    }

    /// Every input of the ADC, in order
    pub fn all() -> Result<Self, AddaError> {
        let ids: [u8; INPUT_CHANNEL_COUNT] = std::array::from_fn(|i| i as u8);
        Self::try_new(&ids)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().copied()
    }

    pub fn as_slice(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Batch index at which `channel` is sampled
    pub fn position(&self, channel: ChannelId) -> Option<usize> {
        self.channels.iter().position(|c| *c == channel)
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{channel}")?;
        }
        Ok(())
    }
}
