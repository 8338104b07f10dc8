use serde::Serialize;
use tracing::debug;

use crate::channel::ChannelSet;
use crate::controller::backend::adda_hardware::{AddaHardware, ChannelFault, Gain, SampleRate};
use crate::error::AddaError;
use crate::lifecycle::DeviceSession;

/// One raw code per channel, all taken under a single gain/rate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSampleBatch {
    codes: Vec<i32>,
    gain: Gain,
    sample_rate: SampleRate,
}

impl RawSampleBatch {
    pub fn new(codes: Vec<i32>, gain: Gain, sample_rate: SampleRate) -> Self {
        Self {
            codes,
            gain,
            sample_rate,
        }
    }

    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }
}

/// Acquire one batch over `channels` under the configuration of `session`.
///
/// Either every channel yields a code or the whole batch is discarded and the
/// failing channel is reported.
pub fn sample_batch<H: AddaHardware + ?Sized>(
    hardware: &mut H,
    session: &DeviceSession,
    channels: &ChannelSet,
) -> Result<RawSampleBatch, AddaError> {
    let mut codes = Vec::new();
    codes.try_reserve_exact(channels.len()).map_err(|err| {
        AddaError::Resource(format!("raw batch of {} codes: {err}", channels.len()))
    })?;

    hardware
        .device_read_channels(channels, &mut codes)
        .map_err(|ChannelFault { channel, source }| AddaError::Sample { channel, source })?;

    if codes.len() != channels.len() {
        return Err(AddaError::ShortBatch {
            expected: channels.len(),
            received: codes.len(),
        });
    }

    debug!(session = session.id(), "Sampled {}: {:?}", channels, codes);

    Ok(RawSampleBatch::new(
        codes,
        session.gain(),
        session.sample_rate(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::controller::backend::adda_hardware::OutputChannel;
    use crate::controller::backend::mock::{MockBoard, MockCall};
    use crate::lifecycle::LifecycleManager;

    fn open_manager(board: MockBoard) -> LifecycleManager<MockBoard> {
        let mut manager = LifecycleManager::new(board);
        manager.open_transport().unwrap();
        manager.open(Gain::X2, SampleRate::Sps1000).unwrap();
        manager
    }

    #[test]
    fn batch_matches_channel_order() {
        let board = MockBoard::new().with_codes([10, 11, 12, 13, 14, 15, 16, 17]);
        let mut manager = open_manager(board);
        let channels = ChannelSet::try_new(&[3, 0, 7]).unwrap();

        let batch = manager.sample_batch(&channels).unwrap();

        assert_eq!(batch.codes(), &[13, 10, 17]);
        assert_eq!(batch.gain(), Gain::X2);
        assert_eq!(batch.sample_rate(), SampleRate::Sps1000);
    }

    #[test]
    fn every_channel_set_length_yields_full_batch() {
        let mut manager = open_manager(MockBoard::new());
        for len in 1..=8u8 {
            let ids: Vec<u8> = (0..len).collect();
            let channels = ChannelSet::try_new(&ids).unwrap();
            let batch = manager.sample_batch(&channels).unwrap();
            assert_eq!(batch.len(), channels.len());
        }
    }

    #[test]
    fn failing_channel_discards_whole_batch() {
        let board = MockBoard::new().failing_read_on(5, -21);
        let mut manager = open_manager(board);
        let channels = ChannelSet::all().unwrap();

        let err = manager.sample_batch(&channels).unwrap_err();

        match err {
            AddaError::Sample { channel, source } => {
                assert_eq!(channel, ChannelId::new(5).unwrap());
                assert_eq!(source.code, -21);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn short_transport_read_is_an_error() {
        let board = MockBoard::new().dropping_last_code();
        let mut manager = open_manager(board);
        let channels = ChannelSet::all().unwrap();

        assert_eq!(
            manager.sample_batch(&channels),
            Err(AddaError::ShortBatch {
                expected: 8,
                received: 7
            })
        );
    }

    #[test]
    fn channels_settle_before_each_read() {
        let mut manager = open_manager(MockBoard::new());
        let channels = ChannelSet::try_new(&[1, 2]).unwrap();
        manager.sample_batch(&channels).unwrap();

        let journal = manager.hardware().journal();
        let reads: Vec<&MockCall> = journal
            .iter()
            .skip_while(|call| !matches!(call, MockCall::Write(OutputChannel::B, _)))
            .skip(1)
            .collect();
        assert!(matches!(reads[0], MockCall::Delay(_)));
        assert!(matches!(reads[1], MockCall::Read(_)));
        assert!(matches!(reads[2], MockCall::Delay(_)));
        assert!(matches!(reads[3], MockCall::Read(_)));
    }
}
