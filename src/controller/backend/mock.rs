use std::time::Duration;
use tracing::debug;

use crate::channel::{ChannelId, ChannelSet, INPUT_CHANNEL_COUNT};
use crate::controller::backend::adda_hardware::{
    AddaHardware, ChannelFault, ChipId, Gain, HardwareError, OutputChannel, SampleRate,
    read_channels_in_order,
};
use crate::converter::OutputCode;

/// Chip id the mock reports on init, the ADS1256 factory id
pub const MOCK_CHIP_ID: ChipId = 3;

/// Call recorded by [`MockBoard`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    TransportOpen,
    Init(Gain, SampleRate),
    Read(ChannelId),
    Write(OutputChannel, OutputCode),
    Close,
    Delay(Duration),
}

/// Scripted board: fixed codes per channel, injectable faults and a journal of
/// every call. Delays are recorded, never slept.
#[derive(Debug, Default)]
pub struct MockBoard {
    journal: Vec<MockCall>,
    codes: [i32; INPUT_CHANNEL_COUNT],
    initialized: bool,
    reads: usize,
    writes: usize,
    premature_writes: usize,
    transport_fault: Option<i32>,
    init_fault: Option<i32>,
    channel_fault: Option<(u8, i32)>,
    read_fault: Option<(usize, i32)>,
    write_fault: Option<(usize, i32)>,
    close_fault: Option<i32>,
    drop_last_code: bool,
}

impl MockBoard {
    /// Board whose channel `n` always reads code `n`
    pub fn new() -> Self {
        Self {
            codes: std::array::from_fn(|i| i as i32),
            ..Default::default()
        }
    }

    pub fn with_codes(mut self, codes: [i32; INPUT_CHANNEL_COUNT]) -> Self {
        self.codes = codes;
        self
    }

    pub fn failing_transport(mut self, code: i32) -> Self {
        self.transport_fault = Some(code);
        self
    }

    pub fn failing_init(mut self, code: i32) -> Self {
        self.init_fault = Some(code);
        self
    }

    /// Every read of `channel` fails
    pub fn failing_read_on(mut self, channel: u8, code: i32) -> Self {
        self.channel_fault = Some((channel, code));
        self
    }

    /// Reads fail once `successful_reads` reads went through
    pub fn failing_read_after(mut self, successful_reads: usize, code: i32) -> Self {
        self.read_fault = Some((successful_reads, code));
        self
    }

    /// The write with zero based index `index` fails
    pub fn failing_write_on(mut self, index: usize, code: i32) -> Self {
        self.write_fault = Some((index, code));
        self
    }

    pub fn failing_close(mut self, code: i32) -> Self {
        self.close_fault = Some(code);
        self
    }

    /// Batch reads silently lose their last code
    pub fn dropping_last_code(mut self) -> Self {
        self.drop_last_code = true;
        self
    }

    pub fn journal(&self) -> &[MockCall] {
        &self.journal
    }

    pub fn init_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Init(..)))
    }

    pub fn close_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Close))
    }

    pub fn read_calls(&self) -> usize {
        self.reads
    }

    /// Writes that reached the board before the chip selects were configured
    pub fn premature_writes(&self) -> usize {
        self.premature_writes
    }

    /// Codes written to `channel`, oldest first
    pub fn written(&self, channel: OutputChannel) -> Vec<OutputCode> {
        self.journal
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(c, code) if *c == channel => Some(*code),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.journal.iter().filter(|call| predicate(*call)).count()
    }
}

impl AddaHardware for MockBoard {
    fn transport_open(&mut self) -> Result<(), HardwareError> {
        self.journal.push(MockCall::TransportOpen);
        match self.transport_fault {
            Some(code) => Err(HardwareError::new(code, "SPI bus unavailable")),
            None => Ok(()),
        }
    }

    fn device_init(
        &mut self,
        gain: Gain,
        sample_rate: SampleRate,
    ) -> Result<ChipId, HardwareError> {
        self.journal.push(MockCall::Init(gain, sample_rate));
        if let Some(code) = self.init_fault {
            return Err(HardwareError::new(code, "init refused"));
        }
        self.initialized = true;
        Ok(MOCK_CHIP_ID)
    }

    fn read_channel(&mut self, channel: ChannelId) -> Result<i32, HardwareError> {
        self.journal.push(MockCall::Read(channel));
        if !self.initialized {
            return Err(HardwareError::new(-101, "read before init"));
        }
        if let Some((faulty, code)) = self.channel_fault {
            if faulty == channel.index() {
                return Err(HardwareError::new(code, "no data ready"));
            }
        }
        if let Some((budget, code)) = self.read_fault {
            if self.reads >= budget {
                return Err(HardwareError::new(code, "no data ready"));
            }
        }
        self.reads += 1;
        Ok(self.codes[usize::from(channel.index())])
    }

    fn device_write_output(
        &mut self,
        channel: OutputChannel,
        code: OutputCode,
    ) -> Result<(), HardwareError> {
        self.journal.push(MockCall::Write(channel, code));
        let index = self.writes;
        self.writes += 1;

        if !self.initialized {
            self.premature_writes += 1;
            return Err(HardwareError::new(-100, "write before chip select configuration"));
        }
        match self.write_fault {
            Some((faulty, fault)) if faulty == index => {
                Err(HardwareError::new(fault, "DAC rejected write"))
            }
            _ => Ok(()),
        }
    }

    fn device_close(&mut self) -> Result<(), HardwareError> {
        self.journal.push(MockCall::Close);
        self.initialized = false;
        match self.close_fault {
            Some(code) => Err(HardwareError::new(code, "close failed")),
            None => Ok(()),
        }
    }

    fn delay(&mut self, duration: Duration) {
        self.journal.push(MockCall::Delay(duration));
    }

    fn device_read_channels(
        &mut self,
        channels: &ChannelSet,
        codes: &mut Vec<i32>,
    ) -> Result<(), ChannelFault> {
        read_channels_in_order(self, channels, codes)?;
        if self.drop_last_code {
            debug!("Mock board dropping last code of batch");
            codes.pop();
        }
        Ok(())
    }
}
