use adda_loop::controller::backend::adda_hardware::{Gain, OutputChannel, SampleRate};
use adda_loop::controller::backend::mock::{MockBoard, MockCall};
use adda_loop::controller::{CycleConfig, CycleController};
use adda_loop::converter::OutputCode;
use adda_loop::error::{AddaError, Stage};
use adda_loop::lifecycle::LifecycleState;
use std::time::Duration;
use uom::si::electric_potential::volt;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn run(board: MockBoard, config: CycleConfig) -> (Result<usize, AddaError>, MockBoard) {
    init_test_logging();
    let mut controller = CycleController::new(board, config);
    let result = controller
        .run()
        .map(|summary| summary.batches_acquired as usize);
    (result, controller.into_hardware())
}

#[test]
fn demo_cycle_runs_ten_batches_and_closes() {
    let (result, board) = run(MockBoard::new(), CycleConfig::default());

    assert_eq!(result, Ok(10));
    assert_eq!(board.init_calls(), 1);
    assert_eq!(board.close_calls(), 1);
    assert_eq!(board.read_calls(), 10 * 8);
    assert_eq!(board.journal().last(), Some(&MockCall::Close));
}

#[test]
fn iteration_count_bounds_the_inner_loop() {
    let config = CycleConfig {
        iterations: 10,
        settle_delay: Duration::from_secs(3600),
        ..Default::default()
    };
    let (result, board) = run(MockBoard::new(), config);

    assert_eq!(result, Ok(10));
    let settles = board
        .journal()
        .iter()
        .filter(|call| **call == MockCall::Delay(Duration::from_secs(3600)))
        .count();
    assert_eq!(settles, 10);
}

#[test]
fn repeat_count_is_configuration() {
    let config = CycleConfig {
        repeat_count: 3,
        iterations: 2,
        ..Default::default()
    };
    let (result, board) = run(MockBoard::new(), config);

    assert_eq!(result, Ok(6));
    assert_eq!(board.init_calls(), 3);
    assert_eq!(board.close_calls(), 3);
    // The transport is opened once per process
    let opens = board
        .journal()
        .iter()
        .filter(|call| **call == MockCall::TransportOpen)
        .count();
    assert_eq!(opens, 1);
}

#[test]
fn outputs_are_never_driven_before_init() {
    let (result, board) = run(MockBoard::new(), CycleConfig::default());
    assert!(result.is_ok());
    assert_eq!(board.premature_writes(), 0);

    let init = board
        .journal()
        .iter()
        .position(|call| matches!(call, MockCall::Init(Gain::X1, SampleRate::Sps100)))
        .unwrap();
    let first_write = board
        .journal()
        .iter()
        .position(|call| matches!(call, MockCall::Write(..)))
        .unwrap();
    let first_read = board
        .journal()
        .iter()
        .position(|call| matches!(call, MockCall::Read(_)))
        .unwrap();
    assert!(init < first_write);
    assert!(first_write < first_read);
    assert_eq!(board.written(OutputChannel::B), vec![OutputCode::ZERO]);
}

#[test]
fn feedback_reproduces_channel_zero_on_output_a() {
    let board = MockBoard::new().with_codes([2_500_000, 0, 0, 0, 0, 0, 0, 0]);
    let config = CycleConfig {
        iterations: 2,
        ..Default::default()
    };
    let (result, board) = run(board, config);

    assert_eq!(result, Ok(2));
    assert_eq!(
        board.written(OutputChannel::A),
        vec![OutputCode::ZERO, OutputCode(0x8000), OutputCode(0x8000)]
    );
}

#[test]
fn summary_carries_feedback_value_not_batch() {
    init_test_logging();
    let board = MockBoard::new().with_codes([2_500_000, 0, 0, 0, 0, 0, 0, 0]);
    let config = CycleConfig {
        iterations: 3,
        ..Default::default()
    };
    let mut controller = CycleController::new(board, config);

    let summary = controller.run().unwrap();

    assert_eq!(summary.batches_acquired, 3);
    assert_eq!(summary.last_output, Some(OutputCode(0x8000)));
    let feedback = summary.last_feedback.unwrap().get::<volt>();
    assert!((feedback - 2.5).abs() < 1e-9);
}

#[test]
fn sampling_failure_closes_exactly_once() {
    // Third batch fails partway through
    let board = MockBoard::new().failing_read_after(2 * 8 + 3, -17);
    let (result, board) = run(board, CycleConfig::default());

    let err = result.unwrap_err();
    assert_eq!(err.stage(), Stage::Sample);
    assert_eq!(err.exit_code(), -3);
    assert_eq!(board.close_calls(), 1);
    assert_eq!(board.journal().last(), Some(&MockCall::Close));
    // No feedback write for the failed batch
    assert_eq!(board.written(OutputChannel::A).len(), 1 + 2);
}

#[test]
fn sampling_then_close_failure_is_compound() {
    let board = MockBoard::new()
        .failing_read_after(4, -17)
        .failing_close(-2);
    let (result, board) = run(board, CycleConfig::default());

    let err = result.unwrap_err();
    assert!(matches!(err, AddaError::Compound { .. }));
    assert_eq!(err.stage(), Stage::Sample);
    assert_eq!(err.exit_code(), -5);
    assert_eq!(board.close_calls(), 1);
}

#[test]
fn init_failure_never_samples_or_closes() {
    let (result, board) = run(MockBoard::new().failing_init(-1), CycleConfig::default());

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), -1);
    assert_eq!(board.read_calls(), 0);
    assert_eq!(board.close_calls(), 0);
    assert!(board.written(OutputChannel::A).is_empty());
}

#[test]
fn transport_failure_stops_before_init() {
    let (result, board) = run(MockBoard::new().failing_transport(-1), CycleConfig::default());

    assert_eq!(result.unwrap_err().exit_code(), -55);
    assert_eq!(board.init_calls(), 0);
}

#[test]
fn close_failure_is_reported() {
    init_test_logging();
    let config = CycleConfig {
        iterations: 1,
        ..Default::default()
    };
    let mut controller = CycleController::new(MockBoard::new().failing_close(-9), config);

    let err = controller.run().unwrap_err();

    assert!(matches!(err, AddaError::Close(ref source) if source.code == -9));
    assert_eq!(err.exit_code(), -2);
    assert_eq!(controller.manager().state(), LifecycleState::Failed);
}
