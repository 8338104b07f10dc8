use adda_loop::controller::backend::sim::SimBoard;
use adda_loop::controller::{CycleConfig, CycleController};
use tracing::*;
use tracing_subscriber::FmtSubscriber;

/// Single read-convert-write run against the simulated board, exiting with the stage status code
fn main() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default tracing subscriber failed");

    info!("Starting ADDA feedback cycle");

    let mut controller = CycleController::new(SimBoard::new(), CycleConfig::default());
    let (code, stage) = match controller.run() {
        Ok(summary) => {
            info!(
                "Completed {} round(s), {} batches, last output code {:?}",
                summary.rounds_completed, summary.batches_acquired, summary.last_output
            );
            (0, None)
        }
        Err(err) => {
            error!("ADDA cycle failed during {:?}: {err}", err.stage());
            (err.exit_code(), Some(err.stage()))
        }
    };

    match stage {
        Some(stage) => {
            info!("ADDA cycle finished with returned code {code}, first failure in {stage:?}")
        }
        None => info!("ADDA cycle finished with returned code {code}"),
    }
    std::process::exit(code);
}
