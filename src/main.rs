use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use kpulse::cli::Args;
use kpulse::signals;
use kpulse::status::ExitStatus;

/// Entry point - wires Ctrl+C to the shutdown token and runs core::run()
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    // First Ctrl+C cancels the supervisors so they can release their
    // sessions; a second one force-exits without cleanup.
    ctrlc::set_handler(move || {
        signals::trigger_shutdown();
        eprintln!("\nInterrupted");

        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("kpulse: failed to start runtime: {}", e);
            return ExitStatus::Error;
        }
    };

    runtime.block_on(kpulse::core::run(args))
}
