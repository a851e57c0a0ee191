//! Example of running a logging session against the simulated panel.

use std::thread;
use std::time::Duration;

use pdplog_core::{FixedIdentifier, LoggerConfig, SamplingEngine, SimulatedPanel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // 1. Log into ./pdp-logs instead of a USB stick
    let dir = std::path::Path::new("./pdp-logs");
    std::fs::create_dir_all(dir)?;
    let config = LoggerConfig::new(dir).with_period_ms(50);

    // 2. Build the engine; this spins up the background runtime
    let engine = SamplingEngine::new(config, SimulatedPanel::default(), FixedIdentifier::new("bench"))?;
    println!("Logging channels 0..={} every {}ms", engine.max_channel(), engine.period_ms());

    // 3. Run a two second session
    engine.start()?;
    thread::sleep(Duration::from_secs(2));

    // 4. Stop; the file is closed once this returns
    if let Some(summary) = engine.stop()? {
        println!("Wrote {} records to {}", summary.records, summary.path.display());
    }

    Ok(())
}
