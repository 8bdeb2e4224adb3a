use std::sync::Arc;

use tracing::{error, info};

use drop_gate::config::Config;
use drop_gate::observability::Metrics;
use drop_gate::{logging, Simulation};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    logging::init(&config.logging);

    info!("Starting drop_gate {}", drop_gate::VERSION);
    config.log_summary();

    // Workers and admission attempts are timer-bound, one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let metrics = Arc::new(Metrics::new()?);
    let simulation = Simulation::new(config.simulation.clone()).with_metrics(Arc::clone(&metrics));

    tokio::select! {
        result = simulation.run() => {
            match result {
                Ok(report) => {
                    report.log();
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(e) => {
                    error!(error = %e, "simulation failed");
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down...");
        }
    }

    if config.print_metrics {
        print!("{}", metrics.export());
    }

    Ok(())
}
