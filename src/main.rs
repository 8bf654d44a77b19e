use std::process::ExitCode;

use spot_price_forecast::config::Config;
use spot_price_forecast::forecast::ForecastRunner;
use spot_price_forecast::telemetry::init_tracing;
use spot_price_forecast::Result;
use tracing::{debug, error, info};

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = e.kind(), exit_code = e.exit_code(), "{e}");
            e.into()
        }
    }
}

fn run() -> Result<()> {
    let cfg = Config::load()?;
    info!(
        data_dir = %cfg.data_dir.display(),
        model = %cfg.model_path().display(),
        output = %cfg.output_path.display(),
        lookback_hours = cfg.lookback_hours,
        "starting spot price forecast"
    );

    let mut runner = ForecastRunner::new(cfg)?;
    let report = runner.run()?;
    for row in &report.rows {
        debug!(timestamp = %row.timestamp_string(), predicted_price = row.predicted_price);
    }
    Ok(())
}
