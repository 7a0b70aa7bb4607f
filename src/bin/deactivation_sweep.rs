//! One-shot deactivation sweep, run once a day by cron.
//!
//! Exits non-zero when the sweep could not run or any subscriber failed,
//! so the scheduler can alert. Failed subscribers are retried by the next run.

use std::process::ExitCode;

use chrono::Utc;
use subscription_billing::config::AppConfig;
use subscription_billing::runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    runtime::init_tracing(&config.server);

    let services = match runtime::build_services(&config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start deactivation sweep");
            return ExitCode::FAILURE;
        }
    };

    let today = Utc::now().date_naive();
    match services.sweeper.run(today).await {
        Ok(report) if report.has_failures() => {
            for failure in &report.failures {
                tracing::error!(
                    subscriber_id = %failure.subscriber_id,
                    error = %failure.error,
                    "Deactivation left for the next run"
                );
            }
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, %today, "Deactivation sweep failed");
            ExitCode::FAILURE
        }
    }
}
