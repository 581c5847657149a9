use std::process::ExitCode;

use log::{error, info};
use openshock_clock::{
    config::Settings,
    headless::{self, HeadlessConfig},
    sink::HttpSink,
};

// configured only through SHOCK_API_KEY, SHOCK_ID, INTENSITY, DURATION and VIBRATE_BEFORE
fn main() -> ExitCode {
    if let Err(e) = simple_file_logger::init_logger!("openshock_clock_headless") {
        eprintln!("couldn't initialize logger: {e}");
    }

    let config = match HeadlessConfig::from_env() {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors.0 {
                error!("{e}");
                eprintln!("{e}");
            }
            return ExitCode::FAILURE;
        }
    };
    info!("OpenShockClock started");

    let settings = Settings::default();
    let timeout = settings.request_timeout();
    let sink = match HttpSink::new(settings.api_endpoint, settings.custom_name, timeout) {
        Ok(sink) => sink,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if headless::trigger(&config, &sink) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
