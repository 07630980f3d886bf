// Entrypoint for the ROI importer.
// - Keeps `main` small: hand a connector and the terminal prompter to the
//   driver with the built-in settings.
// - The driver shows its own error dialog; `main` only maps the outcome to
//   an exit code.

use omero_roi_import::{
    config::Config,
    driver::{self, Outcome},
    session::OmeroConnector,
    ui::TerminalPrompter,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config = Config::default();
    let connector = OmeroConnector::new(config.clone());
    match driver::run(&mut TerminalPrompter, &connector, &config) {
        Outcome::Completed(_) | Outcome::Aborted => ExitCode::SUCCESS,
        Outcome::Failed(_) => ExitCode::FAILURE,
    }
}
