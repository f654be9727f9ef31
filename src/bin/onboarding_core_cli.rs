use std::process;

use onboarding_core::{
    cli::{run_cli, CliError, USAGE},
    init,
};

fn main() {
    init();

    if let Err(err) = run_cli() {
        eprintln!("Error: {err}");
        if matches!(err, CliError::Usage(_)) {
            eprintln!("\n{USAGE}");
        }
        process::exit(1);
    }
}
