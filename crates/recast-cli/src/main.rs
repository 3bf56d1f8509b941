use std::process::ExitCode;

use recast_cli::{command, run, CliOptions};

fn main() -> ExitCode {
    let matches = command().get_matches();
    let options = CliOptions::from_matches(&matches);

    if options.verbose {
        recast_core::init_tracing_with("recast_core=debug,recast_cli=debug");
    } else {
        recast_core::init_tracing();
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&options, &mut out) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::from(2)
        }
    }
}
