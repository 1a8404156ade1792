mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Check) => run::run_check(&cli.view),
        Some(Command::Export(export)) => run::run_export(&cli.view, &export),
        None => run::run_window(&cli.view),
    }
}
