use anyhow::Result;
use clap::Parser;
use mapflow::cli::{Cli, Commands};
use mapflow::{logging, plot, signal, workflow::Workflow};
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let options = args.workflow_options();
            let modules = args.module_set();

            // Ctrl+C requests a graceful stop instead of exiting outright
            signal::install()?;

            let mut workflow = Workflow::new(options, modules);
            workflow.run()?;
        }
        Commands::Plot { folder } => {
            logging::init_console();
            let folder = PathBuf::from(shellexpand::tilde(&folder).into_owned());
            plot::load_and_plot(&folder)?;
        }
    }

    Ok(())
}
