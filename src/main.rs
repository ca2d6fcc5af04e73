use std::panic;
use std::process;

use clap::Parser;
use color_eyre::eyre::Result;
use webex_tools::commands::{self, Cli};
use webex_tools::logger::setup_logger;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Ensure the process terminates if one of the tasks panics.
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));

    let cli = Cli::parse();
    setup_logger(cli.verbose);
    commands::run(cli).await
}
