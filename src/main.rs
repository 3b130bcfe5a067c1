use std::process::ExitCode;

use clap::Parser;

use masonrypreview::cli::{self, CliArgs};
use masonrypreview::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    cli::run(args)
}
