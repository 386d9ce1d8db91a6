use clap::Parser;
use macropulse::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
