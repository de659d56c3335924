use btopt::cli::{run, Cli};
use clap::Parser;

fn main() -> std::process::ExitCode {
    btopt::logging::init_tracing();
    run(Cli::parse())
}
