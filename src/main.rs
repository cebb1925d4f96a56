use clap::Parser;
use quantx::cli::{Cli, run};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn main() -> std::process::ExitCode {
    init_logging();
    run(Cli::parse())
}
