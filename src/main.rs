// logbuf - operator tool for an on-disk log buffer

use clap::Parser;
use tracing::Level;

use logbuf::cli::{run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("logbuf: {e:#}");
        std::process::exit(1);
    }
}
