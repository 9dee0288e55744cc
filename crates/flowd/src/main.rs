use clap::Parser;

use flowd::cli::{self, Cli};
use flowd::logging;

#[tokio::main]
async fn main() {
    logging::init();
    let args = Cli::parse();
    if let Err(err) = cli::run(args).await {
        eprintln!("fieldflow failed: {err:#}");
        std::process::exit(1);
    }
}
