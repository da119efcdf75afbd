// remsh CLI entry point

use clap::Parser;
use remsh_cli::{logging, output, router, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref(), cli.verbose, cli.quiet);

    if let Err(e) = router::route(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
