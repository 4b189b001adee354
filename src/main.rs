use clap::Parser;
use seedboxsync_lib::cli::{self, Cli};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = cli::run(cli).await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
