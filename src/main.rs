//! Main entry point for the rbin CLI application.

use clap::Parser;
use rbin::{app::App, cli::Args, error::Result};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = rbin::cli::Config::from_args(args)?;
    let app = App::new(config);
    app.run()
}
