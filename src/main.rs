use anyhow::Result;
use clap::Parser;
use guardian::cli::{Cli, run};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)?;
    Ok(())
}
