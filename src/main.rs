use anyhow::Result;
use clap::Parser;
use dupelink::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}
