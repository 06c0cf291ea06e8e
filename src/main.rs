//! # Modelforge - Main Entry Point
//!
//! Control plane daemon for dynamically managed LLM backend containers.

use clap::Parser;
use modelforge::{ForgeCliOptions, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let options = ForgeCliOptions::parse();
    options.run().await
}
