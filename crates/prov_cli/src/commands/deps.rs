//! Deps command - Print direct dependencies from a DOT graph.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use prov_iac::find_direct_dependencies;

#[derive(Args)]
pub struct DepsArgs {
    /// DOT file produced by `terraform graph`, or `-` for stdin
    file: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

pub async fn execute(args: DepsArgs) -> Result<()> {
    let dot = if args.file.as_os_str() == "-" {
        let mut dot = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut dot).await?;
        dot
    } else {
        tokio::fs::read_to_string(&args.file)
            .await
            .with_context(|| format!("read {}", args.file.display()))?
    };

    let graph = find_direct_dependencies(&dot)?;
    info!("Found {} labelled nodes", graph.len());

    let map = graph.to_map();
    let output = if args.pretty {
        serde_json::to_string_pretty(&map)?
    } else {
        serde_json::to_string(&map)?
    };
    println!("{}", output);
    Ok(())
}
