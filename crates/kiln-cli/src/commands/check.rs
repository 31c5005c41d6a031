//! Build a patch once and report its schedule.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use kiln_core::{GraphBuilder, NodeInfo};
use kiln_patch::{OperatorRegistry, Patch};
use serde::Serialize;

use super::format_value;

#[derive(Args)]
pub struct CheckArgs {
    /// Patch file (TOML)
    patch: PathBuf,

    /// Largest audio block to plan for
    #[arg(long, default_value = "256")]
    block_frames: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    execution_order: Vec<&'a str>,
    audio_order: Vec<&'a str>,
    output: Option<&'a str>,
    audio_output: Option<&'a str>,
    nodes: Vec<NodeInfo>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let patch = Patch::load(&args.patch)
        .with_context(|| format!("failed to load {}", args.patch.display()))?;

    let mut builder = GraphBuilder::new();
    patch.build(&OperatorRegistry::new(), &mut builder)?;
    let (graph, _plan) = builder.finish(args.block_frames)?;

    let report = CheckReport {
        execution_order: graph.execution_order(),
        audio_order: graph.audio_order(),
        output: graph.output_name(),
        audio_output: graph.audio_output_name(),
        nodes: graph.describe(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Patch: {}", args.patch.display());
    println!("  Output:       {}", report.output.unwrap_or("(none)"));
    println!("  Audio output: {}", report.audio_output.unwrap_or("(none)"));
    println!();
    println!("Control order: {}", report.execution_order.join(" -> "));
    println!("Audio order:   {}", report.audio_order.join(" -> "));
    println!();
    for node in &report.nodes {
        let inputs = if node.inputs.is_empty() {
            String::new()
        } else {
            format!(" <- {}", node.inputs.join(", "))
        };
        println!(
            "  [{}] {} ({}, {}){}",
            node.depth, node.name, node.type_name, node.output_kind, inputs
        );
        for param in &node.params {
            println!(
                "        {} = {}",
                param.descriptor.name,
                format_value(param.value)
            );
        }
    }
    Ok(())
}
