//! Operator listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings

use clap::Args;
use kiln_core::Domain;
use kiln_patch::OperatorRegistry;

use super::format_value;

#[derive(Args)]
pub struct OperatorsArgs {
    /// Show parameters for a specific operator type
    #[arg(value_name = "TYPE")]
    operator: Option<String>,
}

pub fn run(args: OperatorsArgs) -> anyhow::Result<()> {
    let registry = OperatorRegistry::new();

    if let Some(id) = &args.operator {
        let descriptor = registry
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown operator type: {}", id))?;
        let instance = registry
            .create(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown operator type: {}", id))?;

        println!("{}", descriptor.id);
        println!("{}", "=".repeat(descriptor.id.len()));
        println!();
        println!("{} ({})", descriptor.description, domain_label(descriptor.domain));
        println!();
        println!("  {:10}  {:6}  {:12}  {}", "Name", "Kind", "Default", "Range");
        println!("  {:10}  {:6}  {:12}  {}", "----", "----", "-------", "-----");
        for param in instance.param_descriptors() {
            println!(
                "  {:10}  {:6}  {:12}  {} - {}",
                param.name,
                param.kind.to_string(),
                format_value(param.default),
                param.min,
                param.max
            );
        }
        return Ok(());
    }

    for domain in [Domain::Control, Domain::Audio] {
        println!("{} operators:", domain_label(domain));
        println!();
        for descriptor in registry.in_domain(domain) {
            let params: Vec<&str> = registry
                .create(descriptor.id)
                .map(|i| i.param_descriptors().iter().map(|p| p.name).collect())
                .unwrap_or_default();
            println!("  {:10}  {}", descriptor.id, descriptor.description);
            if !params.is_empty() {
                println!("  {:10}  params: {}", "", params.join(", "));
            }
        }
        println!();
    }
    println!("Use 'kiln operators <TYPE>' for parameter details.");
    Ok(())
}

fn domain_label(domain: Domain) -> &'static str {
    match domain {
        Domain::Control => "control",
        Domain::Audio => "audio",
    }
}
