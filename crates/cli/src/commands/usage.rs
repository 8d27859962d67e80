//! Cluster utilization commands

use anyhow::Result;
use colored::Colorize;
use metrics_lib::{ClusterReading, FallbackOrchestrator, MetricsOutcome, Resource};
use tabled::{settings::Style, Table, Tabled};

use crate::client::ApiClient;
use crate::output::{color_percent, format_percent, format_usage, print_info, print_warning, OutputFormat};

/// Where readings come from
pub enum Target {
    /// A running cluster metrics service
    Remote(ApiClient),
    /// The fallback chain, run in this process
    Local(FallbackOrchestrator),
}

/// Row for the per-node table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Usage %")]
    percent: String,
}

/// Show cluster utilization for one resource
pub async fn show_usage(target: &Target, resource: Resource, format: OutputFormat) -> Result<()> {
    let reading = match target {
        Target::Remote(client) => client.cluster_reading(resource).await?,
        Target::Local(orchestrator) => match orchestrator.resolve(resource).await {
            MetricsOutcome::Found(reading) => Some(reading),
            MetricsOutcome::NotFound => None,
            MetricsOutcome::Failed { source, error } => {
                anyhow::bail!("{} source failed: {}", source, error)
            }
        },
    };

    let Some(reading) = reading else {
        print_warning(resource.not_found_message());
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reading)?;
            println!("{}", json);
        }
        OutputFormat::Table => print_reading(&reading),
    }

    Ok(())
}

fn print_reading(reading: &ClusterReading) {
    let title = match reading.resource {
        Resource::Cpu => "Cluster CPU",
        Resource::Memory => "Cluster Memory",
    };

    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
    println!("Source:                 {}", reading.source.to_string().cyan());
    println!("Nodes:                  {}", reading.node_count);
    println!(
        "Used:                   {}",
        format_usage(reading.resource, reading.total_usage)
    );
    println!(
        "Capacity:               {}",
        format_usage(reading.resource, reading.total_capacity)
    );
    println!(
        "{} {}",
        "Utilization:           ".bold(),
        color_percent(reading.cluster_percent)
    );
    println!();

    if reading.nodes.is_empty() {
        print_info("No node readings");
        return;
    }

    let rows: Vec<NodeRow> = reading
        .nodes
        .iter()
        .map(|node| NodeRow {
            name: node.name.clone(),
            usage: format_usage(reading.resource, node.usage),
            percent: format_percent(node.usage_percent),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}
