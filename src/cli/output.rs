//! Output formatting for `fleetplane check`
//!
//! A built configuration is reduced to a [`SnapshotSummary`] and printed as
//! JSON, YAML or a plain table.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::services::BuiltConfiguration;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VirtualHostSummary {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<String>,
}

/// What a fleet's snapshot would contain
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotSummary {
    pub fleet: String,
    pub version: String,
    pub listener: String,
    pub clusters: Vec<String>,
    pub virtual_hosts: Vec<VirtualHostSummary>,
    pub proxied_services: Vec<String>,
}

impl SnapshotSummary {
    pub fn new(fleet: &str, built: &BuiltConfiguration) -> Self {
        let snapshot = &built.snapshot;
        Self {
            fleet: fleet.to_string(),
            version: snapshot.version().to_string(),
            listener: snapshot.listener().name.clone(),
            clusters: snapshot.clusters().iter().map(|c| c.name.clone()).collect(),
            virtual_hosts: snapshot
                .route_configuration()
                .virtual_hosts
                .iter()
                .map(|vhost| VirtualHostSummary {
                    name: vhost.name.clone(),
                    domains: vhost.domains.clone(),
                    routes: vhost.routes.iter().map(|r| r.name.clone()).collect(),
                })
                .collect(),
            proxied_services: built.proxied_services.iter().map(|s| s.id.clone()).collect(),
        }
    }
}

pub fn print_summary(summary: &SnapshotSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Yaml => print_yaml(summary),
        OutputFormat::Table => {
            print!("{}", render_table(summary));
            Ok(())
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len.saturating_sub(3)])
    }
}

fn render_table(summary: &SnapshotSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Fleet:    {}\n", summary.fleet));
    out.push_str(&format!("Version:  {}\n", summary.version));
    out.push_str(&format!("Listener: {}\n", summary.listener));

    out.push_str(&format!("\n{:<32} {:<60}\n", "Virtual host", "Route"));
    out.push_str(&format!("{}\n", "-".repeat(93)));
    for vhost in &summary.virtual_hosts {
        for route in &vhost.routes {
            out.push_str(&format!("{:<32} {:<60}\n", truncate(&vhost.name, 30), truncate(route, 58)));
        }
    }

    out.push_str("\nClusters:\n");
    for cluster in &summary.clusters {
        out.push_str(&format!("  {}\n", cluster));
    }
    if !summary.proxied_services.is_empty() {
        out.push_str("\nValidation proxy services:\n");
        for service in &summary.proxied_services {
            out.push_str(&format!("  {}\n", service));
        }
    }
    out
}
