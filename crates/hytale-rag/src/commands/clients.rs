//! Clients command - list the catalog and registration status.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use hytale_rag_config::{
    ClientConfigurator, ClientId, ConfigFormat, Platform, RegistrationStatus, Scope, catalog,
};
use serde::Serialize;

use super::Context;

/// Arguments for the clients command.
#[derive(Args, Debug)]
pub struct ClientsArgs {}

/// One client for JSON output.
#[derive(Debug, Serialize)]
struct ClientRow {
    id: ClientId,
    name: &'static str,
    format: ConfigFormat,
    targets: Vec<TargetRow>,
}

#[derive(Debug, Serialize)]
struct TargetRow {
    scope: Scope,
    path: Option<String>,
    #[serde(flatten)]
    status: RegistrationStatus,
}

/// Run the clients command.
pub async fn run(_args: ClientsArgs, ctx: &Context) -> Result<()> {
    let platform = Platform::detect();
    let settings = ctx.settings();
    let configurator = ctx.configurator(&platform, &settings)?;

    let rows: Vec<ClientRow> = catalog()
        .iter()
        .map(|desc| {
            let mut targets = vec![target_row(&configurator, desc.id, Scope::Global)];
            if desc.supports_workspace() {
                targets.push(target_row(&configurator, desc.id, Scope::Workspace));
            }
            ClientRow {
                id: desc.id,
                name: desc.display_name,
                format: desc.format,
                targets,
            }
        })
        .collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Supported Clients").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    for row in &rows {
        println!();
        println!("  {} {}", style(row.name).bold(), dim.apply_to(format!("({})", row.id)));
        for target in &row.targets {
            let marker = match target.status {
                RegistrationStatus::Registered => style("●").green(),
                RegistrationStatus::Unreadable(_) => style("●").red(),
                _ => style("○").dim(),
            };
            println!(
                "    {} {:<9} {:<15} {}",
                marker,
                target.scope.to_string(),
                target.status.label(),
                dim.apply_to(target.path.as_deref().unwrap_or("-"))
            );
        }
    }
    println!();
    Ok(())
}

fn target_row(configurator: &ClientConfigurator, client: ClientId, scope: Scope) -> TargetRow {
    let path = configurator
        .target_path(client, scope)
        .ok()
        .map(|p| p.display().to_string());
    let status = configurator
        .inspect(client, scope)
        .unwrap_or_else(|e| RegistrationStatus::Unreadable(e.to_string()));
    TargetRow {
        scope,
        path,
        status,
    }
}
