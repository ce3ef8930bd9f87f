//! Configure command - register the service with clients only.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use hytale_rag_config::{ClientId, Platform, Scope};
use hytale_rag_setup::{
    RegistrationPlan, ServiceWorkspace, SystemRunner, failed_clients, register_clients,
};

use super::Context;
use super::setup::client_output;

/// Arguments for the configure command.
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Client to configure (repeatable); asks about each client when omitted
    #[arg(long = "client", value_name = "ID")]
    pub clients: Vec<ClientId>,

    /// Write project-local configuration where the client supports it
    #[arg(long)]
    pub workspace: bool,
}

/// Run the configure command.
pub async fn run(args: ConfigureArgs, ctx: &Context) -> Result<()> {
    let platform = Platform::detect();
    let settings = ctx.settings();
    let runner = SystemRunner::new(platform.os);
    let configurator = ctx.configurator(&platform, &settings)?;
    let mut decisions = ctx.decisions();

    ServiceWorkspace::new(&ctx.install_dir, &platform, &runner)
        .check_execution_policy(&mut decisions)
        .await;

    let plan = RegistrationPlan {
        clients: (!args.clients.is_empty()).then_some(args.clients),
        scope: args.workspace.then_some(Scope::Workspace),
    };
    let outcomes = register_clients(&configurator, &plan, &mut decisions)?;

    if ctx.json_output {
        let output: Vec<_> = outcomes.iter().map(client_output).collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    let failed = failed_clients(&outcomes);
    let attempted = outcomes
        .iter()
        .filter(|o| !matches!(o, hytale_rag_setup::ClientOutcome::Skipped(_)))
        .count();

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!();
        if attempted == 0 {
            println!("  {}", dim.apply_to("No clients selected."));
        } else {
            println!(
                "  {} of {} client(s) configured.",
                attempted - failed.len(),
                attempted
            );
        }
        println!();
    }

    if attempted > 0 && failed.len() == attempted {
        let names: Vec<_> = failed
            .iter()
            .map(|(client, _)| client.descriptor().display_name)
            .collect();
        bail!("no client could be configured ({})", names.join(", "));
    }
    Ok(())
}
