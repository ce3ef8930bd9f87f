//! Setup command - full provisioning run.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use hytale_rag_config::{ClientId, Platform, Provider, Scope};
use hytale_rag_setup::{
    ClientOutcome, EnsureOutcome, GithubReleases, OllamaApi, SetupOrchestrator, SetupReport,
    SystemRunner, Verdict,
};
use serde::Serialize;

use super::Context;

/// Arguments for the setup command.
#[derive(Args, Debug, Default)]
pub struct SetupArgs {}

/// Setup result for JSON output.
#[derive(Debug, Serialize)]
struct SetupOutput {
    install_dir: String,
    provider: Provider,
    data_type: String,
    downloaded_bytes: Option<u64>,
    verdict: Verdict,
    clients: Vec<ClientOutput>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClientOutput {
    client: ClientId,
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the setup command.
pub async fn run(_args: SetupArgs, ctx: &Context) -> Result<()> {
    let platform = Platform::detect();
    let settings = ctx.settings();
    let runner = SystemRunner::new(platform.os);
    let releases = GithubReleases::new(settings.releases.clone());
    let runtime_api = OllamaApi::new(settings.runtime.base_url.clone());
    let configurator = ctx.configurator(&platform, &settings)?;
    let mut decisions = ctx.decisions();

    if !ctx.json_output {
        eprintln!();
        eprintln!("{}", style("Hytale RAG Setup").bold().cyan());
        eprintln!(
            "{}",
            Style::new().dim().apply_to(format!(
                "Install directory: {} ({})",
                ctx.install_dir.display(),
                platform.os
            ))
        );
    }

    let orchestrator = SetupOrchestrator::new(
        &platform,
        &settings,
        &ctx.install_dir,
        &runner,
        &releases,
        &runtime_api,
        &configurator,
    );
    let report = orchestrator.run(&mut decisions).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&to_output(ctx, &report))?);
    } else {
        print_summary(ctx, &report);
    }
    Ok(())
}

pub(crate) fn client_output(outcome: &ClientOutcome) -> ClientOutput {
    match outcome {
        ClientOutcome::Registered(reg) => ClientOutput {
            client: reg.client,
            result: "registered",
            scope: Some(reg.scope),
            path: Some(reg.path.display().to_string()),
            error: None,
        },
        ClientOutcome::Skipped(client) => ClientOutput {
            client: *client,
            result: "skipped",
            scope: None,
            path: None,
            error: None,
        },
        ClientOutcome::Failed { client, error } => ClientOutput {
            client: *client,
            result: "failed",
            scope: None,
            path: None,
            error: Some(error.clone()),
        },
    }
}

fn to_output(ctx: &Context, report: &SetupReport) -> SetupOutput {
    SetupOutput {
        install_dir: ctx.install_dir.display().to_string(),
        provider: report.provider,
        data_type: report.data_type.to_string(),
        downloaded_bytes: match report.dataset {
            EnsureOutcome::Downloaded { bytes } => Some(bytes),
            EnsureOutcome::AlreadyPresent => None,
        },
        verdict: report.verdict.clone(),
        clients: report.clients.iter().map(client_output).collect(),
    }
}

fn print_summary(ctx: &Context, report: &SetupReport) {
    let dim = Style::new().dim();
    let green = Style::new().green();

    println!();
    println!("{}", style("Setup Complete").bold().green());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Provider:"), report.provider.label());
    println!("  {} {}", dim.apply_to("Data:    "), report.data_type.label());
    if let Some(runtime) = &report.runtime {
        println!("  {} {}", dim.apply_to("Runtime: "), runtime.stage());
    }
    match &report.verdict {
        Verdict::Healthy => {}
        Verdict::Suspect(reason) => println!(
            "  {} {}",
            dim.apply_to("Verify:  "),
            Style::new().yellow().apply_to(format!("passed with warnings ({})", reason))
        ),
        Verdict::Corrupted(reason) => println!(
            "  {} {}",
            dim.apply_to("Verify:  "),
            Style::new().red().apply_to(format!("dataset corrupted, fix manually ({})", reason))
        ),
    }

    let registered: Vec<_> = report.registered().collect();
    println!();
    if registered.is_empty() {
        println!("  No clients were configured. Run 'hytale-rag configure' later to add one.");
    } else {
        println!("  Configured clients:");
        for reg in &registered {
            println!(
                "    {} {} {}",
                green.apply_to("●"),
                reg.client.descriptor().display_name,
                dim.apply_to(reg.path.display())
            );
        }
    }

    let failed = report.failed_clients();
    if !failed.is_empty() {
        let red = Style::new().red();
        println!();
        println!("  {}", red.apply_to("Some clients could not be configured:"));
        for (client, error) in failed {
            println!(
                "    {} {}: {}",
                red.apply_to("✗"),
                client.descriptor().display_name,
                error
            );
        }
    }

    println!();
    if !registered.is_empty() {
        println!(
            "  {}",
            dim.apply_to("Restart your editor or CLI so it picks up the hytale-rag server.")
        );
        println!();
    }
    println!("  To search from a terminal:");
    for line in manual_usage(&ctx.install_dir) {
        println!("    {}", dim.apply_to(line));
    }
    println!();
}

/// Shell lines for querying the service without an MCP client.
fn manual_usage(install_dir: &Path) -> Vec<String> {
    std::iter::once(format!("cd {}", install_dir.display()))
        .chain(
            SEARCH_EXAMPLES
                .iter()
                .map(|example| format!("npx tsx src/search.ts {}", example)),
        )
        .collect()
}

const SEARCH_EXAMPLES: &[&str] = &[
    "\"player movement handling\"",
    "\"inventory management\" --limit 10",
    "\"how to craft iron sword\" --type recipe",
    "--stats",
];
