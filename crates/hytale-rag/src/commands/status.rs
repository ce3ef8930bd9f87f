//! Status command - provider, datasets and local runtime.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use hytale_rag_config::{ENV_FILE_NAME, EmbeddingSettings, EnvFile, Platform, Provider};
use hytale_rag_setup::{
    DataType, DatasetLayout, OllamaApi, RuntimeProvisioner, RuntimeState, SystemRunner,
};
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    install_dir: String,
    provider: Option<Provider>,
    model: Option<String>,
    datasets: Vec<DatasetRow>,
    runtime: RuntimeState,
    runtime_stage: String,
}

#[derive(Debug, Serialize)]
struct DatasetRow {
    provider: Provider,
    data_type: DataType,
    complete: bool,
    missing: Vec<&'static str>,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let platform = Platform::detect();
    let settings = ctx.settings();
    let env = EnvFile::load(&ctx.install_dir.join(ENV_FILE_NAME))?;
    let embedding = env.embedding();

    let layout = DatasetLayout::new(&ctx.install_dir);
    let providers: Vec<Provider> = match &embedding {
        Some(e) => vec![e.provider()],
        None => Provider::ALL.to_vec(),
    };
    let datasets: Vec<DatasetRow> = providers
        .iter()
        .flat_map(|&provider| {
            DataType::ALL.iter().map(move |&data_type| (provider, data_type))
        })
        .map(|(provider, data_type)| {
            let missing = layout.missing_tables(provider, data_type);
            DatasetRow {
                provider,
                data_type,
                complete: missing.is_empty(),
                missing,
            }
        })
        .collect();

    let runner = SystemRunner::new(platform.os);
    let api = OllamaApi::new(settings.runtime.base_url.clone());
    let mut runtime_settings = settings.runtime.clone();
    if let Some(EmbeddingSettings::Local { model }) = &embedding {
        runtime_settings.model = model.clone();
    }
    let runtime = RuntimeProvisioner::new(&platform, &runner, &api, runtime_settings)
        .probe()
        .await;

    let output = StatusOutput {
        install_dir: ctx.install_dir.display().to_string(),
        provider: embedding.as_ref().map(EmbeddingSettings::provider),
        model: match &embedding {
            Some(EmbeddingSettings::Local { model }) => Some(model.clone()),
            _ => None,
        },
        datasets,
        runtime,
        runtime_stage: runtime.stage().to_string(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    println!();
    println!("{}", style("Hytale RAG Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Install:  "), output.install_dir);
    match (&output.provider, &output.model) {
        (Some(provider), Some(model)) => {
            println!("  {} {} ({})", dim.apply_to("Provider: "), provider.label(), model)
        }
        (Some(provider), None) => {
            println!("  {} {}", dim.apply_to("Provider: "), provider.label())
        }
        (None, _) => println!(
            "  {} {}",
            dim.apply_to("Provider: "),
            red.apply_to("not configured (run 'hytale-rag setup')")
        ),
    }
    println!("  {} {}", dim.apply_to("Runtime:  "), output.runtime_stage);

    println!();
    println!("  Datasets:");
    for row in &output.datasets {
        let state = if row.complete {
            green.apply_to("complete".to_string())
        } else {
            red.apply_to(format!("missing {}", row.missing.join(", ")))
        };
        println!(
            "    {:<7} {:<9} {}",
            row.provider.wire_value(),
            row.data_type.to_string(),
            state
        );
    }
    println!();
    Ok(())
}
