//! Verify command - run the dataset self-test once.

use anyhow::{Result, bail};
use clap::Args;
use console::style;
use hytale_rag_config::{ENV_FILE_NAME, EnvFile, Platform};
use hytale_rag_setup::dataset::classify_verification_output;
use hytale_rag_setup::{DatasetLayout, SelfTest, ServiceWorkspace, SystemRunner, Verdict};
use serde::Serialize;

use super::Context;

/// Arguments for the verify command.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Print the self-test output
    #[arg(long)]
    pub show_output: bool,
}

#[derive(Debug, Serialize)]
struct VerifyOutput<'a> {
    #[serde(flatten)]
    verdict: &'a Verdict,
    exit_code: Option<i32>,
}

/// Run the verify command.
pub async fn run(args: VerifyArgs, ctx: &Context) -> Result<()> {
    let platform = Platform::detect();
    let runner = SystemRunner::new(platform.os);
    let workspace = ServiceWorkspace::new(&ctx.install_dir, &platform, &runner);
    workspace.check_layout()?;
    workspace.check_tooling()?;

    let env = EnvFile::load(&ctx.install_dir.join(ENV_FILE_NAME))?;
    let Some(embedding) = env.embedding() else {
        bail!("no embedding provider is configured. Run 'hytale-rag setup' first");
    };
    let provider = embedding.provider();
    tracing::info!(%provider, "running self-test");

    let output = workspace.run_stats().await?;
    let verdict = classify_verification_output(&output.combined(), output.code);

    if ctx.json_output {
        let json = VerifyOutput {
            verdict: &verdict,
            exit_code: output.code,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        if args.show_output || ctx.verbose {
            println!("{}", output.combined());
        }
        match &verdict {
            Verdict::Healthy => println!("{} dataset verified", style("✓").green()),
            Verdict::Suspect(reason) => println!(
                "{} self-test reported a problem: {}",
                style("!").yellow(),
                reason
            ),
            Verdict::Corrupted(_) => {}
        }
    }

    if let Verdict::Corrupted(reason) = verdict {
        let dir = DatasetLayout::new(&ctx.install_dir).provider_dir(provider);
        bail!(
            "the {} dataset appears corrupted ({}). Delete {} and re-run 'hytale-rag setup'",
            provider.wire_value(),
            reason,
            dir.display()
        );
    }
    Ok(())
}
