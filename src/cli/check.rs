// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::api::streaming::StreamEvent;
use crate::bootstrap::{build_pipeline, open_storage};
use crate::check::orchestrator::{Progress, RunOptions};
use crate::check::types::CheckStatus;
use crate::config::CheckerConfig;
use crate::storage::{MemoryStorage, Storage};

/// Arguments for the check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// URLs to check
    pub urls: Vec<String>,

    /// Read additional URLs from a file, one per line
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Skip the hosted API and use the local browser
    #[arg(long)]
    pub economy: bool,

    /// Print each result as a JSON event
    #[arg(long)]
    pub json: bool,

    /// Keep results in memory instead of the database
    #[arg(long)]
    pub no_db: bool,
}

/// Collect URLs from arguments and the optional file
pub fn collect_urls(args: &CheckArgs) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();

    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        urls.extend(content.lines().map(str::to_string));
    }

    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && !u.starts_with('#'))
        .collect();

    if urls.is_empty() {
        return Err(anyhow!("No URLs provided"));
    }
    Ok(urls)
}

fn render(progress: Progress, json: bool) -> String {
    if json {
        return StreamEvent::from(progress).to_json();
    }

    let marker = match progress.outcome.status {
        CheckStatus::Indexed => "✅",
        CheckStatus::NotIndexed => "❌",
        CheckStatus::Error => "⚠️",
    };
    format!(
        "[{}/{}] {} {:<11} {} ({})",
        progress.completed,
        progress.total,
        marker,
        progress.outcome.status,
        progress.outcome.url,
        progress.outcome.engine
    )
}

pub async fn run_check(args: CheckArgs, config: &CheckerConfig) -> Result<()> {
    let urls = collect_urls(&args)?;

    let storage: Arc<dyn Storage> = if args.no_db {
        Arc::new(MemoryStorage::new())
    } else {
        open_storage(config).await?
    };

    let pipeline = build_pipeline(config, storage)?;
    info!("Checking {} URLs", urls.len());

    let mut run = pipeline.orchestrator.run(
        urls,
        RunOptions {
            economy_mode: args.economy,
            batch_id: None,
        },
    );

    let mut indexed = 0;
    let mut errors = 0;
    while let Some(progress) = run.receiver.recv().await {
        match progress.outcome.status {
            CheckStatus::Indexed => indexed += 1,
            CheckStatus::Error => errors += 1,
            CheckStatus::NotIndexed => {}
        }
        println!("{}", render(progress, args.json));
    }

    if !args.json {
        println!(
            "\n{} of {} indexed, {} errors",
            indexed, run.total, errors
        );
    }

    pipeline.shutdown().await;
    Ok(())
}
