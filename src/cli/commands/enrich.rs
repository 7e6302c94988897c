//! Enrichment commands: run, inspect runs and logs, statistics.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{open, print_json, truncate};
use crate::config::EnrichmentSettings;
use crate::db::runs;
use crate::enrichment::log;
use crate::enrichment::{
    EnrichmentEvent, EnrichmentService, ProgressNotifier, RunSummary, StatsPeriod, TriggerSource,
};
use crate::model::EntityType;

/// Enrich one artist or album, printing progress as it happens
pub fn cmd_enrich(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    entity_type: EntityType,
    id: i64,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (config, pool) = open(db_path).await?;
        let settings = EnrichmentSettings::from_config(&config)
            .overlay_from_db(&pool)
            .await?;

        if settings.lastfm_api_key.is_none() {
            println!("Note: no Last.fm API key configured, skipping Last.fm");
        }
        if settings.fanart_api_key.is_none() {
            println!("Note: no Fanart.tv API key configured, skipping Fanart.tv");
        }

        let notifier = ProgressNotifier::default();
        let mut events = notifier.subscribe();
        let service = EnrichmentService::new(pool, settings, Arc::new(notifier))?;

        let handle = service
            .trigger_enrichment(entity_type, id, TriggerSource::Manual)
            .await?;

        let printer = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let done = matches!(
                            event,
                            EnrichmentEvent::Completed(_) | EnrichmentEvent::Error(_)
                        );
                        print_event(&event, json);
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Progress output fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let cancel = handle.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                cancel.cancel();
            }
        });

        let result = handle.wait().await;
        interrupt.abort();
        // Closes the event channel so the printer always finishes
        drop(service);
        let _ = printer.await;

        let summary = result?;
        if !json {
            print_summary(&summary);
        }
        Ok(())
    })
}

fn print_event(event: &EnrichmentEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Could not serialize event"),
        }
        return;
    }

    match event {
        EnrichmentEvent::Started(e) => {
            println!("Enriching {} '{}' (run {})", e.entity.entity_type, e.entity.entity_name, e.run_id);
        }
        EnrichmentEvent::Progress(e) => {
            println!("  [{:>3}%] {} ({}/{})", e.percentage, e.step, e.current, e.total);
        }
        EnrichmentEvent::Completed(e) => {
            println!("Finished: {} in {}ms", e.status.as_str(), e.duration);
        }
        EnrichmentEvent::Error(e) => {
            eprintln!("Failed [{}]: {}", e.code, e.error);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.fields_updated.is_empty() {
        println!("No fields updated.");
    } else {
        let fields: Vec<&str> = summary.fields_updated.iter().map(|f| f.as_str()).collect();
        println!("Updated: {}", fields.join(", "));
    }
    if summary.conflicts_queued > 0 {
        println!(
            "{} proposal(s) queued for review (see `conflicts`)",
            summary.conflicts_queued
        );
    }
    for failure in &summary.failed_providers {
        println!("  {} failed [{}]: {}", failure.provider.display_name(), failure.code, failure.message);
    }
    for rejected in &summary.rejected_fields {
        println!(
            "  {} {} rejected: {}",
            rejected.provider.display_name(),
            rejected.field,
            rejected.reason
        );
    }
}

/// Show the run history of an entity
pub fn cmd_runs(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    entity_type: EntityType,
    id: i64,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let runs = runs::runs_for_entity(&pool, entity_type, id).await?;
        if runs.is_empty() {
            println!("No runs for {} {}.", entity_type, id);
        }
        for run in runs {
            println!(
                "{:>5}  {}  {:<9} {:<8} {:<6} {}",
                run.id,
                run.started_at,
                run.status.as_str(),
                run.outcome.map(|o| o.as_str()).unwrap_or("-"),
                run.triggered_by,
                run.error_message.as_deref().unwrap_or("")
            );
        }
        Ok(())
    })
}

/// Show log entries, for one run or the most recent
pub fn cmd_logs(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    run: Option<i64>,
    limit: i64,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let entries = match run {
            Some(run_id) => log::logs_for_run(&pool, run_id).await?,
            None => log::recent_logs(&pool, limit).await?,
        };

        for entry in entries {
            let fields: Vec<&str> = entry.fields_updated.iter().map(|f| f.as_str()).collect();
            println!(
                "{}  {:<8} {:<6} {:<20} {:<12} {:<8} {:>5}ms  {}",
                entry.created_at,
                entry.provider.as_str(),
                entry.entity_type.as_str(),
                truncate(&entry.entity_name, 20),
                entry.metadata_type,
                entry.status.as_str(),
                entry.processing_time_ms,
                entry
                    .error_message
                    .as_deref()
                    .map(|m| truncate(m, 60))
                    .unwrap_or_else(|| fields.join(","))
            );
        }
        Ok(())
    })
}

/// Print aggregated enrichment statistics
pub fn cmd_stats(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    period: StatsPeriod,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let stats = log::get_stats(&pool, period).await?;
        if json {
            return print_json(&stats);
        }

        println!("Enrichment statistics ({})", stats.period.as_str());
        println!("  Runs:              {}", stats.runs);
        println!("  Provider attempts: {}", stats.total_attempts);
        println!("  Fields updated:    {}", stats.fields_updated);
        println!("  Pending conflicts: {}", stats.pending_conflicts);
        for (status, count) in &stats.by_status {
            println!("  {:<8} {}", status.as_str(), count);
        }
        if !stats.by_provider.is_empty() {
            println!();
            println!("  {:<12} {:>8} {:>8} {:>8} {:>8} {:>10}", "provider", "tries", "ok", "partial", "error", "avg ms");
            for (provider, p) in &stats.by_provider {
                println!(
                    "  {:<12} {:>8} {:>8} {:>8} {:>8} {:>10.0}",
                    provider.display_name(),
                    p.attempts,
                    p.successes,
                    p.partials,
                    p.errors,
                    p.avg_processing_time_ms
                );
            }
        }
        Ok(())
    })
}
