//! Conflict review commands.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use super::{open, print_json, truncate};
use crate::conflicts::{self, ConflictFilter, ConflictStatus, MetadataConflict, ResolveAction};
use crate::model::{EntityType, Provider};

/// List conflicts matching the filters
#[allow(clippy::too_many_arguments)]
pub fn cmd_conflicts(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    entity_type: Option<EntityType>,
    provider: Option<Provider>,
    status: Option<ConflictStatus>,
    skip: i64,
    take: i64,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let filter = ConflictFilter {
            entity_type,
            provider,
            status,
            skip,
            take,
        };
        let page = conflicts::list_conflicts(&pool, &filter).await?;
        if json {
            return print_json(&page);
        }

        if page.items.is_empty() {
            println!("No conflicts.");
            return Ok(());
        }
        for conflict in &page.items {
            print_conflict(conflict);
        }
        println!(
            "Showing {}-{} of {}",
            page.skip + 1,
            page.skip + page.items.len() as i64,
            page.total
        );
        Ok(())
    })
}

fn print_conflict(conflict: &MetadataConflict) {
    let confidence = conflict
        .confidence
        .map(|c| format!(" ({:.0}%)", c * 100.0))
        .unwrap_or_default();
    println!(
        "#{:<5} {:<8} {} {} '{}' {}{}",
        conflict.id,
        conflict.status.to_string(),
        conflict.entity_type,
        conflict.entity_id,
        truncate(&conflict.entity_name, 30),
        conflict.provider.display_name(),
        confidence
    );
    println!(
        "       {}: {} -> {}",
        conflict.field,
        conflict
            .previous_value
            .as_deref()
            .map(|v| truncate(v, 40))
            .unwrap_or_else(|| "(empty)".to_string()),
        truncate(&conflict.proposed_value, 60)
    );
}

/// Accept, reject or ignore one conflict
pub fn cmd_resolve(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    id: i64,
    action: ResolveAction,
    resolved_by: Option<&str>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (_, pool) = open(db_path).await?;
        let conflict = conflicts::resolve(&pool, id, action, resolved_by).await?;
        println!(
            "Conflict #{} {} ({} on {} {})",
            conflict.id, conflict.status, conflict.field, conflict.entity_type, conflict.entity_id
        );
        Ok(())
    })
}
