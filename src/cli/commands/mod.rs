//! CLI command definitions and dispatch.
//!
//! Each subcommand group is implemented in its own submodule:
//! - `library`: Adding and listing artists and albums
//! - `enrich`: Running enrichment and inspecting runs/logs
//! - `conflicts`: Reviewing queued provider proposals
//! - `settings`: Settings table and API key checks

mod conflicts;
mod enrich;
mod library;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePool;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::conflicts::{ConflictStatus, ResolveAction};
use crate::db;
use crate::error::ResultExt;
use crate::enrichment::StatsPeriod;
use crate::model::{EntityType, Provider};

pub use conflicts::{cmd_conflicts, cmd_resolve};
pub use enrich::{cmd_enrich, cmd_logs, cmd_runs, cmd_stats};
pub use library::{cmd_add_album, cmd_add_artist, cmd_list};
pub use settings::{cmd_init_config, cmd_settings, cmd_validate_key};

/// Music Enricher CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (overrides the config file)
    #[arg(long, global = true, env = "MUSIC_ENRICHER_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Add an artist to the library
    AddArtist {
        name: String,
        /// Known MusicBrainz artist ID
        #[arg(long)]
        mbid: Option<String>,
    },
    /// Add an album to the library
    AddAlbum {
        title: String,
        /// Album artist (created if missing)
        #[arg(short, long)]
        artist: Option<String>,
    },
    /// List artists in the library
    List,
    /// Enrich one artist or album
    Enrich {
        /// artist or album
        entity_type: EntityType,
        id: i64,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show enrichment runs for an entity
    Runs { entity_type: EntityType, id: i64 },
    /// Show enrichment log entries
    Logs {
        /// Only entries for this run
        #[arg(long)]
        run: Option<i64>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Enrichment statistics
    Stats {
        /// day, week, month or all
        #[arg(long, default_value = "week")]
        period: StatsPeriod,
        #[arg(long)]
        json: bool,
    },
    /// List metadata conflicts (pending, accepted and rejected by default)
    Conflicts {
        #[arg(long)]
        entity_type: Option<EntityType>,
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        status: Option<ConflictStatus>,
        #[arg(long, default_value = "0")]
        skip: i64,
        #[arg(long, default_value = "50")]
        take: i64,
        #[arg(long)]
        json: bool,
    },
    /// Accept, reject or ignore a conflict
    Resolve {
        id: i64,
        /// accept, reject or ignore
        action: ResolveAction,
        /// Who resolved it
        #[arg(long)]
        by: Option<String>,
    },
    /// Check the format of a provider API key
    ValidateKey {
        /// lastfm or fanart
        service: String,
        key: String,
    },
    /// Write a default config file if none exists
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Read or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Show all metadata settings
    List,
    Get { key: String },
    Set { key: String, value: String },
    Unset { key: String },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let db = cli.db.as_ref();

    match &cli.command {
        Commands::AddArtist { name, mbid } => cmd_add_artist(&rt, db, name, mbid.as_deref()),
        Commands::AddAlbum { title, artist } => cmd_add_album(&rt, db, title, artist.as_deref()),
        Commands::List => cmd_list(&rt, db),
        Commands::Enrich {
            entity_type,
            id,
            json,
        } => cmd_enrich(&rt, db, *entity_type, *id, *json),
        Commands::Runs { entity_type, id } => cmd_runs(&rt, db, *entity_type, *id),
        Commands::Logs { run, limit } => cmd_logs(&rt, db, *run, *limit),
        Commands::Stats { period, json } => cmd_stats(&rt, db, *period, *json),
        Commands::Conflicts {
            entity_type,
            provider,
            status,
            skip,
            take,
            json,
        } => cmd_conflicts(&rt, db, *entity_type, *provider, *status, *skip, *take, *json),
        Commands::Resolve { id, action, by } => cmd_resolve(&rt, db, *id, *action, by.as_deref()),
        Commands::ValidateKey { service, key } => cmd_validate_key(service, key),
        Commands::InitConfig { force } => cmd_init_config(*force),
        Commands::Settings { action } => cmd_settings(&rt, db, action),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Load the config file and open the database it (or `--db`) points at.
pub(crate) async fn open(db_path: Option<&PathBuf>) -> anyhow::Result<(Config, SqlitePool)> {
    let config = config::load();
    let path = db_path.or(config.database.path.as_ref());
    let url = db::db_url(path.map(|p| p.as_path()));

    let pool = db::init_db(&url)
        .await
        .with_context(format!("Failed to open database {}", url))?;

    let abandoned = db::runs::fail_abandoned_runs(&pool).await?;
    if abandoned > 0 {
        warn!(count = abandoned, "Marked runs left over from a previous process as failed");
    }
    info!(db = %url, "Database ready");

    Ok((config, pool))
}

/// Print a value as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shorten long text for one-line display.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
