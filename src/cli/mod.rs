//! Command-line interface for music-enricher.
//!
//! This module provides CLI commands for managing library entities, running
//! enrichment, reviewing conflicts and changing settings.

mod commands;

pub use commands::{Cli, Commands, SettingsCommand, run_command};
