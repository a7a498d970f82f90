use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use ulid::Ulid;

use crate::model::ProviderSnapshot;

/// Compute bookable appointment slots from a provider snapshot.
#[derive(Debug, Parser)]
#[command(name = "slotwise", author, version, about, long_about = None)]
pub struct Cli {
    /// Tracing filter directive, e.g. `info` or `slotwise=debug`.
    #[arg(long, env = "SLOTWISE_LOG", default_value = "info", global = true)]
    pub log: String,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "SLOTWISE_METRICS_PORT", global = true)]
    pub metrics_port: Option<u16>,

    /// Pin the current time (RFC 3339) instead of reading the system clock.
    #[arg(long, env = "SLOTWISE_NOW", global = true)]
    pub now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List bookable slots over an inclusive date range.
    Slots {
        #[command(flatten)]
        target: Target,
        /// Restrict to one location; all eligible locations otherwise.
        #[arg(long)]
        location: Option<Ulid>,
        #[arg(long)]
        from: NaiveDate,
        /// Defaults to `--from`.
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Check whether a start time is currently offered.
    Check {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        location: Ulid,
        /// Local start time, e.g. `2026-10-21T10:00:00`.
        #[arg(long)]
        at: NaiveDateTime,
    },
    /// Find the earliest bookable slot.
    Next {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        location: Option<Ulid>,
        /// Report the earliest slot for every eligible member.
        #[arg(long)]
        per_member: bool,
    },
}

/// Snapshot and service every subcommand works against.
#[derive(Debug, Args)]
pub struct Target {
    /// Provider snapshot JSON file.
    #[arg(long, env = "SLOTWISE_SNAPSHOT")]
    pub snapshot: PathBuf,
    #[arg(long)]
    pub service: Ulid,
    /// Compute for one member; the provider's own schedule otherwise.
    #[arg(long)]
    pub member: Option<Ulid>,
}

/// Read and parse a provider snapshot file.
pub fn load_snapshot(path: &Path) -> anyhow::Result<ProviderSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))
}
