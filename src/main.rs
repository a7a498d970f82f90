use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use slotwise::config::{self, Cli, Command, Target};
use slotwise::engine::{Clock, Engine, FixedClock, SystemClock};
use slotwise::model::{CandidateSlot, SlotQuery};

#[derive(Serialize)]
struct CheckOutput {
    available: bool,
    at: chrono::NaiveDateTime,
}

#[derive(Serialize)]
struct MemberNext {
    member: Ulid,
    slot: Option<CandidateSlot>,
}

/// Load the target snapshot into the engine and return its provider id.
async fn load(engine: &Engine, target: &Target) -> anyhow::Result<Ulid> {
    let snapshot = config::load_snapshot(&target.snapshot)?;
    let provider = snapshot.provider.id;
    engine.load_snapshot(snapshot).await?;
    Ok(provider)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .with_writer(std::io::stderr)
        .init();
    slotwise::observability::init(cli.metrics_port)?;

    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => {
            info!("clock pinned at {now}");
            Arc::new(FixedClock::new(now))
        }
        None => Arc::new(SystemClock),
    };
    let engine = Engine::with_clock(clock);

    match cli.command {
        Command::Slots {
            target,
            location,
            from,
            to,
        } => {
            let provider = load(&engine, &target).await?;
            let query = SlotQuery {
                service: target.service,
                member: target.member,
                location,
                start_date: from,
                end_date: to.unwrap_or(from),
            };
            let slots = engine.get_available_slots(provider, query).await?;
            print_json(&slots)
        }
        Command::Check {
            target,
            location,
            at,
        } => {
            let provider = load(&engine, &target).await?;
            let available = engine
                .is_slot_available(provider, target.service, target.member, location, at)
                .await?;
            print_json(&CheckOutput { available, at })
        }
        Command::Next {
            target,
            location,
            per_member,
        } => {
            let provider = load(&engine, &target).await?;
            if per_member {
                let next = engine
                    .next_available_per_member(provider, target.service, location)
                    .await?
                    .into_iter()
                    .map(|(member, slot)| MemberNext { member, slot })
                    .collect::<Vec<_>>();
                print_json(&next)
            } else {
                let first = engine
                    .first_available(provider, target.service, target.member, location)
                    .await?;
                print_json(&first)
            }
        }
    }
}
