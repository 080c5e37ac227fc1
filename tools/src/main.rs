//! meterwatch: headless runner for the reading validation engine.
//!
//! Usage:
//!   meterwatch --demo --seed 42 --units 24 --cycles 6
//!   meterwatch --db readings.db --config overrides.json --ipc-mode

mod demo;

use anyhow::Result;
use meterwatch_core::{
    config::{ConfigScope, ConfigStore, MemoryConfigStore, PartialValidationConfig},
    engine::MeterEngine,
    flag::ManualFlagInput,
    reading::{ReadingInput, ReviewOutcome},
    store::{MeterStore, SqliteConfigStore},
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    CaptureReading {
        reading: ReadingInput,
    },
    Revalidate {
        reading_id: String,
    },
    AddManualFlag {
        reading_id: String,
        flag: ManualFlagInput,
    },
    RemoveManualFlag {
        reading_id: String,
        index: usize,
    },
    Review {
        reading_id: String,
        outcome: ReviewOutcome,
        reviewed_by: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Reconcile {
        cycle_id: String,
    },
    CycleSummary {
        cycle_id: String,
    },
    ResolveConfig {
        #[serde(default)]
        scheme_id: Option<String>,
    },
    SetConfig {
        #[serde(default)]
        scheme_id: Option<String>,
        config: PartialValidationConfig,
    },
    CloseCycle {
        cycle_id: String,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let units = parse_arg(&args, "--units", 24usize);
    let cycles = parse_arg(&args, "--cycles", 6u32);
    let demo = args.iter().any(|a| a == "--demo");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config_path = string_arg(&args, "--config");

    if !ipc_mode {
        println!("meterwatch");
        println!("  db:      {db}");
        println!("  config:  {}", config_path.unwrap_or("(stored)"));
        println!();
    }

    // For :memory: use a shared-memory URI so the engine store and the
    // config store connections see the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:meterwatch_{}?mode=memory&cache=shared", unix_seconds())
    } else {
        db.to_string()
    };
    let store = MeterStore::open(&db_effective)?;
    store.migrate()?;

    let config_store: Box<dyn ConfigStore> = match config_path {
        Some(path) => Box::new(MemoryConfigStore::load_file(path)?),
        None => Box::new(SqliteConfigStore::new(store.reopen()?)),
    };
    let engine = MeterEngine::new(store, config_store);

    if demo {
        let cycle_ids = demo::seed_scheme(&engine, seed, units, cycles)?;
        if !ipc_mode {
            print_summary(&engine, &cycle_ids)?;
        }
    }
    if ipc_mode {
        run_ipc_loop(&engine)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &MeterEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let response = match handle_command(engine, cmd) {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                log::warn!("IPC command failed: {e}");
                json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &MeterEngine, cmd: IpcCommand) -> Result<Value> {
    let value = match cmd {
        IpcCommand::CaptureReading { reading } => serde_json::to_value(engine.capture_reading(reading)?)?,
        IpcCommand::Revalidate { reading_id } => {
            serde_json::to_value(engine.revalidate_reading(&reading_id)?)?
        }
        IpcCommand::AddManualFlag { reading_id, flag } => {
            json!({ "added": engine.add_manual_flag(&reading_id, flag)? })
        }
        IpcCommand::RemoveManualFlag { reading_id, index } => {
            json!({ "removed": engine.remove_manual_flag(&reading_id, index)? })
        }
        IpcCommand::Review {
            reading_id,
            outcome,
            reviewed_by,
            notes,
        } => serde_json::to_value(engine.review_reading(&reading_id, outcome, &reviewed_by, notes)?)?,
        IpcCommand::Reconcile { cycle_id } => json!({
            "summary": engine.reconciliation_summary(&cycle_id)?,
            "flag": engine.check_bulk_reconciliation(&cycle_id)?,
        }),
        IpcCommand::CycleSummary { cycle_id } => json!({
            "flags": engine.cycle_flag_summary(&cycle_id)?,
            "readiness": engine.closure_readiness(&cycle_id)?,
            "missing": engine.missing_readings(&cycle_id)?,
        }),
        IpcCommand::ResolveConfig { scheme_id } => {
            serde_json::to_value(engine.resolve_config(scheme_id.as_deref()))?
        }
        IpcCommand::SetConfig { scheme_id, config } => {
            let scope = ConfigScope::for_scheme(scheme_id.as_deref());
            engine.set_config(&scope, &config)?;
            serde_json::to_value(engine.resolve_config(scheme_id.as_deref()))?
        }
        IpcCommand::CloseCycle { cycle_id } => serde_json::to_value(engine.close_cycle(&cycle_id)?)?,
        IpcCommand::Quit => Value::Null,
    };
    Ok(value)
}

fn print_summary(engine: &MeterEngine, cycle_ids: &[String]) -> Result<()> {
    let health = engine.scheme_health(demo::DEMO_SCHEME)?;
    println!("=== SCHEME {} ===", health.scheme_id);
    println!("  bulk meters:  {}", health.bulk_meter_count);
    println!("  unit meters:  {}", health.unit_meter_count);
    println!("  open cycles:  {}", health.open_cycle_count);
    for warning in &health.warnings {
        println!("  warning:      {warning}");
    }

    println!();
    println!("=== CYCLES ===");
    for cycle_id in cycle_ids {
        let flags = engine.cycle_flag_summary(cycle_id)?;
        let readiness = engine.closure_readiness(cycle_id)?;
        let recon = engine.reconciliation_summary(cycle_id)?;

        let completion = readiness
            .as_ref()
            .map(|r| format!("{}/{} read", r.units_read, r.total_units))
            .unwrap_or_else(|| "-".into());
        let mismatch = recon
            .as_ref()
            .map(|s| format!("{:.1}% ({})", s.mismatch_percent, s.severity))
            .unwrap_or_else(|| "baseline".into());
        println!(
            "  {cycle_id} | {completion} | flagged {}/{} (H{} M{} L{}) | common area {mismatch}",
            flags.flagged,
            flags.total,
            flags.by_severity.high,
            flags.by_severity.medium,
            flags.by_severity.low,
        );
        if !flags.by_type.is_empty() {
            let types: Vec<String> = flags.by_type.iter().map(|(k, n)| format!("{k}×{n}")).collect();
            println!("      {}", types.join(", "));
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn unix_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
