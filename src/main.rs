use anyhow::{bail, Result};
use std::env;
use std::path::Path;

use gopass_validator::{
    load_table_with_aliases, DoubleChargeDetector, ReconcileEngine, COMERCIO_ALIASES,
    GOPASS_ALIASES, PAYMENT_ALIASES,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("double-charges") => run_double_charges(&args[2..]),
        Some("reconcile") => run_reconcile(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("GoPass Charge Validator v{}", gopass_validator::VERSION);
    println!();
    println!("Usage:");
    println!("  gopass-validator double-charges <pagos.csv> [--window SECS] [--json]");
    println!("  gopass-validator reconcile <comercio.csv> <gopass.csv> [--tolerance MIN] [--json]");
}

/// Pipeline A: flag double charges inside a single payments export.
fn run_double_charges(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("missing payments CSV path");
    };
    let window = flag_value(args, "--window")?.unwrap_or(600);
    let json = args.iter().any(|a| a == "--json");

    println!("⛽ Double-Charge Detection");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading payments ledger...");
    let table = load_table_with_aliases(Path::new(path), PAYMENT_ALIASES)?;
    println!("✓ Loaded {} raw rows", table.row_count());

    println!("\n🔍 Scanning for double charges...");
    let detector = DoubleChargeDetector::with_window(window as i64);
    let report = detector.run_with_progress(&table, |done, total| {
        println!("  analyzed {} of {} records", done, total);
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let s = &report.summary;
    println!("\n📊 Results");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Total records:     {}", s.total_raw);
    println!("  After filtering:   {}", s.total_filtered);
    println!("  Double charges:    {}", s.double_charges);
    println!("  Normal records:    {}", s.normal);
    println!("  Double-charge %:   {:.2}%", s.percentage);
    println!("  Double-charge $:   ${:.0}", s.double_charge_value);

    let top = report.top_establishments(10);
    if !top.is_empty() {
        println!("\n🏪 Top establishments by double charges:");
        for (establishment, count) in top {
            println!("  {:>4}  {}", count, establishment);
        }
    }

    Ok(())
}

/// Pipeline B: reconcile the Comercio movement log against the Gopass ledger.
fn run_reconcile(args: &[String]) -> Result<()> {
    let (Some(comercio_path), Some(gopass_path)) = (args.first(), args.get(1)) else {
        bail!("expected <comercio.csv> <gopass.csv>");
    };
    let tolerance = flag_value(args, "--tolerance")?.unwrap_or(5);
    let json = args.iter().any(|a| a == "--json");

    println!("🅿️  Two-Ledger Reconciliation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading ledgers...");
    let comercio = load_table_with_aliases(Path::new(comercio_path), COMERCIO_ALIASES)?;
    let gopass = load_table_with_aliases(Path::new(gopass_path), GOPASS_ALIASES)?;
    println!(
        "✓ Comercio: {} rows | Gopass: {} rows",
        comercio.row_count(),
        gopass.row_count()
    );

    println!("\n⚖️  Reconciling (tolerance ±{} min)...", tolerance);
    let engine = ReconcileEngine::with_tolerance(tolerance);
    let report = engine.reconcile(&comercio, &gopass)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n📊 {}", report.summary());

    if !report.possible.is_empty() {
        println!("\n🔶 Possible duplicates:");
        for pair in &report.possible {
            println!(
                "  {} ↔ {} | key {} | Δentry {:+.1} min, Δexit {:+.1} min",
                pair.card_id,
                pair.transaction_id,
                pair.session_key,
                pair.entry_diff_minutes,
                pair.exit_diff_minutes,
            );
        }
    }

    if !report.confirmed.is_empty() {
        println!("\n🔴 Confirmed duplicates:");
        for dup in &report.confirmed {
            println!(
                "  {} ↔ {} | plate {} | key {}",
                dup.pair.card_id, dup.pair.transaction_id, dup.comercio_plate, dup.comercio_key,
            );
        }
    } else {
        println!("\n✅ No confirmed duplicates");
    }

    Ok(())
}

/// Parse `--flag N` out of the argument list.
fn flag_value(args: &[String], flag: &str) -> Result<Option<u32>> {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        let Some(raw) = args.get(pos + 1) else {
            bail!("{} requires a value", flag);
        };
        let value = raw
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("{} expects a non-negative integer, got '{}'", flag, raw))?;
        return Ok(Some(value));
    }
    Ok(None)
}
