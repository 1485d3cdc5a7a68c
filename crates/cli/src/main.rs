//! `stock-ledger` command-line entry point.
//!
//! Replays a catalog and a JSON-lines movement file through the ledger engine and prints a
//! JSON summary on stdout. Logs go to stderr.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stock_ledger_core::{ActorId, Clock, LedgerError, ProductId, SystemClock};
use stock_ledger_events::{EventBus, InMemoryEventBus};
use stock_ledger_infra::{
    BalanceDiscrepancy, LedgerConfig, LedgerEnvelope, LedgerServices, LedgerStore, StockReport,
    TimeRange,
};
use stock_ledger_inventory::{
    LedgerEvent, MovementFilter, MovementRecord, MovementRequest, StockAlert, StockTerms,
};

#[derive(Parser)]
#[command(name = "stock-ledger", about = "Append-only stock ledger tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a catalog and a movement file, then print balances and a report.
    Replay(ReplayArgs),
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// JSON array of `{product_id, minimum_stock, maximum_stock, purchase_cost}`.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// JSON-lines file of movement requests.
    #[arg(long)]
    movements: PathBuf,

    /// Actor recorded on every movement (defaults to a fresh id).
    #[arg(long)]
    actor: Option<ActorId>,

    /// Include this product's history in the output.
    #[arg(long)]
    history: Option<ProductId>,

    /// Reject movements for products missing from the catalog.
    #[arg(long)]
    strict: bool,

    /// Report range start (RFC 3339, inclusive).
    #[arg(long, requires = "until")]
    since: Option<DateTime<Utc>>,

    /// Report range end (RFC 3339, exclusive).
    #[arg(long, requires = "since")]
    until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct CatalogEntry {
    product_id: ProductId,
    #[serde(flatten)]
    terms: StockTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Rejection {
    line: usize,
    code: &'static str,
    error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct LowStockLine {
    product_id: ProductId,
    current_stock: i64,
    minimum_stock: i64,
    suggested_reorder: i64,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    accepted: usize,
    rejected: Vec<Rejection>,
    report: StockReport,
    low_stock: Vec<LowStockLine>,
    alerts: Vec<StockAlert>,
    discrepancies: Vec<BalanceDiscrepancy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<Vec<MovementRecord>>,
}

type Bus = Arc<InMemoryEventBus<LedgerEnvelope>>;

fn main() -> Result<()> {
    stock_ledger_observability::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(args) => run_replay(args),
    }
}

fn run_replay(args: ReplayArgs) -> Result<()> {
    let mut config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    if args.strict {
        config = config.with_strict_catalog(true);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    #[cfg(feature = "postgres")]
    if let Some(url) = config.database_url.clone() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let store = runtime
            .block_on(stock_ledger_infra::PostgresLedgerStore::connect(&url))
            .context("failed to connect to postgres")?;
        runtime
            .block_on(store.ensure_schema())
            .context("failed to create ledger schema")?;
        info!("using postgres ledger store");

        let services = LedgerServices::new(store, bus, clock, config);
        let summary = replay(&services, &args)?;
        return print_json(&summary);
    }

    let services = LedgerServices::new(
        stock_ledger_infra::InMemoryLedgerStore::new(),
        bus,
        clock,
        config,
    );
    let summary = replay(&services, &args)?;
    print_json(&summary)
}

fn replay<S: LedgerStore>(services: &LedgerServices<S, Bus>, args: &ReplayArgs) -> Result<ReplaySummary> {
    let alerts_sub = services.bus.subscribe();

    if let Some(path) = &args.catalog {
        let entries = load_catalog(path)?;
        for entry in &entries {
            services
                .engine
                .configure_product(entry.product_id, entry.terms)
                .with_context(|| format!("invalid catalog entry for product {}", entry.product_id))?;
        }
        info!(products = entries.len(), "catalog loaded");
    }

    let file = fs::File::open(&args.movements)
        .with_context(|| format!("failed to open {}", args.movements.display()))?;
    let actor = args.actor.unwrap_or_default();
    let (accepted, rejected) = apply_lines(services, BufReader::new(file), actor)?;
    info!(accepted, rejected = rejected.len(), "movements replayed");

    let range = match (args.since, args.until) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
        _ => None,
    };

    let low_stock = services
        .queries
        .list_low_stock()?
        .into_iter()
        .map(|b| LowStockLine {
            product_id: b.product_id(),
            current_stock: b.current_stock(),
            minimum_stock: b.minimum_stock(),
            suggested_reorder: b.suggested_reorder(),
        })
        .collect();

    let alerts = alerts_sub
        .drain()
        .into_iter()
        .filter_map(|envelope| match envelope.into_payload() {
            LedgerEvent::LowStockReached(alert) => Some(alert),
            _ => None,
        })
        .collect();

    let history = match args.history {
        Some(product_id) => Some(
            services
                .queries
                .list_movements(&MovementFilter::for_product(product_id))?,
        ),
        None => None,
    };

    Ok(ReplaySummary {
        accepted,
        rejected,
        report: services.queries.report(range)?,
        low_stock,
        alerts,
        discrepancies: services.queries.verify_integrity()?,
        history,
    })
}

fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_catalog(&raw).with_context(|| format!("invalid catalog {}", path.display()))
}

fn parse_catalog(raw: &str) -> Result<Vec<CatalogEntry>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
    let mut seen = std::collections::HashSet::new();
    for entry in &entries {
        if !seen.insert(entry.product_id) {
            bail!("duplicate product {}", entry.product_id);
        }
    }
    Ok(entries)
}

/// Apply every non-blank, non-comment line. Line numbers are 1-based.
fn apply_lines<S: LedgerStore>(
    services: &LedgerServices<S, Bus>,
    reader: impl BufRead,
    actor: ActorId,
) -> Result<(usize, Vec<Rejection>)> {
    let mut accepted = 0;
    let mut rejected = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let request: MovementRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(err) => {
                warn!(line = line_no, error = %err, "unparseable movement line");
                rejected.push(Rejection {
                    line: line_no,
                    code: "parse",
                    error: err.to_string(),
                });
                continue;
            }
        };

        match services.engine.apply(request, actor) {
            Ok(_) => accepted += 1,
            Err(err @ LedgerError::Storage(_)) => {
                return Err(err).with_context(|| format!("storage failure at line {line_no}"));
            }
            Err(err) => {
                warn!(line = line_no, code = err.code(), error = %err, "movement line rejected");
                rejected.push(Rejection {
                    line: line_no,
                    code: err.code(),
                    error: err.to_string(),
                });
            }
        }
    }

    Ok((accepted, rejected))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
