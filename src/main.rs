// Entry point and high-level CLI flow.
//
// Every subcommand loads one CSV into a fresh `Session`, derives the view it
// needs and prints markdown previews. `report` and `exceptions` also export
// their tables to the configured output directory.
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use supplier_risk::config::AppConfig;
use supplier_risk::filter::Filters;
use supplier_risk::metrics::{compute_supplier_metrics, defects_by_supplier, late_by_supplier, spend_vs_risk};
use supplier_risk::output;
use supplier_risk::reports::{
    build_top_issues, compute_exceptions, compute_monthly_risk_trend, compute_supplier_monthly_rates,
    exception_records, generate_summary, supplier_ranking_rows,
};
use supplier_risk::session::{DatasetSource, LoadOutcome, Session};
use supplier_risk::types::{CanonicalField, ExceptionKind};
use supplier_risk::util::{format_int, format_number, format_percent};
use tabled::Tabled;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "supplier-risk")]
#[command(version, about = "Supplier risk scoring over procurement CSV exports", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(long, global = true, env = "SUPPLIER_RISK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatasetArgs {
    /// Procurement CSV file
    csv: PathBuf,

    /// Treat the file as the bundled reference sample
    #[arg(long)]
    sample: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Only this supplier ("All" for every supplier)
    #[arg(long)]
    supplier: Option<String>,

    /// Only this category
    #[arg(long)]
    category: Option<String>,

    /// Only this region
    #[arg(long)]
    region: Option<String>,

    /// First PO date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_day)]
    from: Option<NaiveDate>,

    /// Last PO date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_day)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn into_filters(self) -> Filters {
        Filters::new(self.supplier, self.category, self.region, self.from, self.to)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show and save the column mapping detected for a CSV
    Map {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Score every supplier and export the report tables
    Report {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Drill into one supplier
    Supplier {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Supplier name, exactly as it appears in the data
        name: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// List exception records
    Exceptions {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// missingDates, compliance, defects, partials or priceOutliers
        #[arg(long, value_parser = parse_kind)]
        kind: Option<ExceptionKind>,
        /// Case-insensitive search over id, supplier, category and region
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_kind(s: &str) -> Result<ExceptionKind, String> {
    ExceptionKind::from_key(s).ok_or_else(|| format!("unknown exception kind '{}'", s))
}

#[derive(Tabled, Clone)]
struct MappingRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Required")]
    required: &'static str,
    #[tabled(rename = "SourceColumn")]
    header: String,
}

#[derive(Tabled, Clone)]
struct MonthlyRateRow {
    #[tabled(rename = "Month")]
    month: String,
    #[tabled(rename = "LatePct")]
    late: String,
    #[tabled(rename = "DefectPct")]
    defects: String,
    #[tabled(rename = "CompliancePct")]
    compliance: String,
}

fn open_session(config: AppConfig, dataset: &DatasetArgs) -> Result<(Session, LoadOutcome)> {
    let mut session = Session::open(config).context("Failed to open mapping store")?;
    let source = if dataset.sample {
        DatasetSource::Sample
    } else {
        DatasetSource::Upload
    };
    let outcome = session
        .load_csv(&dataset.csv, source)
        .with_context(|| format!("Failed to load {}", dataset.csv.display()))?;
    Ok((session, outcome))
}

/// Load the dataset and make sure its rows are canonicalized.
fn load_records(config: AppConfig, dataset: &DatasetArgs) -> Result<Session> {
    let (mut session, outcome) = open_session(config, dataset)?;
    if !outcome.applied {
        if outcome.needs_review {
            tracing::warn!(
                confidence = outcome.confidence,
                "mapping has not been reviewed; run `map` to inspect it"
            );
        }
        session
            .apply_mapping()
            .context("Cannot map rows; check the mapping with `supplier-risk map`")?;
    }
    if let Some(report) = session.dataset().and_then(|d| d.report.as_ref()) {
        println!(
            "Processing dataset... ({} rows loaded, {} with synthetic ids, {} with unknown supplier)",
            format_int(report.total_rows as u64),
            format_int(report.synthetic_ids as u64),
            format_int(report.unknown_suppliers as u64)
        );
        if report.backfilled_costs > 0 {
            println!(
                "Info: Derived total cost for {} rows.",
                format_int(report.backfilled_costs as u64)
            );
        }
        println!();
    }
    Ok(session)
}

fn handle_map(config: AppConfig, dataset: DatasetArgs) -> Result<()> {
    let (mut session, outcome) = open_session(config, &dataset)?;
    let Some(loaded) = session.dataset() else {
        bail!("No dataset loaded");
    };

    println!("Dataset: {} ({} rows)", loaded.name, format_int(loaded.table.rows.len() as u64));
    println!("Mapping key: {}", outcome.mapping_key);
    println!("Known reference dataset: {}", if outcome.known_dataset { "yes" } else { "no" });
    println!("Restored saved mapping: {}", if outcome.restored { "yes" } else { "no" });
    println!("Confidence: {}", format_percent(outcome.confidence, 0));
    if outcome.needs_review {
        println!("Review required: auto-mapping confidence was low or the mapping is new.");
    }

    let rows: Vec<MappingRow> = CanonicalField::ALL
        .iter()
        .map(|f| MappingRow {
            field: f.label(),
            required: if f.is_required() { "yes" } else { "" },
            header: loaded.mapping.get(*f).unwrap_or("-").to_string(),
        })
        .collect();
    output::preview_table("Column Mapping", None, &rows, rows.len());

    session.save_mapping().context("Failed to save mapping")?;
    println!("Mapping saved to {}", session.config().mapping_store.display());
    Ok(())
}

fn handle_report(config: AppConfig, dataset: DatasetArgs, filters: FilterArgs) -> Result<()> {
    let preview = config.preview_rows;
    let out_dir = config.output_dir.clone();
    let session = load_records(config, &dataset)?;
    let filters = filters.into_filters();
    let records = session.view(&filters)?;

    println!("Generating reports...");
    println!("Active filters: {}\n", filters.describe());

    let metrics = compute_supplier_metrics(&records);
    let ranking = supplier_ranking_rows(&metrics);
    let file1 = output::output_path(&out_dir, "supplier_metrics.csv")?;
    output::write_csv(&file1, &ranking)?;
    output::preview_table(
        "Supplier Risk Ranking",
        Some("Sorted by risk score, highest first"),
        &ranking,
        preview,
    );
    println!("(Full table exported to {})\n", file1.display());

    let trend = compute_monthly_risk_trend(&records);
    let file2 = output::output_path(&out_dir, "monthly_risk.csv")?;
    output::write_csv(&file2, &trend)?;
    output::preview_table("Monthly Risk Trend", Some("Record-weighted"), &trend, preview);
    println!("(Full table exported to {})\n", file2.display());

    let issues = build_top_issues(&records);
    let file3 = output::output_path(&out_dir, "top_issues.csv")?;
    output::write_csv(&file3, &issues)?;
    output::preview_table("Top Issues", None, &issues, preview);
    println!("(Full table exported to {})\n", file3.display());

    let file4 = output::output_path(&out_dir, "late_by_supplier.json")?;
    output::write_json(&file4, &late_by_supplier(&records))?;
    let file5 = output::output_path(&out_dir, "defects_by_supplier.json")?;
    output::write_json(&file5, &defects_by_supplier(&records))?;
    let file6 = output::output_path(&out_dir, "spend_vs_risk.json")?;
    output::write_json(&file6, &spend_vs_risk(&records))?;

    let summary = generate_summary(&records, &metrics, &issues, filters.describe());
    let file7 = output::output_path(&out_dir, "summary.json")?;
    output::write_json(&file7, &summary)?;
    println!("Summary Stats ({}):", file7.display());
    println!(
        "{{\"total_pos\": {}, \"suppliers\": {}, \"high_risk\": {}, \"on_time\": \"{}\", \"avg_days_late\": {}}}",
        format_int(summary.total_pos as u64),
        format_int(summary.total_suppliers as u64),
        format_int(summary.high_risk_suppliers as u64),
        format_percent(summary.kpis.on_time_rate, 1),
        format_number(summary.kpis.avg_days_late, 1)
    );
    for note in &summary.diagnostics.notes {
        println!("Note: {}", note);
    }
    println!();
    Ok(())
}

fn handle_supplier(config: AppConfig, dataset: DatasetArgs, name: String, filters: FilterArgs) -> Result<()> {
    let preview = config.preview_rows;
    let session = load_records(config, &dataset)?;
    let records = session.view(&filters.into_filters())?;

    let metrics = compute_supplier_metrics(&records);
    let Some(metric) = metrics.iter().find(|m| m.supplier == name) else {
        bail!("Supplier '{}' not found in the current view", name);
    };

    println!("Supplier: {}", metric.supplier);
    println!(
        "Risk score: {} ({})",
        format_number(metric.risk_score, 1),
        metric.risk_band
    );
    println!(
        "POs: {}  On-time: {}  Late: {}  Avg days late: {}",
        format_int(metric.total_pos as u64),
        format_percent(metric.on_time_rate, 1),
        format_percent(metric.late_rate, 1),
        format_number(metric.avg_days_late, 1)
    );
    println!(
        "Defects: {}  Compliance gaps: {}  Partial orders: {}  Spend: {}",
        format_percent(metric.defect_rate, 1),
        format_percent(metric.compliance_gap_rate, 1),
        format_percent(metric.partial_order_rate, 1),
        format_number(metric.spend, 2)
    );

    let rates: Vec<MonthlyRateRow> = compute_supplier_monthly_rates(&records, &name)
        .into_iter()
        .map(|r| MonthlyRateRow {
            month: r.month,
            late: format_percent(r.late_rate, 1),
            defects: format_percent(r.defect_rate, 1),
            compliance: format_percent(r.compliance_gap_rate, 1),
        })
        .collect();
    output::preview_table("Monthly Rates", None, &rates, rates.len());

    let issues: Vec<_> = build_top_issues(&records)
        .into_iter()
        .filter(|i| i.supplier == name)
        .collect();
    output::preview_table("Issues", Some(&format!("{} total", issues.len())), &issues, preview);
    Ok(())
}

fn handle_exceptions(
    config: AppConfig,
    dataset: DatasetArgs,
    kind: Option<ExceptionKind>,
    search: Option<String>,
    filters: FilterArgs,
) -> Result<()> {
    let preview = config.preview_rows;
    let out_dir = config.output_dir.clone();
    let session = load_records(config, &dataset)?;
    let records = session.view(&filters.into_filters())?;
    let sets = compute_exceptions(&records);

    let Some(kind) = kind else {
        for kind in ExceptionKind::ALL {
            println!("{:<14} {}", kind.key(), format_int(sets.get(kind).len() as u64));
        }
        return Ok(());
    };

    let rows = exception_records(&sets, kind, search.as_deref());
    let file = output::output_path(&out_dir, &format!("exceptions_{}.csv", kind.key()))?;
    output::write_csv(&file, &rows)?;
    output::preview_table(
        &format!("Exceptions: {}", kind),
        Some(&format!("{} rows", format_int(rows.len() as u64))),
        &rows,
        preview,
    );
    println!("(Full table exported to {})\n", file.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let (config, config_path) = AppConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(path) = config_path {
        tracing::debug!(path = %path.display(), "using config file");
    }

    match cli.command {
        Commands::Map { dataset } => handle_map(config, dataset),
        Commands::Report { dataset, filters } => handle_report(config, dataset, filters),
        Commands::Supplier { dataset, name, filters } => handle_supplier(config, dataset, name, filters),
        Commands::Exceptions {
            dataset,
            kind,
            search,
            filters,
        } => handle_exceptions(config, dataset, kind, search, filters),
    }
}
