// Entry point and high-level CLI flow.
//
// - Option [1] loads and cleans the station table, usage log and P&L sheet.
// - Options [2]-[4] produce the proximity, utilization and P&L reports,
//   printing previews and exporting CSV/JSON files.
// - After a report, the user can go back to the menu or exit.
mod cache;
mod config;
mod error;
mod geo;
mod loader;
mod output;
mod pnl;
mod quarter;
mod reports;
mod types;
mod util;
mod utilization;

use cache::ResultCache;
use clap::Parser;
use config::{AppConfig, Overrides};
use geo::StationFilter;
use loader::LoadReport;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};
use types::{PnlRecord, Station, UsageRecord};

#[derive(Parser)]
#[command(author, version, about = "EV charging station analytics reports", long_about = None)]
struct Cli {
    /// TOML configuration file (default: ./charging_report.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Station table CSV
    #[arg(long)]
    stations: Option<PathBuf>,
    /// Quarterly usage log CSV
    #[arg(long)]
    usage: Option<PathBuf>,
    /// Monthly P&L sheet CSV
    #[arg(long)]
    pnl: Option<PathBuf>,
    /// Directory for exported reports
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Default search radius in km (0.1-10.0)
    #[arg(long)]
    radius: Option<f64>,
    /// AC max energy per charging session, kWh (1-99)
    #[arg(long)]
    ac_capacity: Option<u32>,
    /// DC max energy per charging session, kWh (1-99)
    #[arg(long)]
    dc_capacity: Option<u32>,
}

// Tables are loaded once and reused by every report in a run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState::default()));

#[derive(Default)]
struct AppState {
    config: AppConfig,
    stations: Option<Vec<Station>>,
    usage: Option<Vec<UsageRecord>>,
    pnl: Option<Vec<PnlRecord>>,
    cache: ResultCache,
}

fn state() -> MutexGuard<'static, AppState> {
    // A panic mid-report leaves the tables intact, so a poisoned lock is usable.
    APP_STATE.lock().unwrap_or_else(|e| e.into_inner())
}

/// One trimmed line, or `None` once input is closed or unreadable.
fn read_trimmed_line<R: BufRead>(reader: &mut R) -> Option<String> {
    let mut buf = String::new();
    match reader.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Print a prompt and read one trimmed line of input. End of input exits.
fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    match read_trimmed_line(&mut io::stdin().lock()) {
        Some(line) => line,
        None => {
            info!("stdin closed");
            println!("\nExiting the program.");
            std::process::exit(0);
        }
    }
}

fn read_choice() -> String {
    prompt("Enter choice: ")
}

/// Blank input means "no filter".
fn prompt_optional(label: &str) -> Option<String> {
    Some(prompt(label)).filter(|s| !s.is_empty())
}

/// Ask whether to go back to the report menu. `true` means `Y`.
fn prompt_back_to_menu() -> bool {
    loop {
        match prompt("Back to Report Selection (Y/N): ").to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_report(label: &str, report: &LoadReport) {
    if report.missing {
        println!("{}: {} not found, no data loaded.", label, report.source);
        return;
    }
    println!(
        "{}: {} rows read, {} kept, {} skipped.",
        label,
        util::format_int(report.total_rows),
        util::format_int(report.kept_rows),
        util::format_int(report.dropped_rows)
    );
    if report.defaulted_fields > 0 {
        println!(
            "  Note: {} fields were blank or unparseable and were defaulted.",
            util::format_int(report.defaulted_fields)
        );
    }
    if report.lossy_decoding {
        println!("  Warning: unknown encoding; some characters could not be decoded.");
    } else if report.encoding != "UTF-8" {
        println!("  Decoded as {}.", report.encoding);
    }
}

/// Handle option [1]: load and clean every data file.
fn handle_load() {
    let mut state = state();
    let data = state.config.data.clone();

    match loader::load_stations(&data.stations) {
        Ok((stations, report)) => {
            print_load_report("Stations", &report);
            state.stations = Some(stations);
            state.cache.stations_reloaded();
        }
        Err(e) => eprintln!("Failed to load {}: {}", data.stations.display(), e),
    }
    match loader::load_usage(&data.usage) {
        Ok((usage, report)) => {
            print_load_report("Usage log", &report);
            state.usage = Some(usage);
            state.cache.usage_reloaded();
        }
        Err(e) => eprintln!("Failed to load {}: {}", data.usage.display(), e),
    }
    match loader::load_pnl(&data.pnl) {
        Ok((pnl, report)) => {
            print_load_report("P&L sheet", &report);
            state.pnl = Some(pnl);
        }
        Err(e) => eprintln!("Failed to load {}: {}", data.pnl.display(), e),
    }
    println!();
}

fn export<F>(path: PathBuf, write: F)
where
    F: FnOnce(&std::path::Path) -> error::Result<()>,
{
    match write(&path) {
        Ok(()) => println!("(Full table exported to {})\n", path.display()),
        Err(e) => eprintln!("Write error: {}", e),
    }
}

/// Handle option [2]: stations around a point.
fn handle_nearby() {
    let mut guard = state();
    let AppState {
        config,
        stations,
        cache,
        ..
    } = &mut *guard;
    let Some(stations) = stations.as_deref() else {
        println!("Error: No data loaded. Please load the data files first (option 1).\n");
        return;
    };

    let coords = (
        util::parse_f64_safe(Some(prompt("Latitude: ").as_str())),
        util::parse_f64_safe(Some(prompt("Longitude: ").as_str())),
    );
    let (lat, lon) = match coords {
        (Some(lat), Some(lon)) if geo::is_valid_coordinate(lat, lon) => (lat, lon),
        _ => {
            println!("Invalid coordinates. Latitude must be -90..90 and longitude -180..180.\n");
            return;
        }
    };
    let radius = match prompt_optional(&format!("Radius km [{}]: ", config.proximity.radius_km)) {
        None => config.proximity.radius_km,
        Some(raw) => match util::parse_f64_safe(Some(raw.as_str())).map(config::validate_radius) {
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                println!("{}\n", e);
                return;
            }
            None => {
                println!("Invalid radius.\n");
                return;
            }
        },
    };
    let filter = StationFilter {
        city: prompt_optional("City filter (blank = all): "),
        area_type: prompt_optional("Area type filter (blank = all): "),
        project_type: prompt_optional("Project type filter (blank = all): "),
    };

    let rows = if filter.is_empty() {
        reports::nearby_rows(&cache.nearby(stations, lat, lon, radius))
    } else {
        let subset: Vec<Station> = filter.apply(stations).into_iter().cloned().collect();
        reports::nearby_rows(&geo::find_nearby(lat, lon, &subset, radius))
    };
    info!(lat, lon, radius, found = rows.len(), "nearby search");

    output::preview_table(
        "Nearby Charging Stations",
        Some(&format!("Within {} km of ({}, {})", radius, lat, lon)),
        &rows,
        rows.len(),
    );
    export(config.output_path("nearby_stations.csv"), |p| {
        output::write_csv(p, &rows)
    });
}

/// Handle option [3]: per-record rates and the quarterly rollup.
fn handle_utilization() {
    let mut guard = state();
    let AppState {
        config,
        stations,
        usage,
        cache,
        ..
    } = &mut *guard;
    let (Some(stations), Some(usage)) = (stations.as_deref(), usage.as_deref()) else {
        println!("Error: No data loaded. Please load the data files first (option 1).\n");
        return;
    };

    let station_set: Option<HashSet<String>> =
        prompt_optional("Station IDs (comma-separated, blank = all): ").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

    let (rates, table) = cache.utilization(usage, stations, &config.utilization, station_set.as_ref());
    debug!(hits = cache.hits, misses = cache.misses, "result cache");
    let rate_rows = reports::rate_rows(&rates);
    let quarterly = reports::quarterly_table(&table);

    println!("\nQuarterly Utilization Rate");
    println!(
        "(AC capacity {} kWh/session, DC capacity {} kWh/session)\n",
        config.utilization.ac_capacity, config.utilization.dc_capacity
    );
    output::preview_text_table(&quarterly, quarterly.rows.len());
    export(config.output_path("utilization_quarterly.csv"), |p| {
        output::write_text_table(p, &quarterly)
    });

    output::preview_table("Per-record Utilization", Some("First 5 records"), &rate_rows, 5);
    export(config.output_path("utilization_records.csv"), |p| {
        output::write_csv(p, &rate_rows)
    });
}

/// Handle option [4]: P&L monitoring.
fn handle_pnl() {
    let guard = state();
    let Some(records) = guard.pnl.as_deref() else {
        println!("Error: No data loaded. Please load the data files first (option 1).\n");
        return;
    };
    let config = &guard.config;

    println!(
        "Managers: {}",
        pnl::distinct(records, |r| r.manager.as_str()).join(", ")
    );
    println!("Months: {}", pnl::distinct(records, |r| r.month.as_str()).join(", "));
    println!(
        "Operation types: {}",
        pnl::distinct(records, |r| r.operation_type.as_str()).join(", ")
    );
    let filter = pnl::PnlFilter {
        manager: prompt_optional("Manager (blank = all): "),
        month: prompt_optional("Month (blank = all): "),
        operation_type: prompt_optional("Operation type (blank = all): "),
    };
    let selected = filter.apply(records);
    if selected.is_empty() {
        println!("No records match the selected filters.\n");
        return;
    }

    let summary = pnl::totals(&selected);
    println!("\nP&L Summary");
    println!("Total revenue: {}", util::format_number(summary.total_revenue, 0));
    println!("Total cost:    {}", util::format_number(summary.total_cost, 0));
    println!("Total profit:  {}", util::format_number(summary.total_profit, 0));
    println!(
        "Stations:      {} ({} loss-making)",
        summary.station_count, summary.loss_making_stations
    );

    let ops = reports::operation_rows(&pnl::operation_summary(&selected));
    output::preview_table("Profit by Operation Type", None, &ops, ops.len());
    export(config.output_path("pnl_operation_summary.csv"), |p| {
        output::write_csv(p, &ops)
    });

    let costs = reports::cost_breakdown_rows(&pnl::cost_breakdown(&selected));
    output::preview_table("Cost Structure", None, &costs, costs.len());
    export(config.output_path("pnl_cost_breakdown.csv"), |p| {
        output::write_csv(p, &costs)
    });

    let details = reports::station_pnl_rows(&selected);
    output::preview_table("Station Details", Some("First 5 stations"), &details, 5);
    export(config.output_path("pnl_station_details.csv"), |p| {
        output::write_csv(p, &details)
    });

    let efficiency = reports::cost_efficiency_rows(&pnl::cost_efficiency(&selected));
    output::preview_table(
        "Cost Efficiency Ranking",
        Some("Cost per kWh, best and worst 5"),
        &efficiency,
        efficiency.len(),
    );
    export(config.output_path("pnl_cost_efficiency.csv"), |p| {
        output::write_csv(p, &efficiency)
    });

    let mut rankings = reports::ranking_rows(
        "Utilization",
        &pnl::top_by(&selected, |r| r.utilization, pnl::TOP_RANK_SIZE),
    );
    output::preview_table("Utilization Ranking", Some("Top 10 stations"), &rankings, rankings.len());
    let turnover = reports::ranking_rows(
        "Turnover",
        &pnl::top_by(&selected, |r| r.turnover, pnl::TOP_RANK_SIZE),
    );
    output::preview_table("Turnover Ranking", Some("Top 10 stations"), &turnover, turnover.len());
    rankings.extend(turnover);
    export(config.output_path("pnl_rankings.csv"), |p| {
        output::write_csv(p, &rankings)
    });

    export(config.output_path("pnl_summary.json"), |p| {
        output::write_json(p, &summary)
    });
}

fn init_tracing() {
    // Logs go to stderr so stdout stays the report channel. Respects RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    config.apply(Overrides {
        stations: cli.stations,
        usage: cli.usage,
        pnl: cli.pnl,
        output_dir: cli.output_dir,
        radius_km: cli.radius,
        ac_capacity: cli.ac_capacity,
        dc_capacity: cli.dc_capacity,
    });
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }
    state().config = config;

    loop {
        println!("Select Report:");
        println!("[1] Load the data files");
        println!("[2] Nearby Stations");
        println!("[3] Utilization Rate");
        println!("[4] Profit & Loss");
        println!("[5] Exit\n");
        let report = match read_choice().as_str() {
            "1" => {
                handle_load();
                continue;
            }
            "2" => handle_nearby as fn(),
            "3" => handle_utilization,
            "4" => handle_pnl,
            "5" => {
                println!("Exiting the program.");
                break;
            }
            _ => {
                println!("Invalid choice. Please enter 1 to 5.\n");
                continue;
            }
        };
        println!();
        report();
        if !prompt_back_to_menu() {
            println!("Exiting the program.");
            break;
        }
    }
}
