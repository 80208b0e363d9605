use clap::Parser;
use collision_dash::cli::{Args, Command, ReportArgs};
use collision_dash::compress::{self, CompressionSummary};
use collision_dash::{AppConfig, ConfigManager, Dashboard, FilterModel, RawFilters, APP_NAME};
use color_eyre::Result;
use serde::Serialize;

/// Environment variable holding `env_logger` style filters
const LOG_ENV: &str = "COLLISION_DASH_LOG";

fn init_logging(level: &str) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.parse_filters(level);
    builder.parse_env(LOG_ENV);
    // Ignore a logger already installed (e.g. by a test harness)
    builder.try_init().ok();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn report_filters(dashboard: &Dashboard, args: &ReportArgs) -> FilterModel {
    let current = if args.clear {
        dashboard.clear()
    } else {
        dashboard.apply_filters(&RawFilters::from_lists(
            &args.boroughs,
            &args.years,
            &args.vehicle_types,
            &args.person_types,
        ))
    };
    dashboard.search(args.search.as_deref(), &current)
}

#[derive(Serialize)]
struct SearchOutput {
    query: String,
    parsed: collision_dash::ParsedQuery,
    filters: FilterModel,
}

fn run(args: &Args, config: &AppConfig) -> Result<()> {
    match &args.command {
        Command::InitConfig { force } => {
            let manager = ConfigManager::new(APP_NAME)?;
            let path = manager.write_default_config(*force)?;
            println!("Wrote default config to {}", path.display());
        }
        Command::Compress {
            paths,
            format,
            force,
        } => {
            let files = paths
                .iter()
                .map(|path| compress::compress_file(path, *format, *force))
                .collect::<Result<Vec<_>>>()?;
            let summary = CompressionSummary::new(files);
            eprintln!(
                "Total compressed size {:.1} MB: {}",
                summary.total_compressed_bytes as f64 / (1024.0 * 1024.0),
                summary.advice.message()
            );
            print_json(&summary, true)?;
        }
        Command::Options => {
            let dashboard = Dashboard::open(config)?;
            print_json(dashboard.options(), true)?;
        }
        Command::Search { text } => {
            let dashboard = Dashboard::open(config)?;
            let parsed = dashboard.parse(Some(text.as_str()));
            let filters = parsed.apply_to(&dashboard.clear());
            print_json(
                &SearchOutput {
                    query: text.clone(),
                    parsed,
                    filters,
                },
                true,
            )?;
        }
        Command::Report(report_args) => {
            let dashboard = Dashboard::open(config)?;
            let filters = report_filters(&dashboard, report_args);
            let report = dashboard.generate_report(&filters);
            print_json(&report, report_args.pretty)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let mut config = AppConfig::load(APP_NAME)?;
    config.apply_args(&args);
    config.validate()?;

    init_logging(&config.logging.level);
    log::debug!("configuration: {:?}", config);

    run(&args, &config)
}
