mod collector;
mod input;
mod matcher;
mod output;
mod pipeline;
mod registry;
mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use matcher::NameMatcher;
use output::CsvSink;
use pipeline::{CompanyIdentity, Pipeline, ResultRow, YearMonth};
use registry::RegistryClient;
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "nps_collector",
    about = "Collect NPS business-site headcounts and monthly hires/separations"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up every company in the input list and append rows to the CSV
    Run {
        /// Company list (JSON array of {name, num})
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Directory for the output CSV
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Data month as YYYYMM (default: current month)
        #[arg(short, long)]
        year_month: Option<String>,
        /// Max companies to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Look up a single company and print its rows as CSV
    Company {
        /// Business registration number (at least 6 digits)
        #[arg(long)]
        num: String,
        /// Company name
        #[arg(long)]
        name: String,
        /// Data month as YYYYMM (default: current month)
        #[arg(short, long)]
        year_month: Option<String>,
    },
    /// Show how two names normalize and whether they match
    Match { name_a: String, name_b: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    let matcher = NameMatcher::new(&settings.corporate_markers, settings.min_match_len)?;

    match cli.command {
        Commands::Run {
            input,
            output_dir,
            year_month,
            limit,
        } => {
            if let Some(p) = input {
                settings.input_path = p;
            }
            if let Some(d) = output_dir {
                settings.output_dir = d;
            }
            let ym = resolve_year_month(year_month.as_deref())?;

            let mut companies = input::load_companies(&settings.input_path)?;
            if let Some(n) = limit {
                companies.truncate(n);
            }
            if companies.is_empty() {
                println!("No companies in {}.", settings.input_path.display());
                return Ok(());
            }

            let sink = CsvSink::new(settings.output_path());
            info!(
                "Collecting {} companies for {} into {}",
                companies.len(),
                ym,
                sink.path().display()
            );

            let client = RegistryClient::new(&settings)?;
            let pipeline = Pipeline::new(&client, &matcher, settings.page_size);
            let stats = collector::collect_all(
                &pipeline,
                &companies,
                &ym,
                &sink,
                Duration::from_millis(settings.company_delay_ms),
            );
            stats.print(&sink);
            Ok(())
        }
        Commands::Company {
            num,
            name,
            year_month,
        } => {
            let ym = resolve_year_month(year_month.as_deref())?;
            let company = CompanyIdentity::new(&num, &name)?;
            let client = RegistryClient::new(&settings)?;
            let rows = Pipeline::new(&client, &matcher, settings.page_size)
                .collect_for_company(&company, &ym);
            if rows.is_empty() {
                println!("No matching sites for {}.", company.name);
                return Ok(());
            }
            print_rows(&rows)
        }
        Commands::Match { name_a, name_b } => {
            println!("A: '{}'", matcher.normalize(&name_a));
            println!("B: '{}'", matcher.normalize(&name_b));
            println!(
                "{} (window {})",
                if matcher.matches(&name_a, &name_b) { "match" } else { "no match" },
                matcher.min_length()
            );
            Ok(())
        }
    }
}

fn resolve_year_month(arg: Option<&str>) -> Result<YearMonth> {
    match arg {
        Some(s) => YearMonth::parse(s),
        None => Ok(YearMonth::current()),
    }
}

fn print_rows(rows: &[ResultRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(std::io::stdout().lock());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
