use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::output::CsvSink;
use crate::pipeline::{CompanyIdentity, Pipeline, YearMonth};
use crate::registry::Registry;

/// Counters for one collection run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub companies: usize,
    /// Companies with at least one matching site.
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
    pub saved: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn print(&self, sink: &CsvSink) {
        println!("Companies:      {}", self.companies);
        println!("With matches:   {}", self.succeeded);
        println!("Without:        {}", self.failed);
        println!("Rows collected: {}", self.rows);
        println!("Rows saved:     {}", self.saved);
        println!("Output:         {}", sink.path().display());
        println!("Elapsed:        {}", format_elapsed(self.elapsed));
    }
}

/// Run the pipeline over every company in order, appending rows as they come.
pub fn collect_all<R: Registry>(
    pipeline: &Pipeline<'_, R>,
    companies: &[CompanyIdentity],
    year_month: &YearMonth,
    sink: &CsvSink,
    company_delay: Duration,
) -> RunStats {
    let t0 = Instant::now();
    let mut stats = RunStats {
        companies: companies.len(),
        ..Default::default()
    };

    let pb = ProgressBar::new(companies.len() as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    for (i, company) in companies.iter().enumerate() {
        pb.set_message(company.name.clone());
        let rows = pipeline.collect_for_company(company, year_month);

        if rows.is_empty() {
            stats.failed += 1;
            info!("No matching sites for {}", company.name);
        } else {
            stats.succeeded += 1;
            stats.rows += rows.len();
        }

        for row in &rows {
            match sink.append(row) {
                Ok(()) => stats.saved += 1,
                Err(e) => warn!("Failed to save row for {}: {:#}", row.site_name, e),
            }
        }

        pb.inc(1);
        info!(
            "Progress {}/{} (matched: {}, unmatched: {}, rows: {})",
            i + 1,
            stats.companies,
            stats.succeeded,
            stats.failed,
            stats.rows
        );

        if i + 1 < companies.len() && !company_delay.is_zero() {
            thread::sleep(company_delay);
        }
    }

    pb.finish_and_clear();
    stats.elapsed = t0.elapsed();
    stats
}

/// Seconds with the minute equivalent, e.g. `90.00s (1.50m)`.
fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    format!("{:.2}s ({:.2}m)", secs, secs / 60.0)
}
