mod bootstrap;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metabolic_core::settings::Settings;
use metabolic_data::analysis::Pipeline;
use metabolic_data::fasting::FastingConfig;
use metabolic_data::reader::read_source;
use metabolic_runtime::session::AnalysisSession;

use crate::output::OutputFormat;

fn main() -> Result<()> {
    let settings = Settings::resolve();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Metabolic Health v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Pipeline: {}, Timezone: {}, Format: {}",
        settings.pipeline,
        settings.timezone,
        settings.format
    );

    let pipeline: Pipeline = settings.pipeline.parse()?;
    let format: OutputFormat = settings.format.parse()?;

    let fasting = FastingConfig {
        duration_tolerance_hours: settings.duration_tolerance_hours,
        reject_inconsistent: settings.strict_fasts,
    };
    let mut session = AnalysisSession::new(&settings.timezone, fasting)?;

    let sleep = read_input("--sleep", settings.sleep.as_deref())?;
    let result = match pipeline {
        Pipeline::Glucose => {
            let glucose = read_input("--glucose", settings.glucose.as_deref())?;
            session.glucose_analysis(&sleep, &glucose)?
        }
        Pipeline::Metrics => {
            let levels = read_input("--levels", settings.levels.as_deref())?;
            let fasts = read_input("--fasting", settings.fasting.as_deref())?;
            session.metrics_analysis(&sleep, &levels, &fasts)?
        }
    };

    tracing::info!(
        "{} dates x {} columns in {:.3}s",
        result.metadata.dates,
        result.metadata.columns,
        result.metadata.compute_time_seconds
    );

    match settings.output_dir.as_deref() {
        Some(dir) => {
            let written = output::write_to_dir(&result, format, dir)?;
            tracing::debug!(files = written.len(), "output written");
        }
        None => output::write_stream(&result, format, std::io::stdout().lock())?,
    }

    Ok(())
}

/// Read a required input file named by `flag`.
fn read_input(flag: &str, path: Option<&Path>) -> Result<Vec<u8>> {
    let path: PathBuf = path
        .map(Path::to_path_buf)
        .with_context(|| format!("{flag} is required for this pipeline"))?;
    read_source(&path).with_context(|| format!("loading {flag} input"))
}
