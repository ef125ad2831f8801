//! Command-line settings and the defaults remembered between runs.
//!
//! Values given on the command line (or through their environment variable)
//! always win. Anything left at its default is filled from
//! `~/.metabolic-health/last_used.json`, and the merged result is written
//! back so the next run starts from it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Directory under the home directory holding saved defaults and logs.
pub const APP_DIR: &str = ".metabolic-health";

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Clone)]
#[command(
    name = "metabolic-health",
    about = "Cross-analyse sleep, glucose, metabolic score and fasting exports",
    version
)]
pub struct Settings {
    /// Whoop daily summary export (CSV)
    #[arg(long)]
    pub sleep: Option<PathBuf>,

    /// FreeStyle LibreLink glucose export (CSV)
    #[arg(long)]
    pub glucose: Option<PathBuf>,

    /// Levels daily metabolic score export (CSV)
    #[arg(long)]
    pub levels: Option<PathBuf>,

    /// Zero fasting log export (CSV)
    #[arg(long)]
    pub fasting: Option<PathBuf>,

    /// Which feature table to build
    #[arg(long, default_value = "metrics", value_parser = ["metrics", "glucose"])]
    pub pipeline: String,

    /// IANA timezone of the glucose device clock, or "auto" for the system zone
    #[arg(long, env = "METABOLIC_HEALTH_TIMEZONE", default_value = "auto")]
    pub timezone: String,

    /// Output format
    #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
    pub format: String,

    /// Write output files here instead of printing to stdout
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Allowed gap in hours between a fast's logged duration and its start/end times
    #[arg(long, default_value_t = 0.25)]
    pub duration_tolerance_hours: f64,

    /// Fail on fasts whose logged duration disagrees with their start/end times
    #[arg(long)]
    pub strict_fasts: bool,

    /// Log verbosity
    #[arg(
        long,
        env = "METABOLIC_HEALTH_LOG",
        default_value = "INFO",
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]
    )]
    pub log_level: String,

    /// Also append log output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Shorthand for --log-level DEBUG
    #[arg(long)]
    pub debug: bool,

    /// Forget saved defaults before running
    #[arg(long)]
    pub clear: bool,
}

impl Settings {
    /// Parse the process arguments against the saved defaults in the home
    /// directory.
    pub fn resolve() -> Self {
        Self::resolve_from(std::env::args_os(), &SavedDefaults::default_path())
    }

    /// Parse `args` against the saved defaults at `saved_path`.
    ///
    /// With `--clear` the saved file is removed and nothing is written back.
    /// Exits the process on a usage error, as clap's own `parse` does.
    pub fn resolve_from<I, T>(args: I, saved_path: &Path) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().get_matches_from(args);
        let mut settings = Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        if settings.clear {
            if let Err(e) = SavedDefaults::remove(saved_path) {
                tracing::warn!(error = %e, "could not remove saved defaults");
            }
            return settings.finalize();
        }

        settings.fill_from(&matches, SavedDefaults::read(saved_path));
        let settings = settings.finalize();

        if let Err(e) = SavedDefaults::capture(&settings).write(saved_path) {
            tracing::debug!(error = %e, "could not save defaults");
        }
        settings
    }

    /// Take each saved value the user did not supply this run.
    fn fill_from(&mut self, matches: &ArgMatches, saved: SavedDefaults) {
        let SavedDefaults {
            timezone,
            pipeline,
            format,
            duration_tolerance_hours,
        } = saved;

        if let Some(v) = timezone.filter(|_| !supplied(matches, "timezone")) {
            self.timezone = v;
        }
        if let Some(v) = pipeline.filter(|_| !supplied(matches, "pipeline")) {
            self.pipeline = v;
        }
        if let Some(v) = format.filter(|_| !supplied(matches, "format")) {
            self.format = v;
        }
        if let Some(v) =
            duration_tolerance_hours.filter(|_| !supplied(matches, "duration_tolerance_hours"))
        {
            self.duration_tolerance_hours = v;
        }
    }

    /// Replace `auto` with the system timezone and apply `--debug`.
    fn finalize(mut self) -> Self {
        if self.timezone.eq_ignore_ascii_case("auto") {
            self.timezone = crate::time_utils::get_system_timezone();
        }
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }
}

fn supplied(matches: &ArgMatches, id: &str) -> bool {
    matches!(
        matches.value_source(id),
        Some(ValueSource::CommandLine | ValueSource::EnvVariable)
    )
}

// ── Saved defaults ────────────────────────────────────────────────────────────

/// The subset of [`Settings`] carried over between runs.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_tolerance_hours: Option<f64>,
}

impl SavedDefaults {
    pub fn default_path() -> PathBuf {
        Self::path_under(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn path_under(home: &Path) -> PathBuf {
        home.join(APP_DIR).join("last_used.json")
    }

    /// Missing or unreadable files yield empty defaults.
    pub fn read(path: &Path) -> Self {
        let Ok(bytes) = std::fs::read(path) else {
            return Self::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::debug!(error = %e, path = %path.display(), "ignoring corrupt saved defaults");
            Self::default()
        })
    }

    /// Write through a sibling temp file and rename into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&staged, path)?;
        Ok(())
    }

    /// Delete the file; a file that is already gone is not an error.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn capture(settings: &Settings) -> Self {
        Self {
            timezone: Some(settings.timezone.clone()),
            pipeline: Some(settings.pipeline.clone()),
            format: Some(settings.format.clone()),
            duration_tolerance_hours: Some(settings.duration_tolerance_hours),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
