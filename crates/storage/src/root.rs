//! Storage root resolution.
//!
//! The bot runs on hosts where the working directory is wiped on every
//! redeploy and only an attached disk survives. The resolver picks one
//! directory for all persisted state from an ordered list of candidates,
//! most explicit first, and refuses to continue unless that directory is
//! actually writable.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StorageError;

/// Environment variables consulted for the storage root, highest priority first.
pub const DEFAULT_ROOT_CANDIDATES: &[&str] =
    &["STORAGE_DIR", "RENDER_DISK_PATH", "PERSIST_DIR", "PERSISTENT_DIR"];

/// Used when no candidate is set. Relative to the process working directory.
pub const DEFAULT_FALLBACK_ROOT: &str = "data";

const PROBE_FILE: &str = ".relaybot-write-probe";

/// One candidate source and the raw value it had at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootCandidate {
    /// Where the value came from (usually an environment variable name).
    pub source: String,
    pub value: Option<String>,
}

impl RootCandidate {
    pub fn new(source: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        RootCandidate {
            source: source.into(),
            value: value.map(Into::into),
        }
    }

    /// Read the candidate from the environment variable named `var`.
    pub fn from_env(var: &str) -> Self {
        RootCandidate {
            source: var.to_string(),
            value: std::env::var(var).ok(),
        }
    }

    fn selected_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Display for RootCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_deref() {
            Some(v) if !v.trim().is_empty() => write!(f, "{} = {}", self.source, v),
            Some(_) => write!(f, "{} = (empty)", self.source),
            None => write!(f, "{} = (unset)", self.source),
        }
    }
}

/// Which candidate won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootSource {
    Candidate { source: String },
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Passed,
    Failed { error: String },
}

/// Everything an operator needs to see about where state is kept.
#[derive(Debug, Clone, Serialize)]
pub struct RootDiagnostics {
    pub selected: PathBuf,
    pub source: RootSource,
    pub candidates: Vec<RootCandidate>,
    pub probe: ProbeOutcome,
}

/// A resolved, probed storage directory. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    path: PathBuf,
    diagnostics: RootDiagnostics,
}

impl StorageRoot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn diagnostics(&self) -> &RootDiagnostics {
        &self.diagnostics
    }
}

/// Ordered fallback over candidate locations.
#[derive(Debug, Clone)]
pub struct StorageRootResolver {
    candidates: Vec<RootCandidate>,
    fallback: PathBuf,
}

impl StorageRootResolver {
    pub fn new(candidates: Vec<RootCandidate>, fallback: impl Into<PathBuf>) -> Self {
        StorageRootResolver {
            candidates,
            fallback: fallback.into(),
        }
    }

    /// Snapshot the given environment variables, in priority order.
    pub fn from_env<S: AsRef<str>>(vars: &[S], fallback: impl Into<PathBuf>) -> Self {
        let candidates = vars
            .iter()
            .map(|v| RootCandidate::from_env(v.as_ref()))
            .collect();
        Self::new(candidates, fallback)
    }

    /// [`DEFAULT_ROOT_CANDIDATES`] with [`DEFAULT_FALLBACK_ROOT`].
    pub fn from_default_env() -> Self {
        Self::from_env(DEFAULT_ROOT_CANDIDATES, DEFAULT_FALLBACK_ROOT)
    }

    pub fn candidates(&self) -> &[RootCandidate] {
        &self.candidates
    }

    /// Pick the first non-empty candidate, else the fallback. No I/O.
    pub fn select(&self) -> (PathBuf, RootSource) {
        for candidate in &self.candidates {
            if let Some(value) = candidate.selected_value() {
                return (
                    absolutize(Path::new(value)),
                    RootSource::Candidate {
                        source: candidate.source.clone(),
                    },
                );
            }
        }
        (absolutize(&self.fallback), RootSource::Fallback)
    }

    /// Select, create, and probe the storage root.
    ///
    /// Fails with [`StorageError::Unavailable`] or
    /// [`StorageError::ProbeMismatch`] if the directory cannot be used; the
    /// caller must treat that as fatal.
    pub fn resolve(&self) -> Result<StorageRoot, StorageError> {
        let (path, source) = self.select();
        probe(&path)?;
        let candidates = self
            .candidates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(
            root = %path.display(),
            source = ?source,
            %candidates,
            "storage root resolved"
        );
        Ok(StorageRoot {
            diagnostics: RootDiagnostics {
                selected: path.clone(),
                source,
                candidates: self.candidates.clone(),
                probe: ProbeOutcome::Passed,
            },
            path,
        })
    }

    /// Like [`resolve`](Self::resolve) but records a probe failure instead
    /// of returning it. Used by `relaybot doctor`.
    pub fn diagnose(&self) -> RootDiagnostics {
        let (selected, source) = self.select();
        let probe = match probe(&selected) {
            Ok(()) => ProbeOutcome::Passed,
            Err(e) => ProbeOutcome::Failed {
                error: e.to_string(),
            },
        };
        RootDiagnostics {
            selected,
            source,
            candidates: self.candidates.clone(),
            probe,
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Create the directory, then write, read back, and delete a sentinel file.
fn probe(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::unavailable(dir, e))?;

    let sentinel = dir.join(PROBE_FILE);
    let expected = format!("relaybot probe {}", std::process::id());

    fs::write(&sentinel, expected.as_bytes()).map_err(|e| StorageError::unavailable(&sentinel, e))?;
    let read_back = fs::read(&sentinel).map_err(|e| StorageError::unavailable(&sentinel, e))?;
    fs::remove_file(&sentinel).map_err(|e| StorageError::unavailable(&sentinel, e))?;

    if read_back != expected.as_bytes() {
        return Err(StorageError::ProbeMismatch { path: sentinel });
    }
    Ok(())
}
