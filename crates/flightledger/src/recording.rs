//! Live recordings of flights still in the air.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

fn plane_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid plane id pattern"))
}

/// Check that a plane id is safe to use as a file name.
///
/// # Errors
///
/// Returns [`Error::InvalidPlaneId`] otherwise.
pub fn validate_plane_id(plane_id: &str) -> Result<()> {
    if plane_id_pattern().is_match(plane_id) {
        Ok(())
    } else {
        Err(Error::InvalidPlaneId(plane_id.to_string()))
    }
}

/// Directory of in-progress recordings, one JSON-lines file per plane.
#[derive(Debug, Clone)]
pub struct LiveCache {
    dir: PathBuf,
}

impl LiveCache {
    /// Use `dir` for live recordings. The directory must already exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the live recording for `plane_id` lives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlaneId`] if the id is not a safe file name.
    pub fn path_for(&self, plane_id: &str) -> Result<PathBuf> {
        validate_plane_id(plane_id)?;
        Ok(self.dir.join(format!("{plane_id}.jsonl")))
    }

    /// Append one telemetry point to the plane's recording and flush it to
    /// disk.
    ///
    /// Object payloads get a `server_ts` field with the receive time; other
    /// payloads are wrapped as `{"data": ..., "server_ts": ...}`. Returns the
    /// stamped payload as written and whether this started a new recording.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlaneId`] or an I/O error.
    pub fn append(&self, plane_id: &str, telemetry: &Value) -> Result<(Value, bool)> {
        let path = self.path_for(plane_id)?;
        let is_new = !path.exists();

        let server_ts = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        let stamped = match telemetry {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert("server_ts".to_string(), server_ts);
                Value::Object(map)
            }
            other => serde_json::json!({ "data": other, "server_ts": server_ts }),
        };

        let mut line = serde_json::to_string(&stamped)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        trace!("Recorded {} bytes for {plane_id}", line.len());
        Ok((stamped, is_new))
    }
}
