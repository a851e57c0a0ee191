//! Log file naming, log directory discovery, and identifier providers.
//!
//! File names follow `{directory}/{identifier}.{YYYY-MM-DD-HH-MM-SS}current.csv`
//! with the timestamp fixed when the session starts.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::{LoggerError, Result};

/// `chrono` format of the session timestamp embedded in file names.
pub const SESSION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

const FILE_SUFFIX: &str = "current.csv";

/// Path of the log file for a session started at `session_start`.
pub fn log_file_name(directory: &Path, identifier: &str, session_start: NaiveDateTime) -> PathBuf {
    directory.join(format!(
        "{}.{}{}",
        sanitize_identifier(identifier),
        session_start.format(SESSION_TIMESTAMP_FORMAT),
        FILE_SUFFIX
    ))
}

/// Make an identifier safe to use as a single path component.
fn sanitize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    trimmed
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

pub fn require_directory(dir: &Path) -> Result<PathBuf> {
    if dir.is_dir() {
        Ok(dir.to_path_buf())
    } else {
        Err(LoggerError::Configuration(format!(
            "log directory does not exist: {}",
            dir.display()
        )))
    }
}

/// First existing directory among `candidates`.
pub fn discover_log_directory(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if candidate.is_dir() {
            debug!(dir = %candidate.display(), "using removable storage");
            return Ok(candidate.clone());
        }
        debug!(dir = %candidate.display(), "mount point not present");
    }
    Err(LoggerError::Configuration(
        "no removable storage found".to_string(),
    ))
}

/// Supplies the host or robot identifier that prefixes log file names.
pub trait IdentifierProvider: Send + Sync {
    fn identifier(&self) -> Result<String>;
}

impl<F> IdentifierProvider for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn identifier(&self) -> Result<String> {
        self()
    }
}

/// Always returns the same identifier.
#[derive(Debug, Clone)]
pub struct FixedIdentifier(String);

impl FixedIdentifier {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }
}

impl IdentifierProvider for FixedIdentifier {
    fn identifier(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Resolves the identifier from the system host name, which on a robot
/// controller carries the team number.
#[derive(Debug, Clone, Default)]
pub struct HostnameIdentifier;

impl IdentifierProvider for HostnameIdentifier {
    fn identifier(&self) -> Result<String> {
        let output = Command::new("hostname")
            .output()
            .map_err(|e| LoggerError::Identifier(format!("failed to run hostname: {e}")))?;
        if !output.status.success() {
            return Err(LoggerError::Identifier(format!(
                "hostname exited with {}",
                output.status
            )));
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            return Err(LoggerError::Identifier("hostname is empty".to_string()));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn names_file_from_identifier_and_session_start() {
        let path = log_file_name(Path::new("/tmp/logs"), "robot1", at(2024, 1, 1, 0, 0, 0));
        assert_eq!(
            path,
            PathBuf::from("/tmp/logs/robot1.2024-01-01-00-00-00current.csv")
        );
    }

    #[test]
    fn timestamp_fields_are_zero_padded() {
        let path = log_file_name(Path::new("/U"), "roborio-997-frc", at(2017, 3, 4, 5, 6, 7));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "roborio-997-frc.2017-03-04-05-06-07current.csv"
        );
    }

    #[test]
    fn identifier_cannot_escape_directory() {
        let path = log_file_name(Path::new("/logs"), "../etc/x", at(2024, 1, 1, 0, 0, 0));
        assert_eq!(path.parent(), Some(Path::new("/logs")));
        assert!(path.to_str().unwrap().contains(".._etc_x."));
    }

    #[test]
    fn empty_identifier_becomes_unknown() {
        let path = log_file_name(Path::new("/logs"), "  ", at(2024, 1, 1, 0, 0, 0));
        assert_eq!(
            path,
            PathBuf::from("/logs/unknown.2024-01-01-00-00-00current.csv")
        );
    }

    #[test]
    fn discovery_fails_without_storage() {
        let tmp = TempDir::new().unwrap();
        let candidates = vec![tmp.path().join("U"), tmp.path().join("V")];
        let err = discover_log_directory(&candidates).unwrap_err();
        assert!(matches!(err, LoggerError::Configuration(_)));
    }

    #[test]
    fn discovery_prefers_primary_mount() {
        let tmp = TempDir::new().unwrap();
        let primary = tmp.path().join("U");
        let secondary = tmp.path().join("V");
        std::fs::create_dir(&primary).unwrap();
        std::fs::create_dir(&secondary).unwrap();
        let found = discover_log_directory(&[primary.clone(), secondary]).unwrap();
        assert_eq!(found, primary);
    }

    #[test]
    fn closures_provide_identifiers() {
        let provider = || -> Result<String> { Ok("bench".to_string()) };
        assert_eq!(provider.identifier().unwrap(), "bench");
        assert_eq!(FixedIdentifier::new("robot1").identifier().unwrap(), "robot1");
    }
}
