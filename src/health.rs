use crate::db::Database;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogDirStatus {
    Ok,
    Missing,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub integrity: String,
    pub journal_mode: Option<String>,
    pub log_dir: LogDirStatus,
    pub errors: Vec<String>,
}

/// A failed integrity check or an unwritable log directory is unhealthy; a
/// missing log directory only degrades.
pub fn check(db: &Database, log_dir: &Path) -> HealthReport {
    let mut errors = Vec::new();
    let pragmas = db.read(|conn| {
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok((integrity, journal_mode))
    });
    let (integrity, journal_mode) = match pragmas {
        Ok((integrity, journal_mode)) => (integrity, Some(journal_mode)),
        Err(error) => {
            errors.push(error.to_string());
            ("error".to_string(), None)
        }
    };

    let log_dir = match fs::metadata(log_dir) {
        Ok(metadata) if metadata.permissions().readonly() => LogDirStatus::ReadOnly,
        Ok(_) => LogDirStatus::Ok,
        Err(_) => LogDirStatus::Missing,
    };

    let status = if integrity != "ok" || log_dir == LogDirStatus::ReadOnly {
        HealthStatus::Unhealthy
    } else if log_dir == LogDirStatus::Missing || journal_mode.as_deref() != Some("wal") {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        integrity,
        journal_mode,
        log_dir,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::{check, HealthStatus, LogDirStatus};
    use crate::db::Database;

    #[test]
    fn fresh_database_is_healthy_once_logs_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let logs = dir.path().join("logs");

        let report = check(&db, &logs);
        assert_eq!(report.log_dir, LogDirStatus::Missing);
        assert_eq!(report.status, HealthStatus::Degraded);

        std::fs::create_dir_all(&logs).expect("logs");
        let report = check(&db, &logs);
        assert_eq!(report.integrity, "ok");
        assert_eq!(report.journal_mode.as_deref(), Some("wal"));
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
