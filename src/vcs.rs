//! Asks source control when the posts last changed. The answer becomes the
//! feed's `updated` value.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

/// Reports when anything under a path last changed.
pub trait LastChange {
    fn last_change(&self, path: &Path) -> impl Future<Output = Result<DateTime<Utc>>>;
}

/// A [`LastChange`] backed by `git log`, run from `repository`.
#[derive(Clone, Debug)]
pub struct GitLog {
    pub repository: PathBuf,
}

impl LastChange for GitLog {
    async fn last_change(&self, path: &Path) -> Result<DateTime<Utc>> {
        let output = tokio::process::Command::new("git")
            .args(["log", "-1", "--format=%ct", "--"])
            .arg(path)
            .current_dir(&self.repository)
            .output()
            .await
            .map_err(Error::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(Error::Git(stderr.trim().to_owned()));
        }
        parse_timestamp(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses `git log --format=%ct` output (Unix seconds).
pub fn parse_timestamp(stdout: &str) -> Result<DateTime<Utc>> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Err(Error::NoCommits);
    }
    stdout
        .parse::<i64>()
        .ok()
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .ok_or_else(|| Error::Timestamp(stdout.to_owned()))
}

/// The result of a fallible source-control query.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to learn when the posts last changed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when `git` can't be run at all.
    #[error("running git: {0}")]
    Spawn(#[source] std::io::Error),

    /// Returned when `git` complains.
    #[error("git log failed: {0}")]
    Git(String),

    /// Returned when nothing under the path has ever been committed.
    #[error("no commits touch the posts directory")]
    NoCommits,

    /// Returned when `git` prints something that isn't a timestamp.
    #[error("unexpected git timestamp `{0}`")]
    Timestamp(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_timestamp() -> Result<()> {
        assert_eq!(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            parse_timestamp("1577836800\n")?
        );
        Ok(())
    }

    #[test]
    fn test_parse_timestamp_errors() {
        assert!(matches!(parse_timestamp("\n"), Err(Error::NoCommits)));
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitLog {
            repository: dir.path().to_owned(),
        };
        assert!(git.last_change(Path::new("posts")).await.is_err());
    }
}
