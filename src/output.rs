//! The output directory. An [`OutputRoot`] only exists once its directory
//! has been created, and it's the only way to write into that directory, so
//! writes can't be ordered before creation.

use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tracing::debug;
use walkdir::WalkDir;

/// Subdirectories every build writes into.
const SUBDIRECTORIES: &[&str] = &["blog", "tags"];

/// A freshly created output directory.
#[derive(Debug)]
pub struct OutputRoot {
    root: PathBuf,
}

impl OutputRoot {
    /// Creates `root` and its standard subdirectories. Refuses to reuse an
    /// existing directory so that stale artifacts can't leak into a build.
    pub async fn create(root: &Path) -> Result<OutputRoot> {
        tokio::fs::create_dir(root).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(root.to_owned()),
            _ => Error::Create {
                path: root.to_owned(),
                err,
            },
        })?;
        let output = OutputRoot {
            root: root.to_owned(),
        };
        try_join_all(SUBDIRECTORIES.iter().map(|dir| output.create_dir(dir))).await?;
        Ok(output)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates a directory (and any missing parents) below the root.
    pub async fn create_dir(&self, relative: impl AsRef<Path>) -> Result<()> {
        let path = self.root.join(relative);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|err| Error::Create { path, err })
    }

    /// Writes `contents` to `relative` below the root. The parent directory
    /// must already exist.
    pub async fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.root.join(relative);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|err| Error::Write { path: path.clone(), err })?;
        debug!(path = %path.display(), "wrote artifact");
        Ok(())
    }

    /// Copies the tree under `source` into `relative` below the root,
    /// returning the number of files copied. The tree is walked on the
    /// blocking pool; directories are created first and files are then
    /// copied concurrently.
    pub async fn copy_tree(&self, source: &Path, relative: impl AsRef<Path>) -> Result<usize> {
        let (directories, files) = {
            let source = source.to_owned();
            let destination = self.root.join(relative);
            tokio::task::spawn_blocking(move || walk(&source, &destination))
                .await
                .map_err(|err| Error::Join(err.to_string()))??
        };

        // Parents precede children in walk order.
        for directory in directories {
            tokio::fs::create_dir_all(&directory)
                .await
                .map_err(|err| Error::Create {
                    path: directory.clone(),
                    err,
                })?;
        }

        try_join_all(files.iter().map(|(from, to)| async move {
            tokio::fs::copy(from, to).await.map_err(|err| Error::Copy {
                from: from.clone(),
                to: to.clone(),
                err,
            })
        }))
        .await?;
        Ok(files.len())
    }
}

/// Directories to create and `(from, to)` file pairs for copying `source`
/// onto `destination`. Blocks.
fn walk(source: &Path, destination: &Path) -> Result<(Vec<PathBuf>, Vec<(PathBuf, PathBuf)>)> {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    for result in WalkDir::new(source).sort_by_file_name() {
        let entry = result?;
        // `entry` is always below `source`.
        let target = match entry.path().strip_prefix(source) {
            Ok(suffix) => destination.join(suffix),
            Err(_) => continue,
        };
        if entry.file_type().is_dir() {
            directories.push(target);
        } else {
            files.push((entry.into_path(), target));
        }
    }
    Ok((directories, files))
}

/// The result of a fallible output operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing the output directory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the output root exists before the build starts.
    #[error("output directory '{}' already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Returned when a directory can't be created.
    #[error("creating directory '{}': {err}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a file can't be written.
    #[error("writing '{}': {err}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a static file can't be copied.
    #[error("copying '{}' to '{}': {err}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a source tree can't be walked.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    /// Returned when the task walking a source tree dies.
    #[error("walking task failed: {0}")]
    Join(String),
}
