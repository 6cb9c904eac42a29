//! Compiles the stylesheet and names it by content hash for cache-busting.
//!
//! The entry stylesheet is bundled (`@import`s inlined), vendor-prefixed for
//! [`targets`] and minified with `lightningcss`. The result's hash goes into
//! its file name, so identical sources always produce the same path and a
//! changed source always produces a new one.

use std::path::{Path, PathBuf};

use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Targets};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::output::{self, OutputRoot};

/// The number of digest bytes kept in the hash (128 bits).
const HASH_BYTES: usize = 16;

/// A compiled stylesheet. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledAsset {
    /// Hex-encoded hash of the compiled bytes.
    pub content_hash: String,

    /// The file name below the output root, `main-{hash}.css`.
    pub file_name: String,

    /// The site-relative URL, `/main-{hash}.css`.
    pub public_path: String,
}

impl CompiledAsset {
    /// Names compiled CSS by its hash.
    pub fn from_css(css: &str) -> CompiledAsset {
        let content_hash = content_hash(css.as_bytes());
        let file_name = format!("main-{}.css", content_hash);
        CompiledAsset {
            public_path: format!("/{}", file_name),
            file_name,
            content_hash,
        }
    }
}

/// Hex-encoded, truncated SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..HASH_BYTES])
}

/// The browsers prefixes and syntax lowering are generated for.
pub fn targets() -> Targets {
    Targets::from(Browsers {
        chrome: Some(95 << 16),
        edge: Some(95 << 16),
        firefox: Some(91 << 16),
        safari: Some(14 << 16),
        ios_saf: Some(14 << 16),
        ..Browsers::default()
    })
}

/// Bundles, prefixes and minifies the stylesheet at `entry`.
pub fn compile_css(entry: &Path) -> Result<String> {
    let fs = FileProvider::new();
    let mut bundler = Bundler::new(&fs, None, ParserOptions::default());
    let mut stylesheet = bundler.bundle(entry).map_err(|err| Error::Bundle {
        entry: entry.to_owned(),
        message: err.to_string(),
    })?;

    stylesheet
        .minify(MinifyOptions {
            targets: targets(),
            ..MinifyOptions::default()
        })
        .map_err(|err| Error::Minify(err.to_string()))?;

    let css = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets: targets(),
            ..PrinterOptions::default()
        })
        .map_err(|err| Error::Print(err.to_string()))?;
    Ok(css.code)
}

/// Compiles the stylesheet at `entry` and writes it into `output` under its
/// hashed name.
pub async fn compile(entry: &Path, output: &OutputRoot) -> Result<CompiledAsset> {
    let owned = entry.to_owned();
    let css = tokio::task::spawn_blocking(move || compile_css(&owned))
        .await
        .map_err(|err| Error::Join(err.to_string()))??;

    let asset = CompiledAsset::from_css(&css);
    output.write(&asset.file_name, css).await?;
    info!(path = %asset.public_path, "compiled stylesheet");
    Ok(asset)
}

/// The result of a fallible stylesheet operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure anywhere in the stylesheet pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the entry or one of its imports can't be read or parsed.
    #[error("bundling '{}': {message}", entry.display())]
    Bundle { entry: PathBuf, message: String },

    /// Returned when minification fails.
    #[error("minifying stylesheet: {0}")]
    Minify(String),

    /// Returned when the stylesheet can't be serialized.
    #[error("printing stylesheet: {0}")]
    Print(String),

    /// Returned when the compile task dies.
    #[error("stylesheet task failed: {0}")]
    Join(String),

    /// Returned when the compiled stylesheet can't be written.
    #[error(transparent)]
    Write(#[from] output::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_sources(dir: &Path) -> PathBuf {
        std::fs::write(dir.join("colors.css"), ".a {\n  color: #ff0000;\n}\n").unwrap();
        let entry = dir.join("entry.css");
        std::fs::write(
            &entry,
            "@import \"colors.css\";\n\nbody {\n  margin: 0;\n  user-select: none;\n}\n",
        )
        .unwrap();
        entry
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash(b"body{margin:0}");
        assert_eq!(32, hash.len());
        assert_eq!(hash, content_hash(b"body{margin:0}"));
        assert_ne!(hash, content_hash(b"body{margin:1px}"));
    }

    #[test]
    fn test_from_css() {
        let asset = CompiledAsset::from_css("a{color:red}");
        assert_eq!(format!("main-{}.css", asset.content_hash), asset.file_name);
        assert_eq!(format!("/main-{}.css", asset.content_hash), asset.public_path);
    }

    #[test]
    fn test_compile_css_inlines_imports() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let css = compile_css(&write_sources(dir.path()))?;
        assert!(!css.contains("@import"));
        assert!(css.contains(".a{color:red}"));
        assert!(css.contains("-webkit-user-select:none"));
        Ok(())
    }

    #[test]
    fn test_compile_css_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            compile_css(&dir.path().join("missing.css")),
            Err(Error::Bundle { .. })
        ));
    }

    #[tokio::test]
    async fn test_compile_is_idempotent() -> Result<()> {
        let sources = tempfile::tempdir().unwrap();
        let entry = write_sources(sources.path());

        let out = tempfile::tempdir().unwrap();
        let first = compile(&entry, &OutputRoot::create(&out.path().join("a")).await?).await?;
        let second = compile(&entry, &OutputRoot::create(&out.path().join("b")).await?).await?;
        assert_eq!(first, second);

        let written = std::fs::read_to_string(out.path().join("a").join(&first.file_name)).unwrap();
        assert_eq!(first.content_hash, content_hash(written.as_bytes()));
        Ok(())
    }
}
