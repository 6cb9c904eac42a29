use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The name of the project file searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "folio.yaml";

fn default_math_program() -> PathBuf {
    PathBuf::from("tex2svg")
}

fn default_math_language() -> String {
    String::from(crate::markdown::DEFAULT_MATH_LANGUAGE)
}

#[derive(Deserialize)]
struct Project {
    site_name: String,

    #[serde(default)]
    base_url: Option<String>,

    #[serde(default)]
    author_handle: Option<String>,

    #[serde(default = "default_math_program")]
    math_program: PathBuf,

    #[serde(default = "default_math_language")]
    math_language: String,
}

/// Selects dev-only template markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// `development` selects [`Mode::Development`]; anything else, including
    /// nothing, selects [`Mode::Production`].
    pub fn from_env_value(value: Option<&str>) -> Mode {
        match value {
            Some("development") => Mode::Development,
            _ => Mode::Production,
        }
    }

    pub fn is_dev(self) -> bool {
        self == Mode::Development
    }
}

/// How the stylesheet gets into the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CssMode {
    /// Compile `css/entry.css` into `main-{hash}.css`.
    Compile,

    /// Copy `css/` verbatim and link `/css/entry.css`.
    Static,
}

/// The public path used in [`CssMode::Static`].
pub const STATIC_CSS_PATH: &str = "/css/entry.css";

pub struct Config {
    pub site_name: String,
    pub base_url: Option<String>,
    pub author_handle: Option<String>,
    pub math_program: PathBuf,
    pub math_language: String,
    pub project_root: PathBuf,
    pub posts_directory: PathBuf,
    pub templates_directory: PathBuf,
    pub css_directory: PathBuf,
    pub css_entry: PathBuf,
    pub static_directory: PathBuf,
    pub output_directory: PathBuf,
    pub mode: Mode,
    pub css: CssMode,
}

impl Config {
    /// Looks for [`PROJECT_FILE`] in `dir` and then each of its parents.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path)
                .with_context(|| format!("Loading configuration from `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    /// Loads the project file at `path`. Source and output directories are
    /// laid out relative to the file's directory.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Opening project file `{}`", path.display()))?;
        let project: Project = serde_yaml::from_reader(file)?;
        let project_root = match path.parent() {
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{:?}'",
                    path
                ))
            }
            Some(root) if root.as_os_str().is_empty() => PathBuf::from("."),
            Some(root) => root.to_owned(),
        };

        let css_directory = project_root.join("css");
        Ok(Config {
            site_name: project.site_name,
            base_url: project.base_url,
            author_handle: project.author_handle,
            math_program: project.math_program,
            math_language: project.math_language,
            posts_directory: project_root.join("posts"),
            templates_directory: project_root.join("templates"),
            css_entry: css_directory.join("entry.css"),
            css_directory,
            static_directory: project_root.join("static"),
            output_directory: project_root.join("public"),
            project_root,
            mode: Mode::Production,
            css: CssMode::Compile,
        })
    }

    /// The base URL to build with: `cli` if given, else the project file's.
    pub fn resolve_base_url(&self, cli: Option<String>) -> Result<String> {
        cli.or_else(|| self.base_url.clone()).ok_or_else(|| {
            anyhow!(
                "No base URL: pass one on the command line or set `base_url` in `{}`",
                PROJECT_FILE
            )
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_directory_searches_parents() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(PROJECT_FILE),
            "site_name: Example\nbase_url: https://example.org/\n",
        )?;
        let nested = dir.path().join("posts").join("drafts");
        std::fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested)?;
        assert_eq!("Example", config.site_name);
        assert_eq!(dir.path().join("posts"), config.posts_directory);
        assert_eq!(dir.path().join("css").join("entry.css"), config.css_entry);
        assert_eq!(PathBuf::from("tex2svg"), config.math_program);
        assert_eq!("mathematics", config.math_language);
        assert_eq!(Mode::Production, config.mode);
        Ok(())
    }

    #[test]
    fn test_resolve_base_url() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        std::fs::write(&path, "site_name: Example\n")?;
        let config = Config::from_project_file(&path)?;

        assert!(config.resolve_base_url(None).is_err());
        assert_eq!(
            "https://cli.example/",
            config.resolve_base_url(Some("https://cli.example/".into()))?
        );
        Ok(())
    }

    #[test]
    fn test_mode() {
        assert!(Mode::from_env_value(Some("development")).is_dev());
        assert!(!Mode::from_env_value(Some("production")).is_dev());
        assert!(!Mode::from_env_value(None).is_dev());
    }
}
