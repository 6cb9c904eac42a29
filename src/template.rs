//! Loads and compiles page templates. Templates use Go template syntax
//! ([`gtmpl`]).
//!
//! Partials are registered into a [`PartialRegistry`] which is then sealed
//! into [`Partials`]; only [`Partials`] can compile page templates, so every
//! partial is registered before any template that might use it is compiled.
//! Each partial becomes a `{{define "name"}}` block prepended to every page
//! template, making it available as `{{template "name" .}}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use gtmpl::{Context, Template};
use gtmpl_value::Value;
use tracing::debug;

/// Partials being collected. Registering a name twice keeps the last source.
#[derive(Debug, Default)]
pub struct PartialRegistry {
    partials: BTreeMap<String, String>,
}

impl PartialRegistry {
    pub fn new() -> PartialRegistry {
        PartialRegistry::default()
    }

    pub fn register(&mut self, name: &str, source: String) {
        self.partials.insert(name.to_owned(), source);
    }

    /// Loads every file in `dir` as a partial named after the file name up
    /// to its first `.` (`head.html.tmpl` registers `head`). Files are read
    /// concurrently and registered in file-name order.
    pub async fn load_dir(dir: &Path) -> Result<PartialRegistry> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|err| Error::Read {
            path: dir.to_owned(),
            err,
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|err| Error::Read {
            path: dir.to_owned(),
            err,
        })? {
            let path = entry.path();
            let metadata = tokio::fs::metadata(&path).await.map_err(|err| Error::Read {
                path: path.clone(),
                err,
            })?;
            if metadata.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let sources = try_join_all(paths.iter().map(|path| read(path))).await?;
        let mut registry = PartialRegistry::new();
        for (path, source) in paths.iter().zip(sources) {
            let name = partial_name(path)?;
            debug!(name, "registered partial");
            registry.register(name, source);
        }
        Ok(registry)
    }

    /// Freezes the registry.
    pub fn seal(self) -> Partials {
        let mut defines = String::new();
        for (name, source) in &self.partials {
            defines.push_str(&format!("{{{{define \"{}\"}}}}{}{{{{end}}}}", name, source));
        }
        Partials { defines }
    }
}

fn partial_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::PartialName(path.to_owned()))
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|err| Error::Read {
        path: path.to_owned(),
        err,
    })
}

/// The sealed set of partials. Read-only; compiles page templates.
#[derive(Clone, Debug, Default)]
pub struct Partials {
    defines: String,
}

impl Partials {
    /// Compiles `source` with every partial and the date helpers available.
    pub fn compile(&self, source: &str) -> Result<CompiledTemplate> {
        let mut template = Template::default();
        template.add_func("humanDate", human_date_func);
        template.add_func("isoDate", iso_date_func);
        template
            .parse(&format!("{}{}", self.defines, source))
            .map_err(Error::Parse)?;
        Ok(CompiledTemplate { template })
    }

    /// Reads and compiles the template at `path`.
    pub async fn load(&self, path: &Path) -> Result<CompiledTemplate> {
        let source = read(path).await?;
        self.compile(&source).map_err(|err| Error::Annotated(path.to_owned(), Box::new(err)))
    }
}

/// A compiled page template.
pub struct CompiledTemplate {
    template: Template,
}

impl CompiledTemplate {
    /// Renders the template with `context` as `.`.
    pub fn render(&self, context: Value) -> Result<String> {
        let context = Context::from(context).map_err(Error::Context)?;
        let mut out: Vec<u8> = Vec::new();
        self.template.execute(&mut out, &context).map_err(Error::Execute)?;
        Ok(String::from_utf8(out)?)
    }
}

/// Every page template a site needs.
pub struct Templates {
    pub index: CompiledTemplate,
    pub tag: CompiledTemplate,
    pub about: CompiledTemplate,
    pub blog: CompiledTemplate,
    pub webmention: CompiledTemplate,
    pub atom: CompiledTemplate,
    pub sitemap: CompiledTemplate,
}

impl Templates {
    /// Registers the partials in `{dir}/partials`, then compiles the page
    /// templates in `dir` concurrently.
    pub async fn load(dir: &Path) -> Result<Templates> {
        let partials = PartialRegistry::load_dir(&dir.join("partials")).await?.seal();
        let load = |name: &str| {
            let path = dir.join(format!("{}.tmpl", name));
            let partials = &partials;
            async move { partials.load(&path).await }
        };

        let (index, tag, about, blog, webmention, atom, sitemap) = tokio::try_join!(
            load("index.html"),
            load("tag.html"),
            load("about.html"),
            load("blog.html"),
            load("webmention.html"),
            load("atom.xml"),
            load("sitemap.txt"),
        )?;
        Ok(Templates {
            index,
            tag,
            about,
            blog,
            webmention,
            atom,
            sitemap,
        })
    }
}

/// Formats a date for people, e.g. `Wed Jan 01 2020`.
pub fn human_date(date: &DateTime<Utc>) -> String {
    date.format("%a %b %d %Y").to_string()
}

/// Formats a date as RFC 3339 with whole seconds, e.g.
/// `2020-01-01T00:00:00Z`.
pub fn iso_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn date_arg(args: &[Value]) -> std::result::Result<DateTime<Utc>, String> {
    match args {
        [Value::String(date)] => DateTime::parse_from_rfc3339(date)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|err| format!("invalid date `{}`: {}", date, err)),
        _ => Err(String::from("expected a single date argument")),
    }
}

fn human_date_func(args: &[Value]) -> std::result::Result<Value, String> {
    Ok(Value::String(human_date(&date_arg(args)?)))
}

fn iso_date_func(args: &[Value]) -> std::result::Result<Value, String> {
    Ok(Value::String(iso_date(&date_arg(args)?)))
}

/// The result of a fallible template operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading, compiling or rendering templates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a template or partial file can't be read.
    #[error("reading template '{}': {err}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a partial's file name doesn't yield a name.
    #[error("can't name partial '{}'", .0.display())]
    PartialName(PathBuf),

    /// Returned for template syntax errors.
    #[error("parsing template: {0}")]
    Parse(String),

    /// Returned when a value can't be used as a template context.
    #[error("building template context: {0}")]
    Context(String),

    /// Returned for errors while executing a template.
    #[error("executing template: {0}")]
    Execute(String),

    /// Returned when a template produces invalid UTF-8.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),

    /// An error with the path of the template it concerns.
    #[error("{}: {}", .0.display(), .1)]
    Annotated(PathBuf, #[source] Box<Error>),
}
