//! Defines the [`RenderedDocument`], [`Digester`], and [`Error`] types: the
//! logic for turning post source files (YAML front matter followed by a
//! markdown body) into rendered documents ready for templating.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::markdown::{self, Renderer};
use crate::math::MathRenderer;

/// The front matter of a post.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Attributes {
    /// The title of the post, as written.
    pub title: String,

    /// The publication date and time. Optional here so that a missing value
    /// is reported as a date problem rather than a YAML one.
    #[serde(default)]
    pub datetime: Option<String>,

    /// The tags associated with the post, in the order written. An absent or
    /// null list means no tags.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,

    /// Any other attributes, passed through to templates untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A post after digesting: the front matter plus everything derived from it.
#[derive(Clone, Debug)]
pub struct RenderedDocument {
    /// URL-safe identifier derived from the title. Not guaranteed unique:
    /// two posts with the same title get the same slug.
    pub slug: String,

    /// `{base_url}/blog/{slug}`.
    pub canonical: String,

    /// The page title, `{site_name} - {attributes.title}`.
    pub title: String,

    /// The parsed `datetime` attribute.
    pub date: DateTime<Utc>,

    /// The rendered body.
    pub content: String,

    /// The first paragraph of `content`, see [`markdown::snippet`].
    pub snippet: String,

    /// The handle of the site's author, if configured.
    pub author_handle: Option<String>,

    /// The original front matter.
    pub attributes: Attributes,
}

impl RenderedDocument {
    /// The site-relative path of the post's page.
    pub fn path(&self) -> String {
        format!("/blog/{}", self.slug)
    }
}

/// Digests post sources into [`RenderedDocument`]s.
pub struct Digester<'a, M> {
    /// Prefixed onto every page title.
    pub site_name: &'a str,

    /// The base for canonical URLs. A trailing slash is ignored.
    pub base_url: &'a str,

    /// Passed through to every document.
    pub author_handle: Option<&'a str>,

    /// Renders post bodies.
    pub renderer: &'a Renderer<M>,
}

const MARKDOWN_EXTENSION: &str = "md";

impl<M: MathRenderer> Digester<'_, M> {
    /// Digests a single post source. The body is rendered before the snippet
    /// is taken from it.
    pub async fn digest(&self, source: &str) -> Result<RenderedDocument> {
        let (front_matter, body) = split_front_matter(source)?;
        let attributes: Attributes = serde_yaml::from_str(front_matter)?;
        let date = match &attributes.datetime {
            None => return Err(Error::MissingDate),
            Some(datetime) => parse_datetime(datetime)?,
        };

        let slug = slug::slugify(&attributes.title);
        let content = self.renderer.render(body).await?;
        let snippet = markdown::snippet(&content)?;

        Ok(RenderedDocument {
            canonical: format!("{}/blog/{}", self.base_url.trim_end_matches('/'), slug),
            title: format!("{} - {}", self.site_name, attributes.title),
            slug,
            date,
            content,
            snippet,
            author_handle: self.author_handle.map(str::to_owned),
            attributes,
        })
    }

    /// Reads and digests the post at `path`. Errors are annotated with the
    /// path.
    pub async fn load(&self, path: &Path) -> Result<RenderedDocument> {
        let annotate = |err| Error::Annotated(path.to_owned(), Box::new(err));
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| annotate(Error::Io(err)))?;
        let document = self.digest(&source).await.map_err(annotate)?;
        debug!(path = %path.display(), slug = %document.slug, "digested post");
        Ok(document)
    }

    /// Reads and digests every `.md` file directly inside `dir`, all
    /// concurrently. The result is in file-name order so later stable sorts
    /// are reproducible. The first failure aborts the whole load.
    pub async fn load_all(&self, dir: &Path) -> Result<Vec<RenderedDocument>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| Error::Annotated(dir.to_owned(), Box::new(Error::Io(err))))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| Error::Annotated(dir.to_owned(), Box::new(Error::Io(err))))?
        {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(MARKDOWN_EXTENSION) => paths.push(path),
                _ => warn!(path = %path.display(), "skipping non-markdown file"),
            }
        }
        paths.sort();

        try_join_all(paths.iter().map(|path| self.load(path))).await
    }
}

/// Splits a source into its front matter and body. The front matter must
/// open with a `---` line and close with a `---` (or `...`) line.
pub fn split_front_matter(source: &str) -> Result<(&str, &str)> {
    const FENCE: &str = "---";
    let source = source.trim_start_matches('\u{feff}');

    let mut lines = source.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == FENCE => (),
        _ => return Err(Error::FrontmatterMissingStartFence),
    }

    let yaml_start = source.find('\n').map_or(source.len(), |i| i + 1);
    let mut offset = yaml_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == FENCE || trimmed == "..." {
            return Ok((&source[yaml_start..offset], &source[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(Error::FrontmatterMissingEndFence)
}

/// Parses a `datetime` attribute. Accepts RFC 3339 as well as the looser
/// forms people tend to write by hand (`2020-01-01`, `2020-01-01T10:00`,
/// `2020-01-01 10:00:00`); values without an offset are taken as UTC.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M%:z") {
        return Ok(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| Error::DateParse(input.to_owned()))
}

/// Represents the result of a digest operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error digesting a post.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a post source file is missing its starting front matter
    /// fence (`---`).
    #[error("post must begin with `---`")]
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal front matter
    /// fence (i.e., the starting fence was found but the ending one was
    /// missing).
    #[error("missing closing `---`")]
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the front matter as YAML.
    #[error("parsing front matter: {0}")]
    DeserializeYaml(#[from] serde_yaml::Error),

    /// Returned when the front matter has no `datetime`.
    #[error("missing `datetime` attribute")]
    MissingDate,

    /// Returned when `datetime` isn't a recognizable date.
    #[error("unparseable `datetime` attribute `{0}`")]
    DateParse(String),

    /// Returned when the body can't be rendered.
    #[error(transparent)]
    Render(#[from] markdown::Error),

    /// Returned for I/O errors reading sources.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An error with the path of the file it concerns.
    #[error("{}: {}", .0.display(), .1)]
    Annotated(PathBuf, #[source] Box<Error>),
}

impl Error {
    /// Returns `true` for the date-related errors, looking through
    /// annotations.
    pub fn is_date_error(&self) -> bool {
        match self {
            Error::MissingDate | Error::DateParse(_) => true,
            Error::Annotated(_, err) => err.is_date_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::Classifier;
    use crate::math;
    use pretty_assertions::assert_eq;

    struct NoMath;

    impl MathRenderer for NoMath {
        async fn to_svg(&self, _: &str) -> math::Result<String> {
            Ok(String::from("<svg/>"))
        }
    }

    fn renderer() -> Renderer<NoMath> {
        Renderer::new(Classifier::new("https://example.org/").unwrap(), NoMath)
    }

    fn digester(renderer: &Renderer<NoMath>) -> Digester<'_, NoMath> {
        Digester {
            site_name: "Example",
            base_url: "https://example.org/",
            author_handle: Some("@someone@example.org"),
            renderer,
        }
    }

    const POST: &str = "---
title: Hello, World!
datetime: 2020-03-01T12:30:00Z
tags:
  - greeting
  - meta
draft: false
---
Hi there, [friend](https://example.com/).

More.
";

    #[tokio::test]
    async fn test_digest() -> Result<()> {
        let renderer = renderer();
        let document = digester(&renderer).digest(POST).await?;

        assert_eq!("hello-world", document.slug);
        assert_eq!("https://example.org/blog/hello-world", document.canonical);
        assert_eq!("Example - Hello, World!", document.title);
        assert_eq!(Utc.with_ymd_and_hms(2020, 3, 1, 12, 30, 0).unwrap(), document.date);
        assert_eq!(vec!["greeting", "meta"], document.attributes.tags);
        assert_eq!(
            Some(&serde_yaml::Value::Bool(false)),
            document.attributes.extra.get("draft")
        );
        assert_eq!(
            r#"<p class="quote">Hi there, <a href="https://example.com/" target="_blank" rel="noopener">friend</a>.</p>"#,
            document.snippet
        );
        assert!(document.content.ends_with("<p>More.</p>"));
        assert_eq!("/blog/hello-world", document.path());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_titles_share_a_slug() -> Result<()> {
        let renderer = renderer();
        let digester = digester(&renderer);
        let a = digester.digest("---\ntitle: Same\ndatetime: 2020-01-01\n---\nOne\n").await?;
        let b = digester.digest("---\ntitle: Same\ndatetime: 2021-01-01\n---\nTwo\n").await?;
        assert_eq!(a.slug, b.slug);
        Ok(())
    }

    #[tokio::test]
    async fn test_null_tags_mean_no_tags() -> Result<()> {
        let renderer = renderer();
        let digester = digester(&renderer);
        for tags in ["tags: ~", "tags: null", "tags:"] {
            let source = format!("---\ntitle: Untagged\ndatetime: 2020-01-01\n{}\n---\nBody.\n", tags);
            let document = digester.digest(&source).await?;
            assert!(document.attributes.tags.is_empty(), "{}", tags);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_datetime() {
        let renderer = renderer();
        let err = digester(&renderer)
            .digest("---\ntitle: Undated\n---\nBody\n")
            .await
            .unwrap_err();
        assert!(err.is_date_error());
    }

    #[tokio::test]
    async fn test_bad_datetime() {
        let renderer = renderer();
        let err = digester(&renderer)
            .digest("---\ntitle: Bad\ndatetime: next tuesday\n---\nBody\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DateParse(_)));
    }

    #[tokio::test]
    async fn test_body_without_paragraph() {
        let renderer = renderer();
        let err = digester(&renderer)
            .digest("---\ntitle: Heading\ndatetime: 2020-01-01\n---\n# Only a heading\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render(markdown::Error::NoParagraph)));
    }

    #[test]
    fn test_split_front_matter() -> Result<()> {
        assert_eq!(
            ("title: x\n", "body\n---\nmore\n"),
            split_front_matter("---\ntitle: x\n---\nbody\n---\nmore\n")?
        );
        Ok(())
    }

    #[test]
    fn test_split_front_matter_errors() {
        assert!(matches!(
            split_front_matter("title: x\n---\nbody"),
            Err(Error::FrontmatterMissingStartFence)
        ));
        assert!(matches!(
            split_front_matter("---\ntitle: x\nbody"),
            Err(Error::FrontmatterMissingEndFence)
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        let renderer = renderer();
        let result = futures::executor::block_on(
            digester(&renderer).digest("---\ntitle: [unclosed\n---\nbody\n"),
        );
        assert!(matches!(result, Err(Error::DeserializeYaml(_))));
    }

    #[test]
    fn test_parse_datetime() -> Result<()> {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(expected, parse_datetime("2020-01-01T09:00:00Z")?);
        assert_eq!(expected, parse_datetime("2020-01-01T10:00:00+01:00")?);
        assert_eq!(expected, parse_datetime("2020-01-01T10:00+01:00")?);
        assert_eq!(expected, parse_datetime("2020-01-01T09:00")?);
        assert_eq!(expected, parse_datetime("2020-01-01 09:00:00")?);
        assert_eq!(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            parse_datetime("2020-01-01")?
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_load_all_skips_other_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.md"), "---\ntitle: B\ndatetime: 2020-01-02\n---\nb\n")?;
        std::fs::write(dir.path().join("a.md"), "---\ntitle: A\ndatetime: 2020-01-01\n---\na\n")?;
        std::fs::write(dir.path().join("notes.txt"), "not a post")?;

        let renderer = renderer();
        let documents = digester(&renderer).load_all(dir.path()).await?;
        let slugs: Vec<&str> = documents.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(vec!["a", "b"], slugs);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_annotates_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.md");
        std::fs::write(&path, "no front matter").unwrap();

        let renderer = renderer();
        let err = digester(&renderer).load(&path).await.unwrap_err();
        assert!(err.to_string().contains("broken.md"));
    }
}
