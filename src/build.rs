//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: digesting the posts
//! ([`crate::document`]), ordering them ([`crate::sequence`]) and grouping
//! them by tag ([`crate::tag`]), creating the output root
//! ([`crate::output`]), copying static files and compiling the stylesheet
//! ([`crate::asset`]), and finally rendering every page through the site's
//! templates ([`crate::template`]).
//!
//! Everything that can fail because of the site's sources (posts, templates,
//! the feed's change date) is loaded before the output root is created, so a
//! broken post leaves no output behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use gtmpl_value::Value;
use tracing::{debug, info};

use crate::asset;
use crate::config::{Config, CssMode, STATIC_CSS_PATH};
use crate::document::{self, Digester};
use crate::link::Classifier;
use crate::markdown::Renderer;
use crate::math::MathRenderer;
use crate::output::{self, OutputRoot};
use crate::sequence::{sequence, Sequence};
use crate::tag::{collate, TagIndex};
use crate::template::{self, iso_date, Templates};
use crate::value::{extend, object, optional};
use crate::vcs::{self, LastChange};

/// A rendered page waiting to be written, relative to the output root.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

/// Builds the site described by `config`, with every link and canonical URL
/// relative to `base_url`. Maths blocks are converted with `math`; the feed's
/// `updated` date comes from `clock`.
pub async fn build_site<M, C>(config: &Config, base_url: &str, math: M, clock: &C) -> Result<()>
where
    M: MathRenderer,
    C: LastChange,
{
    let classifier = Classifier::new(base_url).map_err(|err| Error::BaseUrl {
        url: base_url.to_owned(),
        err,
    })?;
    let renderer = Renderer::new(classifier, math).with_math_language(&config.math_language);
    let digester = Digester {
        site_name: &config.site_name,
        base_url,
        author_handle: config.author_handle.as_deref(),
        renderer: &renderer,
    };

    let (documents, templates, updated) = tokio::try_join!(
        async { Ok::<_, Error>(digester.load_all(&config.posts_directory).await?) },
        async { Ok::<_, Error>(Templates::load(&config.templates_directory).await?) },
        async { Ok::<_, Error>(clock.last_change(&config.posts_directory).await?) },
    )?;
    info!(posts = documents.len(), "digested posts");

    let sequence = sequence(documents);
    let tags = collate(sequence.documents());
    info!(tags = tags.len(), "collated tags");

    let output = OutputRoot::create(&config.output_directory).await?;
    let (copied, css_path) = tokio::try_join!(
        copy_static(&config.static_directory, &output),
        stylesheet(config, &output),
    )?;
    info!(files = copied, css_path = %css_path, "copied static files");

    let site = Site {
        site_name: &config.site_name,
        base_url,
        css_path: &css_path,
        dev: config.mode.is_dev(),
        updated,
    };
    let artifacts = site.render(&templates, &sequence, &tags)?;
    try_join_all(
        artifacts
            .iter()
            .map(|artifact| output.write(&artifact.path, &artifact.contents)),
    )
    .await?;

    info!(
        artifacts = artifacts.len(),
        root = %output.path().display(),
        "built site"
    );
    Ok(())
}

async fn copy_static(source: &Path, output: &OutputRoot) -> Result<usize> {
    let is_dir = tokio::fs::metadata(source)
        .await
        .is_ok_and(|metadata| metadata.is_dir());
    if !is_dir {
        debug!(path = %source.display(), "no static directory");
        return Ok(0);
    }
    Ok(output.copy_tree(source, "").await?)
}

/// Produces the stylesheet and returns the path pages link it by.
async fn stylesheet(config: &Config, output: &OutputRoot) -> Result<String> {
    match config.css {
        CssMode::Compile => Ok(asset::compile(&config.css_entry, output).await?.public_path),
        CssMode::Static => {
            output.copy_tree(&config.css_directory, "css").await?;
            Ok(String::from(STATIC_CSS_PATH))
        }
    }
}

/// The site-wide values every page is rendered with.
pub struct Site<'a> {
    pub site_name: &'a str,
    pub base_url: &'a str,
    pub css_path: &'a str,
    pub dev: bool,
    pub updated: DateTime<Utc>,
}

impl Site<'_> {
    /// Renders every page: the home, about and webmention pages, one page per
    /// post, one page per tag, the feed and the sitemap.
    pub fn render(
        &self,
        templates: &Templates,
        sequence: &Sequence,
        tags: &TagIndex<'_>,
    ) -> Result<Vec<Artifact>> {
        let posts = Value::Array(sequence.documents().map(Value::from).collect());
        let mut artifacts = Vec::with_capacity(sequence.len() + tags.len() + 5);

        for sequenced in sequence.iter() {
            let context = extend(
                Value::from(&sequenced.document),
                [
                    ("css_path", Value::String(self.css_path.to_owned())),
                    ("dev", Value::Bool(self.dev)),
                    ("prev_link", optional(sequenced.prev_link.as_deref())),
                    ("next_link", optional(sequenced.next_link.as_deref())),
                ],
            );
            let path = PathBuf::from("blog").join(format!("{}.html", sequenced.document.slug));
            artifacts.push(artifact(path, templates.blog.render(context)?));
        }

        for (tag, documents) in tags.iter() {
            let context = self.page(
                &format!("{} - Posts tagged as {}", self.site_name, tag),
                [
                    (
                        "posts",
                        Value::Array(documents.iter().map(|d| Value::from(*d)).collect()),
                    ),
                    ("tag", Value::String(tag.to_owned())),
                ],
            );
            artifacts.push(artifact(tag_path(tag)?, templates.tag.render(context)?));
        }

        let index = self.page(self.site_name, [("posts", posts.clone())]);
        artifacts.push(artifact("index.html", templates.index.render(index)?));

        let about = self.page(&format!("{} - about", self.site_name), []);
        artifacts.push(artifact("about.html", templates.about.render(about)?));

        let webmention = self.page(&format!("{} - webmention", self.site_name), []);
        artifacts.push(artifact(
            "webmention.html",
            templates.webmention.render(webmention)?,
        ));

        let atom = object([
            ("posts", posts.clone()),
            ("updated", Value::String(iso_date(&self.updated))),
            ("site_name", Value::String(self.site_name.to_owned())),
            ("base_url", Value::String(self.base_url.to_owned())),
        ]);
        artifacts.push(artifact("atom.xml", templates.atom.render(atom)?));

        let sitemap = object([
            ("posts", posts),
            ("base_url", Value::String(self.base_url.to_owned())),
        ]);
        artifacts.push(artifact("sitemap.txt", templates.sitemap.render(sitemap)?));

        debug!(artifacts = artifacts.len(), "rendered pages");
        Ok(artifacts)
    }

    /// The context of an HTML page which isn't a post.
    fn page<const N: usize>(&self, title: &str, extra: [(&'static str, Value); N]) -> Value {
        extend(
            object([
                ("css_path", Value::String(self.css_path.to_owned())),
                ("dev", Value::Bool(self.dev)),
                ("title", Value::String(title.to_owned())),
            ]),
            extra,
        )
    }
}

fn artifact(path: impl Into<PathBuf>, contents: String) -> Artifact {
    Artifact {
        path: path.into(),
        contents,
    }
}

/// The output path of a tag's page. Tags are used verbatim, so one that
/// would escape `tags/` is refused.
pub fn tag_path(tag: &str) -> Result<PathBuf> {
    if tag.is_empty() || tag == "." || tag == ".." || tag.contains(['/', '\\']) {
        return Err(Error::TagName(tag.to_owned()));
    }
    Ok(PathBuf::from("tags").join(format!("{}.html", tag)))
}

/// The result of a fallible build.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Wraps the error of whichever stage
/// failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the base URL isn't an absolute URL.
    #[error("invalid base URL `{url}`: {err}")]
    BaseUrl {
        url: String,
        #[source]
        err: url::ParseError,
    },

    /// Returned for errors reading or digesting posts.
    #[error(transparent)]
    Document(#[from] document::Error),

    /// Returned for errors loading or rendering templates.
    #[error(transparent)]
    Template(#[from] template::Error),

    /// Returned when the feed's change date can't be determined.
    #[error(transparent)]
    Metadata(#[from] vcs::Error),

    /// Returned for errors creating or writing the output root.
    #[error(transparent)]
    Output(#[from] output::Error),

    /// Returned when the stylesheet can't be compiled.
    #[error(transparent)]
    Asset(#[from] asset::Error),

    /// Returned for a tag which can't be used as a file name.
    #[error("tag `{0}` can't be used as a file name")]
    TagName(String),
}
