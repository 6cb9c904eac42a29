use crate::htmlrenderer::push_html;
use crate::link::Classifier;
use crate::math::{self, MathRenderer};
use pulldown_cmark::*;
use regex::Regex;
use std::io;
use std::sync::LazyLock;

/// The fenced-block language tag which marks a block as maths unless
/// overridden with [`Renderer::with_math_language`].
pub const DEFAULT_MATH_LANGUAGE: &str = "mathematics";

/// Converts markdown to HTML. Holds only what's fixed for a whole build: the
/// link classifier and the maths renderer. Rendering keeps no state between
/// calls.
pub struct Renderer<M> {
    classifier: Classifier,
    math: M,
    math_language: String,
}

impl<M: MathRenderer> Renderer<M> {
    /// Constructs a new [`Renderer`].
    pub fn new(classifier: Classifier, math: M) -> Renderer<M> {
        Renderer {
            classifier,
            math,
            math_language: DEFAULT_MATH_LANGUAGE.to_owned(),
        }
    }

    /// Sets the fenced-block language tag recognized as maths.
    pub fn with_math_language(mut self, language: &str) -> Renderer<M> {
        self.math_language = language.to_owned();
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Renders `markdown` to HTML.
    ///
    /// Maths blocks are picked out of the parsed event stream, i.e. from the
    /// fenced block's own source text, and replaced with inline SVG before any
    /// HTML is written. Anchors are classified while the HTML is written, so
    /// links at any nesting depth (lists, blockquotes, tables) are covered.
    pub async fn render(&self, markdown: &str) -> Result<String> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let events = self
            .typeset_math(Parser::new_ext(markdown, options).collect())
            .await?;

        let mut html = String::with_capacity(markdown.len() * 3 / 2);
        push_html(&mut html, events.into_iter(), &self.classifier)?;
        Ok(html)
    }

    fn is_math(&self, info: &str) -> bool {
        info.split_whitespace().next() == Some(self.math_language.as_str())
    }

    async fn typeset_math<'e>(&self, events: Vec<Event<'e>>) -> Result<Vec<Event<'e>>> {
        let mut out = Vec::with_capacity(events.len());
        let mut events = events.into_iter();
        while let Some(event) = events.next() {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(ref info)))
                    if self.is_math(info) =>
                {
                    let mut source = String::new();
                    for inner in events.by_ref() {
                        match inner {
                            Event::End(Tag::CodeBlock(_)) => break,
                            Event::Text(text) => source.push_str(&text),
                            _ => (),
                        }
                    }
                    let svg = math::typeset(&self.math, &source).await?;
                    out.push(Event::Html(CowStr::Boxed(svg.into_boxed_str())));
                }
                event => out.push(event),
            }
        }
        Ok(out)
    }
}

static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").unwrap());

/// Plucks the first paragraph out of rendered HTML and wraps its contents
/// as `<p class="quote">…</p>` for list views. A document without any
/// paragraph has no snippet and is rejected.
pub fn snippet(html: &str) -> Result<String> {
    match PARAGRAPH.captures(html) {
        Some(caps) => Ok(format!(r#"<p class="quote">{}</p>"#, &caps[1])),
        None => Err(Error::NoParagraph),
    }
}

/// The result of a fallible markdown operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error converting markdown to HTML.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a maths block can't be converted.
    #[error("rendering maths: {0}")]
    Math(#[from] math::Error),

    /// Returned when there's nothing to take a snippet from.
    #[error("document has no paragraph to take a snippet from")]
    NoParagraph,

    /// Returned for I/O errors while writing HTML.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE_URL: &str = "https://example.org/";

    /// Stands in for the external converter, emitting the kind of noise the
    /// real one does.
    struct FakeMath;

    impl MathRenderer for FakeMath {
        async fn to_svg(&self, source: &str) -> math::Result<String> {
            if source.contains("\\bad") {
                return Err(math::Error::Converter {
                    program: "fake".into(),
                    stderr: "Undefined control sequence".to_owned(),
                });
            }
            Ok(format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" style="vertical-align: 0"><title id="MathJax-1">{}</title><path d="M0 0"/></svg>"#,
                source
            ))
        }
    }

    fn renderer() -> Renderer<FakeMath> {
        Renderer::new(Classifier::new(BASE_URL).unwrap(), FakeMath)
    }

    fn anchors(html: &str) -> Vec<String> {
        Regex::new("<a [^>]*>")
            .unwrap()
            .find_iter(html)
            .map(|m| m.as_str().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_paragraph() -> Result<()> {
        assert_eq!("<p>a paragraph</p>", renderer().render("a paragraph").await?.trim());
        Ok(())
    }

    #[tokio::test]
    async fn test_internal_links_unchanged() -> Result<()> {
        let r = renderer();
        for href in ["/a/path", "./a/path", "https://example.org/a/path"] {
            let html = r.render(&format!("[a link within the site]({})", href)).await?;
            assert_eq!(vec![format!(r#"<a href="{}">"#, href)], anchors(&html));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_external_link() -> Result<()> {
        let html = renderer()
            .render("[a link to another site](https://example.com/a/path)")
            .await?;
        assert_eq!(
            vec![r#"<a href="https://example.com/a/path" target="_blank" rel="noopener">"#],
            anchors(&html)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_links() -> Result<()> {
        let html = renderer()
            .render("* [x](https://example.com/)\n\n> [y](https://example.net/)\n\n> * [z](/z)\n")
            .await?;
        let anchors = anchors(&html);
        assert_eq!(3, anchors.len());
        assert!(anchors[0].ends_with(r#"target="_blank" rel="noopener">"#));
        assert!(anchors[1].ends_with(r#"target="_blank" rel="noopener">"#));
        assert_eq!(r#"<a href="/z">"#, anchors[2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_raw_internal_anchor_loses_target() -> Result<()> {
        let html = renderer()
            .render(r#"see <a href="/x" target="_blank" rel="noopener">here</a>"#)
            .await?;
        assert_eq!(vec![r#"<a href="/x">"#.to_owned()], anchors(&html));
        Ok(())
    }

    #[tokio::test]
    async fn test_math_block() -> Result<()> {
        let html = renderer().render("```mathematics\na=b\n```").await?;
        assert_eq!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" role="img"><title>a=b</title><path d="M0 0"/></svg>"#,
            html
        );
        assert!(!html.contains("style="));
        Ok(())
    }

    #[tokio::test]
    async fn test_math_block_keeps_link_syntax_literal() -> Result<()> {
        let html = renderer()
            .render("```mathematics\n[a](https://example.com)\n```")
            .await?;
        assert!(html.contains("<title>[a](https://example.com)</title>"));
        assert!(anchors(&html).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_other_fenced_blocks_untouched() -> Result<()> {
        let html = renderer().render("```rust\nlet a = b;\n```").await?;
        assert_eq!(
            r#"<pre><code class="language-rust">let a = b;
</code></pre>"#,
            html
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_math_language() -> Result<()> {
        let html = renderer()
            .with_math_language("tex")
            .render("```tex\nx\n```")
            .await?;
        assert!(html.starts_with("<svg"));
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_math_fails() {
        let result = renderer().render("ok\n\n```mathematics\n\\bad\n```").await;
        assert!(matches!(result, Err(Error::Math(_))));
    }

    #[test]
    fn test_snippet() -> Result<()> {
        assert_eq!(
            r#"<p class="quote">first <em>one</em></p>"#,
            snippet("<h1>t</h1><p>first <em>one</em></p><p>second</p>")?
        );
        Ok(())
    }

    #[test]
    fn test_snippet_requires_paragraph() {
        assert!(matches!(snippet("<h1>t</h1>"), Err(Error::NoParagraph)));
    }
}
