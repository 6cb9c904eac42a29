//! Implements a custom [`push_html`] so that anchors can be classified as
//! they're written. [`pulldown_cmark::html::push_html`] emits links verbatim;
//! here every anchor, whether it came from markdown link syntax or from raw
//! HTML inside the markdown, has its `target`/`rel` attributes decided by a
//! [`Classifier`].

use crate::link::Classifier;
use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::fmt::{self, Display};
use std::io;
use std::sync::LazyLock;

struct Adaptor<'a, T> {
    formatter: &'a mut T,
    result: fmt::Result,
}

impl<T> Adaptor<'_, T> {
    fn handle_result(&mut self, result: fmt::Result) -> io::Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.result = result;
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

impl<T: fmt::Write> StrWrite for Adaptor<'_, T> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let result = self.formatter.write_str(s);
        self.handle_result(result)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> io::Result<()> {
        let result = self.formatter.write_fmt(args);
        self.handle_result(result)
    }
}

struct EscapeHref<'a>(&'a str);

impl Display for EscapeHref<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = escape_href(&mut adaptor, self.0);
        adaptor.result
    }
}

struct EscapeHtml<'a>(&'a str);

impl Display for EscapeHtml<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };

        let _ = escape_html(&mut adaptor, self.0);
        adaptor.result
    }
}

/// The attributes appended to anchors which leave the site.
const EXTERNAL_ATTRIBUTES: &str = r#" target="_blank" rel="noopener""#;

enum TableState {
    Head,
    Body,
}

/// Renders markdown [`Event`]s into HTML. This is largely modeled after
/// [`pulldown_cmark`]'s private [`HtmlWriter`
/// struct](https://github.com/raphlinus/pulldown-cmark/blob/bf0a1a4938dbd2ec41c3add069b3d361d11731f4/src/html.rs#L36-L50).
struct HtmlRenderer<'c> {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Titles of the images currently open. While non-empty, text is being
    /// written into an `alt` attribute and markup is suppressed.
    image_titles: Vec<String>,

    /// Raw HTML not yet written. An HTML block arrives one line per event,
    /// so anchors are only rewritten once the whole run is collected.
    pending_html: String,

    classifier: &'c Classifier,
}

impl<'a> HtmlRenderer<'_> {
    fn on_event<W: StrWrite>(&mut self, w: &mut W, event: Event<'a>) -> io::Result<()> {
        if !matches!(event, Event::Html(_)) {
            self.flush_html(w)?;
        }
        if !self.image_titles.is_empty() {
            return self.on_alt_event(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Code(code) => self.on_code(w, code),
            Event::FootnoteReference(name) => write!(
                w,
                r##"<sup class="footnote-reference"><a href="#{}">{}</a></sup>"##,
                EscapeHtml(&name),
                EscapeHtml(&name),
            ),
            Event::HardBreak => self.on_hard_break(w),
            Event::Html(html) => self.on_html(w, html),
            Event::Rule => self.on_rule(w),
            Event::SoftBreak => self.on_soft_break(w),
            Event::TaskListMarker(checked) => self.on_task_list_marker(w, checked),
            Event::Text(text) => self.on_text(w, text),
        }
    }

    /// Handles events nested inside an image, which only contribute their
    /// text to the `alt` attribute.
    fn on_alt_event<W: StrWrite>(&mut self, w: &mut W, event: Event<'a>) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(_, _, title)) => {
                self.image_titles.push(title.into_string());
                Ok(())
            }
            Event::End(Tag::Image(_, _, _)) => {
                let title = self.image_titles.pop().unwrap_or_default();
                if !self.image_titles.is_empty() {
                    return Ok(());
                }
                w.write_str("\"")?;
                if !title.is_empty() {
                    write!(w, r#" title="{}""#, EscapeHtml(&title))?;
                }
                w.write_str(" />")
            }
            Event::Text(text) | Event::Code(text) => escape_html(w, &text),
            Event::SoftBreak | Event::HardBreak => w.write_str(" "),
            _ => Ok(()),
        }
    }
}

impl<'a, 'c> HtmlRenderer<'c> {
    fn new(classifier: &'c Classifier) -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            image_titles: Vec::default(),
            pending_html: String::new(),
            classifier,
        }
    }

    fn on_start<W: StrWrite>(&mut self, w: &mut W, tag: Tag<'a>) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("<blockquote>"),
            Tag::CodeBlock(kind) => match kind {
                CodeBlockKind::Fenced(info) => match info.split(' ').next() {
                    Some(lang) if !lang.is_empty() => write!(
                        w,
                        r#"<pre><code class="language-{}">"#,
                        EscapeHtml(lang)
                    ),
                    _ => w.write_str("<pre><code>"),
                },
                CodeBlockKind::Indented => w.write_str("<pre><code>"),
            },
            Tag::Emphasis => w.write_str("<em>"),
            Tag::FootnoteDefinition(name) => {
                let name = EscapeHtml(&name);
                write!(
                    w,
                    r#"<div class="footnote-definition" id="{}"><sup class="footnote-definition-label">{}</sup>"#,
                    &name, &name,
                )
            }
            Tag::Heading(size) => write!(w, "<h{}>", size),
            Tag::Image(_link_type, dest, title) => {
                self.image_titles.push(title.into_string());
                write!(w, r#"<img src="{}" alt=""#, EscapeHref(&dest))
            }
            Tag::Item => w.write_str("<li>"),
            Tag::Link(LinkType::Email, dest, title) => {
                write!(w, r#"<a href="mailto:{}""#, EscapeHref(&dest))?;
                self.on_link_title(w, &title)?;
                w.write_str(">")
            }
            Tag::Link(_link_type, dest, title) => {
                write!(w, r#"<a href="{}""#, EscapeHref(&dest))?;
                self.on_link_title(w, &title)?;
                if self.classifier.classify(&dest).is_external() {
                    w.write_str(EXTERNAL_ATTRIBUTES)?;
                }
                w.write_str(">")
            }
            Tag::List(None) => w.write_str("<ul>"),
            Tag::List(Some(1)) => w.write_str("<ol>"),
            Tag::List(Some(start)) => write!(w, r#"<ol start="{}">"#, start),
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                },
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                }
            ),
        }
    }

    fn on_link_title<W: StrWrite>(&mut self, w: &mut W, title: &str) -> io::Result<()> {
        match title.is_empty() {
            true => Ok(()),
            false => write!(w, r#" title="{}""#, EscapeHtml(title)),
        }
    }

    fn on_end<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("</blockquote>"),
            Tag::CodeBlock(_) => w.write_str("</code></pre>"),
            Tag::Emphasis => w.write_str("</em>"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>"),
            Tag::Heading(level) => write!(w, "</h{}>", level),
            Tag::Image(_, _, _) => Ok(()), // handled in `on_alt_event`
            Tag::Item => w.write_str("</li>"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            Tag::List(Some(_)) => w.write_str("</ol>"),
            Tag::List(None) => w.write_str("</ul>"),
            Tag::Paragraph => w.write_str("</p>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Table(_) => w.write_str("</tbody></table>"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>")
            }
            Tag::TableRow => w.write_str("</tr>"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                })
            }
        }
    }

    fn on_text<W: StrWrite>(&mut self, w: &mut W, s: CowStr) -> io::Result<()> {
        escape_html(w, &s)
    }

    fn on_code<W: StrWrite>(&mut self, w: &mut W, s: CowStr) -> io::Result<()> {
        write!(w, "<code>{}</code>", EscapeHtml(&s))
    }

    fn on_html<W: StrWrite>(&mut self, _: &mut W, s: CowStr) -> io::Result<()> {
        self.pending_html.push_str(&s);
        Ok(())
    }

    fn flush_html<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        if self.pending_html.is_empty() {
            return Ok(());
        }
        let html = std::mem::take(&mut self.pending_html);
        w.write_str(&rewrite_anchors(&html, self.classifier))
    }

    fn on_soft_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("\n")
    }

    fn on_hard_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<br />")
    }

    fn on_rule<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<hr />")
    }

    fn on_task_list_marker<W: StrWrite>(&mut self, w: &mut W, checked: bool) -> io::Result<()> {
        write!(
            w,
            r#"<input disabled="" type="checkbox" {}/>"#,
            match checked {
                true => r#"checked="" "#,
                false => "",
            }
        )
    }
}

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a(\s[^>]*?)?(/?)>").unwrap());

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

/// Rewrites the opening `<a>` tags in a chunk of raw HTML: any existing
/// `target` and `rel` attributes are dropped and, when the `href` is
/// external, `target="_blank" rel="noopener"` is appended. Chunks without
/// anchors are returned as-is.
pub fn rewrite_anchors<'h>(html: &'h str, classifier: &Classifier) -> Cow<'h, str> {
    ANCHOR.replace_all(html, |caps: &Captures| {
        let mut tag = String::from("<a");
        let mut href = "";
        if let Some(attributes) = caps.get(1) {
            for attr in ATTRIBUTE.captures_iter(attributes.as_str()) {
                let name = &attr[1];
                if name.eq_ignore_ascii_case("target") || name.eq_ignore_ascii_case("rel") {
                    continue;
                }
                let value = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4));
                match value {
                    Some(value) => {
                        if name.eq_ignore_ascii_case("href") {
                            href = value.as_str();
                        }
                        tag.push_str(&format!(
                            r#" {}="{}""#,
                            name,
                            value.as_str().replace('"', "&quot;")
                        ));
                    }
                    None => {
                        tag.push(' ');
                        tag.push_str(name);
                    }
                }
            }
        }
        if classifier.classify(href).is_external() {
            tag.push_str(EXTERNAL_ATTRIBUTES);
        }
        tag.push_str(&caps[2]);
        tag.push('>');
        tag
    })
}

/// Converts [`Event`]s into an HTML string much like
/// `pulldown_cmark::html::push_html` except that anchors are classified with
/// `classifier`. See the module description for more details.
pub fn push_html<'a, I>(out: &mut String, events: I, classifier: &Classifier) -> io::Result<()>
where
    I: Iterator<Item = Event<'a>>,
{
    let mut renderer = HtmlRenderer::new(classifier);
    for event in events {
        renderer.on_event(out, event)?;
    }
    renderer.flush_html(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use pulldown_cmark::Parser;

    fn render(markdown: &str) -> String {
        let classifier = Classifier::new("https://example.org/").unwrap();
        let mut out = String::new();
        push_html(&mut out, Parser::new(markdown), &classifier).unwrap();
        out
    }

    #[test]
    fn test_external_link() {
        assert_eq!(
            r#"<p><a href="https://example.com/a" title="t" target="_blank" rel="noopener">x</a></p>"#,
            render(r#"[x](https://example.com/a "t")"#)
        );
    }

    #[test]
    fn test_internal_link() {
        assert_eq!(r#"<p><a href="/a">x</a></p>"#, render("[x](/a)"));
    }

    #[test]
    fn test_image_alt_text() {
        assert_eq!(
            r#"<p><img src="/cat.png" alt="a cat" title="Cat" /></p>"#,
            render(r#"![a *cat*](/cat.png "Cat")"#)
        );
    }

    #[test]
    fn test_html_block_anchor_spanning_lines() {
        assert_eq!(
            "<div>\n<a href=\"/internal\">x</a>\n</div>\n",
            render("<div>\n<a href=\"/internal\"\n   target=\"_blank\" rel=\"noopener\">x</a>\n</div>\n")
        );
        assert_eq!(
            "<div>\n<a href=\"https://example.com/\" target=\"_blank\" rel=\"noopener\">x</a>\n</div>\n",
            render("<div>\n<a\n href=\"https://example.com/\">x</a>\n</div>\n")
        );
    }

    #[test]
    fn test_inline_anchor_spanning_lines() {
        let html = render("para <a href=\"/internal\"\ntarget=\"_blank\">x</a>");
        assert!(html.contains(r#"<a href="/internal">x</a>"#), "{}", html);
        assert!(!html.contains("target"), "{}", html);
    }

    #[test]
    fn test_rewrite_anchors_strips_internal_target() {
        let classifier = Classifier::new("https://example.org/").unwrap();
        assert_eq!(
            r#"<a href="/a" class="x">"#,
            rewrite_anchors(
                r#"<a href="/a" target="_blank" rel="noopener" class='x'>"#,
                &classifier
            )
        );
    }

    #[test]
    fn test_rewrite_anchors_marks_external() {
        let classifier = Classifier::new("https://example.org/").unwrap();
        assert_eq!(
            r#"<a href="https://example.com/" target="_blank" rel="noopener">"#,
            rewrite_anchors(
                r#"<A HREF=https://example.com/ rel="nofollow">"#,
                &classifier
            )
            .replace("HREF", "href")
        );
    }

    #[test]
    fn test_rewrite_anchors_ignores_other_tags() {
        let classifier = Classifier::new("https://example.org/").unwrap();
        let html = r#"<abbr title="x">y</abbr><article>z</article>"#;
        assert_eq!(html, rewrite_anchors(html, &classifier));
    }
}
