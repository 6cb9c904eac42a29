//! Turns fenced maths blocks into inline SVG. The conversion itself is done
//! by a [`MathRenderer`] (by default the external `tex2svg` program, see
//! [`Tex2Svg`]); this module owns the post-processing that makes the result
//! deterministic and accessible (see [`tidy_svg`]).

use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Converts maths notation into SVG markup.
pub trait MathRenderer {
    /// Renders `source` (the literal contents of a maths block) as an SVG
    /// document. Invalid notation must be reported as an error.
    fn to_svg(&self, source: &str) -> impl Future<Output = Result<String>>;
}

/// A [`MathRenderer`] which runs an external program with the maths source
/// as its only positional argument (after `--`) and reads SVG from its
/// standard output.
#[derive(Clone, Debug)]
pub struct Tex2Svg {
    pub program: PathBuf,
}

impl Default for Tex2Svg {
    fn default() -> Self {
        Tex2Svg {
            program: PathBuf::from("tex2svg"),
        }
    }
}

impl MathRenderer for Tex2Svg {
    async fn to_svg(&self, source: &str) -> Result<String> {
        // Maths like `-1 < x` must not be read as an option.
        let output = tokio::process::Command::new(&self.program)
            .arg("--")
            .arg(source)
            .output()
            .await
            .map_err(|err| Error::Spawn {
                program: self.program.clone(),
                err,
            })?;

        if !output.status.success() {
            return Err(Error::Converter {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Renders one maths block: converts `source` with `renderer` and tidies
/// the result with [`tidy_svg`]. Trailing newlines of the block are not part
/// of the maths.
pub async fn typeset<M: MathRenderer>(renderer: &M, source: &str) -> Result<String> {
    let source = source.trim_end_matches(['\n', '\r']);
    let svg = renderer.to_svg(source).await?;
    tidy_svg(&svg, source)
}

/// Post-processes converter output:
///
/// * `style` attributes are removed from every element;
/// * `id` attributes are removed from every `<title>`;
/// * the root `<svg>` gets `role="img"`;
/// * the root's `<title>` is replaced with one whose text is `label`, placed
///   as the root's first child.
///
/// XML declarations and doctypes are dropped since the result is inlined into
/// HTML.
pub fn tidy_svg(svg: &str, label: &str) -> Result<String> {
    let mut reader = Reader::from_str(svg);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut depth = 0usize;
    let mut seen_root = false;
    // While `Some(d)`, events are dropped until the element opened at depth
    // `d` closes.
    let mut skipping: Option<usize> = None;

    loop {
        let event = reader.read_event()?;
        if let Some(skip_depth) = skipping {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == skip_depth {
                        skipping = None;
                    }
                }
                Event::Eof => return Err(Error::MalformedSvg("unterminated <title>")),
                _ => (),
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                let name = e.name();
                if depth == 0 && name.as_ref() == b"svg" {
                    seen_root = true;
                    writer.write_event(Event::Start(rebuild(&e, true)?))?;
                    write_title(&mut writer, label)?;
                    depth += 1;
                } else if depth == 1 && seen_root && name.as_ref() == b"title" {
                    skipping = Some(depth);
                    depth += 1;
                } else {
                    writer.write_event(Event::Start(rebuild(&e, false)?))?;
                    depth += 1;
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                if depth == 0 && name.as_ref() == b"svg" {
                    // A self-closing root still needs its label.
                    seen_root = true;
                    writer.write_event(Event::Start(rebuild(&e, true)?))?;
                    write_title(&mut writer, label)?;
                    writer.write_event(Event::End(BytesEnd::new("svg")))?;
                } else if depth == 1 && seen_root && name.as_ref() == b"title" {
                    continue;
                } else {
                    writer.write_event(Event::Empty(rebuild(&e, false)?))?;
                }
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(Error::MalformedSvg("unbalanced closing tag"))?;
                writer.write_event(Event::End(e))?;
            }
            Event::Decl(_) | Event::DocType(_) | Event::PI(_) => (),
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    if !seen_root {
        return Err(Error::MalformedSvg("no root <svg> element"));
    }
    if depth != 0 {
        return Err(Error::MalformedSvg("unclosed element"));
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Copies `elem`, dropping `style` (and `id` on titles). When `root` is set,
/// also sets `role="img"`.
fn rebuild(elem: &BytesStart<'_>, root: bool) -> Result<BytesStart<'static>> {
    let tag = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let is_title = tag == "title";
    let mut rebuilt = BytesStart::new(tag);
    for attr in elem.attributes() {
        let attr: Attribute = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_ref() {
            b"style" => continue,
            b"id" if is_title => continue,
            b"role" if root => continue,
            _ => rebuilt.push_attribute((attr.key.as_ref(), attr.value.as_ref())),
        }
    }
    if root {
        rebuilt.push_attribute(("role", "img"));
    }
    Ok(rebuilt)
}

fn write_title(writer: &mut Writer<Cursor<Vec<u8>>>, label: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("title")))?;
    writer.write_event(Event::Text(BytesText::new(label)))?;
    writer.write_event(Event::End(BytesEnd::new("title")))?;
    Ok(())
}

/// The result of a fallible maths operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to turn a maths block into SVG.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the converter program could not be started.
    #[error("starting maths converter `{}`: {err}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when the converter rejected its input.
    #[error("maths converter `{}` failed: {stderr}", program.display())]
    Converter { program: PathBuf, stderr: String },

    /// Returned when the converter output isn't valid UTF-8.
    #[error("maths converter produced invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Returned when the converter output isn't well-formed XML.
    #[error("parsing converter SVG: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Returned when the converter output is XML but not a usable SVG.
    #[error("malformed converter SVG: {0}")]
    MalformedSvg(&'static str),

    /// Returned for I/O errors while re-serializing the SVG.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
