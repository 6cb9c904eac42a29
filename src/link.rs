//! Classifies hyperlinks relative to the site's own origin. See
//! [`Classifier::classify`] for the rules.

use url::{ParseError, Url};

/// Where a link points relative to the site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    /// A link to another origin. Rendered with `target="_blank"` and
    /// `rel="noopener"`.
    External,

    /// An absolute URL on the site's own origin (e.g.,
    /// `https://example.org/blog/foo`).
    InternalAbsolute,

    /// A path or relative reference (`/a/path`, `./a/path`, `../a/path`,
    /// `#fragment`). Also the class for missing or malformed hrefs.
    InternalRelative,
}

impl Class {
    /// Returns `true` if the link should open in a new browsing context.
    pub fn is_external(self) -> bool {
        self == Class::External
    }
}

/// Classifies hrefs against a base URL.
#[derive(Clone, Debug)]
pub struct Classifier {
    /// The base URL as the user supplied it, plus a trailing `/` if it had
    /// none, so `https://example.org.evil.com` can't pass for
    /// `https://example.org`. Any href that begins with this string is
    /// internal regardless of how it parses.
    prefix: String,

    /// The parsed base URL, used to compare hosts and to resolve
    /// scheme-relative references (`//host/path`).
    base: Url,
}

impl Classifier {
    /// Constructs a new [`Classifier`] for `base_url`.
    pub fn new(base_url: &str) -> Result<Classifier, ParseError> {
        let base = Url::parse(base_url)?;
        let mut prefix = base_url.to_owned();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(Classifier { prefix, base })
    }

    /// The base URL this classifier was constructed with, ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.prefix
    }

    /// Classifies `href`.
    ///
    /// * hrefs beginning with the base URL string are
    ///   [`Class::InternalAbsolute`].
    /// * hrefs with no scheme (`/a`, `./a`, `../a`, `a`, `#a`) are
    ///   [`Class::InternalRelative`], except scheme-relative `//host/...`
    ///   references, which are judged by their host like absolute URLs.
    /// * absolute URLs are [`Class::External`] when they name a host
    ///   other than the base URL's host, otherwise
    ///   [`Class::InternalAbsolute`] (this includes host-less schemes such
    ///   as `mailto:`).
    /// * anything unparseable is [`Class::InternalRelative`].
    pub fn classify(&self, href: &str) -> Class {
        let href = href.trim();
        if href.is_empty() {
            return Class::InternalRelative;
        }
        if href.starts_with(&self.prefix) {
            return Class::InternalAbsolute;
        }

        match Url::parse(href) {
            Ok(url) => self.classify_absolute(&url),
            Err(ParseError::RelativeUrlWithoutBase) if href.starts_with("//") => {
                match self.base.join(href) {
                    Ok(url) => self.classify_absolute(&url),
                    Err(_) => Class::InternalRelative,
                }
            }
            Err(_) => Class::InternalRelative,
        }
    }

    fn classify_absolute(&self, url: &Url) -> Class {
        match url.host_str() {
            Some(host) if Some(host) != self.base.host_str() => Class::External,
            _ => Class::InternalAbsolute,
        }
    }
}
