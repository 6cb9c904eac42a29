//! The library code for the `folio` static blog generator. A build is a
//! pipeline of stages, each in its own module:
//!
//! 1. Digesting posts ([`crate::document`]): splitting off the YAML front
//!    matter and rendering the markdown body ([`crate::markdown`]). Links are
//!    classified as internal or external ([`crate::link`]) while the HTML is
//!    written ([`crate::htmlrenderer`]) and maths blocks become inline SVG
//!    ([`crate::math`]).
//! 2. Ordering the posts newest-first with links to their neighbours
//!    ([`crate::sequence`]) and grouping them by tag ([`crate::tag`]).
//! 3. Creating the output root ([`crate::output`]) and compiling the
//!    stylesheet under a content-hashed name ([`crate::asset`]).
//! 4. Rendering every page through the site's templates
//!    ([`crate::template`], with contexts built by [`crate::value`]) and
//!    writing the results.
//!
//! [`crate::build`] stitches the stages together. Posts and templates are
//! loaded, and the feed date is asked of source control ([`crate::vcs`]),
//! before anything is written, so a broken source produces no output.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod asset;
pub mod build;
pub mod config;
pub mod document;
pub mod htmlrenderer;
pub mod link;
pub mod markdown;
pub mod math;
pub mod output;
pub mod sequence;
pub mod tag;
pub mod template;
pub mod value;
pub mod vcs;
