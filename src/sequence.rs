//! Orders documents newest-first and links each to its neighbours.

use crate::document::RenderedDocument;

/// A document in its reading position with links to its neighbours.
/// `prev_link` points at the next-newer document, `next_link` at the
/// next-older one.
#[derive(Clone, Debug)]
pub struct Sequenced {
    pub document: RenderedDocument,
    pub prev_link: Option<String>,
    pub next_link: Option<String>,
}

/// Documents sorted by date, newest first. Only [`sequence`] produces one, so
/// holding a [`Sequence`] means documents were loaded and ordered.
#[derive(Clone, Debug, Default)]
pub struct Sequence(Vec<Sequenced>);

impl Sequence {
    pub fn iter(&self) -> impl Iterator<Item = &Sequenced> {
        self.0.iter()
    }

    /// The documents alone, in sequence order.
    pub fn documents(&self) -> impl Iterator<Item = &RenderedDocument> {
        self.0.iter().map(|s| &s.document)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sorts `documents` by date descending and attaches navigation links.
/// Documents with equal dates keep their input order.
pub fn sequence(mut documents: Vec<RenderedDocument>) -> Sequence {
    // `sort_by` is stable.
    documents.sort_by(|a, b| b.date.cmp(&a.date));

    let links: Vec<String> = documents.iter().map(RenderedDocument::path).collect();
    Sequence(
        documents
            .into_iter()
            .enumerate()
            .map(|(i, document)| Sequenced {
                document,
                prev_link: match i < 1 {
                    true => None,
                    false => Some(links[i - 1].clone()),
                },
                next_link: links.get(i + 1).cloned(),
            })
            .collect(),
    )
}
