//! Groups documents by tag.

use std::collections::BTreeMap;

use crate::document::RenderedDocument;

/// Maps each tag to the documents carrying it. Documents are borrowed, never
/// copied; within a tag they keep the order they were collated in.
#[derive(Debug, Default)]
pub struct TagIndex<'a> {
    tags: BTreeMap<&'a str, Vec<&'a RenderedDocument>>,
}

impl<'a> TagIndex<'a> {
    /// The documents tagged `tag`, if any.
    pub fn get(&self, tag: &str) -> Option<&[&'a RenderedDocument]> {
        self.tags.get(tag).map(Vec::as_slice)
    }

    /// Iterates over tags in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &[&'a RenderedDocument])> {
        self.tags.iter().map(|(tag, documents)| (*tag, documents.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Collates `documents` by their `tags` attribute, keeping input order
/// within each tag.
///
/// Unlike a plain append per listed tag, a document listing a tag twice
/// appears under it once, so a tag page never shows the same post twice.
pub fn collate<'a, I>(documents: I) -> TagIndex<'a>
where
    I: IntoIterator<Item = &'a RenderedDocument>,
{
    let mut index = TagIndex::default();
    for document in documents {
        for tag in document.attributes.tags.iter() {
            let tagged = index.tags.entry(tag.as_str()).or_insert_with(Vec::new);
            if !tagged.last().is_some_and(|last| std::ptr::eq(*last, document)) {
                tagged.push(document);
            }
        }
    }
    index
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sequence::test::document;

    fn slugs(documents: &[&RenderedDocument]) -> Vec<String> {
        documents.iter().map(|d| d.slug.clone()).collect()
    }

    #[test]
    fn test_collate() {
        let documents = vec![
            document("doc0", (2020, 1, 1), &["a", "b"]),
            document("doc1", (2020, 3, 1), &["a"]),
            document("doc2", (2020, 2, 1), &[]),
        ];
        let index = collate(&documents);

        assert_eq!(2, index.len());
        assert_eq!(vec!["doc0", "doc1"], slugs(index.get("a").unwrap()));
        assert_eq!(vec!["doc0"], slugs(index.get("b").unwrap()));
        assert!(index
            .iter()
            .all(|(_, tagged)| tagged.iter().all(|d| d.slug != "doc2")));
    }

    #[test]
    fn test_collate_shares_documents() {
        let documents = vec![document("doc0", (2020, 1, 1), &["a", "b"])];
        let index = collate(&documents);
        assert!(std::ptr::eq(index.get("a").unwrap()[0], &documents[0]));
        assert!(std::ptr::eq(index.get("b").unwrap()[0], &documents[0]));
    }

    #[test]
    fn test_repeated_tag_listed_once() {
        let documents = vec![document("doc0", (2020, 1, 1), &["a", "a"])];
        assert_eq!(1, collate(&documents).get("a").unwrap().len());
    }

    #[test]
    fn test_untagged() {
        let documents = vec![document("doc0", (2020, 1, 1), &[])];
        assert!(collate(&documents).is_empty());
    }
}
