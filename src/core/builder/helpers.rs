//! One-shot helpers that build, commit and return a view

use super::list::{NodeRefListBuilder, TagListBuilder};
use crate::core::buffer::Buffer;
use crate::core::entity::{NodeRef, NodeRefList, TagList};
use crate::core::error::Result;

/// Run `write` and commit its record, or drop only the bytes `write` added
fn commit_or_rollback<F>(buffer: &mut Buffer, write: F) -> Result<usize>
where
    F: FnOnce(&mut Buffer) -> Result<usize>,
{
    let start = buffer.written();
    match write(buffer) {
        Ok(offset) => {
            buffer.commit();
            Ok(offset)
        }
        Err(e) => {
            buffer.truncate_to(start);
            Err(e)
        }
    }
}

/// Build a standalone tag list from `(key, value)` pairs
pub fn build_tag_list<I, K, V>(buffer: &mut Buffer, tags: I) -> Result<TagList<'_>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    build_tag_list_with(buffer, |list| {
        for (key, value) in tags {
            list.add_tag(key.as_ref(), value.as_ref())?;
        }
        Ok(())
    })
}

/// Build a standalone tag list filled by `fill`
pub fn build_tag_list_with<F>(buffer: &mut Buffer, fill: F) -> Result<TagList<'_>>
where
    F: FnOnce(&mut TagListBuilder<'_>) -> Result<()>,
{
    let offset = commit_or_rollback(buffer, |buffer| {
        let mut list = TagListBuilder::new(buffer)?;
        fill(&mut list)?;
        list.finish()
    })?;
    buffer.get_tag_list(offset)
}

/// Build a standalone node reference list
pub fn build_node_ref_list<I>(buffer: &mut Buffer, nodes: I) -> Result<NodeRefList<'_>>
where
    I: IntoIterator<Item = NodeRef>,
{
    let offset = commit_or_rollback(buffer, |buffer| {
        let mut list = NodeRefListBuilder::new(buffer)?;
        for node in nodes {
            list.add_node_ref(node)?;
        }
        list.finish()
    })?;
    buffer.get_node_ref_list(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::GrowthPolicy;
    use crate::core::entity::Location;
    use crate::core::error::MapbufError;

    #[test]
    fn test_build_tag_list() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let tags = build_tag_list(&mut buffer, [("a", "1"), ("b", "2")]).unwrap();
        let pairs: Vec<_> = tags.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2")]);
        assert_eq!(buffer.written(), buffer.committed());
    }

    #[test]
    fn test_build_tag_list_with_owned_strings() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let source = vec![("name".to_string(), "Lindenstraße".to_string())];
        let tags = build_tag_list(&mut buffer, source).unwrap();
        assert_eq!(tags.get("name"), Some("Lindenstraße"));
    }

    #[test]
    fn test_failed_build_rolls_back() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        build_tag_list(&mut buffer, [("kept", "yes")]).unwrap();
        let committed = buffer.committed();

        let result = build_tag_list_with(&mut buffer, |list| {
            list.add_tag("x", "1")?;
            list.add_tag("bad\0key", "2")
        });
        assert!(matches!(result, Err(MapbufError::EmbeddedNul(_))));
        assert_eq!(buffer.committed(), committed);
        assert_eq!(buffer.written(), committed);
        assert_eq!(buffer.items().count(), 1);
    }

    #[test]
    fn test_failed_build_keeps_earlier_uncommitted_records() {
        use crate::core::builder::PointBuilder;

        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let point = PointBuilder::new(&mut buffer, 8, Location::new(3.0, 4.0))
            .unwrap()
            .finish()
            .unwrap();
        let written = buffer.written();
        assert_eq!(buffer.committed(), 0);

        let result = build_tag_list_with(&mut buffer, |list| list.add_tag("k\0", "v"));
        assert!(matches!(result, Err(MapbufError::EmbeddedNul(_))));
        assert_eq!(buffer.written(), written);

        buffer.commit();
        assert_eq!(buffer.get_point(point).unwrap().id(), 8);
        assert_eq!(buffer.items().count(), 1);
    }

    #[test]
    fn test_build_node_ref_list() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let nodes = build_node_ref_list(
            &mut buffer,
            (1..=3).map(|id| NodeRef::new(id, Location::from_raw(id as i32, 0))),
        )
        .unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes.get(2).unwrap().location.x(), 3);
    }
}
