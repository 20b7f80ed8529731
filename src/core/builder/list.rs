//! Builders for the sub-lists attached to entities

use super::Builder;
use crate::core::buffer::Buffer;
use crate::core::entity::{Location, MemberHeader, NodeRef};
use crate::core::error::{MapbufError, Result};
use crate::core::item::{padded_length, Item, ItemHeader, ItemType, Record};

/// Builds a [`TagList`](crate::core::entity::TagList) record
pub struct TagListBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> TagListBuilder<'a> {
    /// Start a standalone tag list
    pub fn new(buffer: &'a mut Buffer) -> Result<Self> {
        Ok(TagListBuilder {
            inner: Builder::new(buffer, ItemType::TagList, ItemHeader::SIZE)?,
        })
    }

    /// Start a tag list inside `parent`
    pub fn within(parent: &'a mut Builder<'_>) -> Result<Self> {
        Ok(TagListBuilder {
            inner: parent.nested(ItemType::TagList, ItemHeader::SIZE)?,
        })
    }

    /// Append `key` and `value` back to back
    ///
    /// Either both strings are written or neither is.
    pub fn add_tag(&mut self, key: &str, value: &str) -> Result<()> {
        for s in [key, value] {
            if s.as_bytes().contains(&0) {
                return Err(MapbufError::EmbeddedNul(s.to_string()));
            }
        }

        self.inner.reserve(key.len() + value.len() + 2)?;
        self.inner.append_str(key)?;
        self.inner.append_str(value)?;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.inner.offset()
    }

    pub fn finish(self) -> Result<usize> {
        self.inner.finish()
    }
}

/// Builds a [`NodeRefList`](crate::core::entity::NodeRefList) record
pub struct NodeRefListBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> NodeRefListBuilder<'a> {
    pub fn new(buffer: &'a mut Buffer) -> Result<Self> {
        Ok(NodeRefListBuilder {
            inner: Builder::new(buffer, ItemType::NodeRefList, ItemHeader::SIZE)?,
        })
    }

    pub fn within(parent: &'a mut Builder<'_>) -> Result<Self> {
        Ok(NodeRefListBuilder {
            inner: parent.nested(ItemType::NodeRefList, ItemHeader::SIZE)?,
        })
    }

    pub fn add_node_ref(&mut self, node_ref: NodeRef) -> Result<()> {
        self.inner.add_record(&node_ref)
    }

    /// Reference point `id` without a cached location
    pub fn add_node(&mut self, id: i64) -> Result<()> {
        self.add_node_ref(NodeRef::unresolved(id))
    }

    pub fn add_located_node(&mut self, id: i64, location: Location) -> Result<()> {
        self.add_node_ref(NodeRef::new(id, location))
    }

    pub fn offset(&self) -> usize {
        self.inner.offset()
    }

    pub fn finish(self) -> Result<usize> {
        self.inner.finish()
    }
}

/// Builds a [`MemberList`](crate::core::entity::MemberList) record
pub struct MemberListBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> MemberListBuilder<'a> {
    pub fn new(buffer: &'a mut Buffer) -> Result<Self> {
        Ok(MemberListBuilder {
            inner: Builder::new(buffer, ItemType::MemberList, ItemHeader::SIZE)?,
        })
    }

    pub fn within(parent: &'a mut Builder<'_>) -> Result<Self> {
        Ok(MemberListBuilder {
            inner: parent.nested(ItemType::MemberList, ItemHeader::SIZE)?,
        })
    }

    /// Append a member
    ///
    /// With `full` set, a verbatim copy of that entity record is stored
    /// after the role; its type must match `member_type`. Either the whole
    /// member is written or nothing is.
    pub fn add_member(
        &mut self,
        member_type: ItemType,
        id: i64,
        role: &str,
        full: Option<&Item<'_>>,
    ) -> Result<()> {
        if !member_type.is_entity() {
            return Err(MapbufError::InvalidItemType(member_type as u16));
        }
        if role.as_bytes().contains(&0) {
            return Err(MapbufError::EmbeddedNul(role.to_string()));
        }
        if let Some(item) = full {
            item.expect_type(member_type)?;
        }

        let role_length = role.len() + 1;
        let total = MemberHeader::SIZE
            + padded_length(role_length)
            + full.map_or(0, |item| item.byte_length());
        self.inner.reserve(total)?;

        let header = MemberHeader {
            id,
            member_type,
            full: full.is_some(),
            role_length: u32::try_from(role_length)
                .map_err(|_| MapbufError::RecordTooLarge(role_length))?,
        };
        self.inner.add_record(&header)?;
        self.inner.append_str(role)?;
        self.inner.align()?;
        if let Some(item) = full {
            self.inner.add_item(item)?;
        }

        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.inner.offset()
    }

    pub fn finish(self) -> Result<usize> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::GrowthPolicy;
    use crate::core::builder::PointBuilder;

    #[test]
    fn test_tag_list_builder() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = TagListBuilder::new(&mut buffer).unwrap();
        builder.add_tag("amenity", "cafe").unwrap();
        builder.add_tag("name", "").unwrap();
        let offset = builder.finish().unwrap();
        buffer.commit();

        let tags = buffer.get_tag_list(offset).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("amenity"), Some("cafe"));
        assert_eq!(tags.get("name"), Some(""));
    }

    #[test]
    fn test_tag_with_nul_is_rejected_whole() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = TagListBuilder::new(&mut buffer).unwrap();
        assert!(matches!(
            builder.add_tag("ok", "bad\0value"),
            Err(MapbufError::EmbeddedNul(_))
        ));
        let offset = builder.finish().unwrap();
        buffer.commit();

        assert!(buffer.get_tag_list(offset).unwrap().is_empty());
    }

    #[test]
    fn test_node_ref_list_builder() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = NodeRefListBuilder::new(&mut buffer).unwrap();
        builder.add_node(10).unwrap();
        builder
            .add_located_node(11, Location::new(8.5, 47.3))
            .unwrap();
        let offset = builder.finish().unwrap();
        buffer.commit();

        let nodes = buffer.get_node_ref_list(offset).unwrap();
        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(nodes.get(1).unwrap().location, Location::new(8.5, 47.3));
        assert_eq!(buffer.get(offset).unwrap().byte_length(), 8 + 2 * 16);
    }

    #[test]
    fn test_member_list_builder_with_full_member() {
        let mut source = Buffer::new(0, GrowthPolicy::Auto);
        let mut point = PointBuilder::new(&mut source, 7, Location::new(1.0, 1.0)).unwrap();
        point.add_tags([("name", "Fountain")]).unwrap();
        let point_offset = point.finish().unwrap();
        source.commit();
        let snapshot = source.get(point_offset).unwrap();

        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = MemberListBuilder::new(&mut buffer).unwrap();
        builder
            .add_member(ItemType::Path, 100, "outer", None)
            .unwrap();
        builder
            .add_member(ItemType::Point, 7, "label", Some(&snapshot))
            .unwrap();
        builder.add_member(ItemType::Path, 101, "", None).unwrap();
        let offset = builder.finish().unwrap();
        buffer.commit();

        let members: Vec<_> = buffer.get_member_list(offset).unwrap().iter().collect();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].role, "outer");
        assert!(members[0].full.is_none());
        assert_eq!(members[1].id, 7);
        assert_eq!(members[1].full.unwrap().as_bytes(), snapshot.as_bytes());
        assert_eq!(members[2].role, "");

        let copy = members[1].entity().unwrap().unwrap();
        assert_eq!(copy.id(), 7);
        assert_eq!(copy.tags().get("name"), Some("Fountain"));
    }

    #[test]
    fn test_member_type_must_match_full_copy() {
        let mut source = Buffer::new(0, GrowthPolicy::Auto);
        let point_offset = PointBuilder::new(&mut source, 1, Location::undefined())
            .unwrap()
            .finish()
            .unwrap();
        source.commit();
        let snapshot = source.get(point_offset).unwrap();

        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = MemberListBuilder::new(&mut buffer).unwrap();
        assert!(matches!(
            builder.add_member(ItemType::Path, 1, "x", Some(&snapshot)),
            Err(MapbufError::UnexpectedItemType { .. })
        ));
        assert!(matches!(
            builder.add_member(ItemType::TagList, 1, "x", None),
            Err(MapbufError::InvalidItemType(_))
        ));
        assert_eq!(builder.inner.size().unwrap(), ItemHeader::SIZE);
    }
}
