//! Top-level entity builders

use super::list::{MemberListBuilder, NodeRefListBuilder, TagListBuilder};
use super::Builder;
use crate::core::buffer::Buffer;
use crate::core::entity::{
    Location, NodeRef, ID_OFFSET, LOCATION_OFFSET, PATH_FIXED_SIZE, POINT_FIXED_SIZE,
    RELATION_FIXED_SIZE,
};
use crate::core::error::{MapbufError, Result};
use crate::core::item::{Item, ItemType, Record};

/// Open a tag list under `parent` and fill it from `tags`
fn write_tags<I, K, V>(parent: &mut Builder<'_>, tags: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut list = TagListBuilder::within(parent)?;
    for (key, value) in tags {
        list.add_tag(key.as_ref(), value.as_ref())?;
    }
    list.finish()?;
    Ok(())
}

/// Builds a Point record
pub struct PointBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> PointBuilder<'a> {
    pub fn new(buffer: &'a mut Buffer, id: i64, location: Location) -> Result<Self> {
        let mut inner = Builder::new(buffer, ItemType::Point, POINT_FIXED_SIZE)?;
        inner.write_fixed(ID_OFFSET, &id.to_le_bytes());

        let mut raw = [0u8; Location::SIZE];
        location.write_to(&mut raw);
        inner.write_fixed(LOCATION_OFFSET, &raw);

        Ok(PointBuilder { inner })
    }

    /// Open the point's tag list
    pub fn tags(&mut self) -> Result<TagListBuilder<'_>> {
        TagListBuilder::within(&mut self.inner)
    }

    /// Attach a complete tag list in one call
    pub fn add_tags<I, K, V>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        write_tags(&mut self.inner, tags)
    }

    pub fn offset(&self) -> usize {
        self.inner.offset()
    }

    pub fn finish(self) -> Result<usize> {
        self.inner.finish()
    }
}

/// Builds a Path record
pub struct PathBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> PathBuilder<'a> {
    pub fn new(buffer: &'a mut Buffer, id: i64) -> Result<Self> {
        let mut inner = Builder::new(buffer, ItemType::Path, PATH_FIXED_SIZE)?;
        inner.write_fixed(ID_OFFSET, &id.to_le_bytes());
        Ok(PathBuilder { inner })
    }

    pub fn tags(&mut self) -> Result<TagListBuilder<'_>> {
        TagListBuilder::within(&mut self.inner)
    }

    pub fn add_tags<I, K, V>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        write_tags(&mut self.inner, tags)
    }

    /// Open the path's node reference list
    pub fn nodes(&mut self) -> Result<NodeRefListBuilder<'_>> {
        NodeRefListBuilder::within(&mut self.inner)
    }

    /// Attach a complete node reference list in one call
    pub fn add_nodes<I>(&mut self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let mut list = self.nodes()?;
        for node in nodes {
            list.add_node_ref(node)?;
        }
        list.finish()?;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.inner.offset()
    }

    pub fn finish(self) -> Result<usize> {
        self.inner.finish()
    }
}

/// Builds a Relation record
pub struct RelationBuilder<'a> {
    inner: Builder<'a>,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(buffer: &'a mut Buffer, id: i64) -> Result<Self> {
        let mut inner = Builder::new(buffer, ItemType::Relation, RELATION_FIXED_SIZE)?;
        inner.write_fixed(ID_OFFSET, &id.to_le_bytes());
        Ok(RelationBuilder { inner })
    }

    pub fn tags(&mut self) -> Result<TagListBuilder<'_>> {
        TagListBuilder::within(&mut self.inner)
    }

    pub fn add_tags<I, K, V>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        write_tags(&mut self.inner, tags)
    }

    /// Open the relation's member list
    pub fn members(&mut self) -> Result<MemberListBuilder<'_>> {
        MemberListBuilder::within(&mut self.inner)
    }

    /// Copy an already built tag or member list into this relation
    pub fn add_item(&mut self, item: &Item<'_>) -> Result<()> {
        match item.item_type() {
            ItemType::TagList | ItemType::MemberList => self.inner.add_item(item),
            found => Err(MapbufError::UnexpectedItemType {
                expected: ItemType::MemberList,
                found,
            }),
        }
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
    use crate::core::entity::Entity;

    #[test]
    fn test_point_builder() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut point = PointBuilder::new(&mut buffer, -3, Location::new(13.4, 52.5)).unwrap();
        point
            .add_tags([("amenity", "bench"), ("backrest", "yes")])
            .unwrap();
        let offset = point.finish().unwrap();
        buffer.commit();

        let point = buffer.get_point(offset).unwrap();
        assert_eq!(point.id(), -3);
        assert_eq!(point.location(), Location::new(13.4, 52.5));
        assert_eq!(point.tags().get("backrest"), Some("yes"));
        assert_eq!(point.item().byte_length(), buffer.committed());
    }

    #[test]
    fn test_path_builder_children_in_any_order() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut path = PathBuilder::new(&mut buffer, 99).unwrap();
        path.add_nodes([NodeRef::unresolved(1), NodeRef::unresolved(2), NodeRef::unresolved(1)])
            .unwrap();
        {
            let mut tags = path.tags().unwrap();
            tags.add_tag("area", "yes").unwrap();
            tags.finish().unwrap();
        }
        let offset = path.finish().unwrap();
        buffer.commit();

        let path = buffer.get_path(offset).unwrap();
        assert_eq!(path.id(), 99);
        assert_eq!(path.nodes().len(), 3);
        assert!(path.nodes().is_closed());
        assert!(path.tags().has_key("area"));
    }

    #[test]
    fn test_relation_builder_with_inlined_member() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut way = PathBuilder::new(&mut buffer, 5).unwrap();
        way.add_nodes([NodeRef::new(1, Location::new(0.0, 0.0))])
            .unwrap();
        let way_offset = way.finish().unwrap();
        buffer.commit();

        let way_copy = buffer.get(way_offset).unwrap().as_bytes().to_vec();
        let way_item = crate::core::item::Item::parse(&way_copy).unwrap();

        let mut relation = RelationBuilder::new(&mut buffer, 1000).unwrap();
        relation.add_tags([("type", "multipolygon")]).unwrap();
        {
            let mut members = relation.members().unwrap();
            members
                .add_member(ItemType::Path, 5, "outer", Some(&way_item))
                .unwrap();
            members
                .add_member(ItemType::Point, 8, "admin_centre", None)
                .unwrap();
            members.finish().unwrap();
        }
        let offset = relation.finish().unwrap();
        buffer.commit();

        let relation = buffer.get_relation(offset).unwrap();
        assert_eq!(relation.tags().get("type"), Some("multipolygon"));
        let members: Vec<_> = relation.members().iter().collect();
        assert_eq!(members.len(), 2);
        match members[0].entity().unwrap() {
            Some(Entity::Path(p)) => assert_eq!(p.nodes().len(), 1),
            other => panic!("expected inlined path, got {:?}", other),
        }
        assert!(members[1].full.is_none());
    }

    #[test]
    fn test_records_scan_in_order() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        for id in 0..4 {
            PointBuilder::new(&mut buffer, id, Location::undefined())
                .unwrap()
                .finish()
                .unwrap();
            buffer.commit();
        }

        let ids: Vec<i64> = buffer
            .items()
            .map(|item| Entity::from_item(item.unwrap().1).unwrap().id())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_relation_add_item_accepts_lists_only() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let point_offset = PointBuilder::new(&mut buffer, 4, Location::new(1.0, 1.0))
            .unwrap()
            .finish()
            .unwrap();
        let mut list = TagListBuilder::new(&mut buffer).unwrap();
        list.add_tag("type", "route").unwrap();
        let tags_offset = list.finish().unwrap();
        buffer.commit();

        let tags = buffer.get(tags_offset).unwrap().as_bytes().to_vec();
        let point = buffer.get(point_offset).unwrap().as_bytes().to_vec();
        let tags = Item::parse(&tags).unwrap();
        let point = Item::parse(&point).unwrap();

        let mut relation = RelationBuilder::new(&mut buffer, 77).unwrap();
        let before = buffer_written(&relation);
        assert!(matches!(
            relation.add_item(&point),
            Err(MapbufError::UnexpectedItemType {
                found: ItemType::Point,
                ..
            })
        ));
        assert_eq!(buffer_written(&relation), before);
        relation.add_item(&tags).unwrap();
        let offset = relation.finish().unwrap();
        buffer.commit();

        let relation = buffer.get_relation(offset).unwrap();
        assert_eq!(relation.tags().get("type"), Some("route"));
        assert!(relation.members().is_empty());
    }

    fn buffer_written(relation: &RelationBuilder<'_>) -> usize {
        relation.inner.buffer().written()
    }
}
