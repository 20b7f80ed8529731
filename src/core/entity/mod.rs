//! Map entities and their sub-lists
//!
//! Records are written by the builders in [`crate::core::builder`]; the types
//! here are checked read-only views over committed bytes. Every view validates
//! its record once on construction, so iteration afterwards cannot fail.
//!
//! ## Entity layouts
//!
//! ```text
//! Point:    [header 8][id i64][x i32][y i32][TagList]
//! Path:     [header 8][id i64][TagList][NodeRefList]
//! Relation: [header 8][id i64][TagList][MemberList]
//! ```
//!
//! Child lists are optional and may appear in any order.

mod location;

pub use location::{Location, COORDINATE_PRECISION};

use crate::core::error::{MapbufError, Result};
use crate::core::item::{
    padded_length, read_i64, read_u16, read_u32, Item, ItemHeader, ItemIter, ItemType, Record,
};

/// Header plus id plus location
pub const POINT_FIXED_SIZE: usize = ItemHeader::SIZE + 16;

/// Header plus id
pub const PATH_FIXED_SIZE: usize = ItemHeader::SIZE + 8;

/// Header plus id
pub const RELATION_FIXED_SIZE: usize = ItemHeader::SIZE + 8;

pub(crate) const ID_OFFSET: usize = ItemHeader::SIZE;
pub(crate) const LOCATION_OFFSET: usize = ItemHeader::SIZE + 8;

const MEMBER_FULL_FLAG: u16 = 0x0001;

/// Reference from a path to one of its points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    /// Id of the referenced point
    pub id: i64,
    /// Cached coordinate, undefined if not yet resolved
    pub location: Location,
}

impl NodeRef {
    pub fn new(id: i64, location: Location) -> Self {
        NodeRef { id, location }
    }

    /// Reference without a cached coordinate
    pub fn unresolved(id: i64) -> Self {
        NodeRef {
            id,
            location: Location::undefined(),
        }
    }
}

impl Record for NodeRef {
    const SIZE: usize = 16;

    fn write_to(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.id.to_le_bytes());
        self.location.write_to(&mut out[8..16]);
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        Ok(NodeRef {
            id: read_i64(bytes, 0)?,
            location: Location::read_from(bytes.get(8..).unwrap_or_default())?,
        })
    }
}

/// Fixed part of a relation member, followed by the role and an optional copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberHeader {
    pub id: i64,
    pub member_type: ItemType,
    pub full: bool,
    pub role_length: u32,
}

impl Record for MemberHeader {
    const SIZE: usize = 16;

    fn write_to(&self, out: &mut [u8]) {
        let flags = if self.full { MEMBER_FULL_FLAG } else { 0 };
        out[0..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..10].copy_from_slice(&(self.member_type as u16).to_le_bytes());
        out[10..12].copy_from_slice(&flags.to_le_bytes());
        out[12..16].copy_from_slice(&self.role_length.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        Ok(MemberHeader {
            id: read_i64(bytes, 0)?,
            member_type: ItemType::from_u16(read_u16(bytes, 8)?)?,
            full: read_u16(bytes, 10)? & MEMBER_FULL_FLAG != 0,
            role_length: read_u32(bytes, 12)?,
        })
    }
}

/// Split one NUL-terminated UTF-8 string off the front of `rest`
fn take_str<'a>(rest: &mut &'a [u8]) -> Option<&'a str> {
    let end = rest.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&rest[..end]).ok()?;
    *rest = &rest[end + 1..];
    Some(s)
}

/// Key/value attributes of an entity
#[derive(Debug, Clone, Copy, Default)]
pub struct TagList<'a> {
    content: &'a [u8],
}

impl<'a> TagList<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::TagList)?;
        let content = item.content();

        let mut rest = content;
        let mut strings = 0usize;
        while !rest.is_empty() {
            take_str(&mut rest).ok_or_else(|| {
                MapbufError::Corrupted("tag list holds an unterminated or non-UTF-8 string".into())
            })?;
            strings += 1;
        }
        if strings % 2 != 0 {
            return Err(MapbufError::Corrupted(
                "tag list holds a key without a value".into(),
            ));
        }

        Ok(TagList { content })
    }

    /// A list with no tags, used for entities without a tag list record
    pub fn empty() -> Self {
        TagList { content: &[] }
    }

    pub fn iter(&self) -> TagIter<'a> {
        TagIter { rest: self.content }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Value of the first tag with this key
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<'a> IntoIterator for TagList<'a> {
    type Item = (&'a str, &'a str);
    type IntoIter = TagIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over `(key, value)` pairs
#[derive(Debug, Clone)]
pub struct TagIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for TagIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let key = take_str(&mut self.rest)?;
        let value = take_str(&mut self.rest)?;
        Some((key, value))
    }
}

/// Ordered point references of a path
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeRefList<'a> {
    content: &'a [u8],
}

impl<'a> NodeRefList<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::NodeRefList)?;
        let content = item.content();

        if content.len() % NodeRef::SIZE != 0 {
            return Err(MapbufError::Corrupted(format!(
                "node reference list payload of {} bytes is not a multiple of {}",
                content.len(),
                NodeRef::SIZE
            )));
        }

        Ok(NodeRefList { content })
    }

    pub fn empty() -> Self {
        NodeRefList { content: &[] }
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeRef> + 'a {
        self.content
            .chunks_exact(NodeRef::SIZE)
            .filter_map(|chunk| NodeRef::read_from(chunk).ok())
    }

    pub fn len(&self) -> usize {
        self.content.len() / NodeRef::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeRef> {
        let start = index.checked_mul(NodeRef::SIZE)?;
        self.content
            .get(start..start + NodeRef::SIZE)
            .and_then(|chunk| NodeRef::read_from(chunk).ok())
    }

    /// First and last reference point at the same id
    pub fn is_closed(&self) -> bool {
        match (self.get(0), self.len().checked_sub(1).and_then(|i| self.get(i))) {
            (Some(first), Some(last)) => self.len() > 1 && first.id == last.id,
            _ => false,
        }
    }
}

/// One member of a relation
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub member_type: ItemType,
    pub id: i64,
    pub role: &'a str,
    /// Inlined copy of the member entity, if one was stored
    pub full: Option<Item<'a>>,
}

impl<'a> Member<'a> {
    /// Decode the inlined copy, if any
    pub fn entity(&self) -> Result<Option<Entity<'a>>> {
        self.full.map(Entity::from_item).transpose()
    }
}

fn corrupt_member(pos: usize, what: &str) -> MapbufError {
    MapbufError::Corrupted(format!("member at payload offset {}: {}", pos, what))
}

fn parse_member(content: &[u8], pos: usize) -> Result<(Member<'_>, usize)> {
    let fixed = content
        .get(pos..)
        .ok_or_else(|| corrupt_member(pos, "truncated"))?;
    let header = MemberHeader::read_from(fixed)?;

    let role_start = pos + MemberHeader::SIZE;
    let role_end = role_start + header.role_length as usize;
    let role_bytes = content
        .get(role_start..role_end)
        .ok_or_else(|| corrupt_member(pos, "role runs past the end of the list"))?;
    let role = match role_bytes.split_last() {
        Some((&0, text)) => std::str::from_utf8(text)
            .map_err(|_| corrupt_member(pos, "role is not valid UTF-8"))?,
        _ => return Err(corrupt_member(pos, "role is not NUL-terminated")),
    };

    let mut next = padded_length(role_end);
    if next > content.len() {
        return Err(corrupt_member(pos, "missing role padding"));
    }

    let full = if header.full {
        let item = Item::parse(&content[next..])?.expect_type(header.member_type)?;
        next += item.byte_length();
        Some(item)
    } else {
        None
    };

    let member = Member {
        member_type: header.member_type,
        id: header.id,
        role,
        full,
    };
    Ok((member, next))
}

/// Members of a relation
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberList<'a> {
    content: &'a [u8],
}

impl<'a> MemberList<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::MemberList)?;
        let content = item.content();

        let mut pos = 0;
        while pos < content.len() {
            let (_, next) = parse_member(content, pos)?;
            pos = next;
        }

        Ok(MemberList { content })
    }

    pub fn empty() -> Self {
        MemberList { content: &[] }
    }

    pub fn iter(&self) -> MemberIter<'a> {
        MemberIter {
            content: self.content,
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MemberIter<'a> {
    content: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for MemberIter<'a> {
    type Item = Member<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.content.len() {
            return None;
        }
        let (member, next) = parse_member(self.content, self.pos).ok()?;
        self.pos = next;
        Some(member)
    }
}

/// Child records between the fixed part and the end of an entity
fn children<'a>(item: &Item<'a>, fixed_size: usize) -> Result<ItemIter<'a>> {
    let end = item.header().content_end();
    if end < fixed_size {
        return Err(MapbufError::Corrupted(format!(
            "{:?} record of {} bytes is shorter than its fixed part",
            item.item_type(),
            end
        )));
    }
    Ok(ItemIter::new(&item.as_bytes()[fixed_size..end]))
}

fn unexpected_child(expected: ItemType, found: ItemType) -> MapbufError {
    MapbufError::UnexpectedItemType { expected, found }
}

/// A located map point
#[derive(Debug, Clone, Copy)]
pub struct Point<'a> {
    item: Item<'a>,
    id: i64,
    location: Location,
    tags: TagList<'a>,
}

impl<'a> Point<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::Point)?;
        let mut tags = TagList::empty();

        for child in children(&item, POINT_FIXED_SIZE)? {
            let (_, child) = child?;
            match child.item_type() {
                ItemType::TagList => tags = TagList::from_item(child)?,
                other => return Err(unexpected_child(ItemType::TagList, other)),
            }
        }

        let bytes = item.as_bytes();
        Ok(Point {
            item,
            id: read_i64(bytes, ID_OFFSET)?,
            location: Location::read_from(&bytes[LOCATION_OFFSET..])?,
            tags,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn tags(&self) -> TagList<'a> {
        self.tags
    }

    pub fn item(&self) -> Item<'a> {
        self.item
    }
}

/// An ordered sequence of point references
#[derive(Debug, Clone, Copy)]
pub struct Path<'a> {
    item: Item<'a>,
    id: i64,
    tags: TagList<'a>,
    nodes: NodeRefList<'a>,
}

impl<'a> Path<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::Path)?;
        let mut tags = TagList::empty();
        let mut nodes = NodeRefList::empty();

        for child in children(&item, PATH_FIXED_SIZE)? {
            let (_, child) = child?;
            match child.item_type() {
                ItemType::TagList => tags = TagList::from_item(child)?,
                ItemType::NodeRefList => nodes = NodeRefList::from_item(child)?,
                other => return Err(unexpected_child(ItemType::NodeRefList, other)),
            }
        }

        Ok(Path {
            item,
            id: read_i64(item.as_bytes(), ID_OFFSET)?,
            tags,
            nodes,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn tags(&self) -> TagList<'a> {
        self.tags
    }

    pub fn nodes(&self) -> NodeRefList<'a> {
        self.nodes
    }

    pub fn item(&self) -> Item<'a> {
        self.item
    }
}

/// A group of member entities with roles
#[derive(Debug, Clone, Copy)]
pub struct Relation<'a> {
    item: Item<'a>,
    id: i64,
    tags: TagList<'a>,
    members: MemberList<'a>,
}

impl<'a> Relation<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        let item = item.expect_type(ItemType::Relation)?;
        let mut tags = TagList::empty();
        let mut members = MemberList::empty();

        for child in children(&item, RELATION_FIXED_SIZE)? {
            let (_, child) = child?;
            match child.item_type() {
                ItemType::TagList => tags = TagList::from_item(child)?,
                ItemType::MemberList => members = MemberList::from_item(child)?,
                other => return Err(unexpected_child(ItemType::MemberList, other)),
            }
        }

        Ok(Relation {
            item,
            id: read_i64(item.as_bytes(), ID_OFFSET)?,
            tags,
            members,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn tags(&self) -> TagList<'a> {
        self.tags
    }

    pub fn members(&self) -> MemberList<'a> {
        self.members
    }

    pub fn item(&self) -> Item<'a> {
        self.item
    }
}

/// Any of the three entity kinds
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Point(Point<'a>),
    Path(Path<'a>),
    Relation(Relation<'a>),
}

impl<'a> Entity<'a> {
    pub fn from_item(item: Item<'a>) -> Result<Self> {
        match item.item_type() {
            ItemType::Point => Point::from_item(item).map(Entity::Point),
            ItemType::Path => Path::from_item(item).map(Entity::Path),
            ItemType::Relation => Relation::from_item(item).map(Entity::Relation),
            other => Err(MapbufError::Corrupted(format!(
                "{:?} record is not an entity",
                other
            ))),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Point(p) => p.id(),
            Entity::Path(p) => p.id(),
            Entity::Relation(r) => r.id(),
        }
    }

    pub fn tags(&self) -> TagList<'a> {
        match self {
            Entity::Point(p) => p.tags(),
            Entity::Path(p) => p.tags(),
            Entity::Relation(r) => r.tags(),
        }
    }

    pub fn item(&self) -> Item<'a> {
        match self {
            Entity::Point(p) => p.item(),
            Entity::Path(p) => p.item(),
            Entity::Relation(r) => r.item(),
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item().item_type()
    }
}
