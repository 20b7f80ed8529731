//! # mapbuf - Binary Object Model for Map Data
//!
//! `mapbuf` stores map entities (points, paths and relations with their
//! tags) as self-describing records in one append-only buffer, and maps
//! entity ids to values such as coordinates through dense, directly
//! addressed arrays that can be dumped to disk and reopened.
//!
//! - **Buffer**: growable heap or fixed memory-mapped storage with a
//!   separate commit boundary, so half-built records are never visible
//! - **Builders**: nested, borrow-checked record construction that keeps
//!   every enclosing record's length current
//! - **Dense indexes**: heap, memory-map and file backings behind one trait,
//!   sharing a headerless on-disk array format
//!
//! ## Quick Start
//!
//! ```rust
//! use mapbuf::{Buffer, DenseIndex, DenseMemArray, GrowthPolicy, Location, PointBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut buffer = Buffer::new(4096, GrowthPolicy::Auto);
//!
//! let mut point = PointBuilder::new(&mut buffer, 17, Location::new(13.37, 52.52))?;
//! point.add_tags([("amenity", "cafe")])?;
//! let offset = point.finish()?;
//! buffer.commit();
//!
//! let mut locations = DenseMemArray::new();
//! for record in buffer.items() {
//!     let (_, item) = record?;
//!     let point = mapbuf::core::entity::Point::from_item(item)?;
//!     locations.set(point.id() as u64, point.location())?;
//! }
//!
//! assert_eq!(locations.get(17)?, Location::new(13.37, 52.52));
//! assert!(locations.get(18).unwrap_err().is_not_found());
//! assert_eq!(buffer.get_point(offset)?.tags().get("amenity"), Some("cafe"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod geom;
pub mod pool;

pub use crate::config::{BufferConfig, Config, IndexConfig, PoolConfig};
pub use crate::core::{
    buffer::{Buffer, GrowthPolicy},
    builder::{
        MemberListBuilder, NodeRefListBuilder, PathBuilder, PointBuilder, RelationBuilder,
        TagListBuilder,
    },
    entity::{Entity, Location, NodeRef},
    error::{MapbufError, Result},
    index::{
        create_index, open_index, DenseFileArray, DenseIndex, DenseMemArray, DenseMmapArray,
        IndexBacking, IndexValue,
    },
    item::{Item, ItemType},
};
pub use crate::pool::{Pool, TaskHandle};
