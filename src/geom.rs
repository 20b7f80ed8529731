//! Boundary to geometry back ends
//!
//! A back end implements [`GeometryFactory`]; this module supplies the
//! coordinates. Path node references usually carry no cached location, so
//! [`resolve_locations`] looks them up in a location index first.

use crate::core::entity::{Location, NodeRefList, Path, Point};
use crate::core::error::{MapbufError, Result};
use crate::core::index::DenseIndex;
use std::fmt::Write as _;
use thiserror::Error;

/// Failures of the built-in [`WktFactory`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("location {0} is undefined or out of range")]
    InvalidLocation(Location),

    #[error("linestring needs at least two distinct points, got {0}")]
    TooFewPoints(usize),
}

/// Produces geometries from locations
///
/// Implementations report their own failures through
/// [`MapbufError::geometry`].
pub trait GeometryFactory {
    type Point;
    type LineString;

    fn make_point(&self, location: Location) -> Result<Self::Point>;

    fn make_linestring(&self, locations: &[Location]) -> Result<Self::LineString>;

    fn point_geometry(&self, point: &Point<'_>) -> Result<Self::Point> {
        self.make_point(point.location())
    }

    /// Linestring of a path, looking up uncached node locations in `index`
    fn path_geometry(
        &self,
        path: &Path<'_>,
        index: &dyn DenseIndex<Location>,
    ) -> Result<Self::LineString> {
        let locations = resolve_locations(path.nodes(), index)?;
        self.make_linestring(&locations)
    }
}

/// Location of every node reference, in order
///
/// Cached locations are used as is; the rest come from `index`. A node that
/// is in neither fails with [`MapbufError::NotFound`].
pub fn resolve_locations(
    nodes: NodeRefList<'_>,
    index: &dyn DenseIndex<Location>,
) -> Result<Vec<Location>> {
    nodes
        .iter()
        .map(|node| {
            if node.location.is_defined() {
                return Ok(node.location);
            }
            let id = u64::try_from(node.id).map_err(|_| MapbufError::NotFound(node.id as u64))?;
            index.get(id)
        })
        .collect()
}

/// Renders geometries as WKT text
#[derive(Debug, Clone, Copy, Default)]
pub struct WktFactory;

impl WktFactory {
    fn coordinates(out: &mut String, location: Location) -> Result<()> {
        match (location.is_valid(), location.lon(), location.lat()) {
            (true, Some(lon), Some(lat)) => {
                // Writing to a String cannot fail
                let _ = write!(out, "{} {}", lon, lat);
                Ok(())
            }
            _ => Err(MapbufError::geometry(GeometryError::InvalidLocation(location))),
        }
    }
}

impl GeometryFactory for WktFactory {
    type Point = String;
    type LineString = String;

    fn make_point(&self, location: Location) -> Result<String> {
        let mut wkt = String::from("POINT(");
        Self::coordinates(&mut wkt, location)?;
        wkt.push(')');
        Ok(wkt)
    }

    /// Consecutive duplicate locations are written once
    fn make_linestring(&self, locations: &[Location]) -> Result<String> {
        let mut unique = locations.to_vec();
        unique.dedup();
        if unique.len() < 2 {
            return Err(MapbufError::geometry(GeometryError::TooFewPoints(
                unique.len(),
            )));
        }

        let mut wkt = String::from("LINESTRING(");
        for (i, location) in unique.into_iter().enumerate() {
            if i > 0 {
                wkt.push(',');
            }
            Self::coordinates(&mut wkt, location)?;
        }
        wkt.push(')');
        Ok(wkt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::{Buffer, GrowthPolicy};
    use crate::core::builder::{PathBuilder, PointBuilder};
    use crate::core::entity::NodeRef;
    use crate::core::index::DenseMemArray;

    #[test]
    fn test_point_wkt() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let offset = PointBuilder::new(&mut buffer, 1, Location::new(1.5, -2.25))
            .unwrap()
            .finish()
            .unwrap();
        buffer.commit();

        let point = buffer.get_point(offset).unwrap();
        assert_eq!(WktFactory.point_geometry(&point).unwrap(), "POINT(1.5 -2.25)");
    }

    #[test]
    fn test_undefined_point_is_geometry_error() {
        let err = WktFactory.make_point(Location::undefined()).unwrap_err();
        assert!(matches!(err, MapbufError::Geometry(_)));
        assert!(err.to_string().contains("Geometry construction failed"));
    }

    #[test]
    fn test_path_geometry_resolves_from_index() {
        let mut index = DenseMemArray::new();
        index.set(1, Location::new(0.0, 0.0)).unwrap();
        index.set(2, Location::new(1.0, 0.0)).unwrap();

        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut path = PathBuilder::new(&mut buffer, 10).unwrap();
        path.add_nodes([
            NodeRef::unresolved(1),
            NodeRef::unresolved(2),
            NodeRef::new(3, Location::new(1.0, 1.0)),
        ])
        .unwrap();
        let offset = path.finish().unwrap();
        buffer.commit();

        let path = buffer.get_path(offset).unwrap();
        assert_eq!(
            WktFactory.path_geometry(&path, &index).unwrap(),
            "LINESTRING(0 0,1 0,1 1)"
        );
    }

    #[test]
    fn test_missing_node_is_not_found() {
        let index = DenseMemArray::<Location>::new();
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut path = PathBuilder::new(&mut buffer, 10).unwrap();
        path.add_nodes([NodeRef::unresolved(4)]).unwrap();
        let offset = path.finish().unwrap();
        buffer.commit();

        let nodes = buffer.get_path(offset).unwrap().nodes();
        assert!(matches!(
            resolve_locations(nodes, &index),
            Err(MapbufError::NotFound(4))
        ));
    }

    #[test]
    fn test_degenerate_linestring() {
        let same = Location::new(3.0, 3.0);
        let err = WktFactory.make_linestring(&[same, same]).unwrap_err();
        assert!(matches!(err, MapbufError::Geometry(_)));
    }
}
