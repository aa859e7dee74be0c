use std::sync::Arc;

use crate::area::EarthArea;
use crate::geo::GeographicLocation;

/// A single attribute value attached to a feature.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Sources that publish names for the positional attributes of their
/// features.
pub trait AttributeNamed {
    fn attribute_names(&self) -> &[String];

    fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attribute_names().iter().position(|n| n == name)
    }
}

/// An ordered run of geographic points with attributes.
///
/// Points and attributes are shared immutably, so a feature placed in a
/// cache can be handed to many readers without copying. Anything that
/// changes geometry (area filtering) builds new point vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    points: Arc<[GeographicLocation]>,
    attributes: Arc<[AttributeValue]>,
}

impl Feature {
    pub fn new(points: Vec<GeographicLocation>) -> Self {
        Self {
            points: points.into(),
            attributes: Arc::from(Vec::new()),
        }
    }

    pub fn with_attributes(points: Vec<GeographicLocation>, attributes: Vec<AttributeValue>) -> Self {
        Self {
            points: points.into(),
            attributes: attributes.into(),
        }
    }

    #[inline(always)]
    pub fn points(&self) -> &[GeographicLocation] {
        &self.points
    }

    /// Shared handle on the point sequence; identifies this geometry for
    /// projected path caching.
    pub fn shared_points(&self) -> &Arc<[GeographicLocation]> {
        &self.points
    }

    pub fn attributes(&self) -> &[AttributeValue] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Split this feature against an area.
    ///
    /// Every segment with at least one endpoint inside the area is kept;
    /// runs of kept segments become separate features, so a line that
    /// leaves the area and comes back yields two pieces. A single-point
    /// feature is kept whole when its point is inside. Attributes are
    /// carried over to every piece.
    pub fn filter(&self, area: &EarthArea) -> Vec<Feature> {
        let mut pieces = Vec::new();
        let points = self.points();

        if points.len() == 1 {
            if area.contains(&points[0]) {
                pieces.push(self.clone());
            }
            return pieces;
        }

        let mut current: Option<Vec<GeographicLocation>> = None;
        let mut contains_prev = points.first().is_some_and(|p| area.contains(p));

        for pair in points.windows(2) {
            let contains_next = area.contains(&pair[1]);
            if contains_prev || contains_next {
                current
                    .get_or_insert_with(|| vec![pair[0]])
                    .push(pair[1]);
            } else if let Some(run) = current.take() {
                pieces.push(self.piece(run));
            }
            contains_prev = contains_next;
        }

        if let Some(run) = current {
            pieces.push(self.piece(run));
        }
        pieces
    }

    /// This ring wound as `winding` in lon/lat space. A ring that already
    /// matches, or has no orientation, is returned as is and keeps its
    /// shared points.
    pub fn oriented(self, winding: Winding) -> Feature {
        match ring_orientation(self.points()) {
            Some(actual) if actual != winding => {
                let mut points = self.points().to_vec();
                points.reverse();
                Feature {
                    points: points.into(),
                    attributes: self.attributes,
                }
            }
            _ => self,
        }
    }

    fn piece(&self, points: Vec<GeographicLocation>) -> Feature {
        Feature {
            points: points.into(),
            attributes: Arc::clone(&self.attributes),
        }
    }
}

/// Nesting level of a polygon in a land/water hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolygonLevel {
    Land = 1,
    Lake = 2,
    IslandInLake = 3,
    PondInIsland = 4,
}

impl PolygonLevel {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(PolygonLevel::Land),
            2 => Some(PolygonLevel::Lake),
            3 => Some(PolygonLevel::IslandInLake),
            4 => Some(PolygonLevel::PondInIsland),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_land(self) -> bool {
        matches!(self, PolygonLevel::Land | PolygonLevel::IslandInLake)
    }

    /// The level directly enclosing this one
    pub fn parent(self) -> Option<Self> {
        Self::from_code(self.code() - 1)
    }

    /// Solid levels wind counter-clockwise, holes clockwise.
    pub fn winding(self) -> Winding {
        if self.is_land() {
            Winding::CounterClockwise
        } else {
            Winding::Clockwise
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Winding {
    Clockwise,
    CounterClockwise,
}

/// A closed ring with a winding tag and hierarchy level.
/// A polygon without points is a group separator, see [`PolygonFeature::sentinel`].
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonFeature {
    feature: Feature,
    winding: Winding,
    level: PolygonLevel,
}

impl PolygonFeature {
    /// Build a polygon for a level, reversing the ring if needed so its
    /// orientation in lon/lat space matches the level's winding.
    pub fn new(feature: Feature, level: PolygonLevel) -> Self {
        Self::with_winding(feature, level, level.winding())
    }

    pub fn with_winding(feature: Feature, level: PolygonLevel, winding: Winding) -> Self {
        Self {
            feature: feature.oriented(winding),
            winding,
            level,
        }
    }

    /// Zero-length marker closing a polygon group
    pub fn sentinel() -> Self {
        Self {
            feature: Feature::new(Vec::new()),
            winding: Winding::Clockwise,
            level: PolygonLevel::Land,
        }
    }

    #[inline(always)]
    pub fn is_sentinel(&self) -> bool {
        self.feature.is_empty()
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn points(&self) -> &[GeographicLocation] {
        self.feature.points()
    }

    pub fn winding(&self) -> Winding {
        self.winding
    }

    pub fn level(&self) -> PolygonLevel {
        self.level
    }
}

/// Longitudes of a ring unwrapped relative to its first point so rings
/// crossing the antimeridian stay contiguous.
pub(crate) fn unwrapped_lons(points: &[GeographicLocation]) -> Vec<f64> {
    let mut lons = Vec::with_capacity(points.len());
    let mut prev: Option<f64> = None;
    for p in points {
        let lon = match prev {
            None => p.lon,
            Some(last) => {
                let mut d = p.lon - last;
                if d > 180.0 {
                    d -= 360.0;
                } else if d < -180.0 {
                    d += 360.0;
                }
                last + d
            }
        };
        lons.push(lon);
        prev = Some(lon);
    }
    lons
}

/// Orientation of a ring from its signed shoelace area in (lon, lat).
pub(crate) fn ring_orientation(points: &[GeographicLocation]) -> Option<Winding> {
    if points.len() < 3 {
        return None;
    }
    let lons = unwrapped_lons(points);
    let n = points.len();
    let mut twice_area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += lons[i] * points[j].lat - lons[j] * points[i].lat;
    }
    if twice_area > 0.0 {
        Some(Winding::CounterClockwise)
    } else if twice_area < 0.0 {
        Some(Winding::Clockwise)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> Feature {
        Feature::new(
            coords
                .iter()
                .map(|&(lat, lon)| GeographicLocation::new(lat, lon))
                .collect(),
        )
    }

    #[test]
    fn test_filter_keeps_inside_segments() {
        let area = EarthArea::from_bounds(0.0, 0.0, 1.0, 1.0);
        let feature = line(&[(0.5, -1.5), (0.5, 0.5), (0.5, 1.5), (0.5, 2.5)]);
        let pieces = feature.filter(&area);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].len(), 3);
    }

    #[test]
    fn test_filter_splits_on_reentry() {
        let area = EarthArea::from_bounds(0.0, 0.0, 1.0, 1.0);
        let feature = line(&[
            (0.5, 0.5),
            (0.5, 3.5),
            (0.5, 5.5),
            (0.5, 7.5),
            (0.5, 0.2),
        ]);
        let pieces = feature.filter(&area);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].points(), &feature.points()[0..2]);
        assert_eq!(pieces[1].points(), &feature.points()[3..5]);
    }

    #[test]
    fn test_filter_never_fabricates_points() {
        let area = EarthArea::from_bounds(0.0, 0.0, 2.0, 2.0);
        let feature = line(&[
            (0.5, 0.5),
            (1.5, 1.5),
            (5.5, 5.5),
            (6.5, 6.5),
            (1.5, 0.5),
            (0.5, 1.5),
            (8.5, 8.5),
        ]);
        let pieces = feature.filter(&area);
        let mut joined: Vec<GeographicLocation> = Vec::new();
        for piece in &pieces {
            for p in piece.points() {
                if joined.last() != Some(p) {
                    joined.push(*p);
                }
            }
        }
        // Concatenation is a subsequence of the original
        let mut it = feature.points().iter();
        for p in &joined {
            assert!(it.any(|q| q == p));
        }
    }

    #[test]
    fn test_filter_outside_is_empty() {
        let area = EarthArea::from_bounds(0.0, 0.0, 1.0, 1.0);
        let feature = line(&[(40.5, 40.5), (41.5, 41.5)]);
        assert!(feature.filter(&area).is_empty());
    }

    #[test]
    fn test_filter_does_not_alias_source() {
        let area = EarthArea::world();
        let feature = line(&[(0.5, 0.5), (1.5, 1.5)]);
        let pieces = feature.filter(&area);
        assert!(!Arc::ptr_eq(pieces[0].shared_points(), feature.shared_points()));
    }

    #[test]
    fn test_polygon_winding_is_enforced() {
        // Counter-clockwise square in lon/lat
        let ccw = line(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert_eq!(ring_orientation(ccw.points()), Some(Winding::CounterClockwise));

        let lake = PolygonFeature::new(ccw.clone(), PolygonLevel::Lake);
        assert_eq!(lake.winding(), Winding::Clockwise);
        assert_eq!(ring_orientation(lake.points()), Some(Winding::Clockwise));

        let land = PolygonFeature::new(ccw.clone(), PolygonLevel::Land);
        assert_eq!(land.points(), ccw.points());
    }

    #[test]
    fn test_matching_ring_keeps_shared_points() {
        let cw = line(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let same = cw.clone().oriented(Winding::Clockwise);
        assert!(Arc::ptr_eq(same.shared_points(), cw.shared_points()));

        let lake = PolygonFeature::new(same, PolygonLevel::Lake);
        assert!(Arc::ptr_eq(lake.feature().shared_points(), cw.shared_points()));

        let flipped = cw.clone().oriented(Winding::CounterClockwise);
        assert_eq!(flipped.points()[0], cw.points()[3]);
    }

    #[test]
    fn test_sentinel() {
        assert!(PolygonFeature::sentinel().is_sentinel());
        let poly = PolygonFeature::new(line(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]), PolygonLevel::Land);
        assert!(!poly.is_sentinel());
    }

    #[test]
    fn test_level_hierarchy() {
        assert_eq!(PolygonLevel::from_code(3), Some(PolygonLevel::IslandInLake));
        assert_eq!(PolygonLevel::IslandInLake.parent(), Some(PolygonLevel::Lake));
        assert_eq!(PolygonLevel::Land.parent(), None);
        assert!(PolygonLevel::IslandInLake.is_land());
        assert_eq!(PolygonLevel::from_code(9), None);
    }
}
