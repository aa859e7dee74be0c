//! Grouping of leveled polygons into fillable groups.
//!
//! A group is a land polygon together with every lake, island and pond
//! nested inside it. Groups are emitted outermost level first, each one
//! followed by a sentinel, which is the shape the winding assembler fills.

use crate::feature::{unwrapped_lons, PolygonFeature};
use crate::geo::GeographicLocation;

struct Ring {
    lons: Vec<f64>,
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

impl Ring {
    fn new(points: &[GeographicLocation]) -> Self {
        let lons = unwrapped_lons(points);
        let (mut west, mut east) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut south, mut north) = (f64::INFINITY, f64::NEG_INFINITY);
        for (lon, p) in lons.iter().zip(points) {
            west = west.min(*lon);
            east = east.max(*lon);
            south = south.min(p.lat);
            north = north.max(p.lat);
        }
        Self {
            lons,
            west,
            east,
            south,
            north,
        }
    }

    fn extent(&self) -> f64 {
        (self.east - self.west) * (self.north - self.south)
    }

    /// Shift a longitude by whole turns into this ring's unwrapped range
    fn align(&self, lon: f64) -> f64 {
        let mut lon = lon;
        while lon < self.west {
            lon += 360.0;
        }
        while lon > self.east {
            lon -= 360.0;
        }
        lon
    }

    fn contains(&self, points: &[GeographicLocation], loc: &GeographicLocation) -> bool {
        if loc.lat < self.south || loc.lat > self.north {
            return false;
        }
        let x = self.align(loc.lon);
        if x < self.west || x > self.east {
            return false;
        }

        // Even-odd ray cast in unwrapped lon/lat space
        let n = points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.lons[i], points[i].lat);
            let (xj, yj) = (self.lons[j], points[j].lat);
            if (yi > loc.lat) != (yj > loc.lat) {
                let cross = xi + (loc.lat - yi) * (xj - xi) / (yj - yi);
                if x < cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Arrange polygons into sentinel-terminated groups.
///
/// Each polygon's parent is the tightest polygon one level up whose ring
/// contains the polygon's first point. Polygons whose parent was not
/// selected start their own group. Sentinels in the input are ignored.
pub fn group(polygons: Vec<PolygonFeature>) -> Vec<PolygonFeature> {
    let polygons: Vec<PolygonFeature> = polygons.into_iter().filter(|p| !p.is_sentinel()).collect();
    let rings: Vec<Ring> = polygons.iter().map(|p| Ring::new(p.points())).collect();

    let mut parent: Vec<Option<usize>> = vec![None; polygons.len()];
    for (i, poly) in polygons.iter().enumerate() {
        let Some(parent_level) = poly.level().parent() else {
            continue;
        };
        let sample = &poly.points()[0];
        let mut best: Option<(usize, f64)> = None;
        for (j, candidate) in polygons.iter().enumerate() {
            if j == i || candidate.level() != parent_level || candidate.points().len() < 3 {
                continue;
            }
            if !rings[j].contains(candidate.points(), sample) {
                continue;
            }
            let extent = rings[j].extent();
            if best.map_or(true, |(_, e)| extent < e) {
                best = Some((j, extent));
            }
        }
        parent[i] = best.map(|(j, _)| j);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); polygons.len()];
    for (i, p) in parent.iter().enumerate() {
        if let Some(p) = p {
            children[*p].push(i);
        }
    }

    let mut out = Vec::with_capacity(polygons.len() * 2);
    for root in (0..polygons.len()).filter(|&i| parent[i].is_none()) {
        // Breadth first keeps each group in level order
        let mut queue = std::collections::VecDeque::from([root]);
        while let Some(i) = queue.pop_front() {
            out.push(polygons[i].clone());
            queue.extend(children[i].iter().copied());
        }
        out.push(PolygonFeature::sentinel());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, PolygonLevel};

    fn square(lat: f64, lon: f64, size: f64, level: PolygonLevel) -> PolygonFeature {
        PolygonFeature::new(
            Feature::new(vec![
                GeographicLocation::new(lat, lon),
                GeographicLocation::new(lat, lon + size),
                GeographicLocation::new(lat + size, lon + size),
                GeographicLocation::new(lat + size, lon),
            ]),
            level,
        )
    }

    fn levels(grouped: &[PolygonFeature]) -> Vec<Option<i32>> {
        grouped
            .iter()
            .map(|p| (!p.is_sentinel()).then(|| p.level().code()))
            .collect()
    }

    #[test]
    fn test_nested_levels_form_one_group() {
        let grouped = group(vec![
            square(3.0, 3.0, 1.0, PolygonLevel::IslandInLake),
            square(0.0, 0.0, 10.0, PolygonLevel::Land),
            square(2.0, 2.0, 4.0, PolygonLevel::Lake),
        ]);
        assert_eq!(levels(&grouped), vec![Some(1), Some(2), Some(3), None]);
    }

    #[test]
    fn test_separate_islands_are_separate_groups() {
        let grouped = group(vec![
            square(0.0, 0.0, 5.0, PolygonLevel::Land),
            square(20.0, 20.0, 5.0, PolygonLevel::Land),
            square(21.0, 21.0, 1.0, PolygonLevel::Lake),
        ]);
        assert_eq!(levels(&grouped), vec![Some(1), None, Some(1), Some(2), None]);
    }

    #[test]
    fn test_tightest_parent_wins() {
        let grouped = group(vec![
            square(0.0, 0.0, 30.0, PolygonLevel::Lake),
            square(10.0, 10.0, 5.0, PolygonLevel::Lake),
            square(11.0, 11.0, 1.0, PolygonLevel::IslandInLake),
        ]);
        // The big lake stands alone; the island joins the small lake
        assert_eq!(levels(&grouped), vec![Some(2), None, Some(2), Some(3), None]);
    }

    #[test]
    fn test_ring_across_antimeridian_contains() {
        let ring_points = vec![
            GeographicLocation::new(0.0, 175.0),
            GeographicLocation::new(0.0, -175.0),
            GeographicLocation::new(10.0, -175.0),
            GeographicLocation::new(10.0, 175.0),
        ];
        let ring = Ring::new(&ring_points);
        assert!(ring.contains(&ring_points, &GeographicLocation::new(5.0, 179.0)));
        assert!(ring.contains(&ring_points, &GeographicLocation::new(5.0, -178.0)));
        assert!(!ring.contains(&ring_points, &GeographicLocation::new(5.0, 170.0)));
    }
}
