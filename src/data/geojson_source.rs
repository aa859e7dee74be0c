//! User-supplied line features from GeoJSON files.

use std::fs;
use std::io;
use std::path::Path;

use ::geojson::{GeoJson, Geometry, Value};
use tracing::info;

use super::{AreaSelectable, FeatureSource};
use crate::area::EarthArea;
use crate::error::{StoreError, StoreResult};
use crate::feature::{AttributeNamed, AttributeValue, Feature};
use crate::geo::GeographicLocation;

/// Line source over a GeoJSON document held in memory.
///
/// Every line string, polygon ring and point becomes one feature. Feature
/// properties become attributes; the attribute names are the union of all
/// property keys in order of first appearance, and features missing a key
/// get an empty text value.
#[derive(Debug)]
pub struct GeoJsonFeatureSource {
    all: Vec<Feature>,
    attribute_names: Vec<String>,
    area: EarthArea,
    features: Vec<Feature>,
}

impl GeoJsonFeatureSource {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io(e),
        })?;
        let source = Self::from_bytes(bytes)?;
        info!(path = %path.display(), features = source.all.len(), "loaded GeoJSON features");
        Ok(source)
    }

    pub fn from_bytes(mut bytes: Vec<u8>) -> StoreResult<Self> {
        let geojson: GeoJson =
            simd_json::serde::from_slice(&mut bytes).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(Self::from_geojson(&geojson))
    }

    pub fn from_geojson(geojson: &GeoJson) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut raw: Vec<(Vec<GeographicLocation>, Vec<(usize, AttributeValue)>)> = Vec::new();

        let mut add = |geometry: &Geometry, properties: Option<&::geojson::JsonObject>| {
            let mut values = Vec::new();
            for (key, value) in properties.into_iter().flatten() {
                let index = match names.iter().position(|n| n == key) {
                    Some(i) => i,
                    None => {
                        names.push(key.clone());
                        names.len() - 1
                    }
                };
                let value = if let Some(v) = value.as_i64() {
                    AttributeValue::Int(v)
                } else if let Some(v) = value.as_f64() {
                    AttributeValue::Float(v)
                } else if let Some(v) = value.as_str() {
                    AttributeValue::Text(v.to_string())
                } else if let Some(v) = value.as_bool() {
                    AttributeValue::Int(i64::from(v))
                } else {
                    AttributeValue::Text(value.to_string())
                };
                values.push((index, value));
            }
            geometry_lines(geometry, &mut |line| raw.push((line, values.clone())));
        };

        match geojson {
            GeoJson::FeatureCollection(fc) => {
                for feature in &fc.features {
                    if let Some(ref geometry) = feature.geometry {
                        add(geometry, feature.properties.as_ref());
                    }
                }
            }
            GeoJson::Feature(f) => {
                if let Some(ref geometry) = f.geometry {
                    add(geometry, f.properties.as_ref());
                }
            }
            GeoJson::Geometry(geometry) => add(geometry, None),
        }

        let all = raw
            .into_iter()
            .map(|(points, values)| {
                let mut attributes = vec![AttributeValue::Text(String::new()); names.len()];
                for (index, value) in values {
                    attributes[index] = value;
                }
                Feature::with_attributes(points, attributes)
            })
            .collect();

        let mut source = Self {
            all,
            attribute_names: names,
            area: EarthArea::new(),
            features: Vec::new(),
        };
        source.filter_into(&EarthArea::world());
        source
    }

    fn filter_into(&mut self, area: &EarthArea) {
        self.features = self.all.iter().flat_map(|f| f.filter(area)).collect();
        self.area = area.clone();
    }
}

/// Extract point runs from a geometry, positions being `[lon, lat]`.
fn geometry_lines<F>(geometry: &Geometry, add_line: &mut F)
where
    F: FnMut(Vec<GeographicLocation>),
{
    let run = |coords: &[Vec<f64>]| -> Vec<GeographicLocation> {
        coords
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| GeographicLocation::new(c[1], c[0]))
            .collect()
    };

    match &geometry.value {
        Value::Point(coords) => {
            if coords.len() >= 2 {
                add_line(vec![GeographicLocation::new(coords[1], coords[0])]);
            }
        }
        Value::MultiPoint(points) => {
            for coords in points.iter().filter(|c| c.len() >= 2) {
                add_line(vec![GeographicLocation::new(coords[1], coords[0])]);
            }
        }
        Value::LineString(coords) => add_line(run(coords)),
        Value::MultiLineString(lines) => {
            for coords in lines {
                add_line(run(coords));
            }
        }
        Value::Polygon(rings) => {
            for ring in rings {
                add_line(run(ring));
            }
        }
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                for ring in rings {
                    add_line(run(ring));
                }
            }
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                geometry_lines(g, add_line);
            }
        }
    }
}

impl AreaSelectable for GeoJsonFeatureSource {
    fn select(&mut self, area: &EarthArea) -> StoreResult<()> {
        self.filter_into(area);
        Ok(())
    }

    fn area(&self) -> &EarthArea {
        &self.area
    }
}

impl FeatureSource for GeoJsonFeatureSource {
    fn features(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl AttributeNamed for GeoJsonFeatureSource {
    fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }
}
