//! Tile payloads and the feature query surface they expose.

use geo::Intersects;
use geo_types::{Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::geo::Point;
use crate::prelude::HashMap;

/// Features grouped by source-layer name
pub type FeatureMap = HashMap<String, Vec<Feature>>;

/// A single map feature as returned by queries
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<Value>,
    pub source_layer: String,
    pub properties: Map<String, Value>,
    /// Geometry in tile-local extent coordinates
    pub geometry: Geometry<f64>,
}

impl Feature {
    pub fn new(source_layer: impl Into<String>, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: None,
            source_layer: source_layer.into(),
            properties: Map::new(),
            geometry: geometry.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Property equality filter applied by both query kinds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub equals: BTreeMap<String, Value>,
}

impl PropertyFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut equals = BTreeMap::new();
        equals.insert(key.into(), value.into());
        Self { equals }
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| feature.properties.get(key) == Some(expected))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedQueryOptions {
    /// Restrict results to these source layers
    pub layers: Option<Vec<String>>,
    pub filter: Option<PropertyFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQueryOptions {
    pub source_layers: Option<Vec<String>>,
    pub filter: Option<PropertyFilter>,
}

fn layer_selected(selection: &Option<Vec<String>>, layer: &str) -> bool {
    selection
        .as_ref()
        .map_or(true, |layers| layers.iter().any(|name| name == layer))
}

fn filter_passes(filter: &Option<PropertyFilter>, feature: &Feature) -> bool {
    filter.as_ref().map_or(true, |filter| filter.matches(feature))
}

/// Builds the query shape from tile-local points: a point, a closed ring or a line.
pub fn query_geometry(points: &[Point]) -> Option<Geometry<f64>> {
    match points {
        [] => None,
        [single] => Some(Geometry::Point(geo_types::Point::new(single.x, single.y))),
        [first, .., last] if points.len() >= 4 && first == last => {
            let ring: LineString<f64> = points.iter().map(|p| (p.x, p.y)).collect();
            Some(Geometry::Polygon(Polygon::new(ring, vec![])))
        }
        _ => Some(Geometry::LineString(
            points.iter().map(|p| (p.x, p.y)).collect(),
        )),
    }
}

/// Parsed content owned by a loaded tile.
///
/// Implementations decide how features are stored; the manager only routes
/// queries to them.
pub trait TileContent: Send + Sync + fmt::Debug {
    /// Appends features intersecting `geometry` (tile-local coordinates).
    fn query_rendered_features(
        &self,
        geometry: &Geometry<f64>,
        options: &RenderedQueryOptions,
        result: &mut FeatureMap,
    );

    /// Appends every feature accepted by `options`.
    fn query_source_features(&self, options: &SourceQueryOptions, result: &mut Vec<Feature>);

    fn feature_count(&self) -> usize {
        0
    }
}

/// In-memory feature content grouped by source layer
#[derive(Debug, Clone, Default)]
pub struct FeatureTile {
    layers: BTreeMap<String, Vec<Feature>>,
}

impl FeatureTile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.add_feature(feature);
        self
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.layers
            .entry(feature.source_layer.clone())
            .or_default()
            .push(feature);
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}

impl TileContent for FeatureTile {
    fn query_rendered_features(
        &self,
        geometry: &Geometry<f64>,
        options: &RenderedQueryOptions,
        result: &mut FeatureMap,
    ) {
        for (layer, features) in &self.layers {
            if !layer_selected(&options.layers, layer) {
                continue;
            }
            let hits: Vec<Feature> = features
                .iter()
                .filter(|feature| filter_passes(&options.filter, feature))
                .filter(|feature| feature.geometry.intersects(geometry))
                .cloned()
                .collect();
            if !hits.is_empty() {
                result.entry(layer.clone()).or_default().extend(hits);
            }
        }
    }

    fn query_source_features(&self, options: &SourceQueryOptions, result: &mut Vec<Feature>) {
        for (layer, features) in &self.layers {
            if !layer_selected(&options.source_layers, layer) {
                continue;
            }
            result.extend(
                features
                    .iter()
                    .filter(|feature| filter_passes(&options.filter, feature))
                    .cloned(),
            );
        }
    }

    fn feature_count(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }
}
