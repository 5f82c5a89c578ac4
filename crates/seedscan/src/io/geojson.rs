use std::{marker::PhantomData, path::Path};

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::Ellipse,
    error::Result,
    types::{AnalysisResult, CalibrationResult, ExclusionReason, SeedMeasurement, ShapeClass},
};

/// Vertices used to draw each fitted ellipse
const OUTLINE_VERTICES: usize = 64;

/// Properties attached to each seed feature
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[schemars(description = "Properties of one measured seed")]
pub struct SeedProperties {
    #[schemars(description = "Seed id, following centroid order")]
    pub id: u32,
    #[schemars(description = "Major axis length in millimetres")]
    pub length_mm: f64,
    #[schemars(description = "Minor axis length in millimetres")]
    pub width_mm: f64,
    pub aspect_ratio: f64,
    pub area_mm2: f64,
    pub orientation_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Set when the plausibility filter dropped the seed")]
    pub excluded: Option<ExclusionReason>,
}

impl SeedProperties {
    fn new(m: &SeedMeasurement, shape: Option<ShapeClass>, excluded: Option<ExclusionReason>) -> Self {
        Self {
            id: m.id,
            length_mm: m.major_axis_mm,
            width_mm: m.minor_axis_mm,
            aspect_ratio: m.aspect_ratio,
            area_mm2: m.area_mm2,
            orientation_deg: m.orientation_deg,
            shape,
            excluded,
        }
    }
}

/// A GeoJSON feature whose properties deserialize into `P`
#[derive(Serialize, Deserialize, Debug)]
pub struct TypedFeature<P> {
    #[serde(flatten)]
    pub feature: Feature,
    #[serde(skip)]
    _properties: PhantomData<P>,
}

impl<P> TypedFeature<P>
where
    for<'de> P: Serialize + Deserialize<'de>,
{
    pub fn new(geometry: Option<Geometry>, properties: P) -> Self {
        let feature = Feature {
            bbox: None,
            geometry,
            id: None,
            properties: serde_json::to_value(properties).ok().and_then(|v| v.as_object().cloned()),
            foreign_members: None,
        };
        Self {
            feature,
            _properties: PhantomData,
        }
    }

    /// Wrap an untyped feature
    pub fn from_feature(feature: Feature) -> Self {
        Self {
            feature,
            _properties: PhantomData,
        }
    }

    /// Typed view of the feature's properties
    pub fn properties(&self) -> Option<P> {
        self.feature
            .properties
            .as_ref()
            .and_then(|p| serde_json::from_value(serde_json::Value::Object(p.clone())).ok())
    }
}

/// Closed polygon ring of the fitted ellipse, in image pixel coordinates
fn ellipse_geometry(m: &SeedMeasurement, calibration: &CalibrationResult) -> Geometry {
    let ellipse = Ellipse {
        center: m.center_px,
        major_axis: m.major_axis_mm * calibration.pixels_per_mm,
        minor_axis: m.minor_axis_mm * calibration.pixels_per_mm,
        angle: m.orientation_deg.to_radians(),
    };
    let mut ring: Vec<Vec<f64>> = ellipse
        .sample_boundary(OUTLINE_VERTICES)
        .into_iter()
        .map(|[x, y]| vec![x, y])
        .collect();
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    Geometry::new(Value::Polygon(vec![ring]))
}

impl AnalysisResult {
    /// Seeds and excluded seeds as typed polygon features
    pub fn to_typed_features(&self) -> Vec<TypedFeature<SeedProperties>> {
        let kept = self.seeds.iter().map(|s| {
            (
                &s.measurement,
                SeedProperties::new(&s.measurement, Some(s.shape), None),
            )
        });
        let excluded = self.excluded.iter().map(|e| {
            (
                &e.measurement,
                SeedProperties::new(&e.measurement, None, Some(e.reason)),
            )
        });

        kept.chain(excluded)
            .map(|(m, properties)| {
                let mut typed = TypedFeature::new(Some(ellipse_geometry(m, &self.calibration)), properties);
                typed.feature.id = Some(geojson::feature::Id::Number(m.id.into()));
                typed
            })
            .collect()
    }

    /// Export to a GeoJSON feature collection with image metadata as foreign
    /// members
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let features = self.to_typed_features().into_iter().map(|t| t.feature).collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert("image_width".to_string(), self.image_width.into());
        foreign_members.insert("image_height".to_string(), self.image_height.into());
        foreign_members.insert("seed_count".to_string(), self.seeds.len().into());
        foreign_members.insert(
            "pixels_per_mm".to_string(),
            serde_json::to_value(self.calibration.pixels_per_mm)?,
        );

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    /// Export to GeoJSON and serialize to JSON string
    pub fn to_geojson_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_geojson()?)?)
    }

    /// Save GeoJSON to file
    pub fn save_geojson(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}

/// Read seed properties back from a GeoJSON document
pub fn read_seed_properties(geojson: &str) -> Result<Vec<SeedProperties>> {
    let collection: FeatureCollection = geojson.parse()?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(|f| TypedFeature::<SeedProperties>::from_feature(f).properties())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisSummary, ClassifiedSeed, ExcludedSeed};

    fn measurement(id: u32, major: f64, minor: f64) -> SeedMeasurement {
        SeedMeasurement {
            id,
            center_px: [100.0, 80.0],
            major_axis_mm: major,
            minor_axis_mm: minor,
            area_mm2: std::f64::consts::PI * major * minor / 4.0,
            aspect_ratio: major / minor,
            orientation_deg: 0.0,
        }
    }

    fn result() -> AnalysisResult {
        AnalysisResult {
            calibration: CalibrationResult {
                pixels_per_mm: 20.0,
                grid_lines_detected: 40,
                horizontal_lines: 20,
                vertical_lines: 20,
                horizontal_spacing_px: 20.0,
                vertical_spacing_px: 20.0,
                confidence: 1.0,
            },
            seeds: vec![ClassifiedSeed {
                measurement: measurement(1, 3.0, 2.0),
                shape: ShapeClass::Oval,
            }],
            summary: AnalysisSummary::default(),
            excluded: vec![ExcludedSeed {
                measurement: measurement(2, 7.0, 3.0),
                reason: ExclusionReason::TooLong,
            }],
            skipped_regions: 0,
            image_width: 400,
            image_height: 300,
            processing_time_ms: 12,
        }
    }

    #[test]
    fn features_carry_typed_properties() {
        let collection = result().to_geojson().unwrap();
        assert_eq!(collection.features.len(), 2);

        let members = collection.foreign_members.as_ref().unwrap();
        assert_eq!(members["image_width"], 400);
        assert_eq!(members["seed_count"], 1);

        let first = TypedFeature::<SeedProperties>::from_feature(collection.features[0].clone());
        let props = first.properties().unwrap();
        assert_eq!(props.id, 1);
        assert_eq!(props.shape, Some(ShapeClass::Oval));
        assert_eq!(props.excluded, None);
        assert_eq!(collection.features[1].properties.as_ref().unwrap()["excluded"], "too_long");
    }

    #[test]
    fn outline_is_a_closed_ellipse_ring() {
        let collection = result().to_geojson().unwrap();
        let Some(Value::Polygon(rings)) = collection.features[0].geometry.as_ref().map(|g| &g.value) else {
            panic!("expected polygon geometry");
        };
        let ring = &rings[0];
        assert_eq!(ring.len(), OUTLINE_VERTICES + 1);
        assert_eq!(ring.first(), ring.last());
        // 3 mm major axis at 20 px/mm along x
        assert!((ring[0][0] - 130.0).abs() < 1e-9);
        assert!((ring[0][1] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn saved_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.geojson");
        result().save_geojson(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let props = read_seed_properties(&text).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[1].excluded, Some(ExclusionReason::TooLong));
        assert_eq!(props[1].length_mm, 7.0);
    }
}
