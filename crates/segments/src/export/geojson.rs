//! GeoJSON serialization of exported features
//!
//! NaN attributes become `null`. When the CRS has an EPSG code it is
//! written as a legacy named `crs` member so GIS tools pick it up.

use geojson::{feature::Id, GeoJson, Geometry, JsonObject, JsonValue};
use streamnet_core::vector::{AttributeValue, Feature, FeatureCollection};
use streamnet_core::{Error, Result, CRS};

fn attribute_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(v) => JsonValue::Bool(*v),
        AttributeValue::Int(v) => JsonValue::from(*v),
        // Non-finite floats have no JSON form and map to null
        AttributeValue::Float(v) => JsonValue::from(*v),
        AttributeValue::String(v) => JsonValue::String(v.clone()),
    }
}

fn feature_json(feature: &Feature) -> geojson::Feature {
    let properties: JsonObject = feature
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), attribute_json(value)))
        .collect();
    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|geometry| Geometry::new(geojson::Value::from(geometry))),
        id: feature.id.map(|id| Id::Number(id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Convert features to a GeoJSON feature collection
pub fn to_geojson(features: &FeatureCollection, crs: Option<&CRS>) -> geojson::FeatureCollection {
    let foreign_members = crs.and_then(CRS::epsg).map(|code| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", code) },
            }),
        );
        members
    });
    geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(feature_json).collect(),
        foreign_members,
    }
}

/// Serialize features as a GeoJSON string
pub fn to_geojson_string(features: &FeatureCollection, crs: Option<&CRS>, pretty: bool) -> Result<String> {
    let geojson = GeoJson::FeatureCollection(to_geojson(features, crs));
    if pretty {
        serde_json::to_string_pretty(&geojson).map_err(|e| Error::Other(e.to_string()))
    } else {
        Ok(geojson.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point};

    fn sample() -> FeatureCollection {
        let mut outlet = Feature::new(Point::new(25.0, 5.0).into()).with_id(3);
        outlet.set_property("npixels", 25_i64);
        outlet.set_property("relief", f64::NAN);
        outlet.set_property("burned", true);

        let line: LineString<f64> = vec![(0.0, 0.0), (10.0, 10.0)].into();
        let mut segment = Feature::new(line.into()).with_id(1);
        segment.set_property("name", "head");
        [outlet, segment].into_iter().collect()
    }

    #[test]
    fn test_types_and_nan() {
        let collection = to_geojson(&sample(), None);
        assert_eq!(collection.features.len(), 2);
        assert!(collection.foreign_members.is_none());

        let outlet = &collection.features[0];
        assert_eq!(outlet.id, Some(Id::Number(3.into())));
        let props = outlet.properties.as_ref().unwrap();
        assert_eq!(props["npixels"], JsonValue::from(25));
        assert!(props["npixels"].is_i64());
        assert_eq!(props["relief"], JsonValue::Null);
        assert_eq!(props["burned"], JsonValue::Bool(true));
    }

    #[test]
    fn test_epsg_crs_member() {
        let crs = CRS::from_epsg(32611);
        let text = to_geojson_string(&sample(), Some(&crs), false).unwrap();
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(
            parsed["crs"]["properties"]["name"],
            "urn:ogc:def:crs:EPSG::32611"
        );
        assert_eq!(parsed["features"][1]["geometry"]["type"], "LineString");
        assert_eq!(parsed["features"][1]["properties"]["name"], "head");
    }

    #[test]
    fn test_pretty_output_parses() {
        let text = to_geojson_string(&sample(), None, true).unwrap();
        assert!(text.contains('\n'));
        let parsed: GeoJson = text.parse().unwrap();
        assert!(matches!(parsed, GeoJson::FeatureCollection(_)));
    }
}
