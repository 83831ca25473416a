//! Export GeoJSON de la carte courante (parcelle stylée + marqueur)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::BoundingRect;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};

use crate::map::MapFrame;

/// Exporte la carte courante en GeoJSON; retourne le nombre de features écrites
pub fn export_frame(frame: &MapFrame<'_>, output_path: &Path) -> Result<usize> {
    let collection = frame_collection(frame);

    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, &collection)
        .context("Failed to serialize GeoJSON")?;
    writer.flush()?;

    Ok(collection.features.len())
}

/// Construit la FeatureCollection de la carte courante
///
/// Les features de la parcelle reçoivent les propriétés de style
/// (simplestyle: `fill`, `stroke`...), le marqueur devient une feature Point.
pub fn frame_collection(frame: &MapFrame<'_>) -> FeatureCollection {
    let style = frame.style;
    let mut features = Vec::new();

    if let Some(parcel) = frame.parcel {
        for feature in &parcel.collection.features {
            let mut feature = feature.clone();
            let properties = feature.properties.get_or_insert_with(JsonObject::new);
            properties.insert("parcel_id".into(), JsonValue::from(parcel.id.as_str()));
            properties.insert("fill".into(), JsonValue::from(style.fill_color.as_str()));
            properties.insert("fill-opacity".into(), JsonValue::from(style.fill_opacity));
            properties.insert("stroke".into(), JsonValue::from(style.line_color.as_str()));
            properties.insert("stroke-width".into(), JsonValue::from(style.line_width));
            features.push(feature);
        }
    }

    if let Some(marker) = frame.marker {
        let mut properties = JsonObject::new();
        properties.insert("role".into(), JsonValue::from("marker"));
        properties.insert("marker-color".into(), JsonValue::from(style.marker_color.as_str()));
        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![marker.lon, marker.lat]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    // Emprise: parcelle, sinon marqueur seul
    let bbox = frame
        .parcel
        .and_then(|p| p.bounding_rect())
        .or_else(|| frame.marker.map(|m| m.to_point().bounding_rect()))
        .map(|rect| vec![rect.min().x, rect.min().y, rect.max().x, rect.max().y]);

    let mut crs = JsonObject::new();
    crs.insert(
        "crs".into(),
        serde_json::json!({"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::4326"}}),
    );

    FeatureCollection {
        bbox,
        features,
        foreign_members: Some(crs),
    }
}
