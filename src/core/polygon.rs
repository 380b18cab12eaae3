use crate::core::corners::{FootprintBatch, PhotoFootprint};
use crate::types::{CornerSet, FootprintResult};
use geo_types::{Coord, LineString, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;

/// Closed footprint ring UR -> UL -> LL -> LR -> UR
pub fn footprint_polygon(corners: &CornerSet) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = corners
        .ring()
        .iter()
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Footprint polygons of a batch, paired with their record ids
pub fn batch_polygons(batch: &FootprintBatch) -> Vec<(String, Polygon<f64>)> {
    batch
        .footprints()
        .map(|f| (f.id.clone(), footprint_polygon(&f.corners)))
        .collect()
}

fn footprint_feature(footprint: &PhotoFootprint) -> Feature {
    let polygon = footprint_polygon(&footprint.corners);

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(footprint.id));
    properties.insert("exposure".to_string(), json!(footprint.exposure));
    properties.insert("heading_deg".to_string(), json!(footprint.heading.to_degrees()));
    properties.insert(
        "heading_source".to_string(),
        json!(format!("{:?}", footprint.heading_source)),
    );
    properties.insert("quadrant".to_string(), json!(footprint.quadrant.index()));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&polygon))),
        id: Some(geojson::feature::Id::String(footprint.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// GeoJSON feature collection with one polygon per photo
pub fn to_feature_collection(batch: &FootprintBatch) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: batch.footprints().map(footprint_feature).collect(),
        foreign_members: None,
    }
}

/// Write the batch as a GeoJSON file
pub fn write_geojson<P: AsRef<std::path::Path>>(batch: &FootprintBatch, path: P) -> FootprintResult<()> {
    log::info!("Writing footprint polygons: {}", path.as_ref().display());
    let file = std::fs::File::create(path.as_ref())?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &to_feature_collection(batch))?;
    Ok(())
}
