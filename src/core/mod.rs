//! Core footprint processing modules

pub mod grouping;
pub mod corners;
pub mod polygon;
pub mod estimate;

// Re-export main types
pub use grouping::{FlightLineGroup, ProjectGroups, ProjectLayout, partition_projects, group_flight_lines};
pub use corners::{
    FootprintCalculator, FootprintParams, FootprintBatch, GroupFootprints, PhotoFootprint,
    HeadingSource, Quadrant, PhotoRadius,
};
pub use polygon::{footprint_polygon, batch_polygons, to_feature_collection, write_geojson};
pub use estimate::{PhotoCenter, MissingFrameEstimator, estimate_scale, parse_exposure_number};
