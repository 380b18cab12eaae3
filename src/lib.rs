//! apsi-footprints: footprint corners for archival aerial photography
//!
//! Computes the ground footprint of each photo in a flight line from its
//! center, photo scale and neighbouring exposures, and reads and writes the
//! tab-separated photo-center files exchanged with photogrammetry software.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    GeoPoint, PhotoRecord, FlightLineKey, CornerSet, FootprintError, FootprintResult,
    CORNER_FIELDS,
};

pub use crate::core::{FootprintCalculator, FootprintParams, FootprintBatch};
pub use io::{PhotoCenterFile, RecordTable};
