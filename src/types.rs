use serde::{Deserialize, Serialize};

/// Geographic point in decimal degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Build a point from radian coordinates
    pub fn from_radians(lon: f64, lat: f64) -> Self {
        Self {
            lon: lon.to_degrees(),
            lat: lat.to_degrees(),
        }
    }
}

/// One exposure in the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub project: String,
    pub roll: String,
    pub flight_line: String,
    pub exposure: i64,
    pub longitude: f64,
    pub latitude: f64,
    /// Denominator of the representative fraction (1:scale)
    pub scale: Option<f64>,
    /// Remaining archival fields, passed through unchanged
    pub attributes: Vec<(String, String)>,
}

impl PhotoRecord {
    /// Create a record without pass-through attributes
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        project: impl Into<String>,
        roll: impl Into<String>,
        flight_line: impl Into<String>,
        exposure: i64,
        longitude: f64,
        latitude: f64,
        scale: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            project: project.into(),
            roll: roll.into(),
            flight_line: flight_line.into(),
            exposure,
            longitude,
            latitude,
            scale,
            attributes: Vec::new(),
        }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }

    pub fn flight_line_key(&self) -> FlightLineKey {
        FlightLineKey {
            project: self.project.clone(),
            roll: self.roll.clone(),
            flight_line: self.flight_line.clone(),
        }
    }
}

/// Identifies all records flown on one path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightLineKey {
    pub project: String,
    pub roll: String,
    pub flight_line: String,
}

impl std::fmt::Display for FlightLineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/roll {}/line {}", self.project, self.roll, self.flight_line)
    }
}

/// Four footprint corners, labelled relative to the direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub ur: GeoPoint,
    pub ul: GeoPoint,
    pub ll: GeoPoint,
    pub lr: GeoPoint,
}

impl CornerSet {
    /// Corners in ring order UR, UL, LL, LR
    pub fn ring(&self) -> [GeoPoint; 4] {
        [self.ur, self.ul, self.ll, self.lr]
    }

    /// Flattened as UR_LON, UR_LAT, UL_LON, UL_LAT, LL_LON, LL_LAT, LR_LON, LR_LAT
    pub fn to_fields(&self) -> [f64; 8] {
        [
            self.ur.lon, self.ur.lat,
            self.ul.lon, self.ul.lat,
            self.ll.lon, self.ll.lat,
            self.lr.lon, self.lr.lat,
        ]
    }
}

/// Column names of the corner attributes, in [`CornerSet::to_fields`] order
pub const CORNER_FIELDS: [&str; 8] = [
    "UR_LON", "UR_LAT", "UL_LON", "UL_LAT", "LL_LON", "LL_LAT", "LR_LON", "LR_LAT",
];

/// Error types for footprint processing
#[derive(Debug, thiserror::Error)]
pub enum FootprintError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for footprint operations
pub type FootprintResult<T> = Result<T, FootprintError>;
