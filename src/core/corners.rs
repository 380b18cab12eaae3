use crate::core::grouping::{group_flight_lines, FlightLineGroup};
use crate::types::{
    CornerSet, FlightLineKey, FootprintError, FootprintResult, GeoPoint, PhotoRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, SQRT_2};
use std::path::Path;

/// Centimetres per inch
const CM_PER_INCH: f64 = 2.54;

/// Footprint computation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintParams {
    /// Edge length of the square film frame in inches
    pub film_size_in: f64,
    /// Largest exposure-number step for which a local heading is trusted
    pub max_exposure_gap: i64,
    /// Neighbour distance limit, in multiples of the photo half-width
    pub distance_factor: f64,
}

impl Default for FootprintParams {
    fn default() -> Self {
        Self {
            film_size_in: 9.0,     // 9" x 9" aerial film
            max_exposure_gap: 1,   // adjacent frames only
            distance_factor: 2.0,  // one photo width
        }
    }
}

impl FootprintParams {
    /// Parse parameters from TOML text; absent keys keep their defaults
    pub fn from_toml_str(text: &str) -> FootprintResult<Self> {
        let params: FootprintParams = toml::from_str(text)
            .map_err(|e| FootprintError::Config(format!("Invalid footprint parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> FootprintResult<Self> {
        log::info!("Reading footprint parameters: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> FootprintResult<()> {
        if !(self.film_size_in.is_finite() && self.film_size_in > 0.0) {
            return Err(FootprintError::Config(format!(
                "film_size_in must be positive, got {}",
                self.film_size_in
            )));
        }
        if !(self.distance_factor.is_finite() && self.distance_factor > 0.0) {
            return Err(FootprintError::Config(format!(
                "distance_factor must be positive, got {}",
                self.distance_factor
            )));
        }
        Ok(())
    }
}

/// Metres per degree of latitude at the given latitude (radians).
///
/// Fixed empirical series; changing it alters every archived footprint.
pub fn arc_length_at_latitude(lat_rad: f64) -> f64 {
    111132.92 - 559.82 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
}

/// Ground width in metres covered by a square film frame at the given scale
pub fn photo_ground_width(scale: f64, film_size_in: f64) -> f64 {
    film_size_in * CM_PER_INCH * scale / 100.0
}

/// Angular half-width and half-diagonal of one photo, in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoRadius {
    pub half_width: f64,
    pub half_diagonal: f64,
}

impl PhotoRadius {
    pub fn new(scale: f64, lat_rad: f64, film_size_in: f64) -> Self {
        let width = photo_ground_width(scale, film_size_in);
        let half_width = ((width / arc_length_at_latitude(lat_rad)) / 2.0).to_radians();
        Self {
            half_width,
            half_diagonal: SQRT_2 * half_width,
        }
    }
}

/// Angle of the vector from `to` back to `from`, both (lon, lat) in radians.
///
/// Every archived footprint was produced with this orientation.
pub fn heading_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    (from.1 - to.1).atan2(from.0 - to.0)
}

fn planar_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// 90 degree sector holding the first corner's angle (heading + 45 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Q0,
    Q1,
    Q2,
    Q3,
}

/// Indices into the rotated corners for UR, UL, LL, LR, per quadrant
const LABEL_ROTATION: [[usize; 4]; 4] = [
    [0, 1, 2, 3],
    [3, 0, 1, 2],
    [2, 3, 0, 1],
    [1, 2, 3, 0],
];

impl Quadrant {
    /// Sector of an arbitrary angle in radians; periodic in 2π
    pub fn from_angle(angle: f64) -> Self {
        match ((angle / FRAC_PI_2).floor() as i64).rem_euclid(4) {
            0 => Quadrant::Q0,
            1 => Quadrant::Q1,
            2 => Quadrant::Q2,
            _ => Quadrant::Q3,
        }
    }

    /// Sector used to label the corners of a photo flown at `heading`
    pub fn from_heading(heading: f64) -> Self {
        Self::from_angle(heading + FRAC_PI_4)
    }

    pub fn index(self) -> usize {
        match self {
            Quadrant::Q0 => 0,
            Quadrant::Q1 => 1,
            Quadrant::Q2 => 2,
            Quadrant::Q3 => 3,
        }
    }

    /// Positions in the rotated corner list for UR, UL, LL and LR
    pub fn label_order(self) -> [usize; 4] {
        LABEL_ROTATION[self.index()]
    }

    /// Assign UR/UL/LL/LR to corners given in rotation order
    pub fn label(self, rotated: &[GeoPoint; 4]) -> CornerSet {
        let [ur, ul, ll, lr] = self.label_order();
        CornerSet {
            ur: rotated[ur],
            ul: rotated[ul],
            ll: rotated[ll],
            lr: rotated[lr],
        }
    }
}

/// Corners at heading + 45, 135, 225 and 315 degrees around a center
/// given in radians
pub fn rotated_corners(center: (f64, f64), half_diagonal: f64, heading: f64) -> [GeoPoint; 4] {
    let mut corners = [GeoPoint::new(0.0, 0.0); 4];
    for (k, corner) in corners.iter_mut().enumerate() {
        let angle = heading + FRAC_PI_4 + k as f64 * FRAC_PI_2;
        *corner = GeoPoint::from_radians(
            center.0 + half_diagonal * angle.cos(),
            center.1 + half_diagonal * angle.sin(),
        );
    }
    corners
}

/// Where a photo's heading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingSource {
    /// Only photo of its flight line
    Single,
    /// Bearing to the next exposure
    Local,
    /// Bearing between the first two exposures of the line
    Reference,
    /// Last exposure, copied from its predecessor
    Inherited,
}

/// Footprint of one photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoFootprint {
    pub id: String,
    pub exposure: i64,
    pub center: GeoPoint,
    /// Flight heading in radians
    pub heading: f64,
    pub heading_source: HeadingSource,
    pub quadrant: Quadrant,
    pub corners: CornerSet,
}

/// Footprints of one flight line
#[derive(Debug, Clone)]
pub struct GroupFootprints {
    pub key: FlightLineKey,
    /// In exposure order
    pub footprints: Vec<PhotoFootprint>,
    /// Rotated corners of every photo, four per photo in rotation order
    pub corner_points: Vec<GeoPoint>,
}

/// Result of a batch run, one entry per flight line
#[derive(Debug, Clone, Default)]
pub struct FootprintBatch {
    pub groups: Vec<GroupFootprints>,
}

impl FootprintBatch {
    pub fn footprints(&self) -> impl Iterator<Item = &PhotoFootprint> {
        self.groups.iter().flat_map(|g| g.footprints.iter())
    }

    pub fn corner_points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.groups.iter().flat_map(|g| g.corner_points.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.footprints.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Corner sets keyed by record id
    pub fn corners_by_id(&self) -> HashMap<&str, &CornerSet> {
        self.footprints()
            .map(|f| (f.id.as_str(), &f.corners))
            .collect()
    }
}

/// Computes footprint corners for flight lines
pub struct FootprintCalculator {
    params: FootprintParams,
}

impl FootprintCalculator {
    pub fn new(params: FootprintParams) -> Self {
        Self { params }
    }

    /// Calculator with archive defaults
    pub fn standard() -> Self {
        Self::new(FootprintParams::default())
    }

    pub fn params(&self) -> &FootprintParams {
        &self.params
    }

    /// Compute the footprint of every photo of one flight line.
    ///
    /// Fails without output if the group is empty or any photo lacks a
    /// usable scale or has non-finite coordinates.
    pub fn compute_group(&self, group: &FlightLineGroup) -> FootprintResult<GroupFootprints> {
        let records = &group.records;
        if records.is_empty() {
            return Err(FootprintError::InvalidInput(format!(
                "flight line {} has no photos",
                group.key
            )));
        }

        let scales = records
            .iter()
            .map(validated_scale)
            .collect::<FootprintResult<Vec<f64>>>()?;

        let centers: Vec<(f64, f64)> = records
            .iter()
            .map(|r| (r.longitude.to_radians(), r.latitude.to_radians()))
            .collect();

        let n = records.len();
        let reference = if n > 1 {
            heading_between(centers[0], centers[1])
        } else {
            0.0
        };

        log::debug!("Computing {} footprint(s) for {}", n, group.key);

        let mut footprints = Vec::with_capacity(n);
        let mut corner_points = Vec::with_capacity(4 * n);
        let mut previous = (0.0, HeadingSource::Single);

        for i in 0..n {
            let radius = PhotoRadius::new(scales[i], centers[i].1, self.params.film_size_in);

            let (heading, source) = if n == 1 {
                (0.0, HeadingSource::Single)
            } else if i + 1 < n {
                let local = heading_between(centers[i], centers[i + 1]);
                let gap = records[i + 1].exposure - records[i].exposure;
                let distance = planar_distance(centers[i], centers[i + 1]);

                if gap <= self.params.max_exposure_gap
                    && distance < self.params.distance_factor * radius.half_width
                {
                    (local, HeadingSource::Local)
                } else {
                    log::debug!(
                        "Photo {}: exposure step {} / distance {:.3e} rad, using line heading",
                        records[i].id,
                        gap,
                        distance
                    );
                    (reference, HeadingSource::Reference)
                }
            } else {
                (previous.0, HeadingSource::Inherited)
            };
            previous = (heading, source);

            let rotated = rotated_corners(centers[i], radius.half_diagonal, heading);
            let quadrant = Quadrant::from_heading(heading);

            footprints.push(PhotoFootprint {
                id: records[i].id.clone(),
                exposure: records[i].exposure,
                center: records[i].center(),
                heading,
                heading_source: source,
                quadrant,
                corners: quadrant.label(&rotated),
            });
            corner_points.extend_from_slice(&rotated);
        }

        Ok(GroupFootprints {
            key: group.key.clone(),
            footprints,
            corner_points,
        })
    }

    /// Compute footprints for independent flight lines, keeping group order
    pub fn compute_batch(&self, groups: &[FlightLineGroup]) -> FootprintResult<FootprintBatch> {
        log::info!("Computing footprints for {} flight line(s)", groups.len());

        #[cfg(feature = "parallel")]
        let computed = self.compute_groups_parallel(groups)?;

        #[cfg(not(feature = "parallel"))]
        let computed = groups
            .iter()
            .map(|g| self.compute_group(g))
            .collect::<FootprintResult<Vec<_>>>()?;

        let batch = FootprintBatch { groups: computed };
        log::info!(
            "Processed {} photo(s), {} corner point(s)",
            batch.len(),
            batch.corner_points().count()
        );
        Ok(batch)
    }

    #[cfg(feature = "parallel")]
    fn compute_groups_parallel(
        &self,
        groups: &[FlightLineGroup],
    ) -> FootprintResult<Vec<GroupFootprints>> {
        use rayon::prelude::*;

        groups.par_iter().map(|g| self.compute_group(g)).collect()
    }

    /// Group raw records into flight lines and compute all footprints
    pub fn compute_records(&self, records: Vec<PhotoRecord>) -> FootprintResult<FootprintBatch> {
        let groups = group_flight_lines(records)?;
        self.compute_batch(&groups)
    }
}

fn validated_scale(record: &PhotoRecord) -> FootprintResult<f64> {
    if !(record.longitude.is_finite() && record.latitude.is_finite()) {
        return Err(FootprintError::InvalidInput(format!(
            "photo {} has non-numeric coordinates ({}, {})",
            record.id, record.longitude, record.latitude
        )));
    }
    match record.scale {
        Some(scale) if scale.is_finite() && scale > 0.0 => Ok(scale),
        Some(scale) => Err(FootprintError::InvalidInput(format!(
            "photo {} has invalid scale {}",
            record.id, scale
        ))),
        None => Err(FootprintError::InvalidInput(format!(
            "photo {} has no scale",
            record.id
        ))),
    }
}
