use crate::types::{FootprintError, FootprintResult, PhotoRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Inches per metre, as used for archive scale estimates
const INCHES_PER_METRE: f64 = 39.36;

/// Photo center as estimated by the photogrammetry host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoCenter {
    pub label: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Camera altitude above mean sea level, metres
    pub altitude: f64,
    /// Camera height above ground, metres
    pub photo_height: f64,
}

impl PhotoCenter {
    fn combine(label: &str, a: &PhotoCenter, b: &PhotoCenter, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            label: label.to_string(),
            longitude: f(a.longitude, b.longitude),
            latitude: f(a.latitude, b.latitude),
            altitude: f(a.altitude, b.altitude),
            photo_height: f(a.photo_height, b.photo_height),
        }
    }
}

/// Extrapolate past the end of a line: `near + (near - far)`, where `far` is
/// two frames away and `near` is adjacent
pub fn extrapolate_endpoint(label: &str, far: &PhotoCenter, near: &PhotoCenter) -> PhotoCenter {
    PhotoCenter::combine(label, far, near, |f, n| n + (n - f))
}

/// Average of the two frames either side
pub fn interpolate_midpoint(label: &str, before: &PhotoCenter, after: &PhotoCenter) -> PhotoCenter {
    PhotoCenter::combine(label, before, after, |b, a| (a + b) / 2.0)
}

/// Photo scale denominator from camera height above ground (metres) and
/// lens focal length, truncated to a whole number
pub fn estimate_scale(photo_height: f64, focal_length: f64) -> FootprintResult<f64> {
    if !(focal_length.is_finite() && focal_length > 0.0) {
        return Err(FootprintError::InvalidInput(format!(
            "focal length must be positive, got {}",
            focal_length
        )));
    }
    if !photo_height.is_finite() {
        return Err(FootprintError::InvalidInput(format!(
            "photo height is not a number: {}",
            photo_height
        )));
    }
    Ok((photo_height * INCHES_PER_METRE / focal_length).trunc())
}

/// Parse an exposure number, tolerating a one-letter frame suffix.
///
/// `"12"` and `"12A"` give 12; a bare `"A"` or `"N"` gives 0 and a bare `"B"`
/// gives -1.
pub fn parse_exposure_number(text: &str) -> FootprintResult<i64> {
    let pattern = Regex::new(r"^\s*(-?\d+)?\s*([A-Za-z])?\s*$")
        .map_err(|e| FootprintError::InvalidFormat(format!("Regex error: {}", e)))?;

    let invalid = || FootprintError::InvalidFormat(format!("Invalid exposure number: '{}'", text));
    let caps = pattern.captures(text).ok_or_else(invalid)?;

    match (caps.get(1), caps.get(2)) {
        (Some(digits), _) => digits.as_str().parse::<i64>().map_err(|_| invalid()),
        (None, Some(suffix)) => match suffix.as_str().to_ascii_uppercase().as_str() {
            "A" | "N" => Ok(0),
            "B" => Ok(-1),
            _ => Err(invalid()),
        },
        (None, None) => Err(invalid()),
    }
}

/// Archive entity id for a host camera label: "AR" + first 13 characters,
/// upper-cased
pub fn archive_id_from_label(label: &str) -> String {
    let head: String = label.chars().take(13).collect();
    format!("AR{}", head.to_uppercase())
}

/// Estimates centers of frames the photogrammetry host could not align
pub struct MissingFrameEstimator {
    /// Known centers of one flight line, by frame number
    frames: BTreeMap<i64, PhotoCenter>,
}

impl MissingFrameEstimator {
    pub fn new(frames: impl IntoIterator<Item = (i64, PhotoCenter)>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn known_frames(&self) -> usize {
        self.frames.len()
    }

    /// Estimate the center of `frame` within a line spanning
    /// `first_frame..=last_frame`.
    ///
    /// End frames are extrapolated from their two inward neighbours,
    /// interior frames interpolated between the adjacent ones.
    pub fn estimate(
        &self,
        label: &str,
        frame: i64,
        first_frame: i64,
        last_frame: i64,
    ) -> FootprintResult<PhotoCenter> {
        if frame < first_frame || frame > last_frame {
            return Err(FootprintError::InvalidInput(format!(
                "frame {} outside flight line {}..={}",
                frame, first_frame, last_frame
            )));
        }

        let lookup = |n: i64| {
            self.frames.get(&n).ok_or_else(|| {
                FootprintError::InvalidInput(format!(
                    "cannot estimate frame {}: neighbour frame {} has no center",
                    frame, n
                ))
            })
        };

        let estimate = if frame == last_frame {
            log::debug!("Frame {} is the last end-point", frame);
            extrapolate_endpoint(label, lookup(frame - 2)?, lookup(frame - 1)?)
        } else if frame == first_frame {
            log::debug!("Frame {} is the first end-point", frame);
            extrapolate_endpoint(label, lookup(frame + 2)?, lookup(frame + 1)?)
        } else {
            log::debug!("Frame {} is a mid-point", frame);
            interpolate_midpoint(label, lookup(frame - 1)?, lookup(frame + 1)?)
        };

        Ok(estimate)
    }
}

/// Give records without a usable scale one estimated from the matching photo
/// center's height and the focal length attribute. Returns how many records
/// were filled.
pub fn fill_missing_scales(
    records: &mut [PhotoRecord],
    centers: &[PhotoCenter],
    focal_length_column: &str,
) -> usize {
    let heights: HashMap<&str, f64> = centers
        .iter()
        .map(|c| (c.label.as_str(), c.photo_height))
        .collect();

    let mut filled = 0;
    for record in records.iter_mut() {
        let Some(height) = heights.get(record.id.as_str()) else {
            continue;
        };
        if let Some(scale) = estimate_record_scale(record, *height, focal_length_column) {
            record.scale = Some(scale);
            filled += 1;
        }
    }
    filled
}

/// Lens focal length held in a record attribute; a trailing `mm` unit is
/// accepted
pub fn focal_length_attribute(record: &PhotoRecord, column: &str) -> Option<f64> {
    record
        .attributes
        .iter()
        .find(|(name, _)| name == column)
        .and_then(|(_, value)| {
            let value = value.trim();
            value.strip_suffix("mm").unwrap_or(value).trim().parse::<f64>().ok()
        })
}

/// Scale estimate for a record without a usable scale, or `None` when the
/// record already has one or no estimate is possible
pub(crate) fn estimate_record_scale(
    record: &PhotoRecord,
    photo_height: f64,
    focal_length_column: &str,
) -> Option<f64> {
    if matches!(record.scale, Some(s) if s > 0.0) {
        return None;
    }
    match focal_length_attribute(record, focal_length_column).map(|f| estimate_scale(photo_height, f)) {
        Some(Ok(scale)) => {
            log::debug!("Estimated scale 1:{} for {}", scale, record.id);
            Some(scale)
        }
        Some(Err(e)) => {
            log::warn!("Cannot estimate scale for {}: {}", record.id, e);
            None
        }
        None => {
            log::warn!("No focal length for {}", record.id);
            None
        }
    }
}
