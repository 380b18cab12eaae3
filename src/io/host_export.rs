use crate::core::estimate::focal_length_attribute;
use crate::io::photo_centers::COORDINATE_SYSTEM_PREFIX;
use crate::types::{FootprintError, FootprintResult, PhotoRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header of the reference file loaded by the photogrammetry host
pub const HOST_EXPORT_COLUMNS: [&str; 7] = [
    "Label",
    "X/Longitude",
    "Y/Latitude",
    "Z/Altitude",
    "X_est",
    "Y_est",
    "Z_est",
];

/// Options for exporting archive centers as camera references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostExportParams {
    /// Appended to every record id to form the image label
    pub file_extension: String,
    /// Write a flying height estimate in the Z/Altitude column
    pub with_altitude: bool,
    /// Added to the flying height, metres
    pub ground_offset: f64,
    /// Attribute holding the lens focal length in millimetres
    pub focal_length_column: String,
}

impl Default for HostExportParams {
    fn default() -> Self {
        Self {
            file_extension: ".tif".to_string(),
            with_altitude: false,
            ground_offset: 0.0,
            focal_length_column: "LENS_FOCAL_LENGTH_QTY".to_string(),
        }
    }
}

/// Flying height in metres: scale times focal length (mm), plus ground offset
pub fn flying_height(scale: f64, focal_length_mm: f64, ground_offset: f64) -> f64 {
    scale * focal_length_mm * 0.001 + ground_offset
}

/// Coordinate text for the export. Zero and non-finite values are left
/// empty so the host treats them as unknown.
fn coordinate_field(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        String::new()
    } else {
        value.to_string()
    }
}

fn altitude_field(record: &PhotoRecord, params: &HostExportParams) -> FootprintResult<String> {
    if !params.with_altitude {
        return Ok(String::new());
    }
    let scale = record
        .scale
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or_else(|| {
            FootprintError::InvalidInput(format!("photo {} has no scale for altitude", record.id))
        })?;
    let focal_length = focal_length_attribute(record, &params.focal_length_column).ok_or_else(|| {
        FootprintError::InvalidInput(format!(
            "photo {} has no focal length in '{}'",
            record.id, params.focal_length_column
        ))
    })?;
    Ok(flying_height(scale, focal_length, params.ground_offset).to_string())
}

/// Write archive centers as a camera reference file for the photogrammetry
/// host. Returns the number of cameras written.
pub fn write_host_export<W: Write>(
    mut writer: W,
    coordinate_system: &str,
    records: &[PhotoRecord],
    params: &HostExportParams,
) -> FootprintResult<usize> {
    writeln!(writer, "{} {}", COORDINATE_SYSTEM_PREFIX, coordinate_system)?;
    writeln!(writer, "#{}", HOST_EXPORT_COLUMNS.join("\t"))?;

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);

    for record in records {
        csv_writer.write_record([
            format!("{}{}", record.id, params.file_extension),
            coordinate_field(record.longitude),
            coordinate_field(record.latitude),
            altitude_field(record, params)?,
        ])?;
    }
    csv_writer.flush()?;

    log::info!("Exported {} camera reference(s)", records.len());
    Ok(records.len())
}

pub fn write_host_export_file<P: AsRef<Path>>(
    path: P,
    coordinate_system: &str,
    records: &[PhotoRecord],
    params: &HostExportParams,
) -> FootprintResult<usize> {
    log::info!("Writing camera references: {}", path.as_ref().display());
    let file = File::create(path.as_ref())?;
    write_host_export(BufWriter::new(file), coordinate_system, records, params)
}
