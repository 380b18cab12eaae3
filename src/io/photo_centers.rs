use crate::core::estimate::{archive_id_from_label, MissingFrameEstimator, PhotoCenter};
use crate::types::{FlightLineKey, FootprintError, FootprintResult, PhotoRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Prefix of the first preamble line
pub const COORDINATE_SYSTEM_PREFIX: &str = "#CoordinateSystem:";

/// Column order of the exchange file
pub const PHOTO_CENTER_COLUMNS: [&str; 9] = [
    "Label", "X", "Y", "Z", "X_est", "Y_est", "Z_est", "H_est", "H_ground",
];

/// One camera row. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoCenterRow {
    pub label: String,
    /// Source (measured) position
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Estimated position
    pub x_est: f64,
    pub y_est: f64,
    pub z_est: f64,
    /// Estimated camera height above ground
    pub h_est: f64,
    /// Ground elevation below the camera
    pub h_ground: f64,
}

impl PhotoCenterRow {
    /// Row for a camera the host did not align
    pub fn unaligned(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
            x_est: f64::NAN,
            y_est: f64::NAN,
            z_est: f64::NAN,
            h_est: f64::NAN,
            h_ground: f64::NAN,
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.x_est.is_finite() && self.y_est.is_finite()
    }
}

/// Photo-center exchange file: coordinate-system line, header line, rows
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoCenterFile {
    pub coordinate_system: String,
    pub rows: Vec<PhotoCenterRow>,
}

impl PhotoCenterFile {
    pub fn new(coordinate_system: impl Into<String>) -> Self {
        Self {
            coordinate_system: coordinate_system.into(),
            rows: Vec::new(),
        }
    }

    /// Read a photo-center file from disk
    pub fn read_file<P: AsRef<Path>>(path: P) -> FootprintResult<Self> {
        log::info!("Reading photo centers: {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::read_from(file)
    }

    pub fn read_from<R: Read>(reader: R) -> FootprintResult<Self> {
        let mut reader = BufReader::new(reader);
        let coordinate_system = read_preamble(&mut reader, &PHOTO_CENTER_COLUMNS)?;
        let mut csv_reader = tab_reader(reader);

        let mut rows = Vec::new();
        for (i, result) in csv_reader.records().enumerate() {
            let record = result?;
            check_width(&record, PHOTO_CENTER_COLUMNS.len(), i + 1)?;
            let value = |idx: usize| parse_value(&record[idx], PHOTO_CENTER_COLUMNS[idx], i + 1);
            rows.push(PhotoCenterRow {
                label: record[0].trim().to_string(),
                x: value(1)?,
                y: value(2)?,
                z: value(3)?,
                x_est: value(4)?,
                y_est: value(5)?,
                z_est: value(6)?,
                h_est: value(7)?,
                h_ground: value(8)?,
            });
        }

        log::debug!("Read {} photo center row(s)", rows.len());
        Ok(Self {
            coordinate_system,
            rows,
        })
    }

    /// Write the file with the two-line preamble and host precision
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> FootprintResult<()> {
        log::info!("Writing photo centers: {}", path.as_ref().display());
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> FootprintResult<()> {
        writeln!(writer, "{} {}", COORDINATE_SYSTEM_PREFIX, self.coordinate_system)?;
        writeln!(writer, "#{}", PHOTO_CENTER_COLUMNS.join("\t"))?;

        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(writer);

        for row in &self.rows {
            csv_writer.write_record([
                row.label.clone(),
                format_value(row.x, 6),
                format_value(row.y, 6),
                format_value(row.z, 3),
                format_value(row.x_est, 6),
                format_value(row.y_est, 6),
                format_value(row.z_est, 3),
                format_value(row.h_est, 3),
                format_value(row.h_ground, 3),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Split rows into estimated centers keyed by archive id, and archive ids
    /// of cameras without an estimate. A missing altitude becomes 0.
    pub fn aligned_centers(&self) -> (Vec<PhotoCenter>, Vec<String>) {
        let mut aligned = Vec::new();
        let mut missing = Vec::new();

        for row in &self.rows {
            let id = archive_id_from_label(&row.label);
            if row.is_aligned() {
                aligned.push(PhotoCenter {
                    label: id,
                    longitude: row.x_est,
                    latitude: row.y_est,
                    altitude: if row.z_est.is_finite() { row.z_est } else { 0.0 },
                    photo_height: row.h_est,
                });
            } else {
                log::warn!("Missing x or y estimate for {}", id);
                missing.push(id);
            }
        }

        (aligned, missing)
    }

    /// Estimate centers of unaligned cameras from their flight-line
    /// neighbours. `records` supplies roll, flight line and frame number per
    /// archive id. Returns the number of rows filled; cameras that cannot be
    /// estimated are logged and left unaligned.
    pub fn fill_missing(&mut self, records: &[PhotoRecord]) -> usize {
        let (aligned, missing) = self.aligned_centers();
        if missing.is_empty() {
            return 0;
        }

        let by_id: HashMap<&str, &PhotoRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        let centers: HashMap<&str, &PhotoCenter> =
            aligned.iter().map(|c| (c.label.as_str(), c)).collect();

        let mut lines: HashMap<FlightLineKey, Vec<&PhotoRecord>> = HashMap::new();
        for record in records {
            lines.entry(record.flight_line_key()).or_default().push(record);
        }

        let mut estimates: HashMap<String, PhotoCenter> = HashMap::new();
        for id in &missing {
            let Some(record) = by_id.get(id.as_str()) else {
                log::warn!("{} is not in the archive selection, skipping", id);
                continue;
            };
            let line = &lines[&record.flight_line_key()];
            let first = line.iter().map(|r| r.exposure).min().unwrap_or(record.exposure);
            let last = line.iter().map(|r| r.exposure).max().unwrap_or(record.exposure);

            let estimator = MissingFrameEstimator::new(line.iter().filter_map(|r| {
                centers
                    .get(r.id.as_str())
                    .map(|c| (r.exposure, (*c).clone()))
            }));

            match estimator.estimate(id, record.exposure, first, last) {
                Ok(center) => {
                    estimates.insert(id.clone(), center);
                }
                Err(e) => log::warn!("Cannot estimate center for {}: {}", id, e),
            }
        }

        let mut filled = 0;
        for row in self.rows.iter_mut().filter(|r| !r.is_aligned()) {
            if let Some(center) = estimates.get(&archive_id_from_label(&row.label)) {
                row.x_est = center.longitude;
                row.y_est = center.latitude;
                row.z_est = center.altitude;
                row.h_est = center.photo_height;
                filled += 1;
            }
        }

        log::info!("Estimated {} of {} missing photo center(s)", filled, missing.len());
        filled
    }
}

/// Column order of the oblique exchange file
pub const OBLIQUE_CENTER_COLUMNS: [&str; 7] = ["Label", "X", "Y", "Z", "X_est", "Y_est", "Direction"];

/// One oblique camera row; `direction` is the look direction text
#[derive(Debug, Clone, PartialEq)]
pub struct ObliqueCenterRow {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub x_est: f64,
    pub y_est: f64,
    pub direction: String,
}

impl ObliqueCenterRow {
    pub fn is_aligned(&self) -> bool {
        self.x_est.is_finite() && self.y_est.is_finite()
    }
}

/// Oblique photo-center file: same preamble, seven columns ending in
/// `Direction`
#[derive(Debug, Clone, PartialEq)]
pub struct ObliqueCenterFile {
    pub coordinate_system: String,
    pub rows: Vec<ObliqueCenterRow>,
}

impl ObliqueCenterFile {
    pub fn read_file<P: AsRef<Path>>(path: P) -> FootprintResult<Self> {
        log::info!("Reading oblique photo centers: {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::read_from(file)
    }

    pub fn read_from<R: Read>(reader: R) -> FootprintResult<Self> {
        let mut reader = BufReader::new(reader);
        let coordinate_system = read_preamble(&mut reader, &OBLIQUE_CENTER_COLUMNS)?;
        let mut csv_reader = tab_reader(reader);

        let mut rows = Vec::new();
        for (i, result) in csv_reader.records().enumerate() {
            let record = result?;
            check_width(&record, OBLIQUE_CENTER_COLUMNS.len(), i + 1)?;
            let value = |idx: usize| parse_value(&record[idx], OBLIQUE_CENTER_COLUMNS[idx], i + 1);
            rows.push(ObliqueCenterRow {
                label: record[0].trim().to_string(),
                x: value(1)?,
                y: value(2)?,
                z: value(3)?,
                x_est: value(4)?,
                y_est: value(5)?,
                direction: record[6].trim().to_string(),
            });
        }

        log::debug!("Read {} oblique center row(s)", rows.len());
        Ok(Self {
            coordinate_system,
            rows,
        })
    }
}

fn read_preamble<R: BufRead>(reader: &mut R, columns: &[&str]) -> FootprintResult<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let coordinate_system = line
        .trim_end_matches(&['\r', '\n'][..])
        .strip_prefix(COORDINATE_SYSTEM_PREFIX)
        .ok_or_else(|| {
            FootprintError::InvalidFormat(format!(
                "first line must start with '{}'",
                COORDINATE_SYSTEM_PREFIX
            ))
        })?
        .trim()
        .to_string();

    line.clear();
    reader.read_line(&mut line)?;
    let header: Vec<&str> = line
        .trim_end_matches(&['\r', '\n'][..])
        .trim_start_matches('#')
        .split('\t')
        .map(str::trim)
        .collect();
    if header != columns {
        return Err(FootprintError::InvalidFormat(format!(
            "unexpected photo-center header: {:?}",
            header
        )));
    }
    Ok(coordinate_system)
}

fn tab_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

fn check_width(record: &csv::StringRecord, width: usize, row: usize) -> FootprintResult<()> {
    if record.len() != width {
        return Err(FootprintError::InvalidFormat(format!(
            "row {}: expected {} columns, found {}",
            row,
            width,
            record.len()
        )));
    }
    Ok(())
}

fn parse_value(field: &str, column: &str, row: usize) -> FootprintResult<f64> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|_| {
        FootprintError::InvalidFormat(format!(
            "row {}: column {} is not a number: '{}'",
            row, column, field
        ))
    })
}

fn format_value(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.*}", precision, value)
    }
}
