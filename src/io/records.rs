use crate::core::corners::FootprintBatch;
use crate::core::estimate::{
    archive_id_from_label, estimate_record_scale, parse_exposure_number, PhotoCenter,
};
use crate::io::photo_centers::ObliqueCenterRow;
use crate::types::{FootprintError, FootprintResult, PhotoRecord, CORNER_FIELDS};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Archive table column names for the fields the footprint computation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordColumns {
    pub id: String,
    pub project: String,
    pub roll: String,
    pub flight_line: String,
    pub exposure: String,
    pub scale: String,
    pub longitude: String,
    pub latitude: String,
}

impl Default for RecordColumns {
    fn default() -> Self {
        Self {
            id: "VENDOR_ID".to_string(),
            project: "PROJECT_CODE".to_string(),
            roll: "ROLL_NUMBER".to_string(),
            flight_line: "FLIGHT_LINE".to_string(),
            exposure: "EXPOSURE_NUMBER".to_string(),
            scale: "PHOTO_SCALE".to_string(),
            longitude: "CENTER_LON".to_string(),
            latitude: "CENTER_LAT".to_string(),
        }
    }
}

impl RecordColumns {
    fn names(&self) -> [&str; 8] {
        [
            self.id.as_str(),
            self.project.as_str(),
            self.roll.as_str(),
            self.flight_line.as_str(),
            self.exposure.as_str(),
            self.scale.as_str(),
            self.longitude.as_str(),
            self.latitude.as_str(),
        ]
    }
}

/// Row selection `COLUMN=VALUE`, compared on trimmed text
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl std::str::FromStr for RowFilter {
    type Err = FootprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, value) = s.split_once('=').ok_or_else(|| {
            FootprintError::InvalidInput(format!("filter must look like COLUMN=VALUE: '{}'", s))
        })?;
        let column = column.trim();
        if column.is_empty() {
            return Err(FootprintError::InvalidInput(format!(
                "filter has no column name: '{}'",
                s
            )));
        }
        Ok(Self {
            column: column.to_string(),
            value: value.trim().trim_matches('\'').to_string(),
        })
    }
}

/// Column positions resolved against a header
#[derive(Debug, Clone)]
struct ColumnIndex {
    id: usize,
    project: usize,
    roll: usize,
    flight_line: usize,
    exposure: usize,
    scale: usize,
    longitude: usize,
    latitude: usize,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord, columns: &RecordColumns) -> FootprintResult<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| FootprintError::InvalidFormat(format!("missing column '{}'", name)))
        };
        Ok(Self {
            id: find(&columns.id)?,
            project: find(&columns.project)?,
            roll: find(&columns.roll)?,
            flight_line: find(&columns.flight_line)?,
            exposure: find(&columns.exposure)?,
            scale: find(&columns.scale)?,
            longitude: find(&columns.longitude)?,
            latitude: find(&columns.latitude)?,
        })
    }
}

/// Archive metadata table held as text, with the selected rows parsed into
/// photo records
#[derive(Debug, Clone)]
pub struct RecordTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
    /// Row index of every parsed record
    pub selected: Vec<usize>,
    pub records: Vec<PhotoRecord>,
    index: ColumnIndex,
    delimiter: u8,
}

impl RecordTable {
    /// Read a delimited table from disk
    pub fn read_file<P: AsRef<Path>>(
        path: P,
        delimiter: u8,
        columns: &RecordColumns,
        filter: Option<&RowFilter>,
    ) -> FootprintResult<Self> {
        log::info!("Reading archive table: {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::read_from(file, delimiter, columns, filter)
    }

    pub fn read_from<R: Read>(
        reader: R,
        delimiter: u8,
        columns: &RecordColumns,
        filter: Option<&RowFilter>,
    ) -> FootprintResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let index = ColumnIndex::resolve(&headers, columns)?;
        let filter_column = match filter {
            Some(f) => Some((
                headers.iter().position(|h| h.trim() == f.column).ok_or_else(|| {
                    FootprintError::InvalidFormat(format!("missing filter column '{}'", f.column))
                })?,
                f.value.as_str(),
            )),
            None => None,
        };

        let core_columns = columns.names();
        let mut rows = Vec::new();
        let mut selected = Vec::new();
        let mut records = Vec::new();

        for result in csv_reader.records() {
            let row = result?;
            let keep = match filter_column {
                Some((col, value)) => row.get(col).map(str::trim) == Some(value),
                None => true,
            };
            if keep {
                records.push(parse_record(&row, &headers, &index, &core_columns)?);
                selected.push(rows.len());
            }
            rows.push(row);
        }

        log::info!("Selected {} of {} row(s)", records.len(), rows.len());
        if records.is_empty() {
            log::warn!("Selection yielded no photo records");
        }

        Ok(Self {
            headers,
            rows,
            selected,
            records,
            index,
            delimiter,
        })
    }

    /// Copy estimated centers onto the selected rows with a matching id.
    ///
    /// With a focal length column, rows without a usable scale also get one
    /// estimated from the photo height. Returns the number of rows updated.
    pub fn import_centers(
        &mut self,
        centers: &[PhotoCenter],
        focal_length_column: Option<&str>,
    ) -> usize {
        let by_id: HashMap<&str, &PhotoCenter> =
            centers.iter().map(|c| (c.label.as_str(), c)).collect();

        let mut updates = Vec::new();
        let mut imported = 0;
        for (row_idx, record) in self.selected.iter().zip(self.records.iter_mut()) {
            let Some(center) = by_id.get(record.id.as_str()) else {
                continue;
            };
            imported += 1;
            record.longitude = center.longitude;
            record.latitude = center.latitude;
            updates.push((*row_idx, self.index.longitude, center.longitude.to_string()));
            updates.push((*row_idx, self.index.latitude, center.latitude.to_string()));

            let estimated = match focal_length_column {
                Some(column) => estimate_record_scale(record, center.photo_height, column),
                None => None,
            };
            if let Some(scale) = estimated {
                record.scale = Some(scale);
                updates.push((*row_idx, self.index.scale, scale.to_string()));
            }
        }

        for (row_idx, col, value) in updates {
            self.set_field(row_idx, col, value);
        }

        log::info!("Imported {} of {} photo center(s)", imported, centers.len());
        if imported < self.records.len() {
            log::warn!("{} selected row(s) have no photo center", self.records.len() - imported);
        }
        imported
    }

    /// Copy oblique centers and look direction onto the selected rows.
    /// Rows the host did not align are skipped.
    pub fn import_oblique(
        &mut self,
        rows: &[ObliqueCenterRow],
        direction_column: &str,
    ) -> FootprintResult<usize> {
        let direction_idx = self
            .headers
            .iter()
            .position(|h| h.trim() == direction_column)
            .ok_or_else(|| {
                FootprintError::InvalidFormat(format!("missing column '{}'", direction_column))
            })?;

        let mut by_id: HashMap<String, &ObliqueCenterRow> = HashMap::new();
        for row in rows {
            let id = archive_id_from_label(&row.label);
            if row.is_aligned() {
                by_id.insert(id, row);
            } else {
                log::warn!("Missing x or y estimate for {}", id);
            }
        }

        let mut updates = Vec::new();
        for (row_idx, record) in self.selected.iter().zip(self.records.iter_mut()) {
            let Some(center) = by_id.get(record.id.as_str()) else {
                continue;
            };
            record.longitude = center.x_est;
            record.latitude = center.y_est;
            updates.push((*row_idx, center.x_est, center.y_est, center.direction.clone()));
        }

        let imported = updates.len();
        for (row_idx, lon, lat, direction) in updates {
            self.set_field(row_idx, self.index.longitude, lon.to_string());
            self.set_field(row_idx, self.index.latitude, lat.to_string());
            self.set_field(row_idx, direction_idx, direction);
        }

        log::info!("Imported {} oblique center(s)", imported);
        Ok(imported)
    }

    fn set_field(&mut self, row_idx: usize, col: usize, value: String) {
        let row = &mut self.rows[row_idx];
        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        if fields.len() <= col {
            fields.resize(col + 1, String::new());
        }
        fields[col] = value;
        *row = StringRecord::from(fields);
    }

    /// Write headers and rows as held
    pub fn write_to<W: Write>(&self, writer: W) -> FootprintResult<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> FootprintResult<()> {
        log::info!("Writing archive table: {}", path.as_ref().display());
        let file = File::create(path.as_ref())?;
        self.write_to(std::io::BufWriter::new(file))
    }

    /// Write every row back with the corner columns filled in for photos in
    /// `batch`. Existing corner columns are updated in place, missing ones
    /// appended; rows without a footprint keep their old corner values.
    pub fn write_with_corners<W: Write>(&self, writer: W, batch: &FootprintBatch) -> FootprintResult<()> {
        let mut out_headers: Vec<String> = self.headers.iter().map(str::to_string).collect();
        let corner_positions: Vec<usize> = CORNER_FIELDS
            .iter()
            .map(|name| match out_headers.iter().position(|h| h.trim() == *name) {
                Some(pos) => pos,
                None => {
                    out_headers.push(name.to_string());
                    out_headers.len() - 1
                }
            })
            .collect();

        let corners = batch.corners_by_id();

        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);
        csv_writer.write_record(&out_headers)?;

        let mut record_for_row = vec![None; self.rows.len()];
        for (row_idx, record) in self.selected.iter().zip(self.records.iter()) {
            record_for_row[*row_idx] = Some(record);
        }

        let mut updated = 0usize;
        for (row, record) in self.rows.iter().zip(record_for_row.iter()) {
            let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
            fields.resize(out_headers.len(), String::new());

            if let Some(corner_set) = record.and_then(|r| corners.get(r.id.as_str())) {
                for (pos, value) in corner_positions.iter().zip(corner_set.to_fields().iter()) {
                    fields[*pos] = value.to_string();
                }
                updated += 1;
            }
            csv_writer.write_record(&fields)?;
        }
        csv_writer.flush()?;

        log::info!("Updated corners of {} row(s)", updated);
        Ok(())
    }

    pub fn write_file_with_corners<P: AsRef<Path>>(
        &self,
        path: P,
        batch: &FootprintBatch,
    ) -> FootprintResult<()> {
        log::info!("Writing archive table: {}", path.as_ref().display());
        let file = File::create(path.as_ref())?;
        self.write_with_corners(std::io::BufWriter::new(file), batch)
    }
}

fn parse_record(
    row: &StringRecord,
    headers: &StringRecord,
    index: &ColumnIndex,
    core_columns: &[&str; 8],
) -> FootprintResult<PhotoRecord> {
    let text = |i: usize| row.get(i).unwrap_or("").trim();
    let id = text(index.id).to_string();

    // blank centers are not imported yet; the corner computation rejects them
    let coordinate = |i: usize, name: &str| match text(i) {
        "" => Ok(f64::NAN),
        value => value.parse::<f64>().map_err(|_| {
            FootprintError::InvalidInput(format!(
                "photo {}: non-numeric {} '{}'",
                id, name, value
            ))
        }),
    };
    let longitude = coordinate(index.longitude, "longitude")?;
    let latitude = coordinate(index.latitude, "latitude")?;

    let scale = match text(index.scale) {
        "" => None,
        s => Some(s.parse::<f64>().map_err(|_| {
            FootprintError::InvalidInput(format!("photo {}: non-numeric scale '{}'", id, s))
        })?),
    };

    let exposure = parse_exposure_number(text(index.exposure))
        .map_err(|e| FootprintError::InvalidInput(format!("photo {}: {}", id, e)))?;

    let attributes = headers
        .iter()
        .zip(row.iter())
        .filter(|(h, _)| {
            let name = h.trim();
            !core_columns.iter().chain(CORNER_FIELDS.iter()).any(|c| *c == name)
        })
        .map(|(h, v)| (h.to_string(), v.to_string()))
        .collect();

    Ok(PhotoRecord {
        id: id.clone(),
        project: text(index.project).to_string(),
        roll: text(index.roll).to_string(),
        flight_line: text(index.flight_line).to_string(),
        exposure,
        longitude,
        latitude,
        scale,
        attributes,
    })
}

/// Write the flat corner point list as `id,corner,lon,lat`, four points per
/// photo in rotation order
pub fn write_corner_points<W: Write>(writer: W, batch: &FootprintBatch) -> FootprintResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["id", "corner", "lon", "lat"])?;

    for group in &batch.groups {
        for (i, point) in group.corner_points.iter().enumerate() {
            let footprint = &group.footprints[i / 4];
            csv_writer.write_record([
                footprint.id.clone(),
                (i % 4 + 1).to_string(),
                point.lon.to_string(),
                point.lat.to_string(),
            ])?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corners::FootprintCalculator;

    const TABLE: &str = "VENDOR_ID,PROJECT_CODE,ROLL_NUMBER,FLIGHT_LINE,EXPOSURE_NUMBER,PHOTO_SCALE,CENTER_LON,CENTER_LAT,STATE\n\
V1,P1,1,A,2,20000,-150.01,61.0,AK\n\
V2,P1,1,A,1,20000,-150.0,61.0,AK\n\
V3,P2,1,A,1,,-149.0,60.0,AK\n";

    #[test]
    fn test_filter_and_parse() {
        let filter: RowFilter = "PROJECT_CODE = 'P1'".parse().unwrap();
        let table =
            RecordTable::read_from(TABLE.as_bytes(), b',', &RecordColumns::default(), Some(&filter))
                .unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.selected, vec![0, 1]);

        let first = &table.records[0];
        assert_eq!(first.id, "V1");
        assert_eq!(first.exposure, 2);
        assert_eq!(first.scale, Some(20000.0));
        assert_eq!(first.attributes, vec![("STATE".to_string(), "AK".to_string())]);
    }

    #[test]
    fn test_missing_scale_parses_as_none() {
        let table =
            RecordTable::read_from(TABLE.as_bytes(), b',', &RecordColumns::default(), None).unwrap();
        assert_eq!(table.records[2].scale, None);
    }

    #[test]
    fn test_non_numeric_coordinate_rejected() {
        let bad = "VENDOR_ID,PROJECT_CODE,ROLL_NUMBER,FLIGHT_LINE,EXPOSURE_NUMBER,PHOTO_SCALE,CENTER_LON,CENTER_LAT\n\
V1,P1,1,A,1,20000,west,61.0\n";
        let err = RecordTable::read_from(bad.as_bytes(), b',', &RecordColumns::default(), None)
            .unwrap_err();
        assert!(matches!(err, FootprintError::InvalidInput(_)));
    }

    #[test]
    fn test_write_appends_corner_columns() {
        let filter: RowFilter = "PROJECT_CODE=P1".parse().unwrap();
        let table =
            RecordTable::read_from(TABLE.as_bytes(), b',', &RecordColumns::default(), Some(&filter))
                .unwrap();
        let batch = FootprintCalculator::standard()
            .compute_records(table.records.clone())
            .unwrap();

        let mut out = Vec::new();
        table.write_with_corners(&mut out, &batch).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("STATE,UR_LON,UR_LAT,UL_LON,UL_LAT,LL_LON,LL_LAT,LR_LON,LR_LAT"));
        assert_eq!(lines[1].split(',').count(), 17);
        assert!(lines[1].split(',').skip(9).all(|v| !v.is_empty()));
        // P2 row was not selected
        assert!(lines[3].ends_with(",,,,,,,,"));
    }

    #[test]
    fn test_corner_points_file() {
        let table =
            RecordTable::read_from(TABLE.as_bytes(), b',', &RecordColumns::default(), None).unwrap();
        let batch = FootprintCalculator::standard()
            .compute_records(table.records[..2].to_vec())
            .unwrap();

        let mut out = Vec::new();
        write_corner_points(&mut out, &batch).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 9);
        assert!(text.lines().nth(1).unwrap().starts_with("V2,1,"));
    }

    const BLANK_CENTERS: &str = "VENDOR_ID,PROJECT_CODE,ROLL_NUMBER,FLIGHT_LINE,EXPOSURE_NUMBER,PHOTO_SCALE,CENTER_LON,CENTER_LAT,LENS_FOCAL_LENGTH_QTY,OBLIQUE_DIR_TXT\n\
V1,P1,1,A,1,,,,6,\n\
V2,P1,1,A,2,15840,,,6,\n\
V3,P1,1,A,3,,,,,\n";

    fn center(label: &str, lon: f64, lat: f64, h: f64) -> PhotoCenter {
        PhotoCenter {
            label: label.to_string(),
            longitude: lon,
            latitude: lat,
            altitude: 3200.0,
            photo_height: h,
        }
    }

    #[test]
    fn test_blank_centers_read_as_nan() {
        let table =
            RecordTable::read_from(BLANK_CENTERS.as_bytes(), b',', &RecordColumns::default(), None)
                .unwrap();
        assert_eq!(table.records.len(), 3);
        assert!(table.records[0].longitude.is_nan());
        assert!(table.records[0].latitude.is_nan());

        // corners still refuse rows without a center
        let err = FootprintCalculator::standard()
            .compute_records(table.records.clone())
            .unwrap_err();
        assert!(matches!(err, FootprintError::InvalidInput(_)));
    }

    #[test]
    fn test_import_centers_and_scales() {
        let mut table =
            RecordTable::read_from(BLANK_CENTERS.as_bytes(), b',', &RecordColumns::default(), None)
                .unwrap();
        let centers = vec![
            center("V1", -150.0, 61.0, 3048.0),
            center("V2", -150.01, 61.0, 3048.0),
        ];

        let imported = table.import_centers(&centers, Some("LENS_FOCAL_LENGTH_QTY"));
        assert_eq!(imported, 2);
        assert_eq!(table.records[0].longitude, -150.0);
        assert_eq!(table.records[0].scale, Some(19994.0));
        // existing scale is kept
        assert_eq!(table.records[1].scale, Some(15840.0));
        assert!(table.records[2].longitude.is_nan());

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], BLANK_CENTERS.lines().next().unwrap());
        assert_eq!(lines[1], "V1,P1,1,A,1,19994,-150,61,6,");
        assert_eq!(lines[2], "V2,P1,1,A,2,15840,-150.01,61,6,");
        assert_eq!(lines[3], "V3,P1,1,A,3,,,,,");
    }

    #[test]
    fn test_import_centers_without_scale_estimate() {
        let mut table =
            RecordTable::read_from(BLANK_CENTERS.as_bytes(), b',', &RecordColumns::default(), None)
                .unwrap();
        table.import_centers(&[center("V1", -150.0, 61.0, 3048.0)], None);
        assert_eq!(table.records[0].scale, None);
    }

    #[test]
    fn test_import_oblique_direction() {
        let mut table =
            RecordTable::read_from(BLANK_CENTERS.as_bytes(), b',', &RecordColumns::default(), None)
                .unwrap();
        let rows = vec![
            ObliqueCenterRow {
                label: "v1".to_string(),
                x: f64::NAN,
                y: f64::NAN,
                z: f64::NAN,
                x_est: -150.0,
                y_est: 61.0,
                direction: "NW".to_string(),
            },
            ObliqueCenterRow {
                label: "v2".to_string(),
                x: f64::NAN,
                y: f64::NAN,
                z: f64::NAN,
                x_est: f64::NAN,
                y_est: f64::NAN,
                direction: "SE".to_string(),
            },
        ];

        // labels map to ids through the archive prefix
        assert_eq!(table.import_oblique(&rows, "OBLIQUE_DIR_TXT").unwrap(), 0);

        let mut table = RecordTable::read_from(
            BLANK_CENTERS.replace("V1,", "ARV1,").as_bytes(),
            b',',
            &RecordColumns::default(),
            None,
        )
        .unwrap();
        assert_eq!(table.import_oblique(&rows, "OBLIQUE_DIR_TXT").unwrap(), 1);
        assert_eq!(table.records[0].longitude, -150.0);
        assert_eq!(table.rows[0].get(9), Some("NW"));
        assert_eq!(table.rows[1].get(9), Some(""));

        assert!(table.import_oblique(&rows, "NO_SUCH_COLUMN").is_err());
    }
}
