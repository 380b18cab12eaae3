use apsi_footprints::core::estimate::fill_missing_scales;
use apsi_footprints::core::write_geojson;
use apsi_footprints::io::{
    write_corner_points, write_host_export_file, HostExportParams, ObliqueCenterFile,
    RecordColumns, RowFilter,
};
use apsi_footprints::{FootprintCalculator, FootprintParams, PhotoCenterFile, RecordTable};
use std::fs;
use tempfile::TempDir;

const TABLE: &str = "VENDOR_ID\tPROJECT_CODE\tROLL_NUMBER\tFLIGHT_LINE\tEXPOSURE_NUMBER\tPHOTO_SCALE\tCENTER_LON\tCENTER_LAT\tLENS_FOCAL_LENGTH_QTY\tUR_LON\tUR_LAT\tUL_LON\tUL_LAT\tLL_LON\tLL_LAT\tLR_LON\tLR_LAT\n\
AR1VFAJ00010001\tAK-66\t1\t3\t1\t20000\t-150.00\t61.0\t6\t\t\t\t\t\t\t\t\n\
AR1VFAJ00010002\tAK-66\t1\t3\t2\t20000\t-150.01\t61.0\t6\t\t\t\t\t\t\t\t\n\
AR1VFAJ00010003\tAK-66\t1\t3\t3A\t\t-150.02\t61.005\t6\t\t\t\t\t\t\t\t\n\
AR2XYZ000010001\tAK-70\t2\t1\t1\t40000\t-140.00\t60.0\t6\t1\t2\t3\t4\t5\t6\t7\t8\n";

const CENTERS: &str = "#CoordinateSystem: WGS 84 (EPSG::4326)\n\
#Label\tX\tY\tZ\tX_est\tY_est\tZ_est\tH_est\tH_ground\n\
1vfaj00010003.tif\t-150.020000\t61.005000\t3200.000\t-150.020000\t61.005000\t3200.000\t3048.000\t152.000\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_corners_for_selected_project() {
    init_logging();

    let dir = TempDir::new().unwrap();
    let centers_path = dir.path().join("centers.txt");
    let output_path = dir.path().join("out.tsv");
    let points_path = dir.path().join("points.csv");
    let polygons_path = dir.path().join("footprints.geojson");
    fs::write(&centers_path, CENTERS).unwrap();

    let filter: RowFilter = "PROJECT_CODE='AK-66'".parse().unwrap();
    let mut table =
        RecordTable::read_from(TABLE.as_bytes(), b'\t', &RecordColumns::default(), Some(&filter))
            .unwrap();
    assert_eq!(table.records.len(), 3);
    assert_eq!(table.records[2].exposure, 3);
    assert_eq!(table.records[2].scale, None);

    // the third frame gets its scale from the photo height
    let centers = PhotoCenterFile::read_file(&centers_path).unwrap();
    let (aligned, missing) = centers.aligned_centers();
    assert!(missing.is_empty());
    assert_eq!(fill_missing_scales(&mut table.records, &aligned, "LENS_FOCAL_LENGTH_QTY"), 1);
    assert_eq!(table.records[2].scale, Some(19994.0));

    let batch = FootprintCalculator::standard()
        .compute_records(table.records.clone())
        .unwrap();
    assert_eq!(batch.groups.len(), 1);
    assert_eq!(batch.len(), 3);

    table.write_file_with_corners(&output_path, &batch).unwrap();
    write_corner_points(fs::File::create(&points_path).unwrap(), &batch).unwrap();
    write_geojson(&batch, &polygons_path).unwrap();

    let output = fs::read_to_string(&output_path).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 5);
    // header unchanged, corner columns already present
    assert_eq!(lines[0], TABLE.lines().next().unwrap());

    let corners = batch.corners_by_id();
    let first: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(first.len(), 17);
    let ur_lon: f64 = first[9].parse().unwrap();
    assert!((ur_lon - corners["AR1VFAJ00010001"].ur.lon).abs() < 1e-12);

    // rows outside the selection keep their values
    assert!(lines[4].ends_with("\t1\t2\t3\t4\t5\t6\t7\t8"));

    let points = fs::read_to_string(&points_path).unwrap();
    assert_eq!(points.lines().count(), 1 + 12);
    assert_eq!(points.lines().next().unwrap(), "id,corner,lon,lat");

    let geojson: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&polygons_path).unwrap()).unwrap();
    assert_eq!(geojson["type"], "FeatureCollection");
    let features = geojson["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features[0]["geometry"]["type"], "Polygon");
    let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
    assert_eq!(ring.len(), 5);
    assert_eq!(ring[0], ring[4]);
}

#[test]
fn test_missing_scale_fails_the_run() {
    let table =
        RecordTable::read_from(TABLE.as_bytes(), b'\t', &RecordColumns::default(), None).unwrap();
    assert_eq!(table.records.len(), 4);

    // frame 3 has no scale and nothing fills it in
    assert!(FootprintCalculator::standard()
        .compute_records(table.records.clone())
        .is_err());
}

#[test]
fn test_custom_columns_and_params_from_toml() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("footprints.toml");
    fs::write(&config_path, "film_size_in = 9.0\nmax_exposure_gap = 3\n").unwrap();

    let params = FootprintParams::from_toml_file(&config_path).unwrap();
    assert_eq!(params.max_exposure_gap, 3);
    assert_eq!(params.distance_factor, 2.0);

    let columns: RecordColumns = toml::from_str("id = \"PHOTO\"\nscale = \"SCALE\"\n").unwrap();
    assert_eq!(columns.id, "PHOTO");
    assert_eq!(columns.project, "PROJECT_CODE");

    let text = "PHOTO,PROJECT_CODE,ROLL_NUMBER,FLIGHT_LINE,EXPOSURE_NUMBER,SCALE,CENTER_LON,CENTER_LAT\n\
p1,P,1,1,1,20000,-150.00,61.0\n\
p2,P,1,1,3,20000,-150.01,61.0\n";
    let table = RecordTable::read_from(text.as_bytes(), b',', &columns, None).unwrap();
    let batch = FootprintCalculator::new(params)
        .compute_records(table.records.clone())
        .unwrap();

    // a gap of two exposures is within the configured limit
    let first = batch.footprints().next().unwrap();
    assert_eq!(first.heading_source, apsi_footprints::core::HeadingSource::Local);
}

#[test]
fn test_missing_column_is_reported() {
    let text = "VENDOR_ID,PROJECT_CODE\nA,B\n";
    let err = RecordTable::read_from(text.as_bytes(), b',', &RecordColumns::default(), None)
        .unwrap_err();
    assert!(err.to_string().contains("ROLL_NUMBER"));
}

#[test]
fn test_import_then_export_references() {
    init_logging();

    let dir = TempDir::new().unwrap();
    let table_path = dir.path().join("table.tsv");
    let imported_path = dir.path().join("imported.tsv");
    let export_path = dir.path().join("references.txt");
    fs::write(&table_path, TABLE).unwrap();

    let filter: RowFilter = "PROJECT_CODE=AK-66".parse().unwrap();
    let mut table =
        RecordTable::read_file(&table_path, b'\t', &RecordColumns::default(), Some(&filter))
            .unwrap();
    let (aligned, _) = PhotoCenterFile::read_from(CENTERS.as_bytes())
        .unwrap()
        .aligned_centers();
    assert_eq!(table.import_centers(&aligned, Some("LENS_FOCAL_LENGTH_QTY")), 1);
    table.write_file(&imported_path).unwrap();

    let reread =
        RecordTable::read_file(&imported_path, b'\t', &RecordColumns::default(), Some(&filter))
            .unwrap();
    assert_eq!(reread.records[2].scale, Some(19994.0));
    assert_eq!(reread.records[2].longitude, -150.02);

    let params = HostExportParams {
        with_altitude: true,
        focal_length_column: "LENS_FOCAL_LENGTH_QTY".to_string(),
        ..HostExportParams::default()
    };
    let written = write_host_export_file(&export_path, "WGS 84", &reread.records, &params).unwrap();
    assert_eq!(written, 3);

    let text = fs::read_to_string(&export_path).unwrap();
    let first: Vec<&str> = text.lines().nth(2).unwrap().split('\t').collect();
    assert_eq!(first[0], "AR1VFAJ00010001.tif");
    // 1:20000 with a 6 mm focal length attribute
    let z: f64 = first[3].parse().unwrap();
    assert!((z - 120.0).abs() < 1e-9);
}

#[test]
fn test_import_oblique_file() {
    let table_text = "VENDOR_ID,PROJECT_CODE,ROLL_NUMBER,FLIGHT_LINE,EXPOSURE_NUMBER,PHOTO_SCALE,CENTER_LON,CENTER_LAT,OBLIQUE_DIR_TXT\n\
AR1VFAJ00010001,AK-66,1,3,1,,,,\n";
    let centers = "#CoordinateSystem: WGS 84 (EPSG::4326)\n\
#Label\tX\tY\tZ\tX_est\tY_est\tDirection\n\
1vfaj00010001.tif\tnan\tnan\tnan\t-150.5\t61.25\tNE\n";

    let mut table =
        RecordTable::read_from(table_text.as_bytes(), b',', &RecordColumns::default(), None)
            .unwrap();
    let file = ObliqueCenterFile::read_from(centers.as_bytes()).unwrap();
    assert_eq!(table.import_oblique(&file.rows, "OBLIQUE_DIR_TXT").unwrap(), 1);

    let mut out = Vec::new();
    table.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().nth(1).unwrap(), "AR1VFAJ00010001,AK-66,1,3,1,,-150.5,61.25,NE");
}
