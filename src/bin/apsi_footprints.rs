use anyhow::{Context, Result};
use apsi_footprints::core::estimate::fill_missing_scales;
use apsi_footprints::core::write_geojson;
use apsi_footprints::io::{
    write_corner_points, write_host_export_file, HostExportParams, ObliqueCenterFile,
    RecordColumns, RowFilter,
};
use apsi_footprints::{FootprintCalculator, FootprintParams, PhotoCenterFile, RecordTable};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Photo footprint tools for the aerial photography archive
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute footprint corners for selected archive rows
    Corners(CornersArgs),
    /// Estimate photo centers the photogrammetry host failed to align
    FillCenters(FillCentersArgs),
    /// Copy estimated photo centers into the archive table
    ImportCenters(ImportCentersArgs),
    /// Write archive centers as camera references for the photogrammetry host
    ExportCenters(ExportCentersArgs),
}

#[derive(Debug, Args)]
struct TableArgs {
    /// Archive table (delimited text with header)
    #[arg(long)]
    table: PathBuf,

    /// Field delimiter of the archive table
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Row selection, e.g. PROJECT_CODE=AK-66
    #[arg(long)]
    filter: Option<RowFilter>,

    /// TOML file overriding archive column names
    #[arg(long)]
    columns: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CornersArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Output table with UR/UL/LL/LR columns filled in
    #[arg(long)]
    output: PathBuf,

    /// TOML file with footprint parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the flat corner point list as CSV
    #[arg(long)]
    points: Option<PathBuf>,

    /// Write footprint polygons as GeoJSON
    #[arg(long)]
    polygons: Option<PathBuf>,

    /// Photo-center file used to estimate missing scales
    #[arg(long)]
    photo_centers: Option<PathBuf>,

    /// Attribute holding the lens focal length, for scale estimates
    #[arg(long, default_value = "LENS_FOCAL_LENGTH_QTY")]
    focal_length_column: String,
}

#[derive(Debug, Args)]
struct FillCentersArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Photo-center file exported by the photogrammetry host
    #[arg(long)]
    input: PathBuf,

    /// Photo-center file with estimated rows filled in
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct ImportCentersArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Photo-center file exported by the photogrammetry host
    #[arg(long)]
    input: PathBuf,

    /// Archive table with imported centers
    #[arg(long)]
    output: PathBuf,

    /// Input is an oblique export with a Direction column
    #[arg(long)]
    oblique: bool,

    /// Column receiving the oblique look direction
    #[arg(long, default_value = "OBLIQUE_DIR_TXT")]
    direction_column: String,

    /// Estimate centers of unaligned frames before importing
    #[arg(long)]
    fill_missing: bool,

    /// Estimate missing scales from photo height and focal length
    #[arg(long)]
    estimate_scale: bool,

    /// Attribute holding the lens focal length
    #[arg(long, default_value = "LENS_FOCAL_LENGTH_QTY")]
    focal_length_column: String,
}

#[derive(Debug, Args)]
struct ExportCentersArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Camera reference file to write
    #[arg(long)]
    output: PathBuf,

    /// Coordinate system written in the preamble
    #[arg(long, default_value = "WGS 84 (EPSG::4326)")]
    coordinate_system: String,

    /// Appended to each id to form the image label
    #[arg(long, default_value = ".tif")]
    file_extension: String,

    /// Write a flying height estimate as altitude
    #[arg(long)]
    altitude: bool,

    /// Metres added to the flying height
    #[arg(long, default_value_t = 0.0)]
    ground_offset: f64,

    /// Attribute holding the lens focal length in millimetres
    #[arg(long, default_value = "LENS_FOCAL_LENGTH_QTY")]
    focal_length_column: String,
}

fn load_table(args: &TableArgs) -> Result<RecordTable> {
    let columns = match &args.columns {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading column names from {}", path.display()))?;
            toml::from_str::<RecordColumns>(&text)
                .with_context(|| format!("parsing column names in {}", path.display()))?
        }
        None => RecordColumns::default(),
    };

    if !args.delimiter.is_ascii() {
        anyhow::bail!("delimiter must be a single ASCII character");
    }

    RecordTable::read_file(&args.table, args.delimiter as u8, &columns, args.filter.as_ref())
        .with_context(|| format!("reading archive table {}", args.table.display()))
}

fn run_corners(args: CornersArgs) -> Result<()> {
    let params = match &args.config {
        Some(path) => FootprintParams::from_toml_file(path)?,
        None => FootprintParams::default(),
    };
    log::debug!("Footprint parameters: {:?}", params);

    let mut table = load_table(&args.table)?;
    if table.records.is_empty() {
        anyhow::bail!("selection yielded no photo records");
    }

    if let Some(path) = &args.photo_centers {
        let centers = PhotoCenterFile::read_file(path)?;
        let (aligned, _) = centers.aligned_centers();
        let filled = fill_missing_scales(&mut table.records, &aligned, &args.focal_length_column);
        log::info!("Estimated {} missing scale(s)", filled);
    }

    let calculator = FootprintCalculator::new(params);
    let batch = calculator
        .compute_records(table.records.clone())
        .context("computing footprint corners")?;

    table.write_file_with_corners(&args.output, &batch)?;

    if let Some(path) = &args.points {
        log::info!("Writing corner points: {}", path.display());
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        write_corner_points(std::io::BufWriter::new(file), &batch)?;
    }

    if let Some(path) = &args.polygons {
        write_geojson(&batch, path)?;
    }

    Ok(())
}

fn run_fill_centers(args: FillCentersArgs) -> Result<()> {
    let table = load_table(&args.table)?;
    let mut centers = PhotoCenterFile::read_file(&args.input)?;

    let filled = centers.fill_missing(&table.records);
    println!("Estimated {} photo center(s)", filled);

    centers.write_file(&args.output)?;
    Ok(())
}

fn run_import_centers(args: ImportCentersArgs) -> Result<()> {
    let mut table = load_table(&args.table)?;

    let imported = if args.oblique {
        let centers = ObliqueCenterFile::read_file(&args.input)?;
        table.import_oblique(&centers.rows, &args.direction_column)?
    } else {
        let mut centers = PhotoCenterFile::read_file(&args.input)?;
        if args.fill_missing {
            centers.fill_missing(&table.records);
        }
        let (aligned, _) = centers.aligned_centers();
        let focal_length_column = args.estimate_scale.then_some(args.focal_length_column.as_str());
        table.import_centers(&aligned, focal_length_column)
    };
    println!("Imported {} photo center(s)", imported);

    table.write_file(&args.output)?;
    Ok(())
}

fn run_export_centers(args: ExportCentersArgs) -> Result<()> {
    let table = load_table(&args.table)?;
    let params = HostExportParams {
        file_extension: args.file_extension,
        with_altitude: args.altitude,
        ground_offset: args.ground_offset,
        focal_length_column: args.focal_length_column,
    };

    let written = write_host_export_file(&args.output, &args.coordinate_system, &table.records, &params)
        .with_context(|| format!("exporting camera references to {}", args.output.display()))?;
    println!("Exported {} camera reference(s)", written);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Corners(args) => run_corners(args),
        Command::FillCenters(args) => run_fill_centers(args),
        Command::ImportCenters(args) => run_import_centers(args),
        Command::ExportCenters(args) => run_export_centers(args),
    }?;

    log::info!("--Finished--");
    Ok(())
}
