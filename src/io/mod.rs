//! I/O modules for photo-center exchange files and archive tables

pub mod photo_centers;
pub mod records;
pub mod host_export;

pub use photo_centers::{ObliqueCenterFile, ObliqueCenterRow, PhotoCenterFile, PhotoCenterRow};
pub use records::{RecordColumns, RecordTable, RowFilter, write_corner_points};
pub use host_export::{HostExportParams, flying_height, write_host_export, write_host_export_file};
