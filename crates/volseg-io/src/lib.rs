//! Loaders producing [`volseg_core::Volume`]s in Z, Y, X order.
//!
//! - [`dicom_io`]: DICOM series (scan volumes)
//! - [`metaimage`]: MetaImage `.mhd` / `.mha` (label volumes)
//! - [`discovery`]: recursive file discovery

pub mod dicom_io;
pub mod discovery;
pub mod error;
pub mod metaimage;

pub use dicom_io::{load_dicom_series, read_dicom_series, scan_dicom_directory, DicomSeriesInfo};
pub use discovery::{find_directories_with, find_files};
pub use error::{IoError, Result};
pub use metaimage::{read_metaimage, read_metaimage_header, MetaImageHeader};
