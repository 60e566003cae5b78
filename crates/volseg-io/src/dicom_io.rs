use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, FileDicomObject, InMemDicomObject};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use nalgebra::{Point3 as NaPoint3, Vector3 as NaVector3};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use volseg_core::{Direction3, Point3, Spacing3, Vector3, Volume};

use crate::error::{IoError, Result};

type DicomFile = FileDicomObject<InMemDicomObject>;

/// Relative slice spacing spread tolerated within one series.
const SPACING_TOLERANCE: f64 = 0.01;
/// Maximum deviation between direction cosines of two slices.
const ORIENTATION_TOLERANCE: f64 = 1e-3;

/// Metadata for a discovered DICOM series
#[derive(Debug, Clone)]
pub struct DicomSeriesInfo {
    pub series_instance_uid: String,
    pub series_description: String,
    pub modality: String,
    pub patient_id: String,
    pub file_paths: Vec<PathBuf>,
}

/// Scan a directory for DICOM series, grouping them by SeriesInstanceUID.
///
/// Headers are parsed in parallel. Files that are not DICOM, or carry no
/// SeriesInstanceUID, are skipped. Series are returned sorted by UID.
pub fn scan_dicom_directory<P: AsRef<Path>>(path: P) -> Result<Vec<DicomSeriesInfo>> {
    let path = path.as_ref();

    let mut entries: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let headers: Vec<(PathBuf, DicomSeriesInfo)> = entries
        .par_iter()
        .filter_map(|file_path| {
            let obj = open_file(file_path).ok()?;
            let uid = get_string(&obj, tags::SERIES_INSTANCE_UID)?;
            let info = DicomSeriesInfo {
                series_instance_uid: uid,
                series_description: get_string(&obj, tags::SERIES_DESCRIPTION).unwrap_or_default(),
                modality: get_string(&obj, tags::MODALITY).unwrap_or_default(),
                patient_id: get_string(&obj, tags::PATIENT_ID).unwrap_or_default(),
                file_paths: Vec::new(),
            };
            Some((file_path.clone(), info))
        })
        .collect();

    let mut series_map = HashMap::<String, DicomSeriesInfo>::new();
    for (file_path, info) in headers {
        series_map
            .entry(info.series_instance_uid.clone())
            .or_insert(info)
            .file_paths
            .push(file_path);
    }

    let mut series_list: Vec<DicomSeriesInfo> = series_map.into_values().collect();
    series_list.sort_by(|a, b| a.series_instance_uid.cmp(&b.series_instance_uid));

    tracing::debug!(
        files = entries.len(),
        series = series_list.len(),
        "Scanned DICOM directory"
    );

    Ok(series_list)
}

/// Load a DICOM series into a `[Z, Y, X]` volume.
///
/// Slices are ordered along the slice normal. Every slice must share the
/// orientation and matrix size of the first one, and slice spacing must be
/// uniform within 1%; violations are [`IoError::InconsistentSeries`].
/// Rescale slope/intercept are applied per slice.
///
/// Metadata: origin is the first slice's ImagePositionPatient, spacing is
/// `[slice spacing, row spacing, column spacing]`, and the direction columns
/// are the slice normal, the column direction cosine and the row direction
/// cosine, matching array axes Z, Y, X.
pub fn load_dicom_series<B: Backend>(series: &DicomSeriesInfo, device: &B::Device) -> Result<Volume<B>> {
    if series.file_paths.is_empty() {
        return Err(IoError::NoSeries);
    }

    // 1. Read all headers
    let mut slices: Vec<DicomFile> = series
        .file_paths
        .par_iter()
        .map(|p| {
            open_file(p).map_err(|e| {
                tracing::debug!(path = %p.display(), error = %e, "Failed to open DICOM file");
                IoError::Dicom("failed to open DICOM file".to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // 2. Orientation from the first slice
    let (dir_row, dir_col) = get_orientation(&slices[0])?;
    let normal = dir_row.cross(&dir_col).normalize();

    // 3. Sort slices by projection onto the normal
    let mut keyed: Vec<(f64, DicomFile)> = slices
        .drain(..)
        .map(|obj| {
            let position = get_position(&obj).ok_or(IoError::MissingTag("ImagePositionPatient"))?;
            Ok((position.coords.dot(&normal), obj))
        })
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    // 4. Validate consistency and compute spacing
    let first = &keyed[0].1;
    let rows = get_u32(first, tags::ROWS).ok_or(IoError::MissingTag("Rows"))? as usize;
    let cols = get_u32(first, tags::COLUMNS).ok_or(IoError::MissingTag("Columns"))? as usize;
    let pixel_spacing = get_f64_vec(first, tags::PIXEL_SPACING)
        .filter(|v| v.len() == 2)
        .ok_or(IoError::MissingTag("PixelSpacing"))?;
    let row_spacing = pixel_spacing[0];
    let col_spacing = pixel_spacing[1];

    for (_, obj) in keyed.iter().skip(1) {
        let (r, c) = get_orientation(obj)?;
        if (r - dir_row).norm() > ORIENTATION_TOLERANCE || (c - dir_col).norm() > ORIENTATION_TOLERANCE {
            return Err(IoError::inconsistent("ImageOrientationPatient differs between slices"));
        }
        let (slice_rows, slice_cols) = (get_u32(obj, tags::ROWS), get_u32(obj, tags::COLUMNS));
        if slice_rows != Some(rows as u32) || slice_cols != Some(cols as u32) {
            return Err(IoError::inconsistent(format!(
                "slice size {slice_rows:?}x{slice_cols:?} differs from {rows}x{cols}"
            )));
        }
    }

    let slice_spacing = if keyed.len() > 1 {
        let gaps: Vec<f64> = keyed.windows(2).map(|w| (w[1].0 - w[0].0).abs()).collect();
        let avg = gaps.iter().sum::<f64>() / gaps.len() as f64;
        let min = gaps.iter().copied().fold(f64::INFINITY, f64::min);
        let max = gaps.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if min <= 0.0 {
            return Err(IoError::inconsistent("duplicate slice positions"));
        }
        if max - min > SPACING_TOLERANCE * avg {
            return Err(IoError::inconsistent(format!(
                "non-uniform slice spacing: min={min}, max={max}, avg={avg}"
            )));
        }
        avg
    } else {
        get_f64(first, tags::SLICE_THICKNESS).unwrap_or(1.0)
    };

    // 5. Spatial metadata, Z, Y, X
    let origin_pos = get_position(first).ok_or(IoError::MissingTag("ImagePositionPatient"))?;
    let origin = Point3::new([origin_pos.x, origin_pos.y, origin_pos.z]);
    let spacing = Spacing3::new([slice_spacing, row_spacing, col_spacing]);
    let direction = Direction3::from_axes([Vector3(normal), Vector3(dir_col), Vector3(dir_row)]);

    // 6. Decode pixel data in parallel
    let raw = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let slice_pixels: Vec<Vec<f32>> = keyed
        .par_iter()
        .map(|(_, obj)| {
            let pixel_data = obj
                .decode_pixel_data()
                .map_err(|e| IoError::Dicom(format!("failed to decode pixel data: {e}")))?;
            let slope = get_f64(obj, tags::RESCALE_SLOPE).unwrap_or(1.0) as f32;
            let intercept = get_f64(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0) as f32;

            let data: Vec<f32> = pixel_data
                .to_vec_with_options(&raw)
                .map_err(|e| IoError::Dicom(format!("pixel data conversion error: {e}")))?;

            if data.len() != rows * cols {
                return Err(IoError::inconsistent(format!(
                    "slice holds {} pixels, expected {}",
                    data.len(),
                    rows * cols
                )));
            }

            Ok(data.into_iter().map(|v| v * slope + intercept).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let depth = slice_pixels.len();
    let flattened: Vec<f32> = slice_pixels.into_iter().flatten().collect();

    tracing::debug!(
        uid = %series.series_instance_uid,
        shape = ?[depth, rows, cols],
        spacing = ?spacing.to_array(),
        "Loaded DICOM series"
    );

    // 7. Create tensor
    let data = TensorData::new(flattened, Shape::new([depth, rows, cols]));
    let tensor = Tensor::<B, 3>::from_data(data, device);

    Ok(Volume::new(tensor, origin, spacing, direction))
}

/// Read the single series in a directory.
///
/// Fails with [`IoError::NoSeries`] or [`IoError::AmbiguousSeries`] unless
/// exactly one series is present.
pub fn read_dicom_series<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let series_list = scan_dicom_directory(path)?;
    match series_list.as_slice() {
        [] => Err(IoError::NoSeries),
        [series] => load_dicom_series(series, device),
        many => Err(IoError::AmbiguousSeries(many.len())),
    }
}

// --- Helpers ---

fn get_string(obj: &DicomFile, tag: dicom::core::Tag) -> Option<String> {
    obj.element(tag)
        .ok()?
        .to_str()
        .ok()
        .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
}

fn get_u32(obj: &DicomFile, tag: dicom::core::Tag) -> Option<u32> {
    obj.element(tag).ok()?.to_int::<u32>().ok()
}

fn get_f64(obj: &DicomFile, tag: dicom::core::Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn get_f64_vec(obj: &DicomFile, tag: dicom::core::Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn get_position(obj: &DicomFile) -> Option<NaPoint3<f64>> {
    let v = get_f64_vec(obj, tags::IMAGE_POSITION_PATIENT)?;
    if v.len() == 3 {
        Some(NaPoint3::new(v[0], v[1], v[2]))
    } else {
        None
    }
}

/// Normalized row and column direction cosines.
fn get_orientation(obj: &DicomFile) -> Result<(NaVector3<f64>, NaVector3<f64>)> {
    let v = get_f64_vec(obj, tags::IMAGE_ORIENTATION_PATIENT)
        .filter(|v| v.len() == 6)
        .ok_or(IoError::MissingTag("ImageOrientationPatient"))?;
    let row = NaVector3::new(v[0], v[1], v[2]);
    let col = NaVector3::new(v[3], v[4], v[5]);
    if row.norm() == 0.0 || col.norm() == 0.0 {
        return Err(IoError::MissingTag("ImageOrientationPatient"));
    }
    Ok((row.normalize(), col.normalize()))
}
