use std::fs;
use std::io::Write;
use std::path::Path;

use burn_ndarray::NdArray;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use volseg_core::mask::binarize;
use volseg_core::{Direction3, RegionOfInterest};
use volseg_io::metaimage::{read_metaimage, read_metaimage_header};
use volseg_io::IoError;

type TestBackend = NdArray<f32>;

/// Header for a 4 (X) x 3 (Y) x 2 (Z) image.
fn header(element_type: &str, extra: &str, data_file: &str) -> String {
    format!(
        "ObjectType = Image\n\
         NDims = 3\n\
         BinaryData = True\n\
         DimSize = 4 3 2\n\
         ElementSpacing = 0.5 0.75 2.5\n\
         Offset = -10 20.5 3\n\
         {extra}\
         ElementType = {element_type}\n\
         ElementDataFile = {data_file}\n"
    )
}

fn label_values() -> Vec<u8> {
    // Value encodes its (z, y, x) position; a few voxels are background.
    (0..24u8).map(|i| if i % 5 == 0 { 0 } else { i }).collect()
}

fn voxels(path: &Path) -> Vec<f32> {
    let device = Default::default();
    let volume = read_metaimage::<TestBackend, _>(path, &device).unwrap();
    volume.into_data().into_data().to_vec::<f32>().unwrap()
}

#[test]
fn test_mhd_with_raw_file() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("label.raw"), label_values()).unwrap();
    let mhd = temp.path().join("label.mhd");
    fs::write(&mhd, header("MET_UCHAR", "", "label.raw")).unwrap();

    let device = Default::default();
    let volume = read_metaimage::<TestBackend, _>(&mhd, &device).unwrap();

    assert_eq!(volume.shape(), [2, 3, 4]);
    assert_eq!(volume.spacing().to_array(), [2.5, 0.75, 0.5]);
    assert_eq!(volume.origin().to_array(), [-10.0, 20.5, 3.0]);
    assert_eq!(volume.origin_zyx(), [3.0, 20.5, -10.0]);
    assert_eq!(*volume.direction(), Direction3::axis_aligned());

    let expected: Vec<f32> = label_values().into_iter().map(f32::from).collect();
    assert_eq!(voxels(&mhd), expected);
}

#[test]
fn test_mha_inline_big_endian_shorts() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("label.mha");

    let values: Vec<i16> = (0..24).map(|v| v * 100 - 1000).collect();
    let mut bytes = header("MET_SHORT", "ElementByteOrderMSB = True\n", "LOCAL").into_bytes();
    for v in &values {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    fs::write(&path, bytes).unwrap();

    let expected: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    assert_eq!(voxels(&path), expected);
}

#[test]
fn test_mha_compressed_floats() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("label.mha");

    let values: Vec<f32> = (0..24).map(|v| v as f32 * 0.25).collect();
    let mut raw = Vec::new();
    for v in &values {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let compressed = encoder.finish().unwrap();

    let extra = format!("CompressedData = True\nCompressedDataSize = {}\n", compressed.len());
    let mut bytes = header("MET_FLOAT", &extra, "LOCAL").into_bytes();
    bytes.extend_from_slice(&compressed);
    fs::write(&path, bytes).unwrap();

    assert!(read_metaimage_header(&path).unwrap().compressed);
    assert_eq!(voxels(&path), values);
}

#[test]
fn test_header_size_skips_prefix() {
    let temp = tempfile::tempdir().unwrap();
    let mut raw = vec![0xAA; 16];
    raw.extend(label_values());
    fs::write(temp.path().join("label.raw"), raw).unwrap();

    let mhd = temp.path().join("label.mhd");
    fs::write(&mhd, header("MET_UCHAR", "HeaderSize = 16\n", "label.raw")).unwrap();

    let expected: Vec<f32> = label_values().into_iter().map(f32::from).collect();
    assert_eq!(voxels(&mhd), expected);
}

#[test]
fn test_truncated_payload() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("label.raw"), vec![1u8; 10]).unwrap();
    let mhd = temp.path().join("label.mhd");
    fs::write(&mhd, header("MET_UCHAR", "", "label.raw")).unwrap();

    let device = Default::default();
    let result = read_metaimage::<TestBackend, _>(&mhd, &device);
    assert!(matches!(
        result,
        Err(IoError::DataSize { expected: 24, actual: 10 })
    ));
}

#[test]
fn test_missing_raw_file() {
    let temp = tempfile::tempdir().unwrap();
    let mhd = temp.path().join("label.mhd");
    fs::write(&mhd, header("MET_UCHAR", "", "missing.raw")).unwrap();

    let device = Default::default();
    assert!(matches!(
        read_metaimage::<TestBackend, _>(&mhd, &device),
        Err(IoError::Io(_))
    ));
}

#[test]
fn test_label_crop_and_binarize() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("label.raw"), label_values()).unwrap();
    let mhd = temp.path().join("label.mhd");
    fs::write(&mhd, header("MET_UCHAR", "", "label.raw")).unwrap();

    let device = Default::default();
    let label = read_metaimage::<TestBackend, _>(&mhd, &device).unwrap();
    let region = RegionOfInterest::new([1, 1, 1], [1, 2, 3]);
    let mask = binarize(&label.crop(&region).unwrap());

    assert_eq!(mask.shape(), [1, 2, 3]);
    // Flat indices of (1, 1..3, 1..4): 17, 18, 19, 21, 22, 23; 20 is not in the region.
    let data = mask.into_data().into_data().to_vec::<f32>().unwrap();
    assert_eq!(data, vec![1.0; 6]);

    let origin = label.index_to_physical([1.0, 1.0, 1.0]);
    assert_eq!(origin.to_array(), [-9.5, 21.25, 5.5]);
}

#[test]
fn test_oversized_header_with_short_payload() {
    let temp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let huge = |extra: &str| {
        format!(
            "ObjectType = Image\n\
             NDims = 3\n\
             DimSize = 100000 100000 1000\n\
             ElementType = MET_UCHAR\n\
             {extra}\
             ElementDataFile = LOCAL\n"
        )
    };

    let raw = temp.path().join("raw.mha");
    let mut bytes = huge("").into_bytes();
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    fs::write(&raw, bytes).unwrap();
    assert!(matches!(
        read_metaimage::<TestBackend, _>(&raw, &device),
        Err(IoError::DataSize { actual: 4, .. })
    ));

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[1, 2, 3, 4]).unwrap();
    let compressed = encoder.finish().unwrap();
    let zipped = temp.path().join("zipped.mha");
    let mut bytes = huge("CompressedData = True\n").into_bytes();
    bytes.extend_from_slice(&compressed);
    fs::write(&zipped, bytes).unwrap();
    assert!(matches!(
        read_metaimage::<TestBackend, _>(&zipped, &device),
        Err(IoError::DataSize { actual: 4, .. })
    ));
}
