//! MetaImage (`.mhd` / `.mha`) reader.
//!
//! A MetaImage is a text header of `Key = Value` lines terminated by
//! `ElementDataFile`. In `.mha` files the value is `LOCAL` and the voxel
//! payload follows the header in the same file; in `.mhd` files it names a
//! raw file next to the header. Voxels are stored with X fastest, so the
//! payload maps directly onto a `[Z, Y, X]` tensor, while the geometric keys
//! (`DimSize`, `ElementSpacing`, `Offset`) are listed X first and are
//! reversed on load.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use flate2::read::ZlibDecoder;
use volseg_core::{Direction3, Point3, Spacing3, Vector3, Volume};

use crate::error::{IoError, Result};

/// Voxel storage type (`ElementType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    LongLong,
    ULongLong,
    Float,
    Double,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::LongLong | Self::ULongLong | Self::Double => 8,
        }
    }
}

impl FromStr for ElementType {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "MET_CHAR" => Self::Char,
            "MET_UCHAR" => Self::UChar,
            "MET_SHORT" => Self::Short,
            "MET_USHORT" => Self::UShort,
            // MetaIO stores MET_LONG as 32 bits.
            "MET_INT" | "MET_LONG" => Self::Int,
            "MET_UINT" | "MET_ULONG" => Self::UInt,
            "MET_LONG_LONG" => Self::LongLong,
            "MET_ULONG_LONG" => Self::ULongLong,
            "MET_FLOAT" => Self::Float,
            "MET_DOUBLE" => Self::Double,
            other => return Err(IoError::UnsupportedElementType(other.to_string())),
        })
    }
}

/// Where the voxel payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    /// Inline, directly after the header.
    Local,
    /// Separate raw file, relative to the header's directory.
    External(PathBuf),
}

/// Parsed MetaImage header. Geometric fields are in file (X, Y, Z) order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
    pub dim_size: [usize; 3],
    pub element_spacing: [f64; 3],
    pub offset: [f64; 3],
    /// Row `i` is the physical direction of file axis `i`.
    pub transform_matrix: [f64; 9],
    pub element_type: ElementType,
    pub msb: bool,
    pub compressed: bool,
    /// Bytes to skip in the data file; `-1` means the payload is at its end.
    pub header_size: i64,
    pub data_file: DataFile,
}

impl MetaImageHeader {
    /// Parse the header from the start of `bytes`.
    ///
    /// Returns the header and the offset of the first byte after the
    /// `ElementDataFile` line (the inline payload for `LOCAL` data).
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut builder = HeaderBuilder::default();
        let mut pos = 0;

        while pos < bytes.len() {
            let newline = bytes[pos..].iter().position(|b| *b == b'\n');
            let line_end = newline.map_or(bytes.len(), |i| pos + i);
            let line = std::str::from_utf8(&bytes[pos..line_end])
                .map_err(|_| IoError::metaimage("header is not valid text"))?
                .trim();
            pos = (line_end + 1).min(bytes.len());

            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| IoError::metaimage(format!("malformed header line {line:?}")))?;
            let (key, value) = (key.trim(), value.trim());

            if key == "ElementDataFile" {
                builder.data_file = Some(match value {
                    "LOCAL" | "Local" | "local" => DataFile::Local,
                    v if v.starts_with("LIST") || v.contains('%') => {
                        return Err(IoError::metaimage("multi-file data sets are not supported"))
                    }
                    v => DataFile::External(PathBuf::from(v)),
                });
                return Ok((builder.build()?, pos));
            }
            builder.set(key, value)?;
        }

        Err(IoError::metaimage("header has no ElementDataFile entry"))
    }

    /// Voxel count. Fails when `DimSize` overflows.
    pub fn num_voxels(&self) -> Result<usize> {
        self.dim_size
            .iter()
            .try_fold(1usize, |n, &d| n.checked_mul(d))
            .ok_or_else(|| IoError::metaimage(format!("DimSize {:?} is too large", self.dim_size)))
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> Result<usize> {
        self.num_voxels()?
            .checked_mul(self.element_type.size())
            .ok_or_else(|| IoError::metaimage(format!("DimSize {:?} is too large", self.dim_size)))
    }

    /// Shape in Z, Y, X order.
    pub fn shape_zyx(&self) -> [usize; 3] {
        [self.dim_size[2], self.dim_size[1], self.dim_size[0]]
    }

    /// Spacing in Z, Y, X order.
    pub fn spacing_zyx(&self) -> Spacing3 {
        Spacing3::new(self.element_spacing).reversed()
    }

    /// Direction whose column `i` is the physical direction of array axis
    /// `i` (Z, Y, X).
    pub fn direction_zyx(&self) -> Direction3 {
        let m = &self.transform_matrix;
        let axis = |i: usize| Vector3::new([m[3 * i], m[3 * i + 1], m[3 * i + 2]]);
        Direction3::from_axes([axis(2), axis(1), axis(0)])
    }
}

#[derive(Default)]
struct HeaderBuilder {
    ndims: Option<usize>,
    dim_size: Option<Vec<usize>>,
    element_spacing: Option<Vec<f64>>,
    element_size: Option<Vec<f64>>,
    offset: Option<Vec<f64>>,
    transform_matrix: Option<Vec<f64>>,
    element_type: Option<ElementType>,
    channels: usize,
    msb: bool,
    compressed: bool,
    header_size: i64,
    data_file: Option<DataFile>,
}

impl HeaderBuilder {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "NDims" => self.ndims = Some(parse_one(key, value)?),
            "DimSize" => self.dim_size = Some(parse_list(key, value)?),
            "ElementSpacing" => self.element_spacing = Some(parse_list(key, value)?),
            "ElementSize" => self.element_size = Some(parse_list(key, value)?),
            "Offset" | "Origin" | "Position" => self.offset = Some(parse_list(key, value)?),
            "TransformMatrix" | "Orientation" | "Rotation" => {
                self.transform_matrix = Some(parse_list(key, value)?)
            }
            "ElementType" => self.element_type = Some(value.parse()?),
            "ElementNumberOfChannels" => self.channels = parse_one(key, value)?,
            "ElementByteOrderMSB" | "BinaryDataByteOrderMSB" => self.msb = parse_bool(key, value)?,
            "CompressedData" => self.compressed = parse_bool(key, value)?,
            "HeaderSize" => self.header_size = parse_one(key, value)?,
            "ObjectType" if value != "Image" => {
                return Err(IoError::metaimage(format!("ObjectType {value:?} is not an image")))
            }
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<MetaImageHeader> {
        let ndims = self.ndims.ok_or_else(|| IoError::metaimage("missing NDims"))?;
        if !(2..=3).contains(&ndims) {
            return Err(IoError::metaimage(format!("NDims must be 2 or 3, got {ndims}")));
        }
        if self.channels > 1 {
            return Err(IoError::metaimage("multi-channel images are not supported"));
        }

        let dims = self.dim_size.ok_or_else(|| IoError::metaimage("missing DimSize"))?;
        let dim_size = pad3(&dims, ndims, "DimSize", 1)?;
        if dim_size.contains(&0) {
            return Err(IoError::metaimage("DimSize entries must be positive"));
        }

        let spacing = self.element_spacing.or(self.element_size);
        let element_spacing = match spacing {
            Some(s) => pad3(&s, ndims, "ElementSpacing", 1.0)?,
            None => [1.0; 3],
        };
        let offset = match self.offset {
            Some(o) => pad3(&o, ndims, "Offset", 0.0)?,
            None => [0.0; 3],
        };

        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let transform_matrix = match self.transform_matrix {
            None => identity,
            Some(m) if ndims == 3 && m.len() == 9 => {
                let mut out = [0.0; 9];
                out.copy_from_slice(&m);
                out
            }
            Some(m) if ndims == 2 && m.len() == 4 => {
                [m[0], m[1], 0.0, m[2], m[3], 0.0, 0.0, 0.0, 1.0]
            }
            Some(m) => {
                return Err(IoError::metaimage(format!(
                    "TransformMatrix has {} values for NDims {ndims}",
                    m.len()
                )))
            }
        };

        let header = MetaImageHeader {
            dim_size,
            element_spacing,
            offset,
            transform_matrix,
            element_type: self
                .element_type
                .ok_or_else(|| IoError::metaimage("missing ElementType"))?,
            msb: self.msb,
            compressed: self.compressed,
            header_size: self.header_size,
            data_file: self
                .data_file
                .ok_or_else(|| IoError::metaimage("missing ElementDataFile"))?,
        };
        header.data_size()?;
        Ok(header)
    }
}

fn parse_one<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| IoError::metaimage(format!("invalid {key} value {value:?}")))
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value.split_whitespace().map(|v| parse_one(key, v)).collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(IoError::metaimage(format!("invalid {key} value {value:?}"))),
    }
}

/// First `ndims` values, extended to three with `fill`.
fn pad3<T: Copy>(values: &[T], ndims: usize, key: &str, fill: T) -> Result<[T; 3]> {
    if values.len() < ndims {
        return Err(IoError::metaimage(format!(
            "{key} has {} values, expected {ndims}",
            values.len()
        )));
    }
    let mut out = [fill; 3];
    out[..ndims].copy_from_slice(&values[..ndims]);
    Ok(out)
}

/// Read only the header of a MetaImage file.
pub fn read_metaimage_header<P: AsRef<Path>>(path: P) -> Result<MetaImageHeader> {
    let bytes = fs::read(path)?;
    Ok(MetaImageHeader::parse(&bytes)?.0)
}

/// Read a `.mhd` or `.mha` file into a `[Z, Y, X]` volume.
///
/// Origin is the header `Offset` as a physical point; spacing is
/// `ElementSpacing` reversed into Z, Y, X order; direction comes from
/// `TransformMatrix` (identity when absent, which maps array axis Z to
/// physical z).
pub fn read_metaimage<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let (header, data_start) = MetaImageHeader::parse(&bytes)?;

    let payload = match &header.data_file {
        DataFile::Local => bytes[data_start..].to_vec(),
        DataFile::External(name) => {
            let data_path = path.parent().unwrap_or_else(|| Path::new(".")).join(name);
            tracing::debug!(header = %path.display(), data = %data_path.display(), "Reading MetaImage data file");
            let raw = fs::read(&data_path)?;
            if header.header_size > 0 {
                let skip = header.header_size as usize;
                if skip > raw.len() {
                    return Err(IoError::DataSize { expected: skip, actual: raw.len() });
                }
                raw[skip..].to_vec()
            } else {
                raw
            }
        }
    };

    let expected = header.data_size()?;
    let payload = if header.compressed {
        // Pre-allocation is bounded by the compressed size, not the header.
        let mut decoded = Vec::with_capacity(expected.min(payload.len().saturating_mul(1000)));
        ZlibDecoder::new(payload.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| IoError::metaimage(format!("zlib decompression failed: {e}")))?;
        decoded
    } else {
        payload
    };

    if payload.len() < expected {
        return Err(IoError::DataSize {
            expected,
            actual: payload.len(),
        });
    }
    // HeaderSize = -1: the payload is the trailing `expected` bytes.
    let payload = if header.header_size == -1 {
        &payload[payload.len() - expected..]
    } else {
        &payload[..expected]
    };

    let values = decode_elements(payload, header.element_type, header.msb);
    let shape = header.shape_zyx();

    tracing::debug!(
        shape = ?shape,
        element_type = ?header.element_type,
        compressed = header.compressed,
        "Loaded MetaImage"
    );

    let tensor = Tensor::<B, 3>::from_data(TensorData::new(values, shape), device);
    Ok(Volume::new(
        tensor,
        Point3::new(header.offset),
        header.spacing_zyx(),
        header.direction_zyx(),
    ))
}

macro_rules! decode_as {
    ($bytes:expr, $msb:expr, $t:ty) => {{
        const N: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                let value = if $msb {
                    <$t>::from_be_bytes(raw)
                } else {
                    <$t>::from_le_bytes(raw)
                };
                value as f32
            })
            .collect()
    }};
}

fn decode_elements(bytes: &[u8], element_type: ElementType, msb: bool) -> Vec<f32> {
    match element_type {
        ElementType::Char => decode_as!(bytes, msb, i8),
        ElementType::UChar => decode_as!(bytes, msb, u8),
        ElementType::Short => decode_as!(bytes, msb, i16),
        ElementType::UShort => decode_as!(bytes, msb, u16),
        ElementType::Int => decode_as!(bytes, msb, i32),
        ElementType::UInt => decode_as!(bytes, msb, u32),
        ElementType::LongLong => decode_as!(bytes, msb, i64),
        ElementType::ULongLong => decode_as!(bytes, msb, u64),
        ElementType::Float => decode_as!(bytes, msb, f32),
        ElementType::Double => decode_as!(bytes, msb, f64),
    }
}
