//! NIfTI-1 single-file codec (`.nii`, `.nii.gz`)
//!
//! Reads any of the common scalar datatypes in either byte order and applies
//! `scl_slope`/`scl_inter`. Writes little-endian files: `u8` for label
//! volumes, `f32` for intensity volumes. Spacing and qform/sform placement
//! survive a read/write cycle so masks overlay their source series.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{ImagingVolume, LabelVolume, Modality, Orientation, Spacing};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array3, ShapeBuilder};
use tracing::trace;

use crate::error::{NiftiError, Result};

/// Size of the NIfTI-1 header
pub const HEADER_SIZE: usize = 348;

/// Header plus the 4-byte extension flag
pub const VOX_OFFSET: usize = 352;

const MAGIC: [u8; 4] = *b"n+1\0";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `xyzt_units` code for millimetres
const UNITS_MM: u8 = 2;

/// Voxel datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Datatype {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            2 => Some(Self::U8),
            4 => Some(Self::I16),
            8 => Some(Self::I32),
            16 => Some(Self::F32),
            64 => Some(Self::F64),
            256 => Some(Self::I8),
            512 => Some(Self::U16),
            768 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::U8 => 2,
            Self::I16 => 4,
            Self::I32 => 8,
            Self::F32 => 16,
            Self::F64 => 64,
            Self::I8 => 256,
            Self::U16 => 512,
            Self::U32 => 768,
        }
    }

    pub fn bytes_per_voxel(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Decoded header fields the pipeline cares about
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// Spatial dimensions `[nx, ny, nz]`
    pub dim: [usize; 3],
    pub datatype: Datatype,
    /// Voxel size, converted to millimetres
    pub spacing: Spacing,
    pub orientation: Orientation,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub vox_offset: usize,
    pub big_endian: bool,
}

impl NiftiHeader {
    pub fn voxel_count(&self) -> usize {
        self.dim.iter().product()
    }
}

/// Fixed-offset field access in either byte order
struct FieldReader<'a> {
    raw: &'a [u8],
    big_endian: bool,
}

impl FieldReader<'_> {
    fn i16_at(&self, offset: usize) -> i16 {
        let mut field = &self.raw[offset..offset + 2];
        if self.big_endian {
            field.get_i16()
        } else {
            field.get_i16_le()
        }
    }

    fn f32_at(&self, offset: usize) -> f32 {
        let mut field = &self.raw[offset..offset + 4];
        if self.big_endian {
            field.get_f32()
        } else {
            field.get_f32_le()
        }
    }

    fn f32s_at<const N: usize>(&self, offset: usize) -> [f32; N] {
        std::array::from_fn(|i| self.f32_at(offset + 4 * i))
    }
}

/// Parse the 348-byte header
pub fn parse_header(raw: &[u8]) -> Result<NiftiHeader> {
    if raw.len() < HEADER_SIZE {
        return Err(NiftiError::TooShort { len: raw.len() });
    }

    let sizeof_le = (&raw[0..4]).get_i32_le();
    let big_endian = if sizeof_le == HEADER_SIZE as i32 {
        false
    } else if (&raw[0..4]).get_i32() == HEADER_SIZE as i32 {
        true
    } else {
        return Err(NiftiError::BadHeaderSize(sizeof_le));
    };

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&raw[344..348]);
    if magic != MAGIC {
        return Err(NiftiError::BadMagic(magic));
    }

    let fields = FieldReader { raw, big_endian };

    let ndim = fields.i16_at(40);
    if !(1..=7).contains(&ndim) {
        return Err(NiftiError::BadDimensions(format!("dim[0] = {ndim}")));
    }
    let ndim = ndim as usize;

    let mut dim = [1usize; 3];
    for (axis, size) in dim.iter_mut().enumerate().take(ndim) {
        let raw_size = fields.i16_at(42 + 2 * axis);
        if raw_size < 1 {
            return Err(NiftiError::BadDimensions(format!(
                "dim[{}] = {raw_size}",
                axis + 1
            )));
        }
        *size = raw_size as usize;
    }
    for extra in 4..=ndim {
        let raw_size = fields.i16_at(40 + 2 * extra);
        if raw_size > 1 {
            return Err(NiftiError::BadDimensions(format!(
                "dim[{extra}] = {raw_size}, only single-frame 3-D volumes are supported"
            )));
        }
    }

    let code = fields.i16_at(70);
    let datatype = Datatype::from_code(code).ok_or(NiftiError::UnsupportedDatatype(code))?;

    let pixdim: [f32; 4] = fields.f32s_at(76);
    let mut spacing_raw = [1.0f32; 3];
    for axis in 0..ndim.min(3) {
        spacing_raw[axis] = pixdim[axis + 1].abs();
    }
    if spacing_raw.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(NiftiError::BadSpacing(spacing_raw));
    }
    let unit_scale = match raw[123] & 0x07 {
        1 => 1000.0,
        3 => 0.001,
        _ => 1.0,
    };
    let spacing = Spacing(spacing_raw.map(|v| f64::from(v) * unit_scale));

    let vox_offset = fields.f32_at(108);
    let vox_offset = if vox_offset.is_finite() && vox_offset >= VOX_OFFSET as f32 {
        vox_offset as usize
    } else {
        VOX_OFFSET
    };

    let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let orientation = Orientation {
        qform_code: fields.i16_at(252),
        sform_code: fields.i16_at(254),
        quatern: fields.f32s_at(256),
        qoffset: fields.f32s_at(268),
        qfac,
        srow: [fields.f32s_at(280), fields.f32s_at(296), fields.f32s_at(312)],
    };

    Ok(NiftiHeader {
        dim,
        datatype,
        spacing,
        orientation,
        scl_slope: fields.f32_at(112),
        scl_inter: fields.f32_at(116),
        vox_offset,
        big_endian,
    })
}

macro_rules! read_voxels {
    ($buf:ident, $n:expr, $scale:ident, $get:ident) => {
        (0..$n).map(|_| $scale(f64::from($buf.$get()))).collect::<Vec<f32>>()
    };
    ($buf:ident, $n:expr, $scale:ident, $big_endian:expr, $get_be:ident, $get_le:ident) => {
        (0..$n)
            .map(|_| {
                let v = if $big_endian {
                    $buf.$get_be()
                } else {
                    $buf.$get_le()
                };
                $scale(f64::from(v))
            })
            .collect::<Vec<f32>>()
    };
}

/// Decode a whole (already decompressed) file
pub fn decode(raw: &[u8]) -> Result<(NiftiHeader, Array3<f32>)> {
    let header = parse_header(raw)?;
    let [nx, ny, nz] = header.dim;
    let n = header.voxel_count();
    let expected = n * header.datatype.bytes_per_voxel();
    let actual = raw.len().saturating_sub(header.vox_offset);
    if actual < expected {
        return Err(NiftiError::Truncated { expected, actual });
    }

    let slope = f64::from(header.scl_slope);
    let inter = f64::from(header.scl_inter);
    let scaled = slope != 0.0 && slope.is_finite() && inter.is_finite();
    let scale = |v: f64| -> f32 {
        if scaled {
            (v * slope + inter) as f32
        } else {
            v as f32
        }
    };

    let mut buf = &raw[header.vox_offset..header.vox_offset + expected];
    let be = header.big_endian;
    let values = match header.datatype {
        Datatype::U8 => read_voxels!(buf, n, scale, get_u8),
        Datatype::I8 => read_voxels!(buf, n, scale, get_i8),
        Datatype::I16 => read_voxels!(buf, n, scale, be, get_i16, get_i16_le),
        Datatype::U16 => read_voxels!(buf, n, scale, be, get_u16, get_u16_le),
        Datatype::I32 => read_voxels!(buf, n, scale, be, get_i32, get_i32_le),
        Datatype::U32 => read_voxels!(buf, n, scale, be, get_u32, get_u32_le),
        Datatype::F32 => read_voxels!(buf, n, scale, be, get_f32, get_f32_le),
        Datatype::F64 => read_voxels!(buf, n, scale, be, get_f64, get_f64_le),
    };

    // x varies fastest on disk
    let data = Array3::from_shape_vec((nx, ny, nz).f(), values)
        .map_err(|e| NiftiError::BadDimensions(e.to_string()))?
        .as_standard_layout()
        .into_owned();

    trace!(dim = ?header.dim, datatype = ?header.datatype, "decoded NIfTI volume");
    Ok((header, data))
}

/// Read a file, inflating it when it starts with the gzip magic
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path)?;
    if raw.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::with_capacity(raw.len() * 4);
        GzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
        Ok(inflated)
    } else {
        Ok(raw)
    }
}

/// Read one modality volume from disk
pub fn read_volume(path: &Path, modality: Modality) -> Result<ImagingVolume> {
    let raw = read_bytes(path)?;
    let (header, data) = decode(&raw)?;
    Ok(ImagingVolume {
        modality,
        data,
        spacing: header.spacing,
        orientation: header.orientation,
    })
}

/// Read a label mask back (values rounded to the nearest class id)
pub fn read_labels(path: &Path) -> Result<LabelVolume> {
    let raw = read_bytes(path)?;
    let (header, data) = decode(&raw)?;
    Ok(LabelVolume {
        labels: data.mapv(|v| v.round().clamp(0.0, 255.0) as u8),
        spacing: header.spacing,
        orientation: header.orientation,
    })
}

fn encode_header(
    buf: &mut BytesMut,
    dim: [usize; 3],
    datatype: Datatype,
    spacing: Spacing,
    orientation: &Orientation,
    description: &str,
) -> Result<()> {
    let mut dim16 = [0i16; 3];
    for (axis, size) in dim.iter().enumerate() {
        dim16[axis] = i16::try_from(*size)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| NiftiError::BadDimensions(format!("axis {axis} size {size}")))?;
    }

    buf.put_i32_le(HEADER_SIZE as i32);
    // data_type, db_name, extents, session_error, regular, dim_info
    buf.put_bytes(0, 36);
    buf.put_i16_le(3);
    for size in dim16 {
        buf.put_i16_le(size);
    }
    for _ in 0..4 {
        buf.put_i16_le(1);
    }
    // intent_p1..3, intent_code
    buf.put_bytes(0, 14);
    buf.put_i16_le(datatype.code());
    buf.put_i16_le((datatype.bytes_per_voxel() * 8) as i16);
    // slice_start
    buf.put_i16_le(0);
    buf.put_f32_le(orientation.qfac);
    for v in spacing.0 {
        buf.put_f32_le(v as f32);
    }
    buf.put_bytes(0, 16);
    buf.put_f32_le(VOX_OFFSET as f32);
    // scl_slope, scl_inter
    buf.put_f32_le(1.0);
    buf.put_f32_le(0.0);
    // slice_end, slice_code
    buf.put_i16_le(0);
    buf.put_u8(0);
    buf.put_u8(UNITS_MM);
    // cal_max, cal_min, slice_duration, toffset, glmax, glmin
    buf.put_bytes(0, 24);

    let mut descrip = [0u8; 80];
    let text = description.as_bytes();
    let len = text.len().min(79);
    descrip[..len].copy_from_slice(&text[..len]);
    buf.put_slice(&descrip);
    // aux_file
    buf.put_bytes(0, 24);

    buf.put_i16_le(orientation.qform_code);
    buf.put_i16_le(orientation.sform_code);
    for v in orientation.quatern.iter().chain(orientation.qoffset.iter()) {
        buf.put_f32_le(*v);
    }
    for row in &orientation.srow {
        for v in row {
            buf.put_f32_le(*v);
        }
    }
    // intent_name
    buf.put_bytes(0, 16);
    buf.put_slice(&MAGIC);
    // no extensions
    buf.put_bytes(0, 4);

    debug_assert_eq!(buf.len(), VOX_OFFSET);
    Ok(())
}

/// Encode a label volume as an uncompressed `u8` file image
pub fn encode_labels(volume: &LabelVolume) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(VOX_OFFSET + volume.labels.len());
    encode_header(
        &mut buf,
        volume.shape(),
        Datatype::U8,
        volume.spacing,
        &volume.orientation,
        "tumorseg label volume",
    )?;
    // reversed-axes view iterates with x fastest
    for &label in volume.labels.t().iter() {
        buf.put_u8(label);
    }
    Ok(buf.freeze())
}

/// Encode an intensity volume as an uncompressed `f32` file image
pub fn encode_volume(volume: &ImagingVolume) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(VOX_OFFSET + volume.data.len() * 4);
    encode_header(
        &mut buf,
        volume.shape(),
        Datatype::F32,
        volume.spacing,
        &volume.orientation,
        volume.modality.as_str(),
    )?;
    for &v in volume.data.t().iter() {
        buf.put_f32_le(v);
    }
    Ok(buf.freeze())
}

/// Write bytes, gzip-compressed when the path ends in `.gz`
fn write_file(path: &Path, image: &[u8]) -> Result<()> {
    let gzip = path.extension().and_then(|e| e.to_str()) == Some("gz");
    if gzip {
        let file = fs::File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(image)?;
        encoder.finish()?.sync_all()?;
    } else {
        fs::write(path, image)?;
    }
    Ok(())
}

/// Write a label mask (`.nii` or `.nii.gz`)
pub fn write_labels(path: &Path, volume: &LabelVolume) -> Result<()> {
    write_file(path, &encode_labels(volume)?)
}

/// Write an intensity volume (`.nii` or `.nii.gz`)
pub fn write_volume(path: &Path, volume: &ImagingVolume) -> Result<()> {
    write_file(path, &encode_volume(volume)?)
}
