//! Crystallographic Binary File (CBF) codec.
//!
//! Only the `x-CBF_BYTE_OFFSET` compression used by photon-counting
//! detectors is supported. Each pixel is stored as the difference to the
//! previous pixel: one signed byte, escalating to 2, 4 and 8 byte
//! little-endian integers behind the escape values `0x80`, `0x8000` and
//! `0x80000000`.

use crate::mmap::MappedFile;
use crate::{Error, Result};
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Start of the binary section.
const BINARY_MARKER: [u8; 4] = [0x0C, 0x1A, 0x04, 0xD5];
const SECTION_BOUNDARY: &[u8] = b"--CIF-BINARY-FORMAT-SECTION--";
const BYTE_OFFSET: &str = "x-cbf_byte_offset";

/// MIME header fields of the binary section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CbfHeader {
    /// Compressed payload size in bytes.
    pub binary_size: usize,
    /// Columns (fastest varying dimension).
    pub fastest_dimension: usize,
    /// Rows.
    pub second_dimension: usize,
    /// Total pixel count.
    pub elements: usize,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn parse_field(value: &str, field: &str) -> std::result::Result<usize, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {field}: {value:?}"))
}

/// Parses the binary section header and returns it together with the
/// offset of the first payload byte.
fn parse_header(bytes: &[u8]) -> std::result::Result<(CbfHeader, usize), String> {
    let marker = find(bytes, &BINARY_MARKER).ok_or("binary section marker not found")?;
    let preamble = &bytes[..marker];
    let section = rfind(preamble, SECTION_BOUNDARY).map_or(preamble, |start| &preamble[start..]);
    let text = String::from_utf8_lossy(section);

    if !text.to_ascii_lowercase().contains(BYTE_OFFSET) {
        return Err("unsupported compression (only x-CBF_BYTE_OFFSET is supported)".to_string());
    }

    let mut header = CbfHeader::default();
    let mut binary_size = None;
    let mut elements = None;
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        match key.trim() {
            "X-Binary-Size" => binary_size = Some(parse_field(value, key)?),
            "X-Binary-Number-of-Elements" => elements = Some(parse_field(value, key)?),
            "X-Binary-Size-Fastest-Dimension" => {
                header.fastest_dimension = parse_field(value, key)?;
            }
            "X-Binary-Size-Second-Dimension" => {
                header.second_dimension = parse_field(value, key)?;
            }
            "X-Binary-Element-Byte-Order" if !value.contains("LITTLE_ENDIAN") => {
                return Err(format!("unsupported byte order: {}", value.trim()));
            }
            _ => {}
        }
    }

    if header.fastest_dimension == 0 || header.second_dimension == 0 {
        return Err("missing image dimensions".to_string());
    }
    let pixels = header
        .fastest_dimension
        .checked_mul(header.second_dimension)
        .ok_or("image dimensions overflow")?;
    header.elements = elements.unwrap_or(pixels);
    if header.elements != pixels {
        return Err(format!(
            "element count {} does not match {}x{}",
            header.elements, header.second_dimension, header.fastest_dimension
        ));
    }
    header.binary_size = binary_size.ok_or("missing X-Binary-Size")?;
    // Every byte-offset pixel takes at least one payload byte.
    if header.elements > header.binary_size {
        return Err(format!(
            "{} elements cannot fit in {} payload bytes",
            header.elements, header.binary_size
        ));
    }

    Ok((header, marker + BINARY_MARKER.len()))
}

fn take<const N: usize>(data: &[u8], pos: &mut usize) -> std::result::Result<[u8; N], String> {
    let chunk = data
        .get(*pos..*pos + N)
        .ok_or("compressed data truncated")?;
    *pos += N;
    <[u8; N]>::try_from(chunk).map_err(|_| "compressed data truncated".to_string())
}

fn read_delta(data: &[u8], pos: &mut usize) -> std::result::Result<i64, String> {
    let d8 = i8::from_le_bytes(take::<1>(data, pos)?);
    if d8 != i8::MIN {
        return Ok(i64::from(d8));
    }
    let d16 = i16::from_le_bytes(take::<2>(data, pos)?);
    if d16 != i16::MIN {
        return Ok(i64::from(d16));
    }
    let d32 = i32::from_le_bytes(take::<4>(data, pos)?);
    if d32 != i32::MIN {
        return Ok(i64::from(d32));
    }
    Ok(i64::from_le_bytes(take::<8>(data, pos)?))
}

#[allow(clippy::cast_precision_loss)]
fn decode_byte_offset(data: &[u8], count: usize) -> std::result::Result<Vec<f32>, String> {
    let mut values = Vec::with_capacity(count.min(data.len()));
    let mut pos = 0;
    let mut value = 0i64;
    while values.len() < count {
        value = value.wrapping_add(read_delta(data, &mut pos)?);
        values.push(value as f32);
    }
    Ok(values)
}

fn decode(bytes: &[u8]) -> std::result::Result<Array2<f32>, String> {
    let (header, start) = parse_header(bytes)?;
    let end = start
        .checked_add(header.binary_size)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            format!(
                "binary section of {} bytes exceeds file size",
                header.binary_size
            )
        })?;
    let values = decode_byte_offset(&bytes[start..end], header.elements)?;
    Array2::from_shape_vec(
        (header.second_dimension, header.fastest_dimension),
        values,
    )
    .map_err(|e| format!("shape mismatch: {e}"))
}

/// Decodes a CBF image already in memory.
///
/// The result has shape `(rows, cols)`, i.e. (second, fastest) dimension.
///
/// # Errors
/// Returns [`Error::UnreadableImage`] tagged with `path` if the data is
/// not a byte-offset compressed CBF image.
pub fn decode_cbf(bytes: &[u8], path: &Path) -> Result<Array2<f32>> {
    decode(bytes).map_err(|reason| Error::UnreadableImage {
        path: path.to_path_buf(),
        reason,
    })
}

/// Reads the single frame of a CBF file.
///
/// # Errors
/// Returns an I/O error if the file cannot be mapped and
/// [`Error::UnreadableImage`] if it cannot be decoded.
pub fn read_cbf<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let mapped = MappedFile::open(&path)?;
    decode_cbf(mapped.as_bytes(), mapped.path())
}

fn encode_byte_offset(frame: ArrayView2<'_, i32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len());
    let mut previous = 0i64;
    for &v in frame {
        let value = i64::from(v);
        let delta = value - previous;
        previous = value;

        if let Some(d) = i8::try_from(delta).ok().filter(|&d| d != i8::MIN) {
            out.extend_from_slice(&d.to_le_bytes());
            continue;
        }
        out.extend_from_slice(&i8::MIN.to_le_bytes());
        if let Some(d) = i16::try_from(delta).ok().filter(|&d| d != i16::MIN) {
            out.extend_from_slice(&d.to_le_bytes());
            continue;
        }
        out.extend_from_slice(&i16::MIN.to_le_bytes());
        if let Some(d) = i32::try_from(delta).ok().filter(|&d| d != i32::MIN) {
            out.extend_from_slice(&d.to_le_bytes());
            continue;
        }
        out.extend_from_slice(&i32::MIN.to_le_bytes());
        out.extend_from_slice(&delta.to_le_bytes());
    }
    out
}

/// Writes a frame as a byte-offset compressed CBF file.
///
/// # Errors
/// Returns an I/O error if the file cannot be written.
pub fn write_cbf<P: AsRef<Path>>(path: P, frame: ArrayView2<'_, i32>) -> Result<()> {
    let (rows, cols) = frame.dim();
    let payload = encode_byte_offset(frame);
    let name = path
        .as_ref()
        .file_stem()
        .map_or_else(|| "pattern".into(), |s| s.to_string_lossy());

    let mut out = BufWriter::new(File::create(path.as_ref())?);
    write!(
        out,
        "###CBF: VERSION 1.5\r\n\
         \r\n\
         data_{name}\r\n\
         \r\n\
         _array_data.data\r\n\
         ;\r\n\
         --CIF-BINARY-FORMAT-SECTION--\r\n\
         Content-Type: application/octet-stream;\r\n     \
         conversions=\"x-CBF_BYTE_OFFSET\"\r\n\
         Content-Transfer-Encoding: BINARY\r\n\
         X-Binary-Size: {size}\r\n\
         X-Binary-ID: 1\r\n\
         X-Binary-Element-Type: \"signed 32-bit integer\"\r\n\
         X-Binary-Element-Byte-Order: LITTLE_ENDIAN\r\n\
         X-Binary-Number-of-Elements: {elements}\r\n\
         X-Binary-Size-Fastest-Dimension: {cols}\r\n\
         X-Binary-Size-Second-Dimension: {rows}\r\n\
         X-Binary-Size-Padding: 4095\r\n\
         \r\n",
        size = payload.len(),
        elements = rows * cols,
    )?;
    out.write_all(&BINARY_MARKER)?;
    out.write_all(&payload)?;
    out.write_all(&[0u8; 4095])?;
    out.write_all(b"\r\n--CIF-BINARY-FORMAT-SECTION----\r\n;\r\n\r\n")?;
    out.flush()?;
    Ok(())
}
