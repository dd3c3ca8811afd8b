//! Minimal reader for binary little-endian PLY files with a single
//! `vertex` element, the layout emitted by Gaussian-splat training tools.
//!
//! The file is memory-mapped; property accessors read straight out of the
//! mapping, so ingesting a multi-gigabyte scan never copies the body twice.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::FormatError;

/// Scalar types a PLY property can declare.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum PropType {
    Double,
    Float,
    Int,
    UInt,
    Short,
    UShort,
    Char,
    UChar,
}

impl PropType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "double" | "float64" => Self::Double,
            "float" | "float32" => Self::Float,
            "int" | "int32" => Self::Int,
            "uint" | "uint32" => Self::UInt,
            "short" | "int16" => Self::Short,
            "ushort" | "uint16" => Self::UShort,
            "char" | "int8" => Self::Char,
            "uchar" | "uint8" => Self::UChar,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::Double => 8,
            Self::Float | Self::Int | Self::UInt => 4,
            Self::Short | Self::UShort => 2,
            Self::Char | Self::UChar => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Char => "char",
            Self::UChar => "uchar",
        }
    }
}

#[derive(Debug)]
struct Property {
    name: String,
    ty: PropType,
    /// Byte offset of this property within one vertex row.
    offset: usize,
}

/// Headers are ASCII and short; scanning past this point means the file is
/// not a PLY file at all.
const MAX_HEADER_LEN: usize = 64 * 1024;
const END_HEADER: &[u8] = b"end_header\n";

/// A memory-mapped binary PLY file with its header decoded.
pub(crate) struct PlyFile {
    map: Mmap,
    body_start: usize,
    num_vertices: usize,
    row_length: usize,
    props: Vec<Property>,
}

impl PlyFile {
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let io_err = |source| FormatError::Io {
            path: path.display().to_string(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        // Safety: the mapping is read-only and the dataset file is treated as
        // immutable for the lifetime of the process.
        let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;

        let (header, body_start) = split_header(&map)?;
        let mut ply = Self {
            map,
            body_start,
            num_vertices: 0,
            row_length: 0,
            props: Vec::new(),
        };
        ply.parse_header(&header)?;

        let body_len = ply.map.len() - ply.body_start;
        let expected = ply.num_vertices * ply.row_length;
        if body_len < expected {
            return Err(FormatError::Truncated {
                expected,
                actual: body_len,
            });
        }

        Ok(ply)
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Resolves a named `float` property into a row accessor.
    pub fn accessor_f32(&self, name: &str) -> Result<PlyAccessor<'_>, FormatError> {
        let prop = self
            .props
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| FormatError::MissingProperty(name.to_string()))?;

        if prop.ty != PropType::Float {
            return Err(FormatError::TypeMismatch {
                name: name.to_string(),
                found: prop.ty.name(),
                expected: "float",
            });
        }

        Ok(PlyAccessor {
            body: &self.map[self.body_start..],
            row_length: self.row_length,
            offset: prop.offset,
        })
    }

    fn parse_header(&mut self, header: &str) -> Result<(), FormatError> {
        if !header.starts_with("ply\nformat binary_little_endian 1.0") {
            return Err(FormatError::UnsupportedFormat);
        }

        let mut in_vertex_element = false;
        let mut saw_vertex_element = false;

        for line in header.lines() {
            let mut words = line.split_ascii_whitespace();
            match words.next() {
                Some("element") => {
                    let kind = words.next().unwrap_or("");
                    in_vertex_element = kind == "vertex";
                    if in_vertex_element {
                        if saw_vertex_element {
                            return Err(FormatError::BadHeader(
                                "duplicate vertex element".into(),
                            ));
                        }
                        saw_vertex_element = true;
                        self.num_vertices = words
                            .next()
                            .and_then(|n| n.parse().ok())
                            .ok_or_else(|| {
                                FormatError::BadHeader("bad vertex count".into())
                            })?;
                    }
                }
                Some("property") if in_vertex_element => {
                    let ty_word = words.next().unwrap_or("");
                    if ty_word == "list" {
                        return Err(FormatError::BadHeader(
                            "list properties are not supported".into(),
                        ));
                    }
                    let ty = PropType::parse(ty_word).ok_or_else(|| {
                        FormatError::BadHeader(format!("unknown property type `{ty_word}`"))
                    })?;
                    let name = words
                        .next()
                        .ok_or_else(|| FormatError::BadHeader("unnamed property".into()))?;
                    self.props.push(Property {
                        name: name.to_string(),
                        ty,
                        offset: self.row_length,
                    });
                    self.row_length += ty.size();
                }
                _ => {}
            }
        }

        if !saw_vertex_element {
            return Err(FormatError::BadHeader("no vertex element".into()));
        }
        Ok(())
    }
}

/// Locates `end_header` and returns the header text plus the body offset.
fn split_header(map: &[u8]) -> Result<(String, usize), FormatError> {
    let scan = &map[..map.len().min(MAX_HEADER_LEN)];
    let pos = scan
        .windows(END_HEADER.len())
        .position(|w| w == END_HEADER)
        .ok_or(FormatError::UnsupportedFormat)?;
    let end = pos + END_HEADER.len();

    let header = std::str::from_utf8(&map[..end])
        .map_err(|_| FormatError::BadHeader("header is not valid UTF-8".into()))?;
    Ok((header.to_string(), end))
}

/// Reads one `float` property out of fixed-stride vertex rows.
pub(crate) struct PlyAccessor<'a> {
    body: &'a [u8],
    row_length: usize,
    offset: usize,
}

impl PlyAccessor<'_> {
    #[inline]
    pub fn get(&self, row: usize) -> f32 {
        let at = self.offset + row * self.row_length;
        bytemuck::pod_read_unaligned(&self.body[at..at + 4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("nimbus-ply-{}-{name}", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    fn tiny_ply() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            b"ply\nformat binary_little_endian 1.0\n\
              comment made by nobody\n\
              element vertex 2\n\
              property float x\n\
              property float y\n\
              property uchar tag\n\
              end_header\n",
        );
        for (x, y, tag) in [(1.5f32, -2.0f32, 7u8), (0.25, 4.0, 9)] {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
            bytes.push(tag);
        }
        bytes
    }

    #[test]
    fn reads_float_properties_by_name() {
        let path = write_temp("ok", &tiny_ply());
        let ply = PlyFile::open(&path).unwrap();
        assert_eq!(ply.num_vertices(), 2);

        let x = ply.accessor_f32("x").unwrap();
        let y = ply.accessor_f32("y").unwrap();
        assert_eq!(x.get(0), 1.5);
        assert_eq!(y.get(0), -2.0);
        assert_eq!(x.get(1), 0.25);
        assert_eq!(y.get(1), 4.0);
    }

    #[test]
    fn missing_property_is_an_error() {
        let path = write_temp("missing", &tiny_ply());
        let ply = PlyFile::open(&path).unwrap();
        assert!(matches!(
            ply.accessor_f32("z"),
            Err(FormatError::MissingProperty(_))
        ));
    }

    #[test]
    fn mistyped_property_is_an_error() {
        let path = write_temp("mistyped", &tiny_ply());
        let ply = PlyFile::open(&path).unwrap();
        assert!(matches!(
            ply.accessor_f32("tag"),
            Err(FormatError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn ascii_ply_is_rejected() {
        let path = write_temp(
            "ascii",
            b"ply\nformat ascii 1.0\nelement vertex 0\nend_header\n",
        );
        assert!(matches!(
            PlyFile::open(&path),
            Err(FormatError::UnsupportedFormat)
        ));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut bytes = tiny_ply();
        bytes.truncate(bytes.len() - 3);
        let path = write_temp("truncated", &bytes);
        assert!(matches!(
            PlyFile::open(&path),
            Err(FormatError::Truncated { .. })
        ));
    }
}
