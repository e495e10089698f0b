//! Well-Known Binary geometry encoding
//!
//! Geometries are written little-endian (NDR) as 2D WKB. The decoder also
//! accepts big-endian (XDR) input, since the byte order is tagged per
//! geometry. `Line`, `Rect` and `Triangle` are written as their general
//! counterparts, so they read back as `LineString` and `Polygon`.

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

use super::traits::CodecError;

const CODEC_ID: &str = "wkb";

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

const MAX_DEPTH: usize = 32;

// ============================================================================
// Encoding
// ============================================================================

/// Encode a geometry as little-endian WKB
pub fn encode(geometry: &Geometry<f64>) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(64);
    write_geometry(&mut buf, geometry)?;
    Ok(buf)
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry<f64>) -> Result<(), CodecError> {
    match geometry {
        Geometry::Point(p) => {
            header(buf, WKB_POINT)?;
            write_coord(buf, p.0)
        }
        Geometry::Line(line) => {
            header(buf, WKB_LINESTRING)?;
            write_coords(buf, &[line.start, line.end])
        }
        Geometry::LineString(ls) => {
            header(buf, WKB_LINESTRING)?;
            write_coords(buf, &ls.0)
        }
        Geometry::Polygon(poly) => {
            header(buf, WKB_POLYGON)?;
            write_polygon_rings(buf, poly)
        }
        Geometry::Rect(rect) => {
            header(buf, WKB_POLYGON)?;
            write_polygon_rings(buf, &rect.to_polygon())
        }
        Geometry::Triangle(tri) => {
            header(buf, WKB_POLYGON)?;
            write_polygon_rings(buf, &tri.to_polygon())
        }
        Geometry::MultiPoint(mp) => {
            header(buf, WKB_MULTIPOINT)?;
            write_count(buf, mp.0.len())?;
            for p in &mp.0 {
                header(buf, WKB_POINT)?;
                write_coord(buf, p.0)?;
            }
            Ok(())
        }
        Geometry::MultiLineString(mls) => {
            header(buf, WKB_MULTILINESTRING)?;
            write_count(buf, mls.0.len())?;
            for ls in &mls.0 {
                header(buf, WKB_LINESTRING)?;
                write_coords(buf, &ls.0)?;
            }
            Ok(())
        }
        Geometry::MultiPolygon(mp) => {
            header(buf, WKB_MULTIPOLYGON)?;
            write_count(buf, mp.0.len())?;
            for poly in &mp.0 {
                header(buf, WKB_POLYGON)?;
                write_polygon_rings(buf, poly)?;
            }
            Ok(())
        }
        Geometry::GeometryCollection(gc) => {
            header(buf, WKB_GEOMETRYCOLLECTION)?;
            write_count(buf, gc.0.len())?;
            gc.0.iter().try_for_each(|g| write_geometry(buf, g))
        }
    }
}

fn header(buf: &mut Vec<u8>, kind: u32) -> Result<(), CodecError> {
    buf.push(1);
    buf.write_u32::<LittleEndian>(kind).map_err(io_encode)
}

fn write_polygon_rings(buf: &mut Vec<u8>, poly: &Polygon<f64>) -> Result<(), CodecError> {
    write_count(buf, 1 + poly.interiors().len())?;
    write_coords(buf, &poly.exterior().0)?;
    for ring in poly.interiors() {
        write_coords(buf, &ring.0)?;
    }
    Ok(())
}

fn write_coords(buf: &mut Vec<u8>, coords: &[Coord<f64>]) -> Result<(), CodecError> {
    write_count(buf, coords.len())?;
    coords.iter().try_for_each(|c| write_coord(buf, *c))
}

fn write_coord(buf: &mut Vec<u8>, c: Coord<f64>) -> Result<(), CodecError> {
    buf.write_f64::<LittleEndian>(c.x).map_err(io_encode)?;
    buf.write_f64::<LittleEndian>(c.y).map_err(io_encode)
}

fn write_count(buf: &mut Vec<u8>, n: usize) -> Result<(), CodecError> {
    let n = u32::try_from(n).map_err(|_| CodecError::encode("too many elements", CODEC_ID))?;
    buf.write_u32::<LittleEndian>(n).map_err(io_encode)
}

fn io_encode(e: std::io::Error) -> CodecError {
    CodecError::encode(e.to_string(), CODEC_ID)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode WKB in either byte order
pub fn decode(data: &[u8]) -> Result<Geometry<f64>, CodecError> {
    let mut reader = Reader {
        cursor: Cursor::new(data),
        len: data.len(),
        little: true,
    };
    let geometry = reader.geometry(0)?;
    if reader.remaining() != 0 {
        return Err(reader.corrupt(format!("{} trailing bytes", reader.remaining())));
    }
    Ok(geometry)
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
    little: bool,
}

impl Reader<'_> {
    /// Byte-order tag and type of the next geometry
    fn header(&mut self) -> Result<u32, CodecError> {
        self.little = match self.cursor.read_u8().map_err(|_| self.truncated())? {
            0 => false,
            1 => true,
            other => return Err(self.corrupt(format!("bad byte order {}", other))),
        };
        self.u32()
    }

    fn geometry(&mut self, depth: usize) -> Result<Geometry<f64>, CodecError> {
        if depth > MAX_DEPTH {
            return Err(self.corrupt("collections nested too deeply"));
        }
        let kind = self.header()?;
        Ok(match kind {
            WKB_POINT => Geometry::Point(Point(self.coord()?)),
            WKB_LINESTRING => Geometry::LineString(self.line_string()?),
            WKB_POLYGON => Geometry::Polygon(self.polygon()?),
            WKB_MULTIPOINT => {
                let parts = self.parts(WKB_POINT, |r| r.coord().map(Point))?;
                Geometry::MultiPoint(MultiPoint(parts))
            }
            WKB_MULTILINESTRING => {
                let parts = self.parts(WKB_LINESTRING, Self::line_string)?;
                Geometry::MultiLineString(MultiLineString(parts))
            }
            WKB_MULTIPOLYGON => {
                let parts = self.parts(WKB_POLYGON, Self::polygon)?;
                Geometry::MultiPolygon(MultiPolygon(parts))
            }
            WKB_GEOMETRYCOLLECTION => {
                let n = self.count(5)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.geometry(depth + 1)?);
                }
                Geometry::GeometryCollection(GeometryCollection(items))
            }
            other => return Err(self.corrupt(format!("unsupported geometry type {}", other))),
        })
    }

    /// Members of a multi-geometry, each with its own header
    fn parts<T>(
        &mut self,
        expected: u32,
        mut read: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let n = self.count(5)?;
        let mut parts = Vec::with_capacity(n);
        for _ in 0..n {
            let kind = self.header()?;
            if kind != expected {
                return Err(self.corrupt(format!("expected member type {}, got {}", expected, kind)));
            }
            parts.push(read(self)?);
        }
        Ok(parts)
    }

    fn polygon(&mut self) -> Result<Polygon<f64>, CodecError> {
        let rings = self.count(4)?;
        if rings == 0 {
            return Ok(Polygon::new(LineString(Vec::new()), Vec::new()));
        }
        let exterior = self.line_string()?;
        let mut interiors = Vec::with_capacity(rings - 1);
        for _ in 1..rings {
            interiors.push(self.line_string()?);
        }
        Ok(Polygon::new(exterior, interiors))
    }

    fn line_string(&mut self) -> Result<LineString<f64>, CodecError> {
        let n = self.count(16)?;
        let mut coords = Vec::with_capacity(n);
        for _ in 0..n {
            coords.push(self.coord()?);
        }
        Ok(LineString(coords))
    }

    fn coord(&mut self) -> Result<Coord<f64>, CodecError> {
        let x = self.f64()?;
        let y = self.f64()?;
        Ok(Coord { x, y })
    }

    /// Element count, rejected when `min_size`-byte elements cannot fit
    fn count(&mut self, min_size: usize) -> Result<usize, CodecError> {
        let n = self.u32()? as usize;
        if n.saturating_mul(min_size) > self.remaining() {
            return Err(self.truncated());
        }
        Ok(n)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let v = if self.little {
            self.cursor.read_u32::<LittleEndian>()
        } else {
            self.cursor.read_u32::<BigEndian>()
        };
        v.map_err(|_| self.truncated())
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        let v = if self.little {
            self.cursor.read_f64::<LittleEndian>()
        } else {
            self.cursor.read_f64::<BigEndian>()
        };
        v.map_err(|_| self.truncated())
    }

    fn remaining(&self) -> usize {
        self.len.saturating_sub(self.cursor.position() as usize)
    }

    fn truncated(&self) -> CodecError {
        self.corrupt(format!("truncated at offset {}", self.cursor.position()))
    }

    fn corrupt(&self, detail: impl Into<String>) -> CodecError {
        CodecError::decode(detail, CODEC_ID, self.len)
    }
}
