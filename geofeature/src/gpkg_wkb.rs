use crate::engine::{from_geo, to_geo};
use crate::result::{Error, Result};
use crate::types::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// A trait containing methods for encoding geometries according to the GeoPackage [specifcation](https://www.geopackage.org/spec130/#gpb_spec)
///
/// Used when layer rows are written to and read from a GeoPackage.
pub trait GeoPackageBinary: Sized {
    fn to_gpkg_blob(&self) -> Result<Vec<u8>>;
    fn from_gpkg_blob(bytes: &[u8]) -> Result<Self>;
}

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

enum EnvelopeType {
    Missing,
    XY,
    XYM,
    XYZ,
    XYZM,
}

struct GPKGGeomFlags {
    extended: bool,
    empty_geom: bool,
    little_endian: bool,
    envelope: EnvelopeType,
}

impl GPKGGeomFlags {
    // https://www.geopackage.org/spec130/#flags_layout
    fn from_byte(b: u8) -> Result<Self> {
        let extended = ((b >> 5) & 1) > 0;
        let empty_geom = ((b >> 4) & 1) > 0;
        let little_endian = (b & 1) > 0;
        let envelope = match (b >> 1) & 0b111 {
            0 => EnvelopeType::Missing,
            1 => EnvelopeType::XY,
            2 => EnvelopeType::XYZ,
            3 => EnvelopeType::XYM,
            4 => EnvelopeType::XYZM,
            other => {
                return Err(Error::decode(format!("invalid envelope flag {}", other)));
            }
        };
        Ok(GPKGGeomFlags {
            extended,
            empty_geom,
            little_endian,
            envelope,
        })
    }

    fn to_byte(&self) -> u8 {
        let mut flags = 0u8;
        let envelope_val = match self.envelope {
            EnvelopeType::Missing => 0,
            EnvelopeType::XY => 1,
            EnvelopeType::XYZ => 2,
            EnvelopeType::XYM => 3,
            EnvelopeType::XYZM => 4,
        };
        flags |= (self.extended as u8) << 5;
        flags |= (self.empty_geom as u8) << 4;
        flags |= (envelope_val as u8) << 1;
        flags |= self.little_endian as u8;

        flags
    }

    fn envelope_len(&self) -> usize {
        match self.envelope {
            EnvelopeType::Missing => 0,
            EnvelopeType::XY => 32,
            EnvelopeType::XYZ | EnvelopeType::XYM => 48,
            EnvelopeType::XYZM => 64,
        }
    }
}

impl GeoPackageBinary for SpatialGeometry {
    fn to_gpkg_blob(&self) -> Result<Vec<u8>> {
        let mut header: Vec<u8> = Vec::new();
        // magic number that is GP in ASCII
        header.extend_from_slice(&[0x47, 0x50]);
        // version number, 0 means version 1
        header.push(0);
        let flags = GPKGGeomFlags {
            extended: false,
            empty_geom: self.geometry.is_empty(),
            little_endian: true,
            envelope: EnvelopeType::Missing,
        };
        header.push(flags.to_byte());
        // 0 is the "undefined geographic" srs in a GeoPackage
        header.write_i32::<LittleEndian>(self.srid.unwrap_or(0))?;
        write_wkb(&mut header, &self.geometry)?;
        Ok(header)
    }

    fn from_gpkg_blob(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || bytes[0..2] != [0x47, 0x50] {
            return Err(Error::decode("missing GeoPackage binary header"));
        }
        let flags = GPKGGeomFlags::from_byte(bytes[3])?;
        if flags.extended {
            return Err(Error::UnsupportedGeometryType);
        }
        let mut srs_bytes: [u8; 4] = Default::default();
        srs_bytes.copy_from_slice(&bytes[4..8]);
        let srs = match flags.little_endian {
            true => i32::from_le_bytes(srs_bytes),
            false => i32::from_be_bytes(srs_bytes),
        };
        let geom_start = 8 + flags.envelope_len();
        if bytes.len() < geom_start {
            return Err(Error::decode("truncated GeoPackage envelope"));
        }
        let (geometry, _) = read_wkb(&bytes[geom_start..])?;
        Ok(SpatialGeometry {
            srid: Some(srs),
            geometry,
        })
    }
}

/// Byte order, type code and optional SRID at the front of every (E)WKB geometry.
struct WkbHeader {
    little_endian: bool,
    base: u32,
    has_z: bool,
    has_m: bool,
    srid: Option<i32>,
}

impl WkbHeader {
    fn read(r: &mut impl Read) -> Result<Self> {
        match r.read_u8()? {
            0 => Self::read_code::<BigEndian>(r, false),
            1 => Self::read_code::<LittleEndian>(r, true),
            other => Err(Error::decode(format!("invalid WKB byte order {}", other))),
        }
    }

    // ISO puts dimensions in the 1000 ranges, EWKB in the high bits
    fn read_code<T: ByteOrder>(r: &mut impl Read, little_endian: bool) -> Result<Self> {
        let raw = r.read_u32::<T>()?;
        let srid = if raw & EWKB_SRID != 0 {
            Some(r.read_i32::<T>()?)
        } else {
            None
        };
        let code = raw & 0x0FFF_FFFF;
        let (base, range) = (code % 1000, code / 1000);
        if !(1..=7).contains(&base) || range > 3 {
            return Err(Error::UnsupportedGeometryType);
        }
        Ok(WkbHeader {
            little_endian,
            base,
            has_z: raw & EWKB_Z != 0 || range == 1 || range == 3,
            has_m: raw & EWKB_M != 0 || range >= 2,
            srid,
        })
    }

    fn write(&self, w: &mut impl Write, code: u32, srid: Option<i32>) -> Result<()> {
        match self.little_endian {
            true => write_code::<LittleEndian>(w, 1, code, srid),
            false => write_code::<BigEndian>(w, 0, code, srid),
        }
    }
}

fn write_code<T: ByteOrder>(w: &mut impl Write, order: u8, code: u32, srid: Option<i32>) -> Result<()> {
    w.write_u8(order)?;
    w.write_u32::<T>(code)?;
    if let Some(srid) = srid {
        w.write_i32::<T>(srid)?;
    }
    Ok(())
}

/// Read ISO WKB or PostGIS EWKB. Returns the SRID when the EWKB carries one.
///
/// XY geometries are decoded by the `wkb` crate once any EWKB SRID is
/// stripped; `geo_types` has no Z, so Z and M bodies are read here.
pub fn read_wkb(bytes: &[u8]) -> Result<(Geometry, Option<i32>)> {
    let mut r = Cursor::new(bytes);
    let header = WkbHeader::read(&mut r)?;
    let geometry = if header.has_z || header.has_m {
        read_dimensional(&mut r, &header)?
    } else {
        let mut iso = Vec::with_capacity(bytes.len());
        header.write(&mut iso, header.base, None)?;
        iso.extend_from_slice(&bytes[r.position() as usize..]);
        let geom = wkb::wkb_to_geom(&mut Cursor::new(iso))?;
        match from_geo(&geom) {
            // NaN coordinates encode the empty point
            Geometry::Point(Some(p)) if p.x.is_nan() && p.y.is_nan() => Geometry::Point(None),
            g => g,
        }
    };
    Ok((geometry, header.srid))
}

fn read_dimensional(r: &mut impl Read, header: &WkbHeader) -> Result<Geometry> {
    match header.little_endian {
        true => read_body::<LittleEndian>(r, header),
        false => read_body::<BigEndian>(r, header),
    }
}

fn read_body<T: ByteOrder>(r: &mut impl Read, header: &WkbHeader) -> Result<Geometry> {
    let dims = Dims {
        has_z: header.has_z,
        has_m: header.has_m,
    };
    Ok(match header.base {
        1 => {
            let p = dims.read_position::<T>(r)?;
            if p.x.is_nan() && p.y.is_nan() {
                Geometry::Point(None)
            } else {
                Geometry::Point(Some(p))
            }
        }
        2 => Geometry::LineString(dims.read_line::<T>(r)?),
        3 => Geometry::Polygon(dims.read_rings::<T>(r)?),
        4 => Geometry::MultiPoint(
            read_members::<T>(r)?
                .into_iter()
                .map(|g| match g {
                    Geometry::Point(Some(p)) => Ok(p),
                    _ => Err(Error::decode("MultiPoint member is not a point")),
                })
                .collect::<Result<_>>()?,
        ),
        5 => Geometry::MultiLineString(
            read_members::<T>(r)?
                .into_iter()
                .map(|g| match g {
                    Geometry::LineString(ls) => Ok(ls),
                    _ => Err(Error::decode("MultiLineString member is not a line")),
                })
                .collect::<Result<_>>()?,
        ),
        6 => Geometry::MultiPolygon(
            read_members::<T>(r)?
                .into_iter()
                .map(|g| match g {
                    Geometry::Polygon(rings) => Ok(rings),
                    _ => Err(Error::decode("MultiPolygon member is not a polygon")),
                })
                .collect::<Result<_>>()?,
        ),
        _ => Geometry::GeometryCollection(read_members::<T>(r)?),
    })
}

fn read_members<T: ByteOrder>(r: &mut impl Read) -> Result<Vec<Geometry>> {
    let num_geoms = r.read_u32::<T>()?;
    let mut geoms = Vec::with_capacity(num_geoms.min(1024) as usize);
    for _ in 0..num_geoms {
        let member = WkbHeader::read(r)?;
        geoms.push(read_dimensional(r, &member)?);
    }
    Ok(geoms)
}

struct Dims {
    has_z: bool,
    has_m: bool,
}

impl Dims {
    fn read_position<T: ByteOrder>(&self, r: &mut impl Read) -> Result<Position> {
        let x = r.read_f64::<T>()?;
        let y = r.read_f64::<T>()?;
        let z = if self.has_z {
            Some(r.read_f64::<T>()?)
        } else {
            None
        };
        if self.has_m {
            r.read_f64::<T>()?;
        }
        Ok(Position { x, y, z })
    }

    fn read_line<T: ByteOrder>(&self, r: &mut impl Read) -> Result<Vec<Position>> {
        let num_points = r.read_u32::<T>()?;
        let mut out_vec = Vec::with_capacity(num_points.min(4096) as usize);
        for _ in 0..num_points {
            out_vec.push(self.read_position::<T>(r)?);
        }
        Ok(out_vec)
    }

    fn read_rings<T: ByteOrder>(&self, r: &mut impl Read) -> Result<Vec<Ring>> {
        let num_rings = r.read_u32::<T>()?;
        let mut rings = Vec::with_capacity(num_rings.min(1024) as usize);
        for _ in 0..num_rings {
            rings.push(self.read_line::<T>(r)?);
        }
        Ok(rings)
    }
}

// what geo_types holds exactly: XY positions and no empty parts
fn plain_xy(geometry: &Geometry) -> bool {
    let rings_filled = |rings: &[Ring]| !rings.is_empty() && rings.iter().all(|r| !r.is_empty());
    let parts_filled = match geometry {
        Geometry::Polygon(rings) => rings_filled(rings),
        Geometry::MultiPolygon(polys) => polys.iter().all(|p| rings_filled(p)),
        Geometry::MultiLineString(lines) => lines.iter().all(|l| !l.is_empty()),
        Geometry::GeometryCollection(geoms) => geoms.iter().all(plain_xy),
        _ => true,
    };
    parts_filled && !geometry.is_empty() && !geometry.has_z()
}

/// Write ISO WKB.
///
/// XY geometries are encoded by the `wkb` crate. Z geometries and empty
/// parts are written here, little endian, with the 1000 range of type codes.
pub fn write_wkb(w: &mut impl Write, geometry: &Geometry) -> Result<()> {
    if plain_xy(geometry) {
        if let Some(geo) = to_geo(geometry) {
            w.write_all(&wkb::geom_to_wkb(&geo)?)?;
            return Ok(());
        }
    }
    write_dimensional(w, geometry)
}

/// Write PostGIS EWKB with the SRID embedded when known.
pub fn to_ewkb(geometry: &SpatialGeometry) -> Result<Vec<u8>> {
    let mut iso = Vec::new();
    write_wkb(&mut iso, &geometry.geometry)?;
    let Some(srid) = geometry.srid else {
        return Ok(iso);
    };
    // EWKB flags dimensions in the high bits of the type code and puts the SRID after it
    let mut r = Cursor::new(iso.as_slice());
    let header = WkbHeader::read(&mut r)?;
    let mut code = header.base | EWKB_SRID;
    if header.has_z {
        code |= EWKB_Z;
    }
    let mut out = Vec::with_capacity(iso.len() + 4);
    header.write(&mut out, code, Some(srid))?;
    out.extend_from_slice(&iso[r.position() as usize..]);
    Ok(out)
}

fn write_dimensional(w: &mut impl Write, geometry: &Geometry) -> Result<()> {
    let has_z = geometry.has_z();
    let code = geometry.geometry_type().wkb_code();
    // we will always write as little endian
    w.write_u8(1)?;
    w.write_u32::<LittleEndian>(code + if has_z { 1000 } else { 0 })?;
    let pos = |w: &mut dyn Write, p: &Position| -> Result<()> {
        w.write_f64::<LittleEndian>(p.x)?;
        w.write_f64::<LittleEndian>(p.y)?;
        if has_z {
            w.write_f64::<LittleEndian>(p.z.unwrap_or(0.0))?;
        }
        Ok(())
    };
    let line = |w: &mut dyn Write, ps: &[Position]| -> Result<()> {
        w.write_u32::<LittleEndian>(ps.len() as u32)?;
        for p in ps {
            pos(&mut *w, p)?
        }
        Ok(())
    };
    let rings = |w: &mut dyn Write, rs: &[Ring]| -> Result<()> {
        w.write_u32::<LittleEndian>(rs.len() as u32)?;
        for ring in rs {
            line(&mut *w, ring)?
        }
        Ok(())
    };
    match geometry {
        Geometry::Point(Some(p)) => pos(w, p)?,
        Geometry::Point(None) => pos(w, &Position::new(f64::NAN, f64::NAN))?,
        Geometry::LineString(ps) => line(w, ps)?,
        Geometry::Polygon(rs) => rings(w, rs)?,
        Geometry::MultiPoint(ps) => {
            w.write_u32::<LittleEndian>(ps.len() as u32)?;
            for p in ps {
                write_dimensional(w, &Geometry::Point(Some(*p)))?;
            }
        }
        Geometry::MultiLineString(lines) => {
            w.write_u32::<LittleEndian>(lines.len() as u32)?;
            for ls in lines {
                write_dimensional(w, &Geometry::LineString(ls.clone()))?;
            }
        }
        Geometry::MultiPolygon(polys) => {
            w.write_u32::<LittleEndian>(polys.len() as u32)?;
            for poly in polys {
                write_dimensional(w, &Geometry::Polygon(poly.clone()))?;
            }
        }
        Geometry::GeometryCollection(geoms) => {
            w.write_u32::<LittleEndian>(geoms.len() as u32)?;
            for geom in geoms {
                write_wkb(w, geom)?;
            }
        }
    }
    Ok(())
}

/// Decode hex encoded (E)WKB, as databases commonly return it.
pub fn parse_hex_wkb(hex: &str) -> Result<SpatialGeometry> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::decode("not hex encoded WKB"));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| Error::decode(e.to_string()))?;
    let (geometry, srid) = read_wkb(&bytes)?;
    Ok(SpatialGeometry { srid, geometry })
}

/// Decode a binary geometry value, either a GeoPackage blob or raw (E)WKB.
pub fn parse_binary(bytes: &[u8]) -> Result<SpatialGeometry> {
    if bytes.starts_with(&[0x47, 0x50]) {
        return SpatialGeometry::from_gpkg_blob(bytes);
    }
    let (geometry, srid) = read_wkb(bytes)?;
    Ok(SpatialGeometry { srid, geometry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wkt::parse_ewkt;

    #[test]
    fn gpkg_blob_keeps_srid_and_z() {
        let g = parse_ewkt("SRID=4326;LINESTRING Z (40 -105 5280, 41 -106 5280)").unwrap();
        let blob = g.to_gpkg_blob().unwrap();
        assert_eq!(&blob[0..2], b"GP");
        let back = SpatialGeometry::from_gpkg_blob(&blob).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn reads_big_endian_point() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1.5f64.to_be_bytes());
        bytes.extend_from_slice(&(-2.0f64).to_be_bytes());
        let (g, srid) = read_wkb(&bytes).unwrap();
        assert_eq!(srid, None);
        assert_eq!(g, Geometry::Point(Some(Position::new(1.5, -2.0))));
    }

    #[test]
    fn hex_ewkb_with_srid() {
        // SRID=4326;POINT(1 2) as produced by PostGIS
        let g = parse_hex_wkb("0101000020E6100000000000000000F03F0000000000000040").unwrap();
        assert_eq!(g.srid, Some(4326));
        assert_eq!(g.geometry, Geometry::Point(Some(Position::new(1.0, 2.0))));
    }

    #[test]
    fn hex_ewkb_with_z() {
        // SRID=4326;POINT Z (1 2 3)
        let g = parse_hex_wkb(
            "01010000A0E6100000000000000000F03F00000000000000400000000000000840",
        )
        .unwrap();
        assert_eq!(g.srid, Some(4326));
        assert_eq!(g.geometry, Geometry::Point(Some(Position::new_z(1.0, 2.0, 3.0))));
    }

    #[test]
    fn ewkb_writer_matches_postgis() {
        let bytes = to_ewkb(&SpatialGeometry::point(1.0, 2.0, 4326)).unwrap();
        let header = WkbHeader::read(&mut Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!((header.base, header.srid, header.has_z), (1, Some(4326), false));
        let back = parse_binary(&bytes).unwrap();
        assert_eq!(back, SpatialGeometry::point(1.0, 2.0, 4326));

        let z = parse_ewkt("SRID=2154;MULTIPOINT Z ((1 2 3), (4 5 6))").unwrap();
        let bytes = to_ewkb(&z).unwrap();
        let header = WkbHeader::read(&mut Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!((header.base, header.srid, header.has_z), (4, Some(2154), true));
        assert_eq!(parse_binary(&bytes).unwrap(), z);
    }

    #[test]
    fn xy_and_empty_geometries_round_trip() {
        for text in [
            "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 3 2, 3 3, 2 2))",
            "GEOMETRYCOLLECTION (POINT (1 2), LINESTRING (3 4, 5 6))",
            "MULTILINESTRING ((0 0, 1 1), (2 2, 3 3))",
            "POINT EMPTY",
            "LINESTRING EMPTY",
        ] {
            let g = parse_ewkt(text).unwrap().geometry;
            let mut bytes = Vec::new();
            write_wkb(&mut bytes, &g).unwrap();
            assert_eq!(read_wkb(&bytes).unwrap(), (g, None), "{}", text);
        }
    }

    #[test]
    fn unknown_type_codes_are_unsupported() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&17u32.to_le_bytes());
        assert!(matches!(read_wkb(&bytes), Err(Error::UnsupportedGeometryType)));
        assert!(matches!(read_wkb(&[7u8, 1, 0, 0, 0]), Err(Error::GeomDecode(_))));
    }

    #[test]
    fn truncated_wkb_fails() {
        let bytes = [1u8, 2, 0, 0, 0, 5, 0, 0, 0];
        assert!(parse_binary(&bytes).is_err());
    }
}
