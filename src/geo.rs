// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! GPS coordinates from EXIF metadata
//!
//! Extraction is best-effort. Every fault along the way collapses to `None`.

use exif::{Exif, In, Reader, Tag, Value};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

/// Decimal-degree location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Latitude as it should appear in a prompt or text field
    pub fn latitude_text(&self) -> String {
        self.latitude.to_string()
    }

    pub fn longitude_text(&self) -> String {
        self.longitude.to_string()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Looks up where a photograph was taken
pub trait LocationReader: Send + Sync {
    fn read(&self, path: &Path) -> Option<Coordinates>;
}

/// [`LocationReader`] backed by the image's EXIF GPS block
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoExifReader;

impl GeoExifReader {
    pub fn new() -> Self {
        Self
    }

    /// Pull coordinates out of already-parsed EXIF data
    pub fn from_exif(exif: &Exif) -> Option<Coordinates> {
        let latitude = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'N')?;
        let longitude = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'E')?;
        Some(Coordinates::new(latitude, longitude))
    }
}

impl LocationReader for GeoExifReader {
    fn read(&self, path: &Path) -> Option<Coordinates> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(e) => {
                warn!("No EXIF in {:?}: {}", path, e);
                return None;
            }
        };

        let coords = Self::from_exif(&exif);
        if coords.is_none() {
            warn!("No usable GPS coordinates in {:?}", path);
        }
        coords
    }
}

/// Degrees/minutes/seconds to signed decimal degrees, rounded to 6 places.
///
/// `S` and `W` references yield negative values.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, reference: char) -> f64 {
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    let signed = match reference.to_ascii_uppercase() {
        'S' | 'W' => -magnitude,
        _ => magnitude,
    };
    round6(signed)
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

fn gps_coordinate(exif: &Exif, coord_tag: Tag, ref_tag: Tag, default_ref: char) -> Option<f64> {
    let field = exif.get_field(coord_tag, In::PRIMARY)?;
    let (degrees, minutes, seconds) = match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            if parts[..3].iter().any(|r| r.denom == 0) {
                return None;
            }
            (parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64())
        }
        _ => return None,
    };

    let reference = match exif.get_field(ref_tag, In::PRIMARY) {
        Some(field) => hemisphere(&field.value)?,
        None => default_ref,
    };

    let value = dms_to_decimal(degrees, minutes, seconds, reference);
    value.is_finite().then_some(value)
}

fn hemisphere(value: &Value) -> Option<char> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .and_then(|bytes| bytes.first())
            .map(|b| (*b as char).to_ascii_uppercase())
            .filter(|c| matches!(c, 'N' | 'S' | 'E' | 'W')),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Field, Rational};
    use std::io::Cursor;

    fn rational(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn gps_exif(fields: &[Field]) -> Exif {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        Reader::new().read_raw(buf.into_inner()).unwrap()
    }

    fn field(tag: Tag, value: Value) -> Field {
        Field { tag, ifd_num: In::PRIMARY, value }
    }

    #[test]
    fn test_southern_and_western_are_negative() {
        assert!(dms_to_decimal(33.0, 51.0, 54.0, 'S') < 0.0);
        assert!(dms_to_decimal(151.0, 12.0, 36.0, 'W') < 0.0);
        assert!(dms_to_decimal(33.0, 51.0, 54.0, 'N') >= 0.0);
        assert!(dms_to_decimal(0.0, 0.0, 0.0, 'E') >= 0.0);
    }

    #[test]
    fn test_conversion_rounds_to_six_places() {
        let value = dms_to_decimal(10.0, 0.0, 1.0, 'N');
        assert_eq!(value, 10.000278);
    }

    #[test]
    fn test_eiffel_tower_round_trip() {
        let exif = gps_exif(&[
            field(Tag::GPSLatitudeRef, Value::Ascii(vec![b"N".to_vec()])),
            field(
                Tag::GPSLatitude,
                Value::Rational(vec![rational(48, 1), rational(51, 1), rational(3024, 100)]),
            ),
            field(Tag::GPSLongitudeRef, Value::Ascii(vec![b"E".to_vec()])),
            field(
                Tag::GPSLongitude,
                Value::Rational(vec![rational(2, 1), rational(17, 1), rational(402, 10)]),
            ),
        ]);

        let coords = GeoExifReader::from_exif(&exif).unwrap();
        assert!((coords.latitude - 48.8584).abs() < 1e-6);
        assert!((coords.longitude - 2.2945).abs() < 1e-6);
    }

    #[test]
    fn test_missing_reference_defaults_to_north_east() {
        let exif = gps_exif(&[
            field(
                Tag::GPSLatitude,
                Value::Rational(vec![rational(1, 1), rational(0, 1), rational(0, 1)]),
            ),
            field(
                Tag::GPSLongitude,
                Value::Rational(vec![rational(2, 1), rational(0, 1), rational(0, 1)]),
            ),
        ]);

        let coords = GeoExifReader::from_exif(&exif).unwrap();
        assert_eq!(coords, Coordinates::new(1.0, 2.0));
    }

    #[test]
    fn test_missing_longitude_is_absent() {
        let exif = gps_exif(&[field(
            Tag::GPSLatitude,
            Value::Rational(vec![rational(1, 1), rational(0, 1), rational(0, 1)]),
        )]);
        assert!(GeoExifReader::from_exif(&exif).is_none());
    }

    #[test]
    fn test_zero_denominator_is_absent() {
        let exif = gps_exif(&[
            field(
                Tag::GPSLatitude,
                Value::Rational(vec![rational(1, 0), rational(0, 1), rational(0, 1)]),
            ),
            field(
                Tag::GPSLongitude,
                Value::Rational(vec![rational(2, 1), rational(0, 1), rational(0, 1)]),
            ),
        ]);
        assert!(GeoExifReader::from_exif(&exif).is_none());
    }

    #[test]
    fn test_missing_file_is_absent() {
        assert!(GeoExifReader::new().read(Path::new("/nonexistent/file.jpg")).is_none());
    }

    #[test]
    fn test_image_without_exif_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        image::DynamicImage::new_rgb8(8, 8).save(&path).unwrap();
        assert!(GeoExifReader::new().read(&path).is_none());
    }

    #[test]
    fn test_coordinate_text_is_shortest_form() {
        let coords = Coordinates::new(48.8584, -2.2945);
        assert_eq!(coords.latitude_text(), "48.8584");
        assert_eq!(coords.longitude_text(), "-2.2945");
        assert_eq!(coords.to_string(), "48.8584, -2.2945");
    }
}
