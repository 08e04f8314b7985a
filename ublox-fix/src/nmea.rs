use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of the position fix sentence emitted by multi-constellation receivers.
pub const FIX_REPORT_ID: &str = "$GNGGA";

const LAT_FIELD: usize = 2;
const LAT_DIR_FIELD: usize = 3;
const LON_FIELD: usize = 4;
const LON_DIR_FIELD: usize = 5;
const ALT_FIELD: usize = 9;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Kind of an NMEA sentence, as told by its leading identifier
pub enum SentenceKind {
    /// A `$GNGGA` position fix sentence
    FixReport,
    /// Anything else the receiver emits
    Unrecognized,
}

impl SentenceKind {
    /// Identify a line by its first comma-delimited field
    pub fn of(line: &str) -> Self {
        match line.split(',').next() {
            Some(FIX_REPORT_ID) => Self::FixReport,
            _ => Self::Unrecognized,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
/// A decoded position in signed decimal degrees
pub struct Position {
    latitude_deg: f64,
    longitude_deg: f64,
    altitude_m: f64,
}

impl Position {
    /// Latitude in decimal degrees, negative south of the equator
    pub fn latitude_deg(&self) -> f64 {
        self.latitude_deg
    }

    /// Longitude in decimal degrees, negative west of Greenwich
    pub fn longitude_deg(&self) -> f64 {
        self.longitude_deg
    }

    /// Altitude above mean sea level in meters, as reported by the receiver
    pub fn altitude_m(&self) -> f64 {
        self.altitude_m
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
/// A position stamped with the time it was captured.
///
/// The timestamp is the local clock at parse time, not the receiver's
/// reported UTC time.
pub struct GeoFix {
    #[serde(flatten)]
    position: Position,
    captured_at: DateTime<Utc>,
}

impl GeoFix {
    /// Attach a capture timestamp to a decoded position
    pub fn new(position: Position, captured_at: DateTime<Utc>) -> Self {
        Self {
            position,
            captured_at,
        }
    }

    /// Decoded position of the fix
    pub fn position(&self) -> Position {
        self.position
    }

    /// Latitude in decimal degrees
    pub fn latitude_deg(&self) -> f64 {
        self.position.latitude_deg
    }

    /// Longitude in decimal degrees
    pub fn longitude_deg(&self) -> f64 {
        self.position.longitude_deg
    }

    /// Altitude in meters
    pub fn altitude_m(&self) -> f64 {
        self.position.altitude_m
    }

    /// Time the sentence was parsed
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
/// Reason a recognized fix sentence could not be decoded
pub enum DecodeError {
    /// The sentence ended before a required field
    #[error("Missing {name} (field {index})")]
    MissingField {
        /// Positional index of the field
        index: usize,
        /// Field name
        name: &'static str,
    },
    /// A field is empty, non-numeric or not in degree-minute form
    #[error("Invalid {name}: {value:?}")]
    InvalidField {
        /// Field name
        name: &'static str,
        /// Raw field content
        value: String,
    },
    /// A hemisphere indicator is not one of the two expected letters
    #[error("Invalid {name} hemisphere: {value:?}")]
    InvalidHemisphere {
        /// Field name
        name: &'static str,
        /// Raw field content
        value: String,
    },
    /// The decoded value does not fit the coordinate range
    #[error("{name} out of range: {value}")]
    OutOfRange {
        /// Field name
        name: &'static str,
        /// Decoded value
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of parsing one line of receiver output
pub enum Sentence {
    /// A fully decoded fix sentence
    Fix(Position),
    /// Not a fix sentence; the normal case for most receiver output
    NotApplicable,
    /// A fix sentence whose fields could not be decoded
    Malformed(DecodeError),
}

/// Parse one line (without terminator) of receiver output.
pub fn parse_sentence(line: &str) -> Sentence {
    if SentenceKind::of(line) != SentenceKind::FixReport {
        return Sentence::NotApplicable;
    }
    let fields = line.split(',').collect::<Vec<_>>();
    match decode_fix(&fields) {
        Ok(pos) => Sentence::Fix(pos),
        Err(e) => Sentence::Malformed(e),
    }
}

/// Decode latitude, longitude and altitude from the fields of a fix sentence.
///
/// Any missing or malformed field fails the whole decode.
pub fn decode_fix(fields: &[&str]) -> Result<Position, DecodeError> {
    let field = |index: usize, name: &'static str| {
        fields
            .get(index)
            .copied()
            .ok_or(DecodeError::MissingField { index, name })
    };
    let lat = field(LAT_FIELD, "latitude")?;
    let lat_dir = field(LAT_DIR_FIELD, "latitude hemisphere")?;
    let lon = field(LON_FIELD, "longitude")?;
    let lon_dir = field(LON_DIR_FIELD, "longitude hemisphere")?;
    let alt = field(ALT_FIELD, "altitude")?;

    let latitude_deg = parse_lat(lat, lat_dir)?;
    let longitude_deg = parse_lon(lon, lon_dir)?;
    let altitude_m = alt
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite())
        .ok_or_else(|| DecodeError::InvalidField {
            name: "altitude",
            value: alt.to_string(),
        })?;

    Ok(Position {
        latitude_deg,
        longitude_deg,
        altitude_m,
    })
}

fn parse_lat(inp: &str, dir: &str) -> Result<f64, DecodeError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(?<deg>\d{2})(?<min>\d+(?:\.\d+)?)$").expect("Failed to compile regex");
    }
    let lat = parse_degree_minutes(&RE, inp, "latitude")?;
    if lat > 90.0 {
        return Err(DecodeError::OutOfRange {
            name: "latitude",
            value: lat,
        });
    }
    match dir {
        "N" => Ok(lat),
        "S" => Ok(-lat),
        _ => Err(DecodeError::InvalidHemisphere {
            name: "latitude",
            value: dir.to_string(),
        }),
    }
}

fn parse_lon(inp: &str, dir: &str) -> Result<f64, DecodeError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^(?<deg>\d{3})(?<min>\d+(?:\.\d+)?)$").expect("Failed to compile regex");
    }
    let lon = parse_degree_minutes(&RE, inp, "longitude")?;
    if lon > 180.0 {
        return Err(DecodeError::OutOfRange {
            name: "longitude",
            value: lon,
        });
    }
    match dir {
        "E" => Ok(lon),
        "W" => Ok(-lon),
        _ => Err(DecodeError::InvalidHemisphere {
            name: "longitude",
            value: dir.to_string(),
        }),
    }
}

fn parse_degree_minutes(re: &Regex, inp: &str, name: &'static str) -> Result<f64, DecodeError> {
    let invalid = || DecodeError::InvalidField {
        name,
        value: inp.to_string(),
    };
    let caps = re.captures(inp).ok_or_else(invalid)?;
    let deg = caps["deg"].parse::<f64>().map_err(|_| invalid())?;
    let min = caps["min"].parse::<f64>().map_err(|_| invalid())?;
    if min >= 60.0 {
        return Err(DecodeError::OutOfRange { name, value: min });
    }
    Ok(deg + min / 60.0)
}
