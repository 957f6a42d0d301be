//! # Record Decoder
//!
//! Decodes one telemetry line into a [`RawRecord`].
//!
//! ## Wire format
//!
//! ```text
//! <timestamp>,<reading1>,<reading2>,<reading3>,<reading4>
//! ```
//!
//! The timestamp is a non-negative integer. Readings are validated later, one
//! field at a time, by the sample transformer; the decoder only keeps their
//! original text so the session log can store them untouched.

use crate::error::DecodeError;

/// Field delimiter
pub const FIELD_DELIMITER: char = ',';

/// Fields per record: timestamp plus readings
pub const RECORD_ARITY: usize = 5;

/// Channel readings carried by one record
pub const READINGS_PER_RECORD: usize = RECORD_ARITY - 1;

/// One decoded device record, fields kept in their original string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    fields: [String; RECORD_ARITY],
    timestamp: u64,
}

impl RawRecord {
    /// Parsed timestamp (field 0)
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// All fields, timestamp first, exactly as received
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Raw reading for channel slot `channel_index` (field `channel_index + 1`).
    ///
    /// Returns `None` for a slot the record does not carry.
    #[must_use]
    pub fn reading(&self, channel_index: usize) -> Option<&str> {
        if channel_index >= READINGS_PER_RECORD {
            return None;
        }
        self.fields.get(channel_index + 1).map(String::as_str)
    }
}

/// Decode one line into a [`RawRecord`].
///
/// Surrounding whitespace (including a trailing `\r`) is ignored.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedRecord`] if:
/// - The line does not have exactly [`RECORD_ARITY`] fields
/// - The timestamp is not a non-negative integer
///
/// # Examples
///
/// ```
/// use sensor_datalogger::protocol::record::decode;
///
/// let record = decode("10,1.0,2.0,3.0,4.0").unwrap();
/// assert_eq!(record.timestamp(), 10);
/// assert_eq!(record.fields(), ["10", "1.0", "2.0", "3.0", "4.0"]);
///
/// assert!(decode("10,1.0,2.0").is_err());
/// ```
pub fn decode(line: &str) -> Result<RawRecord, DecodeError> {
    let line = line.trim();
    let parts: Vec<&str> = line.split(FIELD_DELIMITER).collect();

    let fields: [String; RECORD_ARITY] = match <[&str; RECORD_ARITY]>::try_from(parts.as_slice()) {
        Ok(parts) => parts.map(str::to_string),
        Err(_) => {
            return Err(DecodeError::MalformedRecord(format!(
                "expected {} fields, got {}",
                RECORD_ARITY,
                parts.len()
            )))
        }
    };

    let timestamp = fields[0].trim().parse::<u64>().map_err(|_| {
        DecodeError::MalformedRecord(format!("invalid timestamp {:?}", fields[0]))
    })?;

    Ok(RawRecord { fields, timestamp })
}
