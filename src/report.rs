// report.rs — Water meter report text parsing

use crate::*;

/// Everything from this marker on is checksum and padding.
const CRC_MARKER: &str = "CRC";
const LINE_SEPARATOR: &str = "\r\n";
const VOLUME_UNIT_SUFFIX: &str = " m³";

const KEY_SERIAL: &str = "S/N";
const KEY_BATTERY: &str = "Battery";

/// Report keys kept verbatim in `Reading::fields`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldKey {
    Vol,
    Temp,
    FVol,
    RVol,
    KVol,
    KDate,
    Time,
}

impl FieldKey {
    pub const ALL: [FieldKey; 7] = [
        FieldKey::Vol,
        FieldKey::Temp,
        FieldKey::FVol,
        FieldKey::RVol,
        FieldKey::KVol,
        FieldKey::KDate,
        FieldKey::Time,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Vol => "Vol",
            FieldKey::Temp => "Temp",
            FieldKey::FVol => "FVol",
            FieldKey::RVol => "RVol",
            FieldKey::KVol => "KVol",
            FieldKey::KDate => "KDate",
            FieldKey::Time => "Time",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// Current, forward, reverse and previous volume plus temperature and time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingFields {
    #[serde(rename = "Vol", skip_serializing_if = "Option::is_none")]
    pub vol: Option<String>,
    #[serde(rename = "Temp", skip_serializing_if = "Option::is_none")]
    pub temp: Option<String>,
    #[serde(rename = "FVol", skip_serializing_if = "Option::is_none")]
    pub fvol: Option<String>,
    #[serde(rename = "RVol", skip_serializing_if = "Option::is_none")]
    pub rvol: Option<String>,
    #[serde(rename = "KVol", skip_serializing_if = "Option::is_none")]
    pub kvol: Option<String>,
    #[serde(rename = "KDate", skip_serializing_if = "Option::is_none")]
    pub kdate: Option<String>,
    #[serde(rename = "Time", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl ReadingFields {
    fn slot(&mut self, key: FieldKey) -> &mut Option<String> {
        match key {
            FieldKey::Vol => &mut self.vol,
            FieldKey::Temp => &mut self.temp,
            FieldKey::FVol => &mut self.fvol,
            FieldKey::RVol => &mut self.rvol,
            FieldKey::KVol => &mut self.kvol,
            FieldKey::KDate => &mut self.kdate,
            FieldKey::Time => &mut self.time,
        }
    }

    pub fn set(&mut self, key: FieldKey, value: &str) {
        *self.slot(key) = Some(value.to_string());
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        match key {
            FieldKey::Vol => self.vol.as_deref(),
            FieldKey::Temp => self.temp.as_deref(),
            FieldKey::FVol => self.fvol.as_deref(),
            FieldKey::RVol => self.rvol.as_deref(),
            FieldKey::KVol => self.kvol.as_deref(),
            FieldKey::KDate => self.kdate.as_deref(),
            FieldKey::Time => self.time.as_deref(),
        }
    }

    /// Present fields in report order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        FieldKey::ALL.into_iter().filter_map(|k| self.get(k).map(|v| (k, v)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub volume: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "Name")]
    pub device_name: String,
    #[serde(rename = "SN")]
    pub serial_number: String,
    #[serde(rename = "NFC_Id")]
    pub serial_number_lower: String,
    #[serde(rename = "NFC_Typ")]
    pub tag_kind: String,
    #[serde(rename = "Battery", skip_serializing_if = "Option::is_none")]
    pub battery: Option<String>,
    #[serde(flatten)]
    pub fields: ReadingFields,
    pub history: Vec<HistoryEntry>,
    #[serde(skip)]
    pub volume_numeric: Option<f32>,
}

impl Reading {
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub reading: Reading,
    pub warnings: Vec<DecodeWarning>,
}

/// `YYYY-MM-DD` shape only, the digits are not checked.
fn is_date_key(key: &str) -> bool {
    let b = key.as_bytes();
    b.len() == 10 && b[4] == b'-' && b[7] == b'-'
}

fn trim_blank(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

/// Numeric part of a `Vol` value, in m³, rounded to litres.
pub fn parse_volume(value: &str) -> Option<f32> {
    let number = value.strip_suffix(VOLUME_UNIT_SUFFIX).unwrap_or(value);
    let v = trim_blank(number).parse::<f32>().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some((v * 1000.0).round() / 1000.0)
}

/// Decode the report text recovered from a tag.
///
/// `tag_kind` is the reader's name for the tag type. Fails only when the text
/// holds no usable line; a bad volume only costs `volume_numeric`.
pub fn decode_report(payload: &[u8], tag_kind: &str) -> AppResult<Report> {
    let text = String::from_utf8_lossy(payload);
    let text = match text.find(CRC_MARKER) {
        Some(pos) => &text[..pos],
        None => &text[..],
    };

    let mut lines = text.split(LINE_SEPARATOR);
    let device_name = lines
        .next()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
        .unwrap_or_default();
    if device_name.is_empty() && !text.contains(':') {
        return Err(AppError::Parse("report has no usable lines".into()));
    }

    let mut reading = Reading {
        device_name: device_name.to_string(),
        ..Default::default()
    };
    let mut warnings = Vec::new();

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = trim_blank(key);
        let value = trim_blank(value);

        if is_date_key(key) {
            reading.history.push(HistoryEntry {
                date: key.to_string(),
                volume: value.to_string(),
            });
        } else if let Some(field) = FieldKey::from_key(key) {
            reading.fields.set(field, value);
        } else if key == KEY_SERIAL {
            reading.serial_number = value.to_string();
            reading.tag_kind = tag_kind.to_string();
        } else if key == KEY_BATTERY {
            reading.battery = Some(value.to_string());
        } else {
            debug!("Meter: ignoring key {key:?}");
        }
    }

    reading.serial_number_lower = reading.serial_number.to_ascii_lowercase();

    if let Some(vol) = reading.fields.get(FieldKey::Vol) {
        reading.volume_numeric = parse_volume(vol);
        if reading.volume_numeric.is_none() {
            let warning = DecodeWarning::Volume(vol.to_string());
            warn!("Meter: {warning}");
            warnings.push(warning);
        }
    }

    info!(
        "Meter: {} S/N {} vol={:?} battery={:?} history={}",
        reading.device_name,
        reading.serial_number,
        reading.volume_numeric,
        reading.battery,
        reading.history.len()
    );
    Ok(Report { reading, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "DeviceX\r\nS/N: 12345ABC\r\nVol: 123.456 m³\r\nBattery: 87%\r\n2024-01-01: 100.000\r\n";

    #[test]
    fn sample_report() {
        let report = decode_report(SAMPLE.as_bytes(), NFC_FORUM_TYPE_2).unwrap();
        let r = &report.reading;
        assert_eq!(r.device_name, "DeviceX");
        assert_eq!(r.serial_number, "12345ABC");
        assert_eq!(r.serial_number_lower, "12345abc");
        assert_eq!(r.tag_kind, "NFC Forum Type 2");
        assert_eq!(r.fields.get(FieldKey::Vol), Some("123.456 m³"));
        assert_eq!(r.battery.as_deref(), Some("87%"));
        assert!((r.volume_numeric.unwrap() - 123.456).abs() < 1e-4);
        assert_eq!(
            r.history,
            vec![HistoryEntry {
                date: "2024-01-01".into(),
                volume: "100.000".into()
            }]
        );
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn decoding_twice_gives_the_same_reading() {
        let a = decode_report(SAMPLE.as_bytes(), NFC_FORUM_TYPE_2).unwrap();
        let b = decode_report(SAMPLE.as_bytes(), NFC_FORUM_TYPE_2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unparsable_volume_is_only_a_warning() {
        let text = "Meter\r\nS/N: X1\r\nVol: N/A\r\nTemp: 11 C\r\nBattery: 50%\r\n";
        let report = decode_report(text.as_bytes(), NFC_FORUM_TYPE_2).unwrap();
        assert_eq!(report.reading.volume_numeric, None);
        assert_eq!(report.reading.fields.get(FieldKey::Vol), Some("N/A"));
        assert_eq!(report.reading.fields.get(FieldKey::Temp), Some("11 C"));
        assert_eq!(report.reading.serial_number, "X1");
        assert_eq!(report.warnings, vec![DecodeWarning::Volume("N/A".into())]);
    }

    #[test]
    fn text_after_crc_is_dropped() {
        let text = "Meter\r\nVol: 1.5 m³\r\nCRC: 1A2B\r\nTemp: 99\r\n\u{0}\u{0}";
        let r = decode_report(text.as_bytes(), "").unwrap().reading;
        assert_eq!(r.fields.temp, None);
        assert_eq!(r.volume_numeric, Some(1.5));
    }

    #[test]
    fn all_known_fields_and_history_order() {
        let text = "M\r\nVol:1 m³\r\nTemp:\t20\r\nFVol: 2\r\nRVol: 3\r\nKVol: 4\r\nKDate: 2023-12-31\r\n\
                    Time: 12:30\r\n2024-02-01: 2.000\r\n2024-01-01: 1.000\r\nFoo: bar\r\n";
        let r = decode_report(text.as_bytes(), "").unwrap().reading;
        let keys: Vec<_> = r.fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, FieldKey::ALL.to_vec());
        assert_eq!(r.fields.get(FieldKey::Temp), Some("20"));
        assert_eq!(r.fields.get(FieldKey::Time), Some("12:30"));
        assert_eq!(r.fields.get(FieldKey::KDate), Some("2023-12-31"));
        let dates: Vec<_> = r.history.iter().map(|h| h.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-01-01"]);
        // no S/N line: no tag kind either
        assert_eq!(r.tag_kind, "");
    }

    #[test]
    fn serial_lowering_is_ascii_only() {
        let text = "M\r\nS/N: AbZ-ÄÖ9\r\n";
        let r = decode_report(text.as_bytes(), "").unwrap().reading;
        assert_eq!(r.serial_number_lower, "abz-ÄÖ9");
    }

    #[test]
    fn empty_payload_is_a_parse_error() {
        assert!(matches!(decode_report(b"", ""), Err(AppError::Parse(_))));
        assert!(matches!(decode_report(b"\0\0\0", ""), Err(AppError::Parse(_))));
        assert!(matches!(decode_report(b"CRC:00", ""), Err(AppError::Parse(_))));
    }

    #[test]
    fn volume_parsing() {
        assert_eq!(parse_volume("0.125 m³"), Some(0.125));
        assert_eq!(parse_volume("42"), Some(42.0));
        assert_eq!(parse_volume("1.23456 m³"), Some(1.235));
        assert_eq!(parse_volume(""), None);
        assert_eq!(parse_volume("NaN"), None);
    }

    #[test]
    fn json_shape() {
        let r = decode_report(SAMPLE.as_bytes(), NFC_FORUM_TYPE_2).unwrap().reading;
        let json = r.to_json().unwrap();
        assert_eq!(
            json,
            "{\"Name\":\"DeviceX\",\"SN\":\"12345ABC\",\"NFC_Id\":\"12345abc\",\
             \"NFC_Typ\":\"NFC Forum Type 2\",\"Battery\":\"87%\",\"Vol\":\"123.456 m³\",\
             \"history\":[{\"date\":\"2024-01-01\",\"volume\":\"100.000\"}]}"
        );
        assert!(!json.contains(",}") && !json.contains(",]"));
    }
}

// EOF
