//! Parameter mnemonics, their value decoders, and the last-known table.
//!
//! Every mnemonic the engine understands is listed once in
//! [`PARAMETERS`] (reported as `#KEY=VALUE`) or [`STATUS_PARAMETERS`]
//! (reported through fixed-prefix status lines). [`ParameterTable`] holds
//! the latest decoded value for each, with [`ParamValue::Unknown`] until
//! the first report and again after every session reset.

use std::collections::BTreeMap;
use std::fmt;

/// What to produce for a code missing from a label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// `Unknown (<code>)`.
    UnknownCode,
    /// The raw code itself.
    Raw,
    /// A fixed label.
    Fixed(&'static str),
}

/// How a raw report value becomes a display value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Reported as-is.
    Passthrough,
    /// `1` is `On`, anything else `Off`.
    OnOff,
    /// `1` is `Yes`, anything else `No`.
    YesNo,
    /// Reported as-is, or `None` when empty.
    OrNone,
    /// `<value> kbps`.
    Kbps,
    /// Enumerated code.
    Labels {
        table: &'static [(&'static str, &'static str)],
        fallback: Fallback,
    },
}

impl Decoder {
    /// Decode one raw value.
    pub fn decode(&self, raw: &str) -> String {
        match self {
            Decoder::Passthrough => raw.to_string(),
            Decoder::OnOff => (if raw == "1" { "On" } else { "Off" }).to_string(),
            Decoder::YesNo => (if raw == "1" { "Yes" } else { "No" }).to_string(),
            Decoder::OrNone => {
                if raw.is_empty() {
                    "None".to_string()
                } else {
                    raw.to_string()
                }
            }
            Decoder::Kbps => format!("{raw} kbps"),
            Decoder::Labels { table, fallback } => {
                match table.iter().find(|(code, _)| *code == raw) {
                    Some((_, label)) => (*label).to_string(),
                    None => match fallback {
                        Fallback::UnknownCode => format!("Unknown ({raw})"),
                        Fallback::Raw => raw.to_string(),
                        Fallback::Fixed(label) => (*label).to_string(),
                    },
                }
            }
        }
    }
}

/// A known device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Device mnemonic, e.g. `COD1`.
    pub mnemonic: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    pub decoder: Decoder,
}

const fn spec(mnemonic: &'static str, name: &'static str, decoder: Decoder) -> ParamSpec {
    ParamSpec {
        mnemonic,
        name,
        decoder,
    }
}

const CODING_ALGORITHMS: &[(&str, &str)] = &[
    ("0", "G722 - H242 (Mono)"),
    ("1", "G711 (Mono)"),
    ("2", "G722 - H221"),
    ("4", "MPEG Layer 2 (Mono)"),
    ("5", "MPEG Layer 2 (Dual Mono)"),
    ("7", "G722 - SRT"),
    ("10", "AAC-LC (Mono)"),
    ("17", "Opus (Mono)"),
    ("50", "Opus (Mono)"),
    ("51", "Opus (Stereo)"),
];

const NETWORK_TYPES: &[(&str, &str)] = &[
    ("0", "ISDN"),
    ("1", "Leased Line"),
    ("2", "Analog (Codec)"),
    ("3", "Analog (Hybrid)"),
    ("4", "Mobile Voice"),
    ("5", "IP"),
];

const IP_QUALITIES: &[(&str, &str)] = &[
    ("0", "Low"),
    ("1", "Medium"),
    ("2", "High"),
    ("3", "Bad"),
    ("4", "Very Bad"),
    ("5", "Very High"),
];

const REPLICATION: &[(&str, &str)] = &[("1", "On"), ("2", "On (Interleaved)")];

const SYNC_MODES: &[(&str, &str)] = &[("0", "Genlock")];

const AES_RATES: &[(&str, &str)] = &[("0", "32 kHz"), ("1", "48 kHz"), ("2", "96 kHz")];

/// Parameters reported as `#KEY=VALUE`.
pub const PARAMETERS: &[ParamSpec] = &[
    spec("5AS", "5AS", Decoder::OnOff),
    spec(
        "COD1",
        "Coding algorithm",
        Decoder::Labels {
            table: CODING_ALGORITHMS,
            fallback: Fallback::UnknownCode,
        },
    ),
    spec(
        "NET",
        "Network type",
        Decoder::Labels {
            table: NETWORK_TYPES,
            fallback: Fallback::UnknownCode,
        },
    ),
    spec(
        "IPQ",
        "IP quality",
        Decoder::Labels {
            table: IP_QUALITIES,
            fallback: Fallback::UnknownCode,
        },
    ),
    spec(
        "REP",
        "Packet replication",
        Decoder::Labels {
            table: REPLICATION,
            fallback: Fallback::Fixed("Off"),
        },
    ),
    spec("CHD1", "Coding bit rate", Decoder::Kbps),
    spec("NUM1", "Number 1", Decoder::OrNone),
    spec("NUM2", "Number 2", Decoder::OrNone),
    spec("NUM3", "Number 3", Decoder::OrNone),
    spec("NUM4", "Number 4", Decoder::OrNone),
    spec("NUM5", "Number 5", Decoder::OrNone),
    spec("NUM6", "Number 6", Decoder::OrNone),
    spec("NUM7", "Number 7", Decoder::OrNone),
    spec("NUM8", "Number 8", Decoder::OrNone),
    spec("LOC1", "Location 1", Decoder::OrNone),
    spec("LOC2", "Location 2", Decoder::OrNone),
    spec("LOC3", "Location 3", Decoder::OrNone),
    spec("LOC4", "Location 4", Decoder::OrNone),
    spec("LOC5", "Location 5", Decoder::OrNone),
    spec("LOC6", "Location 6", Decoder::OrNone),
    spec("LOC7", "Location 7", Decoder::OrNone),
    spec("LOC8", "Location 8", Decoder::OrNone),
    spec("AUTO1", "Auto answer 1", Decoder::OnOff),
    spec("AUTO2", "Auto answer 2", Decoder::OnOff),
    spec("RED1", "Redundancy 1", Decoder::OnOff),
    spec("RED2", "Redundancy 2", Decoder::OnOff),
    spec("LCT", "Line connection type", Decoder::Passthrough),
    spec("LLBC", "Leased line bit clock", Decoder::Passthrough),
    spec("LLBR", "Leased line bit rate", Decoder::Passthrough),
    spec("FRE", "Frequency", Decoder::Passthrough),
    spec(
        "SYNC",
        "Sync mode",
        Decoder::Labels {
            table: SYNC_MODES,
            fallback: Fallback::Fixed("Master"),
        },
    ),
    spec(
        "AES",
        "AES sampling rate",
        Decoder::Labels {
            table: AES_RATES,
            fallback: Fallback::Raw,
        },
    ),
    spec("GIN", "Gain in", Decoder::Passthrough),
    spec("GOUT", "Gain out", Decoder::Passthrough),
    spec("TAE", "TAE", Decoder::Passthrough),
    spec("HLC", "HLC", Decoder::Passthrough),
    spec("NBR", "NBR", Decoder::Passthrough),
    spec("TTR", "TTR", Decoder::Passthrough),
    spec("DHCP", "DHCP", Decoder::Passthrough),
    spec("IP", "IP address", Decoder::Passthrough),
    spec("IPM", "IP mask", Decoder::Passthrough),
    spec("GW", "Gateway", Decoder::Passthrough),
    spec("DNS", "DNS", Decoder::Passthrough),
    spec("N1", "Last connected number", Decoder::Passthrough),
];

/// Parameters carried by fixed-prefix status reports.
pub const STATUS_PARAMETERS: &[ParamSpec] = &[
    spec("COD1:S", "Codec status", Decoder::Passthrough),
    spec("ENT:APPEL1", "Incoming call", Decoder::YesNo),
    spec("CFG", "Configuration number", Decoder::Passthrough),
    spec("BOU", "Test loop", Decoder::Passthrough),
    spec("ALA:D1", "Alarm D1", Decoder::Passthrough),
    spec("ALA:D2", "Alarm D2", Decoder::Passthrough),
    spec("ALA:D3", "Alarm D3", Decoder::Passthrough),
];

/// Look up a `#KEY=` mnemonic.
pub fn lookup(key: &str) -> Option<&'static ParamSpec> {
    PARAMETERS.iter().find(|p| p.mnemonic == key)
}

/// Look up any mnemonic, `#KEY=` or status.
pub fn lookup_any(key: &str) -> Option<&'static ParamSpec> {
    lookup(key).or_else(|| STATUS_PARAMETERS.iter().find(|p| p.mnemonic == key))
}

/// Every known parameter.
pub fn all() -> impl Iterator<Item = &'static ParamSpec> {
    PARAMETERS.iter().chain(STATUS_PARAMETERS.iter())
}

/// Last-known value of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParamValue {
    /// Not reported since the session started.
    #[default]
    Unknown,
    /// Decoded value from the latest report.
    Known(String),
}

impl ParamValue {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            ParamValue::Known(v) => Some(v),
            ParamValue::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ParamValue::Known(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Unknown => f.write_str("unknown"),
            ParamValue::Known(v) => f.write_str(v),
        }
    }
}

/// Latest decoded value for every known mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterTable {
    values: BTreeMap<&'static str, ParamValue>,
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterTable {
    /// A table with every mnemonic set to [`ParamValue::Unknown`].
    pub fn new() -> Self {
        ParameterTable {
            values: all().map(|p| (p.mnemonic, ParamValue::Unknown)).collect(),
        }
    }

    /// Set every entry back to unknown.
    pub fn reset(&mut self) {
        for value in self.values.values_mut() {
            *value = ParamValue::Unknown;
        }
    }

    /// `None` if `key` is not a known mnemonic.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// Store a decoded value. Returns whether the stored value changed.
    /// Unknown mnemonics are ignored.
    pub fn set(&mut self, key: &str, value: String) -> bool {
        let Some(slot) = self.values.get_mut(key) else {
            return false;
        };
        let value = ParamValue::Known(value);
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Number of entries with a known value.
    pub fn known_count(&self) -> usize {
        self.values.values().filter(|v| v.is_known()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(key: &str, raw: &str) -> String {
        lookup_any(key).unwrap().decoder.decode(raw)
    }

    #[test]
    fn coding_algorithm_labels() {
        assert_eq!(decode("COD1", "7"), "G722 - SRT");
        assert_eq!(decode("COD1", "51"), "Opus (Stereo)");
        assert_eq!(decode("COD1", "999"), "Unknown (999)");
    }

    #[test]
    fn enumerated_fallbacks() {
        assert_eq!(decode("NET", "5"), "IP");
        assert_eq!(decode("NET", "6"), "Unknown (6)");
        assert_eq!(decode("IPQ", "5"), "Very High");
        assert_eq!(decode("REP", "2"), "On (Interleaved)");
        assert_eq!(decode("REP", "0"), "Off");
        assert_eq!(decode("SYNC", "0"), "Genlock");
        assert_eq!(decode("SYNC", "3"), "Master");
        assert_eq!(decode("AES", "1"), "48 kHz");
        assert_eq!(decode("AES", "44"), "44");
    }

    #[test]
    fn simple_decoders() {
        assert_eq!(decode("5AS", "1"), "On");
        assert_eq!(decode("RED2", "0"), "Off");
        assert_eq!(decode("CHD1", "64"), "64 kbps");
        assert_eq!(decode("LOC3", ""), "None");
        assert_eq!(decode("NUM1", "0612345678"), "0612345678");
        assert_eq!(decode("ENT:APPEL1", "1"), "Yes");
        assert_eq!(decode("GW", "10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn status_keys_are_not_hash_parameters() {
        assert!(lookup("COD1:S").is_none());
        assert!(lookup_any("COD1:S").is_some());
        assert!(lookup("XYZ").is_none());
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for p in all() {
            assert!(seen.insert(p.mnemonic), "duplicate {}", p.mnemonic);
        }
    }

    #[test]
    fn table_starts_unknown_and_reports_changes() {
        let mut table = ParameterTable::new();
        assert_eq!(table.get("COD1"), Some(&ParamValue::Unknown));
        assert_eq!(table.known_count(), 0);

        assert!(table.set("COD1", "G722 - SRT".into()));
        assert!(!table.set("COD1", "G722 - SRT".into()));
        assert!(table.set("COD1", "Unknown (999)".into()));
        assert_eq!(
            table.get("COD1").and_then(|v| v.as_known()),
            Some("Unknown (999)")
        );

        assert!(!table.set("NOPE", "x".into()));
        assert_eq!(table.get("NOPE"), None);
    }

    #[test]
    fn reset_returns_every_key_to_unknown() {
        let mut table = ParameterTable::new();
        for p in all() {
            table.set(p.mnemonic, "x".into());
        }
        assert_eq!(table.known_count(), all().count());
        table.reset();
        assert!(table.iter().all(|(_, v)| *v == ParamValue::Unknown));
    }
}
