//! Four-level result severity with wire-stable integer codes.

use std::fmt;

/// Outcome of a single checker invocation, ordered from best to worst known
/// state. `Unknown` sorts last: a checker that can't determine status is not
/// better than a critical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i16)]
pub enum Severity {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl Severity {
    /// The integer code this severity serializes to on the wire (NSCA and
    /// friends). Stable across releases.
    pub fn wire_code(self) -> i16 {
        self as i16
    }

    pub fn from_wire_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Severity::Ok),
            1 => Some(Severity::Warning),
            2 => Some(Severity::Critical),
            3 => Some(Severity::Unknown),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_match_spec() {
        assert_eq!(Severity::Ok.wire_code(), 0);
        assert_eq!(Severity::Warning.wire_code(), 1);
        assert_eq!(Severity::Critical.wire_code(), 2);
        assert_eq!(Severity::Unknown.wire_code(), 3);
    }

    #[test]
    fn round_trips_through_wire_code() {
        for s in [
            Severity::Ok,
            Severity::Warning,
            Severity::Critical,
            Severity::Unknown,
        ] {
            assert_eq!(Severity::from_wire_code(s.wire_code()), Some(s));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Severity::from_wire_code(42), None);
    }

    #[test]
    fn total_order_is_ok_lt_warning_lt_critical_lt_unknown() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Critical < Severity::Unknown);
    }
}
