use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque identifier of a point in the source's change stream, e.g.
/// `"3E11FA47-71CA-11E1-9E33-C80AA9429562:1-5"`. MygramDB never parses the
/// internal structure beyond what's needed to merge GTID sets; it is
/// captured at snapshot time and advanced as binlog events apply (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gtid(pub String);

impl Gtid {
    pub fn empty() -> Self {
        Gtid(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Gtid {
    fn from(s: String) -> Self {
        Gtid(s)
    }
}

impl From<&str> for Gtid {
    fn from(s: &str) -> Self {
        Gtid(s.to_string())
    }
}
