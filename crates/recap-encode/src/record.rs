//! Compound record table entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a compound record, stored as the first column of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Integer scalar or integer list, data in `Ints`.
    Int = 0,
    /// Float scalar or float list, data in `Floats`.
    Float = 1,
    /// UTF-8 string, data in `Strings`.
    Str = 2,
    /// Heterogeneous list, child handles in `Lists`.
    List = 3,
    /// Map, two handles (keys, values) in `Lists`.
    Dict = 4,
}

impl Kind {
    /// Decode the stored discriminant.
    pub fn from_code(code: i64) -> Option<Kind> {
        match code {
            0 => Some(Kind::Int),
            1 => Some(Kind::Float),
            2 => Some(Kind::Str),
            3 => Some(Kind::List),
            4 => Some(Kind::Dict),
            _ => None,
        }
    }

    /// Stored discriminant.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Str => "str",
            Kind::List => "list",
            Kind::Dict => "dict",
        };
        f.write_str(name)
    }
}

/// One row of the compound record table.
///
/// `start..end` is the data range in the array selected by `kind`. A
/// scalar number stores `end == -1`: the value is the single element at
/// `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    /// Record kind.
    pub kind: Kind,
    /// First element.
    pub start: i64,
    /// One past the last element, or `-1` for scalars.
    pub end: i64,
}

impl Record {
    /// Whether this record holds a bare scalar.
    pub fn is_scalar(&self) -> bool {
        self.end < self.start
    }

    /// Encode as the stored `[kind, start, end]` triple.
    pub fn to_row(self) -> [i64; 3] {
        [self.kind.code(), self.start, self.end]
    }

    /// Decode a stored triple.
    pub fn from_row(row: [i64; 3]) -> Option<Record> {
        Some(Record {
            kind: Kind::from_code(row[0])?,
            start: row[1],
            end: row[2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_codec() {
        let r = Record {
            kind: Kind::Dict,
            start: 3,
            end: 5,
        };
        assert_eq!(r.to_row(), [4, 3, 5]);
        assert_eq!(Record::from_row(r.to_row()), Some(r));
        assert_eq!(Record::from_row([9, 0, 0]), None);
    }

    #[test]
    fn scalar_detection() {
        let scalar = Record {
            kind: Kind::Int,
            start: 0,
            end: -1,
        };
        assert!(scalar.is_scalar());
        let empty = Record {
            kind: Kind::Int,
            start: 4,
            end: 4,
        };
        assert!(!empty.is_scalar());
    }
}
