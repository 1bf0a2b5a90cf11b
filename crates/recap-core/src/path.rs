//! Simulation paths and their builder.
//!
//! A [`SimPath`] names a quantity in the simulation: a chain of member
//! accesses, calls and index lookups ending in a terminal property, e.g.
//! `comp1.S1.Count` or `TETS(1, 2).A.Conc`. Paths are built with an
//! explicit method chain:
//!
//! ```
//! use recap_core::path;
//!
//! let p = path().member("comp1").member("A").terminal("Count");
//! assert_eq!(p.to_string(), "comp1.A.Count");
//! ```

use crate::value::Value;
use smallvec::SmallVec;
use std::fmt;

/// One step of a simulation path.
#[derive(Clone, Debug, PartialEq)]
pub enum PathElem {
    /// Named member, e.g. a compartment or species.
    Member(String),
    /// Named call with arguments, e.g. `TETS(1, 2)`.
    Call(String, Vec<Value>),
    /// Index lookup, e.g. `[3]`.
    Index(Value),
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Member(name) => write!(f, "{name}"),
            PathElem::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            PathElem::Index(key) => write!(f, "[{key}]"),
        }
    }
}

/// A complete path bound to a terminal property.
///
/// `subset`, when present, restricts the path to a subset of its columns
/// (positions into the unrestricted output). It is set by distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct SimPath {
    elems: SmallVec<[PathElem; 4]>,
    property: String,
    subset: Option<Vec<usize>>,
}

impl SimPath {
    /// Path elements preceding the terminal property.
    pub fn elems(&self) -> &[PathElem] {
        &self.elems
    }

    /// Terminal property, e.g. `Count`.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Column subset, if the path has been restricted.
    pub fn subset(&self) -> Option<&[usize]> {
        self.subset.as_deref()
    }

    /// Copy of this path restricted to `indices` of the unrestricted output.
    ///
    /// Restricting an already restricted path composes the two subsets.
    pub fn restricted(&self, indices: &[usize]) -> SimPath {
        let subset = match &self.subset {
            Some(prev) => indices.iter().filter_map(|&i| prev.get(i).copied()).collect(),
            None => indices.to_vec(),
        };
        SimPath {
            elems: self.elems.clone(),
            property: self.property.clone(),
            subset: Some(subset),
        }
    }

    /// The same path without any column restriction.
    pub fn unrestricted(&self) -> SimPath {
        SimPath {
            elems: self.elems.clone(),
            property: self.property.clone(),
            subset: None,
        }
    }

    /// Stable key identifying structurally identical paths.
    pub fn key(&self) -> String {
        match &self.subset {
            Some(s) => format!("{self}{s:?}"),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for SimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.elems.iter().enumerate() {
            if i > 0 && !matches!(e, PathElem::Index(_)) {
                write!(f, ".")?;
            }
            write!(f, "{e}")?;
        }
        if !self.elems.is_empty() {
            write!(f, ".")?;
        }
        write!(f, "{}", self.property)
    }
}

/// Incomplete path under construction.
///
/// A builder is not a selector source until [`terminal`](Self::terminal)
/// binds it to a property. [`into_complete`](Self::into_complete) lets a
/// caller distinguish incomplete paths without panicking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathBuilder {
    elems: SmallVec<[PathElem; 4]>,
}

/// Start an empty path.
pub fn path() -> PathBuilder {
    PathBuilder::default()
}

impl PathBuilder {
    /// Append a member access.
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.elems.push(PathElem::Member(name.into()));
        self
    }

    /// Append a call with arguments.
    pub fn call(mut self, name: impl Into<String>, args: Vec<Value>) -> Self {
        self.elems.push(PathElem::Call(name.into(), args));
        self
    }

    /// Append an index lookup.
    pub fn index(mut self, key: impl Into<Value>) -> Self {
        self.elems.push(PathElem::Index(key.into()));
        self
    }

    /// Elements accumulated so far.
    pub fn elems(&self) -> &[PathElem] {
        &self.elems
    }

    /// Bind the path to its terminal property.
    pub fn terminal(self, property: impl Into<String>) -> SimPath {
        SimPath {
            elems: self.elems,
            property: property.into(),
            subset: None,
        }
    }

    /// Split the last member off as the terminal property.
    ///
    /// Returns `None` when the path is empty or does not end in a member.
    pub fn into_complete(mut self) -> Option<SimPath> {
        match self.elems.pop() {
            Some(PathElem::Member(name)) => Some(SimPath {
                elems: self.elems,
                property: name,
                subset: None,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for PathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.elems.iter().enumerate() {
            if i > 0 && !matches!(e, PathElem::Index(_)) {
                write!(f, ".")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Anything a leaf selector can be built from.
///
/// A [`SimPath`] is complete; a [`PathBuilder`] never is, and converting
/// it hands the builder back so the caller can report what was missing.
pub trait IntoSimPath {
    /// Convert into a complete path, or return the incomplete builder.
    fn into_sim_path(self) -> Result<SimPath, PathBuilder>;
}

impl IntoSimPath for SimPath {
    fn into_sim_path(self) -> Result<SimPath, PathBuilder> {
        Ok(self)
    }
}

impl IntoSimPath for PathBuilder {
    fn into_sim_path(self) -> Result<SimPath, PathBuilder> {
        Err(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mixes_calls_and_indices() {
        let p = path()
            .call("TETS", vec![1.into(), 2.into()])
            .member("A")
            .index(0)
            .terminal("Conc");
        assert_eq!(p.to_string(), "TETS(1, 2).A[0].Conc");
    }

    #[test]
    fn restriction_composes() {
        let p = path().member("c").terminal("Count");
        let r = p.restricted(&[1, 3, 4]).restricted(&[0, 2]);
        assert_eq!(r.subset(), Some(&[1, 4][..]));
        assert_eq!(r.unrestricted(), p);
        assert_ne!(r.key(), p.key());
    }

    #[test]
    fn into_complete_needs_member_tail() {
        assert!(path().into_complete().is_none());
        assert!(path().member("a").index(1).into_complete().is_none());
        let p = path().member("a").member("Count").into_complete();
        assert_eq!(p.map(|p| p.to_string()), Some("a.Count".to_string()));
    }
}
