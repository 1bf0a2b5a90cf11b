//! Index selection along one dimension of stored results.

use crate::error::StoreError;

/// Selection along runs, rows or columns.
///
/// Negative indices count from the end, as do negative range bounds.
/// Reads always return full nested blocks, so an [`Index`](Slice::Index)
/// still yields a one-element dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slice {
    /// Every index.
    All,
    /// A single index.
    Index(isize),
    /// `start..stop` by `step`, bounds clamped like a sequence slice.
    Range {
        /// First index, `None` for the natural start.
        start: Option<isize>,
        /// End bound (exclusive), `None` for the natural end.
        stop: Option<isize>,
        /// Stride, never zero.
        step: isize,
    },
    /// Explicit indices, in the order given.
    List(Vec<isize>),
}

impl Slice {
    /// `start..stop` with unit step.
    pub fn range(start: isize, stop: isize) -> Self {
        Slice::Range {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Whether any explicit index is negative.
    ///
    /// Range bounds do not count: they are clamped rather than checked.
    pub fn has_negative(&self) -> bool {
        match self {
            Slice::Index(i) => *i < 0,
            Slice::List(l) => l.iter().any(|&i| i < 0),
            _ => false,
        }
    }

    /// Concrete indices for a dimension of size `len`.
    ///
    /// Explicit indices outside `-len..len` are an error. Ranges are clamped.
    pub fn resolve(&self, len: usize, dim: &'static str) -> Result<Vec<usize>, StoreError> {
        let norm = |i: isize| -> Result<usize, StoreError> {
            let n = len as isize;
            let j = if i < 0 { i + n } else { i };
            if (0..n).contains(&j) {
                Ok(j as usize)
            } else {
                Err(StoreError::OutOfRange {
                    dim,
                    index: i,
                    len,
                })
            }
        };
        match self {
            Slice::All => Ok((0..len).collect()),
            Slice::Index(i) => Ok(vec![norm(*i)?]),
            Slice::List(l) => l.iter().map(|&i| norm(i)).collect(),
            Slice::Range { start, stop, step } => {
                if *step == 0 {
                    return Err(StoreError::Unsupported {
                        op: "slice with zero step".to_string(),
                    });
                }
                Ok(range_indices(len as isize, *start, *stop, *step))
            }
        }
    }

    /// Largest index this selection may need, if it can be known without
    /// the dimension's size.
    pub fn max_index(&self) -> Option<usize> {
        match self {
            Slice::Index(i) if *i >= 0 => Some(*i as usize),
            Slice::List(l) if !l.is_empty() && l.iter().all(|&i| i >= 0) => {
                l.iter().max().map(|&i| i as usize)
            }
            Slice::Range {
                start,
                stop: Some(stop),
                step,
            } if *step > 0 && *stop >= 0 && start.is_none_or(|s| s >= 0) => {
                Some((*stop as usize).saturating_sub(1))
            }
            _ => None,
        }
    }
}

fn range_indices(n: isize, start: Option<isize>, stop: Option<isize>, step: isize) -> Vec<usize> {
    let clamp = |i: isize, lo: isize, hi: isize| {
        let j = if i < 0 { i + n } else { i };
        j.clamp(lo, hi)
    };
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, n));
        let end = stop.map_or(n, |s| clamp(s, 0, n));
        while i < end {
            out.push(i as usize);
            i += step;
        }
    } else {
        let mut i = start.map_or(n - 1, |s| clamp(s, -1, n - 1));
        let end = stop.map_or(-1, |s| clamp(s, -1, n - 1));
        while i > end {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

impl From<isize> for Slice {
    fn from(i: isize) -> Self {
        Slice::Index(i)
    }
}

impl From<std::ops::Range<isize>> for Slice {
    fn from(r: std::ops::Range<isize>) -> Self {
        Slice::range(r.start, r.end)
    }
}

impl From<Vec<isize>> for Slice {
    fn from(l: Vec<isize>) -> Self {
        Slice::List(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(Slice::Index(-1).resolve(5, "row").unwrap(), vec![4]);
        assert_eq!(Slice::List(vec![0, -2]).resolve(5, "row").unwrap(), vec![0, 3]);
        assert!(matches!(
            Slice::Index(-6).resolve(5, "row"),
            Err(StoreError::OutOfRange { index: -6, len: 5, .. })
        ));
        assert!(Slice::Index(5).resolve(5, "row").is_err());
    }

    #[test]
    fn ranges_clamp() {
        assert_eq!(Slice::range(1, 10).resolve(4, "row").unwrap(), vec![1, 2, 3]);
        let back = Slice::Range {
            start: None,
            stop: None,
            step: -2,
        };
        assert_eq!(back.resolve(5, "row").unwrap(), vec![4, 2, 0]);
        let tail = Slice::Range {
            start: Some(-2),
            stop: None,
            step: 1,
        };
        assert_eq!(tail.resolve(5, "row").unwrap(), vec![3, 4]);
        assert!(Slice::Range {
            start: None,
            stop: None,
            step: 0
        }
        .resolve(3, "row")
        .is_err());
    }

    #[test]
    fn negative_detection_and_max() {
        assert!(Slice::Index(-1).has_negative());
        assert!(!Slice::range(-3, -1).has_negative());
        assert_eq!(Slice::List(vec![3, 7, 1]).max_index(), Some(7));
        assert_eq!(Slice::range(2, 5).max_index(), Some(4));
        assert_eq!(Slice::All.max_index(), None);
    }
}
