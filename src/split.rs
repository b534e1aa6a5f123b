//! Split-index assignment.
//!
//! A [`SplitCursor`] is kept per partition key and hands out a split index for
//! every record of that key, in arrival order.

use crate::error::ConfigError;
use std::num::NonZeroUsize;

/// How records of one partition key are spread over output units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// One unit per key.
    #[default]
    Whole,
    /// At most this many rows per unit.
    Rows(NonZeroUsize),
    /// This many units of near-equal size.
    Equal(NonZeroUsize),
}

impl SplitMode {
    /// Build a mode from the two mutually exclusive row/equal limits.
    pub fn from_limits(rows: Option<usize>, equal: Option<usize>) -> Result<Self, ConfigError> {
        match (rows, equal) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSplitModes),
            (Some(rows), None) => NonZeroUsize::new(rows)
                .map(SplitMode::Rows)
                .ok_or(ConfigError::ZeroRows),
            (None, Some(equal)) => NonZeroUsize::new(equal)
                .map(SplitMode::Equal)
                .ok_or(ConfigError::ZeroEqual),
            (None, None) => Ok(SplitMode::Whole),
        }
    }

    /// Whether the key's total row count must be known before assigning.
    pub fn needs_totals(self) -> bool {
        matches!(self, SplitMode::Equal(_))
    }

    /// Whether file names carry a split number.
    pub fn is_numbered(self) -> bool {
        !matches!(self, SplitMode::Whole)
    }
}

/// Sizes of `units` near-equal parts of `total` rows, larger parts first.
///
/// The first `total % units` parts hold one extra row. Parts of size zero
/// (when `total < units`) are dropped since they would produce empty files.
pub fn equal_sizes(total: usize, units: NonZeroUsize) -> Vec<usize> {
    let units = units.get();
    let base = total / units;
    let extra = total % units;
    (0..units)
        .map(|i| if i < extra { base + 1 } else { base })
        .filter(|&size| size > 0)
        .collect()
}

/// Sizes of the units produced by capping `total` rows at `max` per unit.
pub fn row_sizes(total: usize, max: NonZeroUsize) -> Vec<usize> {
    let max = max.get();
    let mut sizes = vec![max; total / max];
    if total % max != 0 {
        sizes.push(total % max);
    }
    sizes
}

/// Where a single record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub split_index: usize,
    /// The unit is complete once this record is written.
    pub closes_unit: bool,
}

#[derive(Debug, Clone)]
enum Capacity {
    Unbounded,
    Fixed(usize),
    Planned(Vec<usize>),
}

/// Running split state for one partition key.
#[derive(Debug, Clone)]
pub struct SplitCursor {
    capacity: Capacity,
    split_index: usize,
    rows_in_unit: usize,
}

impl SplitCursor {
    /// `total` is the key's row count when known. Equal mode needs it and
    /// treats a missing total as zero rows.
    pub fn new(mode: SplitMode, total: Option<usize>) -> Self {
        let capacity = match (mode, total) {
            (SplitMode::Whole, _) => Capacity::Unbounded,
            (SplitMode::Rows(max), Some(total)) => Capacity::Planned(row_sizes(total, max)),
            (SplitMode::Rows(max), None) => Capacity::Fixed(max.get()),
            (SplitMode::Equal(units), total) => {
                Capacity::Planned(equal_sizes(total.unwrap_or(0), units))
            }
        };
        Self {
            capacity,
            split_index: 0,
            rows_in_unit: 0,
        }
    }

    fn unit_capacity(&self) -> Option<usize> {
        match &self.capacity {
            Capacity::Unbounded => None,
            Capacity::Fixed(max) => Some(*max),
            // Rows beyond the counted total spill into one extra, unbounded unit.
            Capacity::Planned(sizes) => sizes.get(self.split_index).copied(),
        }
    }

    /// Assign the next record of this key.
    pub fn advance(&mut self) -> Placement {
        let split_index = self.split_index;
        self.rows_in_unit += 1;

        let closes_unit = self
            .unit_capacity()
            .is_some_and(|cap| self.rows_in_unit >= cap);
        if closes_unit {
            self.split_index += 1;
            self.rows_in_unit = 0;
        }

        Placement {
            split_index,
            closes_unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn unit_sizes(mode: SplitMode, total: usize) -> Vec<usize> {
        let mut cursor = SplitCursor::new(mode, Some(total));
        let mut sizes: Vec<usize> = Vec::new();
        for _ in 0..total {
            let placement = cursor.advance();
            if placement.split_index == sizes.len() {
                sizes.push(0);
            }
            sizes[placement.split_index] += 1;
        }
        sizes
    }

    #[test]
    fn test_from_limits() {
        assert_eq!(SplitMode::from_limits(None, None).unwrap(), SplitMode::Whole);
        assert_eq!(
            SplitMode::from_limits(Some(3), None).unwrap(),
            SplitMode::Rows(nz(3))
        );
        assert_eq!(
            SplitMode::from_limits(None, Some(4)).unwrap(),
            SplitMode::Equal(nz(4))
        );
        assert!(matches!(
            SplitMode::from_limits(Some(3), Some(4)),
            Err(ConfigError::ConflictingSplitModes)
        ));
        assert!(matches!(
            SplitMode::from_limits(Some(0), None),
            Err(ConfigError::ZeroRows)
        ));
        assert!(matches!(
            SplitMode::from_limits(None, Some(0)),
            Err(ConfigError::ZeroEqual)
        ));
    }

    #[test]
    fn test_equal_sizes_larger_first() {
        assert_eq!(equal_sizes(10, nz(3)), vec![4, 3, 3]);
        assert_eq!(equal_sizes(11, nz(3)), vec![4, 4, 3]);
        assert_eq!(equal_sizes(9, nz(3)), vec![3, 3, 3]);
        assert_eq!(equal_sizes(2, nz(5)), vec![1, 1]);
        assert!(equal_sizes(0, nz(3)).is_empty());
    }

    #[test]
    fn test_equal_sizes_property() {
        for total in 0..60 {
            for units in 1..9 {
                let sizes = equal_sizes(total, nz(units));
                assert_eq!(sizes.iter().sum::<usize>(), total);

                let floor = total / units;
                let larger = sizes.iter().filter(|&&s| s == floor + 1).count();
                assert_eq!(larger, total % units);
                assert!(sizes.iter().all(|&s| s == floor || s == floor + 1));
                assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    #[test]
    fn test_row_sizes() {
        assert_eq!(row_sizes(10, nz(3)), vec![3, 3, 3, 1]);
        assert_eq!(row_sizes(9, nz(3)), vec![3, 3, 3]);
        assert_eq!(row_sizes(2, nz(5)), vec![2]);
        assert!(row_sizes(0, nz(5)).is_empty());
    }

    #[test]
    fn test_cursor_rows_mode() {
        assert_eq!(unit_sizes(SplitMode::Rows(nz(3)), 10), vec![3, 3, 3, 1]);
        assert_eq!(unit_sizes(SplitMode::Rows(nz(5)), 6), vec![5, 1]);
        assert_eq!(unit_sizes(SplitMode::Rows(nz(5)), 4), vec![4]);
    }

    #[test]
    fn test_cursor_rows_mode_matches_row_sizes() {
        for total in 1..40 {
            for max in 1..7 {
                assert_eq!(
                    unit_sizes(SplitMode::Rows(nz(max)), total),
                    row_sizes(total, nz(max))
                );
            }
        }
    }

    #[test]
    fn test_cursor_equal_mode() {
        assert_eq!(unit_sizes(SplitMode::Equal(nz(3)), 10), vec![4, 3, 3]);
        assert_eq!(unit_sizes(SplitMode::Equal(nz(4)), 2), vec![1, 1]);
    }

    #[test]
    fn test_cursor_whole_mode_never_closes() {
        let mut cursor = SplitCursor::new(SplitMode::Whole, None);
        for _ in 0..100 {
            let placement = cursor.advance();
            assert_eq!(placement.split_index, 0);
            assert!(!placement.closes_unit);
        }
    }

    #[test]
    fn test_cursor_rows_mode_without_total() {
        let mut cursor = SplitCursor::new(SplitMode::Rows(nz(3)), None);
        let indices: Vec<usize> = (0..7).map(|_| cursor.advance().split_index).collect();
        assert_eq!(indices, vec![0, 0, 0, 1, 1, 1, 2]);
    }

    #[test]
    fn test_cursor_closes_at_unit_boundaries() {
        let mut cursor = SplitCursor::new(SplitMode::Rows(nz(2)), None);
        let closes: Vec<bool> = (0..5).map(|_| cursor.advance().closes_unit).collect();
        assert_eq!(closes, vec![false, true, false, true, false]);
    }
}
