//! Sparse marker table
//!
//! Maps positions of the concatenated text to packed markers. Most positions
//! carry no marker, so only marked positions are stored.

use crate::core::codec::PackedMarker;
use std::collections::HashMap;

/// Position → marker lookup for one concatenated text
#[derive(Debug, Clone, Default)]
pub struct SparseMarkerTable {
    markers: HashMap<u64, PackedMarker>,
}

impl SparseMarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-sized for `capacity` markers
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            markers: HashMap::with_capacity(capacity),
        }
    }

    /// Store the marker at `position`, returning the one it replaced
    pub fn insert(&mut self, position: u64, marker: PackedMarker) -> Option<PackedMarker> {
        self.markers.insert(position, marker)
    }

    /// Marker at `position`, if any
    #[inline]
    pub fn lookup(&self, position: u64) -> Option<PackedMarker> {
        self.markers.get(&position).copied()
    }

    /// Number of marked positions
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl FromIterator<(u64, PackedMarker)> for SparseMarkerTable {
    fn from_iter<I: IntoIterator<Item = (u64, PackedMarker)>>(iter: I) -> Self {
        let mut table = SparseMarkerTable::new();
        table.extend(iter);
        table
    }
}

impl Extend<(u64, PackedMarker)> for SparseMarkerTable {
    fn extend<I: IntoIterator<Item = (u64, PackedMarker)>>(&mut self, iter: I) {
        for (position, marker) in iter {
            self.insert(position, marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup() {
        let mut table = SparseMarkerTable::new();
        assert!(table.is_empty());
        assert_eq!(table.insert(10, PackedMarker::from_raw(7)), None);
        assert_eq!(table.lookup(10), Some(PackedMarker::from_raw(7)));
        assert_eq!(table.lookup(11), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut table = SparseMarkerTable::new();
        table.insert(3, PackedMarker::from_raw(1));
        assert_eq!(table.insert(3, PackedMarker::from_raw(2)), Some(PackedMarker::from_raw(1)));
        assert_eq!(table.lookup(3), Some(PackedMarker::from_raw(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_zero_marker_is_stored() {
        let table: SparseMarkerTable = [(0, PackedMarker::from_raw(0))].into_iter().collect();
        assert_eq!(table.lookup(0), Some(PackedMarker::from_raw(0)));
    }
}
