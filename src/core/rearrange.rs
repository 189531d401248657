//! Permutation rearranger
//!
//! Walks the index engine's permutation stream (the original text position at
//! each output rank, in rank order) and yields `(rank, marker)` for every rank
//! whose original position carries a marker.

use crate::core::codec::PackedMarker;
use crate::core::error::{StreamError, StreamResult};
use crate::core::io::WordReader;
use crate::core::table::SparseMarkerTable;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ranks read between two checks of the cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 1 << 16;

/// Single-pass iterator over marked ranks
pub struct Rearranger<'t, R: Read> {
    permutation: WordReader<R>,
    table: &'t SparseMarkerTable,
    rank: u64,
    cancel: Option<Arc<AtomicBool>>,
    done: bool,
}

impl<'t, R: Read> Rearranger<'t, R> {
    pub fn new(permutation: WordReader<R>, table: &'t SparseMarkerTable) -> Self {
        Self {
            permutation,
            table,
            rank: 0,
            cancel: None,
            done: false,
        }
    }

    /// Stop with [`StreamError::Cancelled`] once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Permutation entries consumed so far
    pub fn ranks_read(&self) -> u64 {
        self.rank
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn advance(&mut self) -> StreamResult<Option<(u64, PackedMarker)>> {
        loop {
            if self.rank % CANCEL_CHECK_INTERVAL == 0 && self.cancelled() {
                return Err(StreamError::Cancelled { ranks: self.rank });
            }
            let position = match self.permutation.next_word("permutation entry")? {
                Some(position) => position,
                None => return Ok(None),
            };
            let rank = self.rank;
            self.rank += 1;
            if let Some(marker) = self.table.lookup(position) {
                return Ok(Some((rank, marker)));
            }
        }
    }
}

impl<'t, R: Read> Iterator for Rearranger<'t, R> {
    type Item = StreamResult<(u64, PackedMarker)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Endian, WordWidth};
    use std::io::Cursor;

    fn permutation(positions: &[u64]) -> WordReader<Cursor<Vec<u8>>> {
        let bytes = positions.iter().flat_map(|p| p.to_le_bytes()).collect();
        WordReader::new(Cursor::new(bytes), WordWidth::W64, Endian::Little)
    }

    fn table() -> SparseMarkerTable {
        [(2, PackedMarker::from_raw(20)), (5, PackedMarker::from_raw(50))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_marked_ranks_in_order() {
        let table = table();
        let out: Vec<_> = Rearranger::new(permutation(&[5, 0, 1, 2, 4, 3]), &table)
            .collect::<StreamResult<_>>()
            .unwrap();
        assert_eq!(
            out,
            vec![(0, PackedMarker::from_raw(50)), (3, PackedMarker::from_raw(20))]
        );
    }

    #[test]
    fn test_truncated_permutation() {
        let table = table();
        let mut bytes: Vec<u8> = 5u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[2, 0, 0]);
        let reader = WordReader::new(Cursor::new(bytes), WordWidth::W64, Endian::Little);
        let mut it = Rearranger::new(reader, &table);
        assert!(matches!(it.next(), Some(Ok((0, _)))));
        assert!(matches!(it.next(), Some(Err(StreamError::TruncatedStream { got: 3, .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn test_cancelled_before_start() {
        let table = table();
        let flag = Arc::new(AtomicBool::new(true));
        let mut it = Rearranger::new(permutation(&[5]), &table).with_cancel(flag);
        assert!(matches!(it.next(), Some(Err(StreamError::Cancelled { ranks: 0 }))));
    }
}
