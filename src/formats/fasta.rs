//! FASTA reader and writer
//!
//! The reference is loaded whole, contigs kept in file order; a contig's
//! index in that order is its contig id. [`FastaWriter`] streams haplotype
//! sequences with fixed-width line wrapping.

use crate::core::io::open_text;
use log::info;
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Line width of written sequences
pub const FASTA_LINE_WIDTH: usize = 60;

/// FASTA parsing error
#[derive(Debug, thiserror::Error)]
pub enum FastaError {
    #[error("{path:?} line {line}: sequence data before the first header")]
    SequenceBeforeHeader { path: PathBuf, line: usize },

    #[error("{path:?} line {line}: empty contig name")]
    EmptyName { path: PathBuf, line: usize },

    #[error("{path:?}: duplicate contig {name}")]
    DuplicateContig { path: PathBuf, name: String },

    #[error("{0:?}: no sequences")]
    Empty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One named sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: String,
    pub sequence: Vec<u8>,
}

/// Reference contigs in file order
#[derive(Debug, Clone, Default)]
pub struct ReferenceGenome {
    contigs: Vec<FastaRecord>,
}

impl ReferenceGenome {
    /// Load a FASTA file (plain, gzip or bzip2)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FastaError> {
        let path = path.as_ref();
        info!("Loading reference from {:?}", path);
        let reader = open_text(path)?;
        let genome = Self::from_reader(reader, path)?;
        info!(
            "Loaded {} contigs, {} bases",
            genome.len(),
            genome.total_length()
        );
        Ok(genome)
    }

    /// Parse FASTA text; `path` is only used in errors
    pub fn from_reader<R: BufRead>(mut reader: R, path: &Path) -> Result<Self, FastaError> {
        let mut contigs: Vec<FastaRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut line = String::with_capacity(256);
        let mut line_no = 0usize;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            let trimmed = line.trim_end();

            if let Some(header) = trimmed.strip_prefix('>') {
                let name = header.split_whitespace().next().unwrap_or("");
                if name.is_empty() {
                    return Err(FastaError::EmptyName {
                        path: path.to_path_buf(),
                        line: line_no,
                    });
                }
                if !seen.insert(name.to_string()) {
                    return Err(FastaError::DuplicateContig {
                        path: path.to_path_buf(),
                        name: name.to_string(),
                    });
                }
                contigs.push(FastaRecord {
                    name: name.to_string(),
                    sequence: Vec::new(),
                });
                continue;
            }

            if trimmed.is_empty() {
                continue;
            }
            match contigs.last_mut() {
                Some(record) => record
                    .sequence
                    .extend(trimmed.bytes().filter(|b| !b.is_ascii_whitespace())),
                None => {
                    return Err(FastaError::SequenceBeforeHeader {
                        path: path.to_path_buf(),
                        line: line_no,
                    })
                }
            }
        }

        if contigs.is_empty() {
            return Err(FastaError::Empty(path.to_path_buf()));
        }
        Ok(Self { contigs })
    }

    pub fn contigs(&self) -> &[FastaRecord] {
        &self.contigs
    }

    /// Contig name → contig id
    pub fn contig_ids(&self) -> HashMap<String, u64> {
        self.contigs
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i as u64))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Sum of contig lengths
    pub fn total_length(&self) -> u64 {
        self.contigs.iter().map(|c| c.sequence.len() as u64).sum()
    }
}

/// Streaming FASTA writer with line wrapping
///
/// Bytes written through the [`Write`] impl form the body of the record
/// opened by the last [`begin_record`](FastaWriter::begin_record).
pub struct FastaWriter<W: Write> {
    inner: W,
    line_width: usize,
    column: usize,
}

impl<W: Write> FastaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_line_width(inner, FASTA_LINE_WIDTH)
    }

    pub fn with_line_width(inner: W, line_width: usize) -> Self {
        Self {
            inner,
            line_width: line_width.max(1),
            column: 0,
        }
    }

    /// Close the current record and start a new one
    pub fn begin_record(&mut self, name: &str) -> io::Result<()> {
        self.end_record()?;
        writeln!(self.inner, ">{}", name)
    }

    /// Terminate the current sequence line, if one is open
    pub fn end_record(&mut self) -> io::Result<()> {
        if self.column > 0 {
            self.inner.write_all(b"\n")?;
            self.column = 0;
        }
        Ok(())
    }

    /// Finish the last record and return the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        self.end_record()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for FastaWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.line_width - self.column;
            let take = room.min(rest.len());
            self.inner.write_all(&rest[..take])?;
            self.column += take;
            rest = &rest[take..];
            if self.column == self.line_width {
                self.inner.write_all(b"\n")?;
                self.column = 0;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<ReferenceGenome, FastaError> {
        ReferenceGenome::from_reader(Cursor::new(text.as_bytes()), Path::new("test.fa"))
    }

    #[test]
    fn test_contigs_in_file_order() {
        let genome = parse(">chr2 desc\nACGT\nAC\n\n>chr1\nGG\n").unwrap();
        assert_eq!(genome.len(), 2);
        assert_eq!(genome.contigs()[0].name, "chr2");
        assert_eq!(genome.contigs()[0].sequence, b"ACGTAC");
        assert_eq!(genome.contig_ids()["chr1"], 1);
        assert_eq!(genome.total_length(), 8);
    }

    #[test]
    fn test_inner_whitespace_dropped_case_kept() {
        let genome = parse(">chr1\nAC gt\n\tNa \r\n").unwrap();
        assert_eq!(genome.contigs()[0].sequence, b"ACgtNa".to_vec());
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("ACGT\n"), Err(FastaError::SequenceBeforeHeader { line: 1, .. })));
        assert!(matches!(parse(">a\nA\n>a\nC\n"), Err(FastaError::DuplicateContig { .. })));
        assert!(matches!(parse(">\nA\n"), Err(FastaError::EmptyName { .. })));
        assert!(matches!(parse(""), Err(FastaError::Empty(_))));
    }

    #[test]
    fn test_writer_wraps_lines() {
        let mut w = FastaWriter::with_line_width(Vec::new(), 4);
        w.begin_record("a").unwrap();
        w.write_all(b"ACG").unwrap();
        w.write_all(b"TACGTA").unwrap();
        w.begin_record("b").unwrap();
        w.write_all(b"GGGG").unwrap();
        w.begin_record("empty").unwrap();
        let out = String::from_utf8(w.finish().unwrap()).unwrap();
        assert_eq!(out, ">a\nACGT\nACGT\nA\n>b\nGGGG\n>empty\n");
    }
}
