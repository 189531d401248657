//! Text rendering of binary marker files and rank lookups

use super::PipelineResult;
use crate::core::{expand, MarkerCodec, MarkerConfig, PackedMarker, SmartReader, StreamResult, WordReader};
use crate::formats::{open_pairs, open_runs, MarkerArray, PairKind};
use std::io::Write;
use std::path::Path;

/// Which binary layout a file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    /// `.mps`
    Events,
    /// `.sma`
    SparseArray,
    /// `.ma`
    Runs,
    /// One position per rank
    Permutation,
}

impl DumpKind {
    /// Guess from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            "mps" => Some(DumpKind::Events),
            "sma" => Some(DumpKind::SparseArray),
            "ma" => Some(DumpKind::Runs),
            "sa" | "perm" => Some(DumpKind::Permutation),
            _ => None,
        }
    }
}

/// Rendering options
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    pub kind: DumpKind,
    /// Print packed words in hex instead of decoded fields
    pub raw: bool,
    /// Print one line per rank for compressed runs
    pub expand: bool,
    pub config: MarkerConfig,
}

fn render(codec: &MarkerCodec, marker: PackedMarker, raw: bool) -> StreamResult<String> {
    if raw {
        return Ok(marker.to_string());
    }
    let m = codec.decode(marker)?;
    Ok(format!("{}\t{}\t{}", m.contig_id, m.reference_position, m.allele_index))
}

/// Write one text line per record of `path`; returns the number of lines
pub fn dump_file<P: AsRef<Path>, W: Write>(
    path: P,
    options: &DumpOptions,
    out: &mut W,
) -> PipelineResult<u64> {
    let codec = MarkerCodec::from_config(&options.config);
    let mut lines = 0u64;

    match options.kind {
        DumpKind::Events | DumpKind::SparseArray => {
            let kind = if options.kind == DumpKind::Events {
                PairKind::Events
            } else {
                PairKind::SparseArray
            };
            for pair in open_pairs(path, &options.config, kind)? {
                let (key, marker) = pair?;
                writeln!(out, "{}\t{}", key, render(&codec, marker, options.raw)?)?;
                lines += 1;
            }
        }
        DumpKind::Runs => {
            for run in open_runs(path, &options.config)? {
                let run = run?;
                let text = render(&codec, run.marker, options.raw)?;
                if options.expand {
                    for (rank, _) in expand(std::slice::from_ref(&run)) {
                        writeln!(out, "{}\t{}", rank, text)?;
                        lines += 1;
                    }
                } else {
                    writeln!(out, "{}\t{}\t{}", run.first_rank, run.last_rank, text)?;
                    lines += 1;
                }
            }
        }
        DumpKind::Permutation => {
            let mut words = WordReader::with_config(SmartReader::open_auto(path)?, &options.config);
            while let Some(position) = words.next_word("permutation entry")? {
                writeln!(out, "{}\t{}", lines, position)?;
                lines += 1;
            }
        }
    }
    out.flush()?;
    Ok(lines)
}

/// Look up `ranks` in a compressed marker array, one line per rank
///
/// Unmarked ranks print `.`. Returns the number of marked ranks.
pub fn lookup_ranks<P: AsRef<Path>, W: Write>(
    path: P,
    ranks: &[u64],
    raw: bool,
    config: &MarkerConfig,
    out: &mut W,
) -> PipelineResult<u64> {
    let codec = MarkerCodec::from_config(config);
    let array = MarkerArray::load(path, config)?;
    let mut marked = 0u64;
    for &rank in ranks {
        match array.lookup(rank) {
            Some(marker) => {
                writeln!(out, "{}\t{}", rank, render(&codec, marker, raw)?)?;
                marked += 1;
            }
            None => writeln!(out, "{}\t.", rank)?,
        }
    }
    out.flush()?;
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CompressedMarkerRun, PendingFile};
    use crate::formats::RunWriter;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DumpKind::from_path(Path::new("x.mps")), Some(DumpKind::Events));
        assert_eq!(DumpKind::from_path(Path::new("x.ma")), Some(DumpKind::Runs));
        assert_eq!(DumpKind::from_path(Path::new("x.txt")), None);
    }

    #[test]
    fn test_dump_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.ma");
        let config = MarkerConfig::default();
        let codec = MarkerCodec::from_config(&config);
        let marker = codec.encode(1, 42, 2).unwrap();

        let mut w = RunWriter::new(PendingFile::create(&path).unwrap(), &config);
        w.write_run(&CompressedMarkerRun::new(3, 4, marker)).unwrap();
        w.finish().unwrap().commit().unwrap();

        let mut options = DumpOptions {
            kind: DumpKind::Runs,
            raw: false,
            expand: false,
            config,
        };
        let mut out = Vec::new();
        assert_eq!(dump_file(&path, &options, &mut out).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "3\t4\t1\t42\t2\n");

        options.expand = true;
        let mut out = Vec::new();
        assert_eq!(dump_file(&path, &options, &mut out).unwrap(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "3\t1\t42\t2\n4\t1\t42\t2\n");
    }

    #[test]
    fn test_lookup_ranks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.ma");
        let config = MarkerConfig::default();
        let codec = MarkerCodec::from_config(&config);
        let marker = codec.encode(0, 7, 1).unwrap();

        let mut w = RunWriter::new(PendingFile::create(&path).unwrap(), &config);
        w.write_run(&CompressedMarkerRun::new(2, 3, marker)).unwrap();
        w.finish().unwrap().commit().unwrap();

        let mut out = Vec::new();
        let marked = lookup_ranks(&path, &[1, 2, 3, 4], false, &config, &mut out).unwrap();
        assert_eq!(marked, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "1\t.\n2\t0\t7\t1\n3\t0\t7\t1\n4\t.\n");
    }
}
