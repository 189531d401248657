//! Input and output plumbing
//!
//! Buffered or memory-mapped inputs (with `-` for standard input), gzip and
//! bzip2 text inputs, fixed-width binary words, and output files that only
//! appear once committed.

use crate::core::config::{Endian, MarkerConfig, WordWidth};
use crate::core::error::{StreamError, StreamResult};
use memmap2::Mmap;
use tempfile::NamedTempFile;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Buffer size for text inputs and all outputs
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Buffer size for binary streams that are read once end to end
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;

/// Binary inputs at least this large are memory mapped
pub const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Path that stands for standard input
pub const STDIN_PATH: &str = "-";

/// How a file input is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Map files of at least [`MMAP_THRESHOLD`] bytes, buffer the rest
    #[default]
    Auto,
    /// Always buffer, with the given capacity
    Buffered(usize),
    /// Always map
    Mapped,
}

/// An input opened from a path, a mapping or standard input
pub enum SmartReader {
    File(BufReader<File>),
    Mapped(Cursor<Mmap>),
    /// Standard input, e.g. a pipe from the index engine
    Stdin(BufReader<io::Stdin>),
}

fn map_file(file: &File) -> io::Result<Cursor<Mmap>> {
    // SAFETY: inputs are not modified while a stage is reading them
    let map = unsafe { Mmap::map(file)? };
    Ok(Cursor::new(map))
}

impl SmartReader {
    /// Open `path`, or standard input for `-`
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> io::Result<Self> {
        let path = path.as_ref();
        if path == Path::new(STDIN_PATH) {
            let stdin = BufReader::with_capacity(LARGE_BUFFER_SIZE, io::stdin());
            return Ok(SmartReader::Stdin(stdin));
        }

        let file = File::open(path)?;
        let reader = match mode {
            ReadMode::Buffered(capacity) => {
                SmartReader::File(BufReader::with_capacity(capacity, file))
            }
            ReadMode::Mapped => SmartReader::Mapped(map_file(&file)?),
            ReadMode::Auto if file.metadata()?.len() >= MMAP_THRESHOLD => {
                SmartReader::Mapped(map_file(&file)?)
            }
            ReadMode::Auto => SmartReader::File(BufReader::with_capacity(LARGE_BUFFER_SIZE, file)),
        };
        Ok(reader)
    }

    /// Open with [`ReadMode::Auto`]
    pub fn open_auto<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open(path, ReadMode::Auto)
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, SmartReader::Mapped(_))
    }

    fn inner(&mut self) -> &mut dyn BufRead {
        match self {
            SmartReader::File(r) => r,
            SmartReader::Mapped(r) => r,
            SmartReader::Stdin(r) => r,
        }
    }
}

impl Read for SmartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner().read(buf)
    }
}

impl BufRead for SmartReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner().fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner().consume(amt)
    }
}

/// Compression of a text input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Plain,
    /// gzip, including multi-member bgzip
    Gzip,
    Bzip2,
}

impl CompressionFormat {
    /// Recognise the leading magic bytes of a stream
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&[0x1f, 0x8b]) {
            CompressionFormat::Gzip
        } else if head.starts_with(b"BZh") {
            CompressionFormat::Bzip2
        } else {
            CompressionFormat::Plain
        }
    }
}

/// Open a text input (or `-`), decompressing gzip and bzip2 by content
pub fn open_text<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let mut reader = SmartReader::open(path, ReadMode::Buffered(DEFAULT_BUFFER_SIZE))?;
    let format = CompressionFormat::sniff(reader.fill_buf()?);

    Ok(match format {
        CompressionFormat::Plain => Box::new(reader),
        CompressionFormat::Gzip => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            flate2::bufread::MultiGzDecoder::new(reader),
        )),
        CompressionFormat::Bzip2 => Box::new(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            bzip2::bufread::BzDecoder::new(reader),
        )),
    })
}

/// Reads fixed-width unsigned words in the configured byte order
pub struct WordReader<R: Read> {
    reader: R,
    width: WordWidth,
    endian: Endian,
    offset: u64,
}

/// Longest record read in one call: four words of 8 bytes
const MAX_RECORD_BYTES: usize = 32;

impl<R: Read> WordReader<R> {
    pub fn new(reader: R, width: WordWidth, endian: Endian) -> Self {
        Self {
            reader,
            width,
            endian,
            offset: 0,
        }
    }

    /// Reader using the configuration's width and byte order
    pub fn with_config(reader: R, config: &MarkerConfig) -> Self {
        Self::new(reader, config.width, config.endian)
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    /// Read one word; `Ok(None)` at a clean end of stream
    pub fn next_word(&mut self, what: &'static str) -> StreamResult<Option<u64>> {
        let mut out = [0u64; 1];
        Ok(self.read_record(&mut out, what)?.then_some(out[0]))
    }

    /// Fill `out` with one record of `out.len()` words
    ///
    /// Returns `Ok(false)` when the stream ends exactly on a record boundary,
    /// and [`StreamError::TruncatedStream`] when it ends inside a record.
    pub fn read_record(&mut self, out: &mut [u64], what: &'static str) -> StreamResult<bool> {
        let word_bytes = self.width.bytes();
        let expected = word_bytes * out.len();
        debug_assert!(expected <= MAX_RECORD_BYTES);

        let mut buf = [0u8; MAX_RECORD_BYTES];
        let got = fill(&mut self.reader, &mut buf[..expected])?;
        if got == 0 {
            return Ok(false);
        }
        if got < expected {
            return Err(StreamError::TruncatedStream {
                what,
                offset: self.offset,
                got,
                expected,
            });
        }

        for (slot, chunk) in out.iter_mut().zip(buf[..expected].chunks_exact(word_bytes)) {
            *slot = decode_word(chunk, self.width, self.endian);
        }
        self.offset += expected as u64;
        Ok(true)
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn decode_word(bytes: &[u8], width: WordWidth, endian: Endian) -> u64 {
    match (width, endian) {
        (WordWidth::W32, Endian::Little) => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
        }
        (WordWidth::W32, Endian::Big) => {
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
        }
        (WordWidth::W64, endian) => {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes[..8]);
            match endian {
                Endian::Little => u64::from_le_bytes(arr),
                Endian::Big => u64::from_be_bytes(arr),
            }
        }
    }
}

/// Writes fixed-width unsigned words in the configured byte order
pub struct WordWriter<W: Write> {
    writer: W,
    width: WordWidth,
    endian: Endian,
    words: u64,
}

impl<W: Write> WordWriter<W> {
    pub fn new(writer: W, width: WordWidth, endian: Endian) -> Self {
        Self {
            writer,
            width,
            endian,
            words: 0,
        }
    }

    /// Writer using the configuration's width and byte order
    pub fn with_config(writer: W, config: &MarkerConfig) -> Self {
        Self::new(writer, config.width, config.endian)
    }

    /// Words written so far
    pub fn words_written(&self) -> u64 {
        self.words
    }

    /// Write one word; values wider than the word are rejected, never truncated
    pub fn write_word(&mut self, value: u64) -> StreamResult<()> {
        if value > self.width.max_value() {
            return Err(StreamError::WordOverflow {
                value,
                bits: self.width.bits(),
            });
        }
        match (self.width, self.endian) {
            (WordWidth::W32, Endian::Little) => self.writer.write_all(&(value as u32).to_le_bytes())?,
            (WordWidth::W32, Endian::Big) => self.writer.write_all(&(value as u32).to_be_bytes())?,
            (WordWidth::W64, Endian::Little) => self.writer.write_all(&value.to_le_bytes())?,
            (WordWidth::W64, Endian::Big) => self.writer.write_all(&value.to_be_bytes())?,
        }
        self.words += 1;
        Ok(())
    }

    /// Write several words back to back
    pub fn write_words(&mut self, values: &[u64]) -> StreamResult<()> {
        for &value in values {
            self.write_word(value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// An output file written under a temporary name and moved into place on commit
///
/// The temporary file lives next to the destination, so the final rename never
/// crosses a filesystem. Dropping a `PendingFile` without calling
/// [`PendingFile::commit`] deletes it and leaves no truncated output behind.
pub struct PendingFile {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl PendingFile {
    /// Create a temporary `<name>.<random>.tmp` beside `path`
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let final_path = path.as_ref().to_path_buf();
        let parent = match final_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut prefix = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        prefix.push(".");
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        Ok(Self {
            writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, tmp),
            final_path,
        })
    }

    /// Final destination
    pub fn path(&self) -> &Path {
        &self.final_path
    }

    /// Current temporary location
    pub fn temp_path(&self) -> &Path {
        self.writer.get_ref().path()
    }

    /// Flush, sync and rename into place
    pub fn commit(self) -> io::Result<PathBuf> {
        let tmp = self.writer.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.final_path).map_err(|e| e.error)?;
        Ok(self.final_path)
    }
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_small_file_is_buffered() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b">chr1\nACGT\n")?;
        temp.flush()?;

        let reader = SmartReader::open_auto(temp.path())?;
        assert!(!reader.is_mapped());
        Ok(())
    }

    #[test]
    fn test_mapped_permutation() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(&7u64.to_le_bytes())?;
        temp.flush()?;

        let reader = SmartReader::open(temp.path(), ReadMode::Mapped)?;
        assert!(reader.is_mapped());
        let mut words = WordReader::new(reader, WordWidth::W64, Endian::Little);
        assert_eq!(words.next_word("test").unwrap(), Some(7));
        assert_eq!(words.next_word("test").unwrap(), None);
        Ok(())
    }

    #[test]
    fn test_sniff() {
        assert_eq!(CompressionFormat::sniff(&[0x1f, 0x8b, 8]), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::sniff(b"BZh91AY"), CompressionFormat::Bzip2);
        assert_eq!(CompressionFormat::sniff(b"##fileformat"), CompressionFormat::Plain);
        assert_eq!(CompressionFormat::sniff(b""), CompressionFormat::Plain);
    }

    #[test]
    fn test_word_round_trip_all_formats() {
        for width in [WordWidth::W32, WordWidth::W64] {
            for endian in [Endian::Little, Endian::Big] {
                let mut writer = WordWriter::new(Vec::new(), width, endian);
                writer.write_words(&[1, 0x0102_0304, width.max_value()]).unwrap();
                assert_eq!(writer.words_written(), 3);
                let bytes = writer.into_inner();
                assert_eq!(bytes.len(), 3 * width.bytes());

                let mut reader = WordReader::new(Cursor::new(bytes), width, endian);
                let mut rec = [0u64; 3];
                assert!(reader.read_record(&mut rec, "test").unwrap());
                assert_eq!(rec, [1, 0x0102_0304, width.max_value()]);
                assert!(!reader.read_record(&mut rec, "test").unwrap());
            }
        }
    }

    #[test]
    fn test_big_endian_byte_layout() {
        let mut writer = WordWriter::new(Vec::new(), WordWidth::W32, Endian::Big);
        writer.write_word(0x0102_0304).unwrap();
        assert_eq!(writer.into_inner(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_truncated_record() {
        let bytes = vec![0u8; 12];
        let mut reader = WordReader::new(Cursor::new(bytes), WordWidth::W64, Endian::Little);
        let mut rec = [0u64; 2];
        let err = reader.read_record(&mut rec, "marker pair").unwrap_err();
        assert!(matches!(
            err,
            StreamError::TruncatedStream { what: "marker pair", got: 12, expected: 16, offset: 0 }
        ));
    }

    #[test]
    fn test_word_overflow_for_narrow_width() {
        let mut writer = WordWriter::new(Vec::new(), WordWidth::W32, Endian::Little);
        assert!(matches!(
            writer.write_word(1 << 32),
            Err(StreamError::WordOverflow { bits: 32, .. })
        ));
    }

    #[test]
    fn test_open_text_gzip() -> io::Result<()> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = TempDir::new()?;
        // content decides, not the extension
        let path = dir.path().join("seq.fa");
        let mut enc = GzEncoder::new(File::create(&path)?, Compression::default());
        enc.write_all(b">chr1\nACGT\n")?;
        enc.finish()?;

        let mut text = String::new();
        open_text(&path)?.read_to_string(&mut text)?;
        assert_eq!(text, ">chr1\nACGT\n");
        Ok(())
    }

    #[test]
    fn test_pending_file_commit_and_abort() -> io::Result<()> {
        let dir = TempDir::new()?;
        let kept = dir.path().join("kept.ma");
        let dropped = dir.path().join("dropped.ma");

        let mut pending = PendingFile::create(&kept)?;
        pending.write_all(b"data")?;
        pending.commit()?;
        assert_eq!(fs::read(&kept)?, b"data");

        let tmp_path = {
            let mut pending = PendingFile::create(&dropped)?;
            pending.write_all(b"partial")?;
            pending.flush()?;
            assert_eq!(pending.temp_path().parent(), Some(dir.path()));
            assert!(pending.temp_path().exists());
            pending.temp_path().to_path_buf()
        };
        assert!(!dropped.exists());
        assert!(!tmp_path.exists());

        let names: Vec<_> = fs::read_dir(dir.path())?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<io::Result<_>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("kept.ma")]);
        Ok(())
    }

    #[test]
    fn test_pending_file_replaces_existing() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("run.mps");
        fs::write(&path, b"old")?;

        let mut pending = PendingFile::create(&path)?;
        pending.write_all(b"new contents")?;
        assert_eq!(fs::read(&path)?, b"old");
        assert_eq!(pending.commit()?, path);
        assert_eq!(fs::read(&path)?, b"new contents");
        Ok(())
    }
}
