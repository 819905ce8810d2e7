//! Buffered script output, plain or gzip-compressed.
//!
//! A file destination is written through a temporary file in the same
//! directory and renamed into place by `Output::finish`; an output dropped
//! before that leaves nothing behind.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const WRITER_BUFFER_SIZE: usize = 256 * 1024;
pub const STMT_BUFFER_COUNT: usize = 100;

/// Statement-oriented writer. Flushes every `STMT_BUFFER_COUNT` statements
/// so that a long data phase streams out instead of piling up in memory.
pub struct ScriptWriter<W: Write> {
    writer: BufWriter<W>,
    write_count: usize,
    statements: usize,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(WRITER_BUFFER_SIZE, inner),
            write_count: 0,
            statements: 0,
        }
    }

    /// Write one statement followed by a newline
    pub fn write_statement(&mut self, stmt: &str) -> io::Result<()> {
        self.writer.write_all(stmt.as_bytes())?;
        self.writer.write_all(b"\n")?;

        self.statements += 1;
        self.write_count += 1;
        if self.write_count >= STMT_BUFFER_COUNT {
            self.write_count = 0;
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Write a comment or blank line; not counted as a statement
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.write_count = 0;
        self.writer.flush()
    }

    /// Flush and hand back the inner writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Where the script goes
pub enum Output {
    Stdout(io::Stdout),
    File(NamedTempFile, PathBuf),
    Gzip(GzEncoder<NamedTempFile>, PathBuf),
    GzipStdout(GzEncoder<io::Stdout>),
}

impl Output {
    /// Open the destination. `path` of `None` means stdout; gzip applies
    /// when `compress` is set or the path ends in `.gz`.
    pub fn open(path: Option<&Path>, compress: bool) -> io::Result<Self> {
        match path {
            Some(path) => {
                let dir = match path.parent() {
                    Some(dir) if !dir.as_os_str().is_empty() => dir,
                    _ => Path::new("."),
                };
                let file = NamedTempFile::new_in(dir)?;
                let gz = compress || path.extension().is_some_and(|e| e == "gz");
                Ok(if gz {
                    Output::Gzip(GzEncoder::new(file, Compression::default()), path.to_path_buf())
                } else {
                    Output::File(file, path.to_path_buf())
                })
            }
            None if compress => Ok(Output::GzipStdout(GzEncoder::new(
                io::stdout(),
                Compression::default(),
            ))),
            None => Ok(Output::Stdout(io::stdout())),
        }
    }

    /// Write any compression trailer and move a file into place
    pub fn finish(self) -> io::Result<()> {
        match self {
            Output::Stdout(mut out) => out.flush(),
            Output::File(mut file, path) => {
                file.flush()?;
                persist(file, &path)
            }
            Output::Gzip(gz, path) => {
                let mut file = gz.finish()?;
                file.flush()?;
                persist(file, &path)
            }
            Output::GzipStdout(gz) => gz.finish().map(drop),
        }
    }
}

fn persist(file: NamedTempFile, path: &Path) -> io::Result<()> {
    file.persist(path).map(drop).map_err(|e| e.error)
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(out) => out.write(buf),
            Output::File(file, _) => file.write(buf),
            Output::Gzip(gz, _) => gz.write(buf),
            Output::GzipStdout(gz) => gz.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(out) => out.flush(),
            Output::File(file, _) => file.flush(),
            Output::Gzip(gz, _) => gz.flush(),
            Output::GzipStdout(gz) => gz.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs::{self, File};
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_statements_counted() {
        let mut writer = ScriptWriter::new(Vec::new());
        writer.write_line("-- header").unwrap();
        writer.write_statement("BEGIN;").unwrap();
        writer.write_statement("COMMIT;").unwrap();
        assert_eq!(writer.statements(), 2);
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "-- header\nBEGIN;\nCOMMIT;\n");
    }

    #[test]
    fn test_gz_extension_compresses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.sql.gz");

        let output = Output::open(Some(&path), false).unwrap();
        let mut writer = ScriptWriter::new(output);
        writer.write_statement("SELECT 1;").unwrap();
        writer.into_inner().unwrap().finish().unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "SELECT 1;\n");
    }

    #[test]
    fn test_unfinished_output_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.sql");

        let output = Output::open(Some(&path), false).unwrap();
        let mut writer = ScriptWriter::new(output);
        writer.write_statement("BEGIN;").unwrap();
        writer.flush().unwrap();
        assert!(!path.exists());
        drop(writer);

        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_finish_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.sql");
        fs::write(&path, "old").unwrap();

        let mut writer = ScriptWriter::new(Output::open(Some(&path), false).unwrap());
        writer.write_statement("SELECT 1;").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        writer.into_inner().unwrap().finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "SELECT 1;\n");
    }
}
