// pgmanager/src/backup/archive.rs
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::utils::discard_scratch_file;

pub const COMPRESSED_SUFFIX: &str = ".gz";

// Read side buffer; content is streamed through in chunks of this size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Gzips `src` into `{src}.gz`, replacing any existing file at that path.
///
/// The source is left in place; removing it is the caller's decision.
pub fn compress(src: &Path) -> Result<PathBuf> {
    let mut name = src.as_os_str().to_owned();
    name.push(COMPRESSED_SUFFIX);
    let dest = PathBuf::from(name);

    info!("Compressing {} to {}", src.display(), dest.display());
    let written = stream_into(&dest, |out| {
        let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(src)?);
        let mut encoder = GzEncoder::new(out, Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()
    });
    written.map(|_| dest)
}

/// Gunzips `src` (which must end in `.gz`) next to itself, without the suffix.
pub fn decompress(src: &Path) -> Result<PathBuf> {
    let dest = src
        .to_str()
        .and_then(|s| s.strip_suffix(COMPRESSED_SUFFIX))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "{} does not end in {}",
                src.display(),
                COMPRESSED_SUFFIX
            ))
        })?;

    info!("Extracting {} to {}", src.display(), dest.display());
    let written = stream_into(&dest, |out| {
        let mut decoder = GzDecoder::new(BufReader::with_capacity(CHUNK_SIZE, File::open(src)?));
        io::copy(&mut decoder, out)?;
        out.flush()
    });
    written.map(|_| dest)
}

/// Creates `dest` and hands a buffered writer to `fill`. A failed `fill`
/// removes the partial output before the error is returned.
fn stream_into<F>(dest: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut out = BufWriter::new(File::create(dest)?);
    match fill(&mut out) {
        Ok(()) => Ok(()),
        Err(e) => {
            drop(out);
            discard_scratch_file(dest);
            Err(AppError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_restores_compressed_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("backup-20230101-000000-app.dump");
        // larger than one chunk, with every byte value present
        let content: Vec<u8> = (0..(3 * CHUNK_SIZE + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &content).unwrap();

        let compressed = compress(&src).unwrap();
        assert_eq!(compressed, dir.path().join("backup-20230101-000000-app.dump.gz"));
        assert!(src.exists(), "compress leaves the source for the caller to remove");

        std::fs::remove_file(&src).unwrap();
        let extracted = decompress(&compressed).unwrap();
        assert_eq!(extracted, src);
        assert_eq!(std::fs::read(&extracted).unwrap(), content);
    }

    #[test]
    fn empty_file_survives_compression() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("empty.dump");
        std::fs::write(&src, b"").unwrap();

        let compressed = compress(&src).unwrap();
        std::fs::remove_file(&src).unwrap();
        assert_eq!(std::fs::read(decompress(&compressed).unwrap()).unwrap(), b"");
    }

    #[test]
    fn decompress_requires_the_gz_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("restore.dump");
        std::fs::write(&src, b"plain").unwrap();
        assert!(matches!(decompress(&src), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn corrupt_archive_fails_without_leaving_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("restore.dump.gz");
        std::fs::write(&src, b"this is not gzip data").unwrap();

        assert!(matches!(decompress(&src), Err(AppError::Io(_))));
        assert!(!dir.path().join("restore.dump").exists());
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compress(&dir.path().join("absent.dump")).unwrap_err();
        assert!(matches!(err, AppError::Io(e) if e.kind() == io::ErrorKind::NotFound));
        assert!(!dir.path().join("absent.dump.gz").exists());
    }
}
