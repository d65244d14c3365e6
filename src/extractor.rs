//! Hand-rolled decoder for the resource bundle (ZIP local file headers only).
//!
//! The archive is walked from the first local file header to the first record that is not
//! one (normally the central directory). Supported methods: `0` (stored) and `8` (raw
//! deflate). Everything else is rejected with [ExtractionError::UnsupportedCompression].
//!
//! Extraction is all-or-nothing per attempt: the destination directory is removed before
//! any entry is written, and every header (name, sizes, method) is validated before the
//! first write. Payloads are inflated and CRC-checked entry by entry, so a corrupt payload
//! leaves the earlier entries on disk until the next attempt clears the destination.

use crate::byte_cursor::{ByteCursor, OutOfBounds};
use crate::error::ExtractionError;
use crate::types::ExtractionStatus;
use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4B50;
/// End of central directory signature; an archive with no entries starts with it.
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4B50;
/// Optional signature in front of a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4B50;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// Default number of entries between two progress reports.
pub const DEFAULT_PROGRESS_BATCH: usize = 100;

const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Receives [ExtractionStatus] reports while an archive is extracted.
pub type ProgressSink<'a> = dyn FnMut(&ExtractionStatus) + 'a;

/// One entry as described by its local file header.
#[derive(Debug, Clone)]
pub struct ArchiveEntry<'a> {
  /// Name as stored in the archive (`/` separated).
  pub name: String,
  /// Validated relative path under the destination.
  pub relative_path: PathBuf,
  pub method: u16,
  pub flags: u16,
  pub crc32: u32,
  pub uncompressed_size: u32,
  /// Compressed bytes, `[data_start, data_start + compressed_size)`.
  pub data: &'a [u8],
}

impl ArchiveEntry<'_> {
  pub fn is_dir(&self) -> bool {
    self.name.ends_with('/') || self.name.ends_with('\\')
  }

  /// Decodes the entry's bytes according to its compression method.
  pub fn decode(&self) -> Result<Vec<u8>, ExtractionError> {
    let bytes = match self.method {
      METHOD_STORED => {
        if self.data.len() as u64 != u64::from(self.uncompressed_size) {
          return Err(ExtractionError::DecompressionFailed(self.name.clone()));
        }
        self.data.to_vec()
      }
      METHOD_DEFLATE => inflate(self.data, self.uncompressed_size)
        .ok_or_else(|| ExtractionError::DecompressionFailed(self.name.clone()))?,
      other => return Err(ExtractionError::UnsupportedCompression(other)),
    };
    if self.flags & FLAG_DATA_DESCRIPTOR == 0 {
      let mut crc = Crc::new();
      crc.update(&bytes);
      if crc.sum() != self.crc32 {
        return Err(ExtractionError::DecompressionFailed(format!(
          "{} (crc mismatch)",
          self.name
        )));
      }
    }
    Ok(bytes)
  }
}

/// Raw-inflates `data`; the result must be exactly `expected` bytes long.
fn inflate(data: &[u8], expected: u32) -> Option<Vec<u8>> {
  let expected = u64::from(expected);
  let mut out = Vec::with_capacity(expected.min(1 << 24) as usize);
  // Read one byte past the declared size so an oversized stream is detected, not truncated.
  DeflateDecoder::new(data)
    .take(expected + 1)
    .read_to_end(&mut out)
    .ok()?;
  (out.len() as u64 == expected).then_some(out)
}

fn truncated(what: &str, e: OutOfBounds) -> ExtractionError {
  ExtractionError::InvalidArchive(format!("truncated {}: {}", what, e))
}

/// Parses all local file headers of `archive` without touching the filesystem.
#[instrument(level = "trace", skip(archive), fields(len = archive.len()))]
pub fn read_entries(archive: &[u8]) -> Result<Vec<ArchiveEntry<'_>>, ExtractionError> {
  let signature = LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes();
  let Some(first) = archive.windows(4).position(|w| w == signature) else {
    if archive.starts_with(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes()) {
      return Ok(Vec::new());
    }
    return Err(ExtractionError::InvalidArchive(
      "no local file header found".to_string(),
    ));
  };

  let mut cursor = ByteCursor::new(archive);
  cursor.seek(first).map_err(|e| truncated("archive", e))?;
  let mut entries = Vec::new();
  while cursor.peek_u32_le().ok() == Some(LOCAL_FILE_HEADER_SIGNATURE) {
    entries.push(read_entry(&mut cursor)?);
  }
  Ok(entries)
}

fn read_entry<'a>(cursor: &mut ByteCursor<'a>) -> Result<ArchiveEntry<'a>, ExtractionError> {
  let header_at = cursor.position();
  let header = |e| truncated(&format!("header at offset {}", header_at), e);

  cursor.skip(4).map_err(header)?; // signature
  cursor.skip(2).map_err(header)?; // version needed
  let flags = cursor.read_u16_le().map_err(header)?;
  let method = cursor.read_u16_le().map_err(header)?;
  cursor.skip(4).map_err(header)?; // mod time + date
  let crc32 = cursor.read_u32_le().map_err(header)?;
  let compressed_size = cursor.read_u32_le().map_err(header)?;
  let uncompressed_size = cursor.read_u32_le().map_err(header)?;
  let name_len = cursor.read_u16_le().map_err(header)?;
  let extra_len = cursor.read_u16_le().map_err(header)?;
  let name_bytes = cursor.take(usize::from(name_len)).map_err(header)?;
  cursor.skip(usize::from(extra_len)).map_err(header)?;

  let name = String::from_utf8_lossy(name_bytes).into_owned();
  let relative_path = sanitize_entry_name(&name)?;
  if method != METHOD_STORED && method != METHOD_DEFLATE {
    return Err(ExtractionError::UnsupportedCompression(method));
  }

  let streamed = flags & FLAG_DATA_DESCRIPTOR != 0;
  if streamed && compressed_size == 0 && !name.ends_with('/') {
    return Err(ExtractionError::InvalidArchive(format!(
      "{}: sizes deferred to a data descriptor",
      name
    )));
  }

  let data = cursor
    .take(compressed_size as usize)
    .map_err(|e| truncated(&format!("data of {}", name), e))?;

  if streamed {
    skip_data_descriptor(cursor);
  }

  Ok(ArchiveEntry {
    name,
    relative_path,
    method,
    flags,
    crc32,
    uncompressed_size,
    data,
  })
}

/// Skips a data descriptor (with or without its signature) following entry data.
fn skip_data_descriptor(cursor: &mut ByteCursor<'_>) {
  let len = if cursor.peek_u32_le().ok() == Some(DATA_DESCRIPTOR_SIGNATURE) {
    16
  } else {
    12
  };
  if cursor.skip(len).is_err() {
    let end = cursor.len();
    let _ = cursor.seek(end);
  }
}

/// Turns an archive name into a relative path that stays under the destination.
pub(crate) fn sanitize_entry_name(name: &str) -> Result<PathBuf, ExtractionError> {
  let normalized = name.replace('\\', "/");
  if normalized.is_empty() || normalized.starts_with('/') {
    return Err(ExtractionError::InvalidArchive(format!(
      "illegal entry name {:?}",
      name
    )));
  }
  let mut path = PathBuf::new();
  for part in normalized.split('/') {
    if part.is_empty() || part == "." {
      continue;
    }
    match Path::new(part).components().next() {
      Some(Component::Normal(_)) if !part.contains(':') => path.push(part),
      _ => {
        return Err(ExtractionError::InvalidArchive(format!(
          "illegal entry name {:?}",
          name
        )));
      }
    }
  }
  Ok(path)
}

fn create_failed(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractionError + '_ {
  move |source| ExtractionError::FileCreationFailed {
    path: path.to_path_buf(),
    source,
  }
}

/// Decodes archives into directory trees, reporting progress every `progress_batch` entries.
#[derive(Debug, Clone)]
pub struct Extractor {
  progress_batch: usize,
}

impl Default for Extractor {
  fn default() -> Self {
    Self {
      progress_batch: DEFAULT_PROGRESS_BATCH,
    }
  }
}

impl Extractor {
  pub fn new(progress_batch: usize) -> Self {
    Self {
      progress_batch: progress_batch.max(1),
    }
  }

  pub fn progress_batch(&self) -> usize {
    self.progress_batch
  }

  /// Reads the archive at `archive_path` and extracts it into `dest`.
  pub fn extract_file(
    &self,
    archive_path: &Path,
    dest: &Path,
    progress: &mut ProgressSink<'_>,
  ) -> Result<usize, ExtractionError> {
    let bytes = fs::read(archive_path).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ExtractionError::ArchiveNotFound(archive_path.to_path_buf()),
      _ => ExtractionError::InvalidArchive(format!("{}: {}", archive_path.display(), e)),
    })?;
    self.extract(&bytes, dest, progress)
  }

  /// Extracts `archive` into `dest` and returns the number of entries written.
  ///
  /// `dest` is deleted first. On error, a final `error` status is reported and whatever
  /// was written stays behind until the next attempt clears it.
  #[instrument(level = "trace", skip(self, archive, progress), fields(dest = %dest.display()))]
  pub fn extract(
    &self,
    archive: &[u8],
    dest: &Path,
    progress: &mut ProgressSink<'_>,
  ) -> Result<usize, ExtractionError> {
    if dest.exists() {
      fs::remove_dir_all(dest).map_err(create_failed(dest))?;
    }
    fs::create_dir_all(dest).map_err(create_failed(dest))?;

    let entries = match read_entries(archive) {
      Ok(entries) => entries,
      Err(e) => {
        progress(&ExtractionStatus::failed(0, e.to_string()));
        return Err(e);
      }
    };
    let total = entries.len() as u64;
    info!(entries = total, dest = %dest.display(), "extracting bundle");
    progress(&ExtractionStatus::started(Some(total)));

    let mut done = 0usize;
    for entry in &entries {
      if let Err(e) = self.materialize(entry, dest) {
        progress(&ExtractionStatus::failed(done as u64, e.to_string()));
        return Err(e);
      }
      done += 1;
      if done % self.progress_batch == 0 {
        progress(&ExtractionStatus::progress(
          done as u64,
          Some(total),
          entry.name.clone(),
        ));
      }
    }

    progress(&ExtractionStatus::complete(done as u64));
    info!(entries = done, "bundle extracted");
    Ok(done)
  }

  fn materialize(&self, entry: &ArchiveEntry<'_>, dest: &Path) -> Result<(), ExtractionError> {
    let target = dest.join(&entry.relative_path);
    if entry.is_dir() {
      return fs::create_dir_all(&target).map_err(create_failed(&target));
    }
    let bytes = entry.decode()?;
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).map_err(create_failed(parent))?;
    }
    debug!(name = %entry.name, bytes = bytes.len(), method = entry.method, "writing entry");
    fs::write(&target, bytes).map_err(create_failed(&target))
  }
}
