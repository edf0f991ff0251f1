//! Multi-page backend: every plane of an acquisition appended to one stack file.
//!
//! Layout of `frames.mpstack`:
//! - 8-byte magic `MPSTACK1`
//! - per record: `u32` LE tag length, tag JSON, `u64` LE pixel length, pixels
//!
//! The last record written for a coordinate wins. A record cut short by a crash
//! ends the scan with a warning instead of failing the whole open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::file_storage::{files_with_extension, read_summary, write_summary};
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::{Coords, FrameTags, StorageId, StorageKind, SummaryMetadata, TaggedFrame};

pub const STACK_FILE: &str = "frames.mpstack";
pub const STACK_EXTENSION: &str = "mpstack";
const MAGIC: &[u8; 8] = b"MPSTACK1";

struct IndexEntry {
    tags: FrameTags,
    offset: u64,
    len: u64,
}

struct MultipageInner {
    file: File,
    index: BTreeMap<Coords, IndexEntry>,
    end: u64,
    summary: Option<SummaryMetadata>,
    frozen: bool,
    data_size: u64,
}

pub struct MultipageStorage {
    id: StorageId,
    dir: PathBuf,
    inner: Mutex<MultipageInner>,
}

impl MultipageStorage {
    /// Creates a writable stack in `dir`, creating the directory as needed.
    ///
    /// Fails if `dir` already holds a stack file.
    pub fn create(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create acquisition dir {}: {}", dir.display(), e);
            StorageError::WriteFailed(format!("{}: {}", dir.display(), e))
        })?;
        let path = dir.join(STACK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                error!("Failed to create stack file {}: {}", path.display(), e);
                StorageError::WriteFailed(format!("{}: {}", path.display(), e))
            })?;
        file.write_all(MAGIC).map_err(|e| {
            error!("Failed to write stack header {}: {}", path.display(), e);
            StorageError::WriteFailed(e.to_string())
        })?;

        let storage = Self {
            id: Uuid::new_v4(),
            dir: dir.to_path_buf(),
            inner: Mutex::new(MultipageInner {
                file,
                index: BTreeMap::new(),
                end: MAGIC.len() as u64,
                summary: None,
                frozen: false,
                data_size: 0,
            }),
        };
        info!("[{}] MultipageStorage created at {}", storage.id, dir.display());
        Ok(storage)
    }

    /// Opens the stack in `dir` read-only. The backend starts frozen.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let path = if dir.join(STACK_FILE).exists() {
            dir.join(STACK_FILE)
        } else {
            files_with_extension(dir, STACK_EXTENSION)?
                .into_iter()
                .next()
                .ok_or_else(|| StorageError::FormatNotRecognized(dir.to_path_buf()))?
        };
        let mut file = File::open(&path).map_err(|e| {
            error!("Failed to open stack file {}: {}", path.display(), e);
            StorageError::ReadFailed(format!("{}: {}", path.display(), e))
        })?;
        let (index, end, data_size) = scan_stack(&mut file, &path)?;
        let summary = read_summary(dir)?;

        let storage = Self {
            id: Uuid::new_v4(),
            dir: dir.to_path_buf(),
            inner: Mutex::new(MultipageInner {
                file,
                index,
                end,
                summary,
                frozen: true,
                data_size,
            }),
        };
        info!(
            "[{}] MultipageStorage opened {} with {} frame(s)",
            storage.id,
            path.display(),
            storage.lock().index.len()
        );
        Ok(storage)
    }

    fn lock(&self) -> MutexGuard<'_, MultipageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn scan_stack(
    file: &mut File,
    path: &Path,
) -> Result<(BTreeMap<Coords, IndexEntry>, u64, u64), StorageError> {
    let read_err = |e: io::Error| {
        error!("Failed to read stack file {}: {}", path.display(), e);
        StorageError::ReadFailed(format!("{}: {}", path.display(), e))
    };
    let file_len = file.metadata().map_err(read_err)?.len();
    file.seek(SeekFrom::Start(0)).map_err(read_err)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    if !read_or_eof(&mut reader, &mut magic).map_err(read_err)? || &magic != MAGIC {
        return Err(StorageError::Corrupted(format!(
            "{} is not a frame stack",
            path.display()
        )));
    }

    let mut index = BTreeMap::new();
    let mut data_size = 0u64;
    let mut pos = MAGIC.len() as u64;
    loop {
        let mut len_buf = [0u8; 4];
        if !read_or_eof(&mut reader, &mut len_buf).map_err(read_err)? {
            break;
        }
        let tags_len = u32::from_le_bytes(len_buf) as u64;
        if pos + 4 + tags_len + 8 > file_len {
            warn!("Truncated record at offset {} in {}", pos, path.display());
            break;
        }
        let mut tags_buf = vec![0u8; tags_len as usize];
        reader.read_exact(&mut tags_buf).map_err(read_err)?;
        let tags: FrameTags = serde_json::from_slice(&tags_buf).map_err(|e| {
            error!("Invalid frame tags at offset {} in {}: {}", pos, path.display(), e);
            StorageError::Corrupted(format!("{} at offset {}: {}", path.display(), pos, e))
        })?;
        let mut pix_len_buf = [0u8; 8];
        reader.read_exact(&mut pix_len_buf).map_err(read_err)?;
        let len = u64::from_le_bytes(pix_len_buf);
        let offset = pos + 4 + tags_len + 8;
        let Some(end) = offset.checked_add(len) else {
            error!("Pixel length {} at offset {} in {} is out of range", len, offset, path.display());
            return Err(StorageError::Corrupted(format!(
                "{} at offset {}: pixel length {} is out of range",
                path.display(),
                offset,
                len
            )));
        };
        if end > file_len {
            warn!("Truncated pixel data at offset {} in {}", offset, path.display());
            break;
        }
        reader.seek(SeekFrom::Start(end)).map_err(read_err)?;

        let coords = tags.coords();
        if let Some(old) = index.insert(coords, IndexEntry { tags, offset, len }) {
            data_size -= old.len;
        }
        data_size += len;
        pos = end;
    }
    Ok((index, pos, data_size))
}

impl FrameStorage for MultipageStorage {
    fn id(&self) -> StorageId {
        self.id
    }

    fn kind(&self) -> StorageKind {
        StorageKind::MultiPage
    }

    fn accept_frame(&self, frame: TaggedFrame) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen {
            return Err(StorageError::Frozen);
        }
        let coords = frame.coords();
        let tags = serde_json::to_vec(&frame.tags)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        let len = frame.pixels.len() as u64;

        let mut record = Vec::with_capacity(4 + tags.len() + 8 + frame.pixels.len());
        record.extend_from_slice(&(tags.len() as u32).to_le_bytes());
        record.extend_from_slice(&tags);
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&frame.pixels);

        let start = inner.end;
        let file = &mut inner.file;
        let write = file
            .seek(SeekFrom::Start(start))
            .and_then(|_| file.write_all(&record));
        if let Err(e) = write {
            error!("[{}] Failed to append frame at {}: {}", self.id, coords, e);
            return Err(StorageError::WriteFailed(e.to_string()));
        }

        let offset = start + 4 + tags.len() as u64 + 8;
        inner.end = start + record.len() as u64;
        if let Some(old) = inner.index.insert(
            coords,
            IndexEntry {
                tags: frame.tags,
                offset,
                len,
            },
        ) {
            inner.data_size -= old.len;
        }
        inner.data_size += len;
        debug!("[{}] Appended frame at {} ({} bytes)", self.id, coords, len);
        Ok(())
    }

    fn set_summary_metadata(&self, summary: SummaryMetadata) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen || inner.summary.is_some() {
            return Err(StorageError::Frozen);
        }
        write_summary(&self.dir, &summary)?;
        inner.summary = Some(summary);
        Ok(())
    }

    fn summary_metadata(&self) -> Option<SummaryMetadata> {
        self.lock().summary.clone()
    }

    fn coords(&self) -> Vec<Coords> {
        self.lock().index.keys().copied().collect()
    }

    fn frame(&self, coords: &Coords) -> Result<Option<TaggedFrame>, StorageError> {
        let mut inner = self.lock();
        let (tags, offset, len) = match inner.index.get(coords) {
            Some(entry) => (entry.tags.clone(), entry.offset, entry.len),
            None => return Ok(None),
        };
        let mut pixels = vec![0u8; len as usize];
        let file = &mut inner.file;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut pixels))
            .map_err(|e| {
                error!("[{}] Failed to read frame at {}: {}", self.id, coords, e);
                StorageError::ReadFailed(e.to_string())
            })?;
        Ok(Some(TaggedFrame { pixels, tags }))
    }

    fn freeze(&self) {
        let mut inner = self.lock();
        if inner.frozen {
            return;
        }
        inner.frozen = true;
        if let Err(e) = inner.file.sync_all() {
            warn!("[{}] Failed to sync stack file on freeze: {}", self.id, e);
        }
        info!("[{}] MultipageStorage frozen with {} frame(s)", self.id, inner.index.len());
    }

    fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    fn save_path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    fn data_size_bytes(&self) -> u64 {
        self.lock().data_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{Axis, PixelType};
    use tempfile::TempDir;

    fn frame_at(c: Coords, fill: u8) -> TaggedFrame {
        let mut tags = FrameTags::new(3, 2, PixelType::Gray16);
        tags.set_coords(c);
        TaggedFrame::new(vec![fill; 12], tags)
    }

    #[test]
    fn frames_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Acq_1");
        let storage = MultipageStorage::create(&path).unwrap();
        storage.accept_frame(frame_at(Coords::new(1, 0, 0, 0), 7)).unwrap();
        storage.accept_frame(frame_at(Coords::new(0, 1, 0, 0), 9)).unwrap();
        storage
            .set_summary_metadata(SummaryMetadata {
                frames: Some(2),
                ..Default::default()
            })
            .unwrap();
        storage.freeze();
        drop(storage);

        let reopened = MultipageStorage::open(&path).unwrap();
        assert!(reopened.is_frozen());
        assert_eq!(reopened.coords().len(), 2);
        assert_eq!(reopened.axis_length(Axis::Frame), 2);
        assert_eq!(reopened.data_size_bytes(), 24);
        assert_eq!(reopened.summary_metadata().unwrap().frames, Some(2));
        let frame = reopened.frame(&Coords::new(0, 1, 0, 0)).unwrap().unwrap();
        assert_eq!(frame.pixels, vec![9; 12]);
        assert_eq!(frame.tags.channel_index, Some(1));
    }

    #[test]
    fn last_record_for_a_coordinate_wins() {
        let dir = TempDir::new().unwrap();
        let storage = MultipageStorage::create(dir.path()).unwrap();
        storage.accept_frame(frame_at(Coords::default(), 1)).unwrap();
        storage.accept_frame(frame_at(Coords::default(), 2)).unwrap();
        assert_eq!(storage.frame(&Coords::default()).unwrap().unwrap().pixels, vec![2; 12]);
        drop(storage);

        let reopened = MultipageStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.coords(), vec![Coords::default()]);
        assert_eq!(reopened.frame(&Coords::default()).unwrap().unwrap().pixels, vec![2; 12]);
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = MultipageStorage::create(dir.path()).unwrap();
        storage.accept_frame(frame_at(Coords::new(0, 0, 0, 0), 1)).unwrap();
        storage.accept_frame(frame_at(Coords::new(1, 0, 0, 0), 1)).unwrap();
        drop(storage);

        let path = dir.path().join(STACK_FILE);
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let reopened = MultipageStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.coords(), vec![Coords::new(0, 0, 0, 0)]);
    }

    #[test]
    fn pixel_length_past_u64_range_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let tags = serde_json::to_vec(&frame_at(Coords::default(), 0).tags).unwrap();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(tags.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&tags);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0; 12]);
        fs::write(dir.path().join(STACK_FILE), bytes).unwrap();

        assert!(matches!(
            MultipageStorage::open(dir.path()),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn pixel_length_past_end_of_file_is_truncation() {
        let dir = TempDir::new().unwrap();
        let storage = MultipageStorage::create(dir.path()).unwrap();
        storage.accept_frame(frame_at(Coords::new(0, 0, 0, 0), 1)).unwrap();
        drop(storage);

        let tags = serde_json::to_vec(&frame_at(Coords::new(1, 0, 0, 0), 0).tags).unwrap();
        let mut tail = (tags.len() as u32).to_le_bytes().to_vec();
        tail.extend_from_slice(&tags);
        tail.extend_from_slice(&(1u64 << 40).to_le_bytes());
        let path = dir.path().join(STACK_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&tail).unwrap();
        drop(file);

        let reopened = MultipageStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.coords(), vec![Coords::new(0, 0, 0, 0)]);
    }

    #[test]
    fn refuses_to_overwrite_an_existing_stack() {
        let dir = TempDir::new().unwrap();
        MultipageStorage::create(dir.path()).unwrap();
        assert!(matches!(
            MultipageStorage::create(dir.path()),
            Err(StorageError::WriteFailed(_))
        ));
    }

    #[test]
    fn opened_stack_rejects_writes() {
        let dir = TempDir::new().unwrap();
        MultipageStorage::create(dir.path()).unwrap();
        let reopened = MultipageStorage::open(dir.path()).unwrap();
        assert!(matches!(
            reopened.accept_frame(frame_at(Coords::default(), 0)),
            Err(StorageError::Frozen)
        ));
        assert!(matches!(
            reopened.set_summary_metadata(SummaryMetadata::default()),
            Err(StorageError::Frozen)
        ));
    }
}
