//! Depth files: one flat file of encoded records per depth.
//!
//! Files are written to `<name>.partial` and renamed into place once complete,
//! so a depth file either holds every record of its depth or does not exist.
//! Reading is a lazy stream of one record at a time; a short final read ends
//! the stream.

use crate::codec::{self, PersistedRecord, RECORD_SIZE};
use crate::error::PersistError;
use crate::store::RecordStore;
use crate::zobrist::HashKey;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub struct DepthFiles {
    dir: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DepthFiles {
    /// Use `dir` for depth files, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(DepthFiles { dir })
    }

    pub fn path_for(&self, depth: u32) -> PathBuf {
        self.dir.join(format!("uniques_{depth}.dat"))
    }

    fn partial_path_for(&self, depth: u32) -> PathBuf {
        self.dir.join(format!("uniques_{depth}.dat.partial"))
    }

    pub fn exists(&self, depth: u32) -> bool {
        self.path_for(depth).is_file()
    }

    /// Number of whole records in a depth file.
    pub fn record_count(&self, depth: u32) -> Result<u64, PersistError> {
        let path = self.path_for(depth);
        let meta = fs::metadata(&path).map_err(|source| PersistError::MissingDepth {
            depth,
            path: path.clone(),
            source,
        })?;
        Ok(meta.len() / RECORD_SIZE as u64)
    }

    pub fn remove(&self, depth: u32) -> Result<(), PersistError> {
        let path = self.path_for(depth);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error(&path)(e)),
            _ => Ok(()),
        }
    }

    /// Start writing a fresh file for `depth`.
    pub fn writer(&self, depth: u32) -> Result<DepthWriter, PersistError> {
        let partial = self.partial_path_for(depth);
        let file = File::create(&partial).map_err(io_error(&partial))?;
        Ok(DepthWriter {
            writer: Some(BufWriter::new(file)),
            partial,
            target: self.path_for(depth),
            dir: self.dir.clone(),
            written: 0,
        })
    }

    /// Write every record of `store` as the complete file for `depth`.
    pub fn save<K: HashKey>(&self, store: &RecordStore<K>, depth: u32) -> Result<u64, PersistError> {
        let mut writer = self.writer(depth)?;
        writer.append(store)?;
        let written = writer.commit()?;
        log::info!("depth {depth}: {written} records saved to {}", self.path_for(depth).display());
        Ok(written)
    }

    /// Stream the records of `depth` one at a time.
    pub fn load_stream(&self, depth: u32) -> Result<RecordStream, PersistError> {
        let path = self.path_for(depth);
        let file = File::open(&path).map_err(|source| PersistError::MissingDepth {
            depth,
            path: path.clone(),
            source,
        })?;
        Ok(RecordStream {
            reader: BufReader::new(file),
            path,
            depth,
            index: 0,
            done: false,
        })
    }
}

/// Writer for one depth file; removes its partial file unless committed.
pub struct DepthWriter {
    writer: Option<BufWriter<File>>,
    partial: PathBuf,
    target: PathBuf,
    dir: PathBuf,
    written: u64,
}

impl DepthWriter {
    /// Append every live record of `store`, in store iteration order.
    pub fn append<K: HashKey>(&mut self, store: &RecordStore<K>) -> Result<u64, PersistError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };
        let mut appended = 0u64;
        for record in store.records() {
            let bytes = codec::encode(&PersistedRecord {
                position: record.position,
                aux: record.aux,
                count: record.count,
            })?;
            writer.write_all(&bytes).map_err(io_error(&self.partial))?;
            appended += 1;
        }
        self.written += appended;
        Ok(appended)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, sync and move the file into place, then sync the directory so
    /// the rename survives a crash. Returns the record count.
    pub fn commit(mut self) -> Result<u64, PersistError> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| io_error(&self.partial)(e.into_error()))?;
            file.sync_all().map_err(io_error(&self.partial))?;
        }
        fs::rename(&self.partial, &self.target).map_err(io_error(&self.target))?;
        sync_dir(&self.dir).map_err(io_error(&self.dir))?;
        Ok(self.written)
    }
}

// Directory handles can only be synced on unix.
fn sync_dir(dir: &Path) -> io::Result<()> {
    if cfg!(unix) {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

impl Drop for DepthWriter {
    fn drop(&mut self) {
        // Only an uncommitted writer still owns its BufWriter.
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// Lazy, single-pass sequence of the records in one depth file.
pub struct RecordStream {
    reader: BufReader<File>,
    path: PathBuf,
    depth: u32,
    index: u64,
    done: bool,
}

// Fill `buf` as far as the file allows; returns the bytes read.
fn read_record(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Iterator for RecordStream {
    type Item = Result<PersistedRecord, PersistError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; RECORD_SIZE];
        match read_record(&mut self.reader, &mut buf) {
            Ok(RECORD_SIZE) => {
                let index = self.index;
                self.index += 1;
                Some(codec::decode(&buf).map_err(|source| PersistError::Decode {
                    depth: self.depth,
                    index,
                    source,
                }))
            }
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                log::warn!(
                    "{}: ignoring {n} trailing bytes after record {}",
                    self.path.display(),
                    self.index
                );
                self.done = true;
                None
            }
            Err(source) => {
                self.done = true;
                Some(Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::position::{AuxFlags, Position};

    fn filled_store() -> RecordStore<u64> {
        let config = StoreConfig {
            buckets: 2,
            arena_block: 2,
            max_arenas: 4,
        };
        let mut store = RecordStore::new(&config);
        for n in 1..=5u64 {
            let position = Position {
                white: n,
                kings: n,
                ..Position::default()
            };
            let aux = AuxFlags {
                white_to_move: n % 2 == 0,
                castling: (n % 16) as u8,
                ep_file: None,
            };
            store.insert_or_accumulate(n, &position, &aux, n * 10).unwrap();
        }
        store
    }

    #[test]
    fn save_then_stream_in_store_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        let store = filled_store();

        assert_eq!(files.save(&store, 3).unwrap(), 5);
        assert!(files.exists(3));
        assert!(!files.partial_path_for(3).exists());
        assert_eq!(files.record_count(3).unwrap(), 5);

        let streamed: Vec<PersistedRecord> =
            files.load_stream(3).unwrap().map(|r| r.unwrap()).collect();
        let expected: Vec<u64> = store.records().map(|r| r.count).collect();
        assert_eq!(streamed.iter().map(|r| r.count).collect::<Vec<_>>(), expected);
        for (record, stored) in streamed.iter().zip(store.records()) {
            assert_eq!(record.position, stored.position);
            assert_eq!(record.aux, stored.aux);
        }
    }

    #[test]
    fn committed_file_is_synced_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        let mut writer = files.writer(6).unwrap();
        writer.append(&filled_store()).unwrap();
        writer.append(&filled_store()).unwrap();
        assert!(!files.exists(6));
        assert_eq!(writer.commit().unwrap(), 10);

        assert!(files.exists(6));
        assert!(!files.partial_path_for(6).exists());
        assert_eq!(files.record_count(6).unwrap(), 10);
        sync_dir(dir.path()).unwrap();
    }

    #[test]
    fn missing_depth_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        assert!(matches!(
            files.load_stream(7),
            Err(PersistError::MissingDepth { depth: 7, .. })
        ));
    }

    #[test]
    fn short_final_read_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        files.save(&filled_store(), 1).unwrap();

        let mut bytes = fs::read(files.path_for(1)).unwrap();
        bytes.extend_from_slice(&[0xAB; RECORD_SIZE / 2]);
        fs::write(files.path_for(1), &bytes).unwrap();

        let records: Vec<_> = files.load_stream(1).unwrap().collect();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn uncommitted_writer_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        {
            let mut writer = files.writer(2).unwrap();
            writer.append(&filled_store()).unwrap();
            assert_eq!(writer.written(), 5);
        }
        assert!(!files.exists(2));
        assert!(!files.partial_path_for(2).exists());
    }

    #[test]
    fn save_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = DepthFiles::new(dir.path()).unwrap();
        fs::write(files.path_for(4), [0u8; RECORD_SIZE * 9]).unwrap();
        files.save(&filled_store(), 4).unwrap();
        assert_eq!(files.record_count(4).unwrap(), 5);
        files.remove(4).unwrap();
        assert!(!files.exists(4));
        files.remove(4).unwrap();
    }
}
