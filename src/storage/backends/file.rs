//! File-based pool store
//!
//! A pool file is JSON lines: one header line with the pool metadata, then
//! one line per k-point record in local order. Write handles keep the pool in
//! memory and write the whole file on close. Read handles only index where
//! each record line starts and decode a record when it is asked for, so an
//! open reader costs a few bytes per k-point however large the records are.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::storage::{
    error::{StorageError, StorageResult},
    naming::pool_file_name,
    traits::{PoolHandle, PoolStore},
    types::{BandsIndex, EphG2, KPointRecord, OpenMode, PoolDocument, PoolHeader, PoolSlots},
};

/// Byte range of one record line
#[derive(Debug, Clone, Copy)]
struct RecordSpan {
    offset: u64,
    len: usize,
}

/// Pool store backed by JSON lines files on the local file system
#[derive(Debug, Clone, Default)]
pub struct FilePoolStore;

impl FilePoolStore {
    pub fn new() -> Self {
        Self
    }

    fn encode(path: &Path, doc: &PoolDocument) -> StorageResult<Vec<u8>> {
        let mut out =
            serde_json::to_vec(&doc.header).map_err(|e| StorageError::serialization(path, e))?;
        out.push(b'\n');
        for record in &doc.records {
            serde_json::to_writer(&mut out, record)
                .map_err(|e| StorageError::serialization(path, e))?;
            out.push(b'\n');
        }
        Ok(out)
    }

    fn write_document(path: &Path, doc: &PoolDocument) -> StorageResult<()> {
        let content = Self::encode(path, doc)?;
        fs::write(path, content).map_err(|e| StorageError::io(path, e))
    }

    /// Write `doc` to a file that must not exist yet
    fn write_new_document(path: &Path, doc: &PoolDocument) -> StorageResult<()> {
        let content = Self::encode(path, doc)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
                    path: path.to_path_buf(),
                },
                _ => StorageError::io(path, e),
            })?;
        file.write_all(&content).map_err(|e| StorageError::io(path, e))
    }

    /// Read the header and locate every record line without decoding it
    fn index(path: &Path) -> StorageResult<(PoolHeader, Vec<RecordSpan>)> {
        let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let mut line = Vec::new();

        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| StorageError::io(path, e))?;
        let header: PoolHeader =
            serde_json::from_slice(&line).map_err(|e| StorageError::serialization(path, e))?;

        let mut offset = read as u64;
        let mut spans = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| StorageError::io(path, e))?;
            if read == 0 {
                break;
            }
            let len = line.strip_suffix(b"\n").unwrap_or(&line[..]).len();
            if len > 0 {
                spans.push(RecordSpan { offset, len });
            }
            offset += read as u64;
        }

        if spans.len() != header.nk_loc {
            return Err(StorageError::serialization(
                path,
                format!(
                    "nk_loc is {} but {} records are stored",
                    header.nk_loc,
                    spans.len()
                ),
            ));
        }
        Ok((header, spans))
    }

    fn read_span(file: &mut File, path: &Path, span: RecordSpan) -> StorageResult<KPointRecord> {
        let mut buf = vec![0u8; span.len];
        file.seek(SeekFrom::Start(span.offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| StorageError::io(path, e))?;
        let record: KPointRecord =
            serde_json::from_slice(&buf).map_err(|e| StorageError::serialization(path, e))?;
        record.validate()?;
        Ok(record)
    }
}

impl PoolStore for FilePoolStore {
    fn open(&self, path: &Path, mode: OpenMode) -> StorageResult<Box<dyn PoolHandle>> {
        trace!("Opening {} ({:?})", path.display(), mode);
        let (header, spans) = Self::index(path)?;
        match mode {
            OpenMode::Read => Ok(Box::new(FilePoolReader {
                path: path.to_path_buf(),
                header,
                spans,
            })),
            OpenMode::Write => {
                let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
                let records = spans
                    .iter()
                    .map(|&span| Self::read_span(&mut file, path, span))
                    .collect::<StorageResult<Vec<_>>>()?;
                let slots = PoolSlots::from_document(path, PoolDocument { header, records })?;
                Ok(Box::new(FilePoolHandle { slots }))
            }
        }
    }

    fn create(
        &self,
        dir: &Path,
        prefix: &str,
        pool_number: usize,
    ) -> StorageResult<Box<dyn PoolHandle>> {
        let path: PathBuf = dir.join(pool_file_name(prefix, pool_number));
        let slots = PoolSlots::empty(&path, prefix, pool_number);
        let doc = PoolDocument {
            header: PoolHeader {
                prefix: prefix.to_string(),
                pool: pool_number,
                nk_loc: 0,
                nkq: 0,
            },
            records: Vec::new(),
        };
        Self::write_new_document(&path, &doc)?;
        debug!("Created pool file {}", path.display());
        Ok(Box::new(FilePoolHandle { slots }))
    }
}

/// Read-only handle that decodes records on demand
#[derive(Debug)]
pub struct FilePoolReader {
    path: PathBuf,
    header: PoolHeader,
    spans: Vec<RecordSpan>,
}

impl FilePoolReader {
    fn span(&self, local: usize) -> StorageResult<RecordSpan> {
        if local == 0 || local > self.spans.len() {
            return Err(StorageError::IndexOutOfRange {
                path: self.path.clone(),
                index: local,
                len: self.spans.len(),
            });
        }
        Ok(self.spans[local - 1])
    }

    fn read_only(&self) -> StorageError {
        StorageError::ReadOnly {
            path: self.path.clone(),
        }
    }
}

impl PoolHandle for FilePoolReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn pool_number(&self) -> usize {
        self.header.pool
    }

    fn local_count(&self) -> usize {
        self.spans.len()
    }

    fn set_local_count(&mut self, _count: usize) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn secondary_count(&self) -> usize {
        self.header.nkq
    }

    fn get_eph_g2(&self, local: usize) -> StorageResult<EphG2> {
        self.get_record(local).map(|r| r.eph_g2)
    }

    fn set_eph_g2(&mut self, _local: usize, _value: EphG2) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn get_bands_index(&self, local: usize) -> StorageResult<BandsIndex> {
        self.get_record(local).map(|r| r.bands_index)
    }

    fn set_bands_index(&mut self, _local: usize, _value: BandsIndex) -> StorageResult<()> {
        Err(self.read_only())
    }

    fn get_record(&self, local: usize) -> StorageResult<KPointRecord> {
        let span = self.span(local)?;
        let mut file = File::open(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        FilePoolStore::read_span(&mut file, &self.path, span)
    }

    fn close(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

/// Writable handle on one pool file, flushed on close
#[derive(Debug)]
pub struct FilePoolHandle {
    slots: PoolSlots,
}

impl PoolHandle for FilePoolHandle {
    fn path(&self) -> &Path {
        self.slots.path()
    }

    fn pool_number(&self) -> usize {
        self.slots.pool_number()
    }

    fn local_count(&self) -> usize {
        self.slots.local_count()
    }

    fn set_local_count(&mut self, count: usize) -> StorageResult<()> {
        self.slots.set_local_count(count)
    }

    fn secondary_count(&self) -> usize {
        self.slots.secondary_count()
    }

    fn get_eph_g2(&self, local: usize) -> StorageResult<EphG2> {
        self.slots.get_eph_g2(local)
    }

    fn set_eph_g2(&mut self, local: usize, value: EphG2) -> StorageResult<()> {
        self.slots.set_eph_g2(local, value)
    }

    fn get_bands_index(&self, local: usize) -> StorageResult<BandsIndex> {
        self.slots.get_bands_index(local)
    }

    fn set_bands_index(&mut self, local: usize, value: BandsIndex) -> StorageResult<()> {
        self.slots.set_bands_index(local, value)
    }

    fn close(self: Box<Self>) -> StorageResult<()> {
        let FilePoolHandle { slots } = *self;
        let path = slots.path().to_path_buf();
        let doc = slots.into_document()?;
        FilePoolStore::write_document(&path, &doc)?;
        debug!(
            "Closed {} with nk_loc = {}, nkq = {}",
            path.display(),
            doc.header.nk_loc,
            doc.header.nkq
        );
        Ok(())
    }
}
