//! Zip container.
//!
//! Zip has a central directory, so unlike tar the whole entry table is
//! decoded up front and kept in memory. Serialization rebuilds the archive
//! from that table.

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ArchiveFormat, Container, ContainerError, Entry, EntryFile, normalize_path};

const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Default)]
pub struct ZipContainer {
    entries: Vec<Entry>,
}

impl ZipContainer {
    pub fn from_bytes(bytes: &Bytes) -> Result<Self, ContainerError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_ref()))?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let path = file.name().to_string();
            let is_directory = file.is_dir();
            let mode = file.unix_mode();

            let content = if is_directory {
                Bytes::new()
            } else {
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)?;
                Bytes::from(buf)
            };
            entries.push(Entry::new(path, is_directory, mode, content));
        }

        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn position(&self, normalized: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.normalized_path() == normalized)
    }
}

impl Container for ZipContainer {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn entries(&self) -> Result<Vec<Entry>, ContainerError> {
        Ok(self.entries.clone())
    }

    fn add_entries(
        &mut self,
        files: Vec<(String, EntryFile)>,
    ) -> Result<Vec<String>, ContainerError> {
        let mut stored = Vec::with_capacity(files.len());

        for (path, file) in files {
            let normalized = normalize_path(&path);
            if normalized.is_empty() {
                return Err(ContainerError::UnsafePath(path));
            }

            match self.position(&normalized) {
                Some(idx) => {
                    let existing = &self.entries[idx];
                    let mode = file.mode.or(existing.mode);
                    let relative_path = existing.relative_path.clone();
                    debug!(path = %relative_path, size = file.content.len(), "replacing zip entry");
                    self.entries[idx] = Entry::new(relative_path.clone(), false, mode, file.content);
                    // Same normalized path stored twice in the source: keep the first.
                    let mut seen = false;
                    self.entries.retain(|e| {
                        if e.normalized_path() != normalized {
                            return true;
                        }
                        let keep = !seen;
                        seen = true;
                        keep
                    });
                    stored.push(relative_path);
                }
                None => {
                    debug!(path = %normalized, size = file.content.len(), "appending zip entry");
                    self.entries
                        .push(Entry::new(normalized.clone(), false, file.mode, file.content));
                    stored.push(normalized);
                }
            }
        }

        Ok(stored)
    }

    fn remove_entry(&mut self, path: &str) -> Result<bool, ContainerError> {
        let target = normalize_path(path);
        let before = self.entries.len();
        self.entries.retain(|e| e.normalized_path() != target);
        Ok(self.entries.len() != before)
    }

    fn to_bytes(&self) -> Result<Bytes, ContainerError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(entry.mode.unwrap_or(DEFAULT_FILE_MODE) & 0o7777);

            if entry.is_directory {
                writer.add_directory(entry.relative_path.as_str(), options)?;
            } else {
                writer.start_file(entry.relative_path.as_str(), options)?;
                writer.write_all(entry.content())?;
            }
        }

        Ok(Bytes::from(writer.finish()?.into_inner()))
    }
}
