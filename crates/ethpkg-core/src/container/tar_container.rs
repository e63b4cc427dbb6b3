//! Tar (optionally gzip) container.
//!
//! The archive is kept as its serialized bytes; there is no entry index.
//! Every read is a streaming scan and every mutation is a single streaming
//! rewrite: each source entry is passed through, replaced or removed
//! according to an [`EntryDecision`], then the plan's append list is
//! written before the archive is finalized (and re-compressed if needed).

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use super::{ArchiveFormat, Container, ContainerError, Entry, EntryFile, normalize_path};

const DEFAULT_FILE_MODE: u32 = 0o644;
const NAME_FIELD_LEN: usize = 100;

/// What to do with one source entry during a rewrite.
#[derive(Debug, Clone)]
pub enum EntryDecision {
    /// Copy the entry to the output unmodified.
    PassThrough,
    /// Write this content at the entry's stored path instead; the original
    /// content is discarded.
    Replace(EntryFile),
    /// Leave the entry out of the output.
    Remove,
}

/// A source entry as seen by a [`RewritePlan`].
#[derive(Debug)]
pub struct SourceEntry<'a> {
    /// Path as stored in the archive.
    pub path: &'a str,
    /// Normalized form of `path`.
    pub normalized: &'a str,
    pub header: &'a tar::Header,
}

/// Drives a streaming rewrite: one decision per source entry, then the
/// entries to append once the source is exhausted.
pub trait RewritePlan {
    fn decide(&mut self, entry: &SourceEntry<'_>) -> EntryDecision;

    /// Called once, after the last source entry.
    fn append(&mut self) -> Vec<(String, EntryFile)> {
        Vec::new()
    }
}

impl<F> RewritePlan for F
where
    F: FnMut(&SourceEntry<'_>) -> EntryDecision,
{
    fn decide(&mut self, entry: &SourceEntry<'_>) -> EntryDecision {
        self(entry)
    }
}

/// Overwrite-if-present, else append.
#[derive(Debug, Default)]
struct AddPlan {
    pending: HashMap<String, EntryFile>,
    /// First-seen order of pending paths, for a stable append order.
    order: Vec<String>,
    replaced: HashSet<String>,
    /// Normalized path -> path actually stored in the output.
    stored: HashMap<String, String>,
}

impl RewritePlan for AddPlan {
    fn decide(&mut self, entry: &SourceEntry<'_>) -> EntryDecision {
        if let Some(file) = self.pending.remove(entry.normalized) {
            self.replaced.insert(entry.normalized.to_string());
            self.stored
                .insert(entry.normalized.to_string(), entry.path.to_string());
            EntryDecision::Replace(file)
        } else if self.replaced.contains(entry.normalized) {
            // Collapse duplicates so the path stays unique.
            EntryDecision::Remove
        } else {
            EntryDecision::PassThrough
        }
    }

    fn append(&mut self) -> Vec<(String, EntryFile)> {
        let mut out = Vec::new();
        for normalized in &self.order {
            if let Some(file) = self.pending.remove(normalized) {
                self.stored.insert(normalized.clone(), normalized.clone());
                out.push((normalized.clone(), file));
            }
        }
        out
    }
}

#[derive(Clone)]
pub struct TarContainer {
    data: Bytes,
    gzip: bool,
}

impl std::fmt::Debug for TarContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarContainer")
            .field("bytes", &self.data.len())
            .field("gzip", &self.gzip)
            .finish()
    }
}

impl TarContainer {
    pub fn from_bytes(data: Bytes, gzip: bool) -> Self {
        Self { data, gzip }
    }

    /// A container with no entries. Serializing it produces a valid,
    /// empty archive.
    pub fn empty(gzip: bool) -> Self {
        Self {
            data: Bytes::new(),
            gzip,
        }
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    fn reader(&self) -> Box<dyn Read + '_> {
        if self.gzip && !self.data.is_empty() {
            Box::new(GzDecoder::new(&self.data[..]))
        } else {
            Box::new(&self.data[..])
        }
    }

    /// Stream the archive through `plan`, producing new archive bytes.
    /// `self` is not modified.
    pub fn rewrite<P>(&self, plan: &mut P) -> Result<Bytes, ContainerError>
    where
        P: RewritePlan + ?Sized,
    {
        let bytes = if self.gzip {
            let encoder = GzEncoder::new(Vec::new(), Compression::default());
            self.rewrite_into(encoder, plan)?.finish()?
        } else {
            self.rewrite_into(Vec::new(), plan)?
        };
        Ok(Bytes::from(bytes))
    }

    fn rewrite_into<W, P>(&self, out: W, plan: &mut P) -> Result<W, ContainerError>
    where
        W: Write,
        P: RewritePlan + ?Sized,
    {
        let mut builder = tar::Builder::new(out);

        if !self.data.is_empty() {
            let mut archive = tar::Archive::new(self.reader());
            for entry in archive.entries().map_err(malformed)? {
                let mut entry = entry.map_err(malformed)?;
                let path = entry_path(&entry);
                let normalized = normalize_path(&path);

                let decision = plan.decide(&SourceEntry {
                    path: &path,
                    normalized: &normalized,
                    header: entry.header(),
                });
                match decision {
                    EntryDecision::PassThrough => {
                        let mut header = entry.header().clone();
                        append_with_path(&mut builder, &mut header, &path, &mut entry)?;
                    }
                    EntryDecision::Replace(file) => {
                        debug!(path = %path, size = file.content.len(), "replacing tar entry");
                        let mut header = file_header(&file, entry.header().mode().ok());
                        append_with_path(&mut builder, &mut header, &path, file.content.as_ref())?;
                    }
                    EntryDecision::Remove => {
                        debug!(path = %path, "dropping tar entry");
                    }
                }
            }
        }

        for (path, file) in plan.append() {
            debug!(path = %path, size = file.content.len(), "appending tar entry");
            let mut header = file_header(&file, None);
            append_with_path(&mut builder, &mut header, &path, file.content.as_ref())?;
        }

        Ok(builder.into_inner()?)
    }

    /// The same entries with gzip switched on or off.
    pub fn with_compression(&self, gzip: bool) -> Result<Self, ContainerError> {
        if gzip == self.gzip || self.data.is_empty() {
            return Ok(Self {
                data: self.data.clone(),
                gzip,
            });
        }

        let data = if gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&self.data)?;
            encoder.finish()?
        } else {
            let mut plain = Vec::new();
            GzDecoder::new(&self.data[..])
                .read_to_end(&mut plain)
                .map_err(|e| ContainerError::Malformed(format!("gzip stream: {e}")))?;
            plain
        };

        Ok(Self {
            data: Bytes::from(data),
            gzip,
        })
    }
}

impl Container for TarContainer {
    fn format(&self) -> ArchiveFormat {
        if self.gzip {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Tar
        }
    }

    fn entries(&self) -> Result<Vec<Entry>, ContainerError> {
        let mut entries = Vec::new();
        if self.data.is_empty() {
            return Ok(entries);
        }

        let mut archive = tar::Archive::new(self.reader());
        for entry in archive.entries().map_err(malformed)? {
            let mut entry = entry.map_err(malformed)?;
            let path = entry_path(&entry);
            let is_directory = entry.header().entry_type().is_dir();
            let mode = entry.header().mode().ok();

            let content = if is_directory {
                Bytes::new()
            } else if self.gzip {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf).map_err(malformed)?;
                Bytes::from(buf)
            } else {
                // Uncompressed: slice the content out of the archive buffer.
                let start = entry.raw_file_position() as usize;
                let end = start + entry.size() as usize;
                if end > self.data.len() {
                    return Err(ContainerError::Malformed(format!(
                        "entry '{path}' extends past end of archive"
                    )));
                }
                self.data.slice(start..end)
            };

            entries.push(Entry::new(path, is_directory, mode, content));
        }
        Ok(entries)
    }

    fn add_entries(
        &mut self,
        files: Vec<(String, EntryFile)>,
    ) -> Result<Vec<String>, ContainerError> {
        let mut plan = AddPlan::default();
        let mut requested = Vec::with_capacity(files.len());

        for (path, file) in files {
            let normalized = normalize_path(&path);
            if normalized.is_empty() {
                return Err(ContainerError::UnsafePath(path));
            }
            // Later files for the same path win.
            if plan.pending.insert(normalized.clone(), file).is_none() {
                plan.order.push(normalized.clone());
            }
            requested.push(normalized);
        }

        self.data = self.rewrite(&mut plan)?;

        Ok(requested
            .into_iter()
            .map(|n| plan.stored.get(&n).cloned().unwrap_or(n))
            .collect())
    }

    fn remove_entry(&mut self, path: &str) -> Result<bool, ContainerError> {
        let target = normalize_path(path);
        let mut removed = false;
        let data = self.rewrite(&mut |entry: &SourceEntry<'_>| {
            if entry.normalized == target {
                removed = true;
                EntryDecision::Remove
            } else {
                EntryDecision::PassThrough
            }
        })?;
        if removed {
            self.data = data;
        }
        Ok(removed)
    }

    fn to_bytes(&self) -> Result<Bytes, ContainerError> {
        if self.data.is_empty() {
            return self.rewrite(&mut |_: &SourceEntry<'_>| EntryDecision::PassThrough);
        }
        Ok(self.data.clone())
    }
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

/// Append an entry keeping `path` byte-for-byte when it fits the header's
/// name field. `tar`'s own path setter would strip `./` and reject `/x`.
/// Longer paths go through an extension header with the normalized path.
fn append_with_path<W: Write, R: Read>(
    builder: &mut tar::Builder<W>,
    header: &mut tar::Header,
    path: &str,
    data: R,
) -> std::io::Result<()> {
    let raw = path.as_bytes();
    if raw.len() < NAME_FIELD_LEN {
        let name = &mut header.as_old_mut().name;
        name.fill(0);
        name[..raw.len()].copy_from_slice(raw);
        if let Some(ustar) = header.as_ustar_mut() {
            ustar.prefix.fill(0);
        }
        header.set_cksum();
        builder.append(header, data)
    } else {
        builder.append_data(header, normalize_path(path), data)
    }
}

fn file_header(file: &EntryFile, original_mode: Option<u32>) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(file.content.len() as u64);
    header.set_mode(file.mode.or(original_mode).unwrap_or(DEFAULT_FILE_MODE));
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header
}

fn malformed(e: std::io::Error) -> ContainerError {
    ContainerError::Malformed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tar(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o755);
            match content {
                Some(data) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(data.len() as u64);
                    append_with_path(&mut builder, &mut header, path, *data).unwrap();
                }
                None => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    append_with_path(&mut builder, &mut header, path, &[][..]).unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    fn container(entries: &[(&str, Option<&[u8]>)]) -> TarContainer {
        TarContainer::from_bytes(Bytes::from(build_tar(entries)), false)
    }

    #[test]
    fn directories_are_flagged() {
        let tar = container(&[("dir/", None), ("dir/a.txt", Some(b"a"))]);
        let entries = tar.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_directory);
        assert!(matches!(
            tar.content("./dir"),
            Err(ContainerError::IsDirectory(_))
        ));
        assert_eq!(tar.content("dir/a.txt").unwrap().as_ref(), b"a");
    }

    #[test]
    fn replace_keeps_stored_path_and_mode() {
        let mut tar = container(&[("./bin/tool", Some(b"v1")), ("README", Some(b"hi"))]);
        let stored = tar.add_entry("bin/tool", "v2".into()).unwrap();
        assert_eq!(stored, "./bin/tool");

        let entries = tar.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].relative_path, "./bin/tool");
        assert_eq!(entries[0].mode, Some(0o755));
        assert_eq!(entries[0].content().as_ref(), b"v2");
        assert_eq!(entries[1].content().as_ref(), b"hi");
    }

    #[test]
    fn duplicate_source_entries_collapse_on_replace() {
        let mut tar = container(&[("a", Some(b"1")), ("./a", Some(b"2")), ("b", Some(b"3"))]);
        tar.add_entry("a", "new".into()).unwrap();
        let entries = tar.entries().unwrap();
        let paths: Vec<String> = entries.iter().map(Entry::normalized_path).collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(tar.content("a").unwrap().as_ref(), b"new");
    }

    #[test]
    fn batch_mixes_replace_and_append_in_input_order() {
        let mut tar = container(&[("/x", Some(b"1"))]);
        let stored = tar
            .add_entries(vec![
                ("new/y".to_string(), "y".into()),
                ("x".to_string(), "2".into()),
                ("new/y".to_string(), "y2".into()),
            ])
            .unwrap();
        assert_eq!(stored, vec!["new/y", "/x", "new/y"]);
        assert_eq!(tar.entries().unwrap().len(), 2);
        assert_eq!(tar.content("new/y").unwrap().as_ref(), b"y2");
    }

    #[test]
    fn absolute_source_paths_pass_through_verbatim() {
        let mut tar = container(&[("/abs.txt", Some(b"1"))]);
        tar.add_entry("other", "o".into()).unwrap();
        let entries = tar.entries().unwrap();
        assert_eq!(entries[0].relative_path, "/abs.txt");
        assert_eq!(tar.content("abs.txt").unwrap().as_ref(), b"1");
    }

    #[test]
    fn long_paths_survive_rewrite() {
        let long = format!("{}/file.txt", "d".repeat(150));
        let mut tar = container(&[(long.as_str(), Some(b"deep"))]);
        tar.add_entry("other", "o".into()).unwrap();
        assert_eq!(tar.content(&long).unwrap().as_ref(), b"deep");
    }

    #[test]
    fn gzip_round_trip_and_conversion() {
        let plain = container(&[("a", Some(b"alpha"))]);
        let gz = plain.with_compression(true).unwrap();
        assert!(gz.to_bytes().unwrap().starts_with(&[0x1F, 0x8B]));
        assert_eq!(gz.content("a").unwrap().as_ref(), b"alpha");

        let mut gz = gz;
        gz.add_entry("b", "beta".into()).unwrap();
        let back = gz.with_compression(false).unwrap();
        assert_eq!(back.entries().unwrap().len(), 2);
    }

    #[test]
    fn remove_entry_reports_absence() {
        let mut tar = container(&[("a", Some(b"1")), ("b", Some(b"2"))]);
        assert!(tar.remove_entry("./a").unwrap());
        assert!(!tar.remove_entry("a").unwrap());
        assert_eq!(tar.entries().unwrap().len(), 1);
    }

    #[test]
    fn empty_container_serializes_to_valid_archive() {
        let empty = TarContainer::empty(true);
        let bytes = empty.to_bytes().unwrap();
        assert_eq!(ArchiveFormat::sniff(&bytes).unwrap(), ArchiveFormat::TarGz);
        assert!(TarContainer::from_bytes(bytes, true).entries().unwrap().is_empty());
    }

    #[test]
    fn truncated_archive_is_malformed() {
        let bytes = build_tar(&[("a", Some(&[7u8; 2048]))]);
        let truncated = Bytes::from(bytes[..1024].to_vec());
        let tar = TarContainer::from_bytes(truncated, false);
        assert!(matches!(tar.entries(), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn rewrite_visitor_sees_normalized_paths() {
        let tar = container(&[("./a", Some(b"1")), ("/b", Some(b"2"))]);
        let mut seen = Vec::new();
        tar.rewrite(&mut |entry: &SourceEntry<'_>| {
            seen.push((entry.path.to_string(), entry.normalized.to_string()));
            EntryDecision::PassThrough
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                ("./a".to_string(), "a".to_string()),
                ("/b".to_string(), "b".to_string())
            ]
        );
    }
}
