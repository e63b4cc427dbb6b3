//! Package containers
//!
//! A uniform read/modify/write interface over tar (optionally gzip) and zip
//! archives. Only what signing workflows need is supported: enumerate
//! entries, read one entry, overwrite-or-append entries, serialize, extract
//! and create from a directory.

mod format;
mod fs;
pub mod path;
mod tar_container;
mod zip_container;

use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

pub use format::ArchiveFormat;
pub use fs::ExtractedFile;
pub use path::{is_metadata_path, manifest_root, normalize_path};
pub use tar_container::{EntryDecision, RewritePlan, SourceEntry, TarContainer};
pub use zip_container::ZipContainer;

use crate::listener::Listener;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed archive: {0}")]
    Malformed(String),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("File name suggests {hinted} but content is {detected}")]
    FormatMismatch {
        hinted: ArchiveFormat,
        detected: ArchiveFormat,
    },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry is a directory: {0}")]
    IsDirectory(String),

    #[error("Target already exists: {0}")]
    TargetExists(String),

    #[error(
        "Refusing to write {} archive to '{path}': extension does not match (pass an explicit compression to convert)",
        compression_label(.gzip)
    )]
    CompressionMismatch { path: String, gzip: bool },

    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

fn compression_label(gzip: &bool) -> &'static str {
    if *gzip {
        "a gzip-compressed"
    } else {
        "an uncompressed"
    }
}

/// One file or directory inside a container.
///
/// `relative_path` keeps the literal form stored in the archive; use
/// [`Entry::normalized_path`] for comparisons.
#[derive(Debug, Clone)]
pub struct Entry {
    pub relative_path: String,
    pub is_directory: bool,
    pub size: u64,
    pub mode: Option<u32>,
    content: Bytes,
}

impl Entry {
    pub(crate) fn new(
        relative_path: String,
        is_directory: bool,
        mode: Option<u32>,
        content: Bytes,
    ) -> Self {
        Self {
            relative_path,
            is_directory,
            size: content.len() as u64,
            mode,
            content,
        }
    }

    pub fn normalized_path(&self) -> String {
        normalize_path(&self.relative_path)
    }

    /// Entry bytes. Cheap to clone; for uncompressed tar archives this is a
    /// view into the archive buffer rather than a copy.
    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

/// Metadata folder prefix for `entries`, see [`manifest_root`].
pub fn metadata_root(entries: &[Entry]) -> String {
    manifest_root(
        entries
            .iter()
            .filter(|e| !e.is_directory)
            .map(Entry::normalized_path),
    )
}

/// New content for [`Container::add_entry`].
#[derive(Debug, Clone, Default)]
pub struct EntryFile {
    pub content: Bytes,
    /// Unix permission bits. When replacing, `None` keeps the original mode.
    pub mode: Option<u32>,
}

impl EntryFile {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl From<Vec<u8>> for EntryFile {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&'static str> for EntryFile {
    fn from(s: &'static str) -> Self {
        Self::new(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for EntryFile {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<Bytes> for EntryFile {
    fn from(b: Bytes) -> Self {
        Self::new(b)
    }
}

/// Read/modify/write access to an archive.
///
/// Implementations are not internally synchronized; mutation takes `&mut
/// self` so the borrow checker rules out concurrent writers.
pub trait Container {
    fn format(&self) -> ArchiveFormat;

    /// All entries in archive order.
    ///
    /// For tar this is a full scan of the archive on every call.
    fn entries(&self) -> Result<Vec<Entry>, ContainerError>;

    /// Overwrite-if-present, else append, for every file in `files`.
    ///
    /// Returns the stored path of each file, in input order.
    fn add_entries(&mut self, files: Vec<(String, EntryFile)>)
    -> Result<Vec<String>, ContainerError>;

    /// Remove the entry at `path`. Returns whether anything was removed.
    fn remove_entry(&mut self, path: &str) -> Result<bool, ContainerError>;

    /// Serialize the archive.
    fn to_bytes(&self) -> Result<Bytes, ContainerError>;

    /// Look up an entry by normalized path. Missing entries are `None`.
    fn entry(&self, path: &str) -> Result<Option<Entry>, ContainerError> {
        let target = normalize_path(path);
        Ok(self
            .entries()?
            .into_iter()
            .find(|e| e.normalized_path() == target))
    }

    /// Content of the file at `path`.
    fn content(&self, path: &str) -> Result<Bytes, ContainerError> {
        match self.entry(path)? {
            None => Err(ContainerError::EntryNotFound(path.to_string())),
            Some(e) if e.is_directory => Err(ContainerError::IsDirectory(path.to_string())),
            Some(e) => Ok(e.content),
        }
    }

    /// Overwrite-if-present, else append. Returns the stored path.
    fn add_entry(&mut self, path: &str, file: EntryFile) -> Result<String, ContainerError> {
        let mut stored = self.add_entries(vec![(path.to_string(), file)])?;
        stored
            .pop()
            .ok_or_else(|| ContainerError::EntryNotFound(path.to_string()))
    }
}

/// Options for [`Package::write_package`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Replace an existing file at the target path.
    pub overwrite: bool,
    /// Force gzip on (`Some(true)`) or off (`Some(false)`) for tar output.
    /// `None` keeps the container's compression and requires the target
    /// extension to agree with it.
    pub compression: Option<bool>,
}

/// A loaded package archive of either supported format.
#[derive(Debug, Clone)]
pub enum Package {
    Tar(TarContainer),
    Zip(ZipContainer),
}

impl Package {
    /// Load an archive, detecting the format from its magic bytes.
    pub fn load(bytes: impl Into<Bytes>) -> Result<Self, ContainerError> {
        let bytes = bytes.into();
        match ArchiveFormat::sniff(&bytes)? {
            ArchiveFormat::Tar => Ok(Self::Tar(TarContainer::from_bytes(bytes, false))),
            ArchiveFormat::TarGz => Ok(Self::Tar(TarContainer::from_bytes(bytes, true))),
            ArchiveFormat::Zip => Ok(Self::Zip(ZipContainer::from_bytes(&bytes)?)),
        }
    }

    /// Load an archive whose file name is known. The name is only a hint:
    /// it must agree with the detected content.
    pub fn load_with_hint(bytes: impl Into<Bytes>, file_name: &str) -> Result<Self, ContainerError> {
        let bytes = bytes.into();
        let detected = ArchiveFormat::sniff(&bytes)?;
        if let Some(hinted) = ArchiveFormat::from_path(file_name) {
            if hinted != detected {
                return Err(ContainerError::FormatMismatch { hinted, detected });
            }
        }
        Self::load(bytes)
    }

    /// Read and load an archive from disk.
    pub fn from_file(path: &Path) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::load_with_hint(bytes, &path.to_string_lossy())
    }

    /// Bundle a directory into a gzip-compressed tar archive.
    pub fn create(dir: &Path) -> Result<Self, ContainerError> {
        Self::create_with_format(dir, ArchiveFormat::TarGz)
    }

    /// Bundle a directory into an archive of the given format.
    pub fn create_with_format(dir: &Path, format: ArchiveFormat) -> Result<Self, ContainerError> {
        let files = fs::collect_dir(dir)?;
        let mut package = Self::empty(format);
        package.add_entries(files)?;
        Ok(package)
    }

    /// An archive with no entries.
    pub fn empty(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Tar => Self::Tar(TarContainer::empty(false)),
            ArchiveFormat::TarGz => Self::Tar(TarContainer::empty(true)),
            ArchiveFormat::Zip => Self::Zip(ZipContainer::empty()),
        }
    }

    /// Serialize to `path`.
    ///
    /// Fails if the target exists and `overwrite` is not set, or if the
    /// target extension disagrees with the tar compression and no explicit
    /// `compression` was requested.
    pub fn write_package(&self, path: &Path, options: WriteOptions) -> Result<(), ContainerError> {
        if path.exists() && !options.overwrite {
            return Err(ContainerError::TargetExists(path.display().to_string()));
        }

        let bytes = match self {
            Self::Tar(tar) => {
                let target_gzip = matches!(
                    ArchiveFormat::from_path(&path.to_string_lossy()),
                    Some(ArchiveFormat::TarGz)
                );
                match options.compression {
                    None if target_gzip != tar.is_gzip() => {
                        return Err(ContainerError::CompressionMismatch {
                            path: path.display().to_string(),
                            gzip: tar.is_gzip(),
                        });
                    }
                    None => tar.to_bytes()?,
                    Some(gzip) => tar.with_compression(gzip)?.to_bytes()?,
                }
            }
            Self::Zip(zip) => zip.to_bytes()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote package");
        Ok(())
    }

    /// Write every entry below `dest`, overwriting existing files.
    pub fn extract(
        &self,
        dest: &Path,
        listener: &dyn Listener,
    ) -> Result<Vec<ExtractedFile>, ContainerError> {
        fs::extract_entries(&self.entries()?, dest, listener)
    }
}

impl Container for Package {
    fn format(&self) -> ArchiveFormat {
        match self {
            Self::Tar(c) => c.format(),
            Self::Zip(c) => c.format(),
        }
    }

    fn entries(&self) -> Result<Vec<Entry>, ContainerError> {
        match self {
            Self::Tar(c) => c.entries(),
            Self::Zip(c) => c.entries(),
        }
    }

    fn add_entries(
        &mut self,
        files: Vec<(String, EntryFile)>,
    ) -> Result<Vec<String>, ContainerError> {
        match self {
            Self::Tar(c) => c.add_entries(files),
            Self::Zip(c) => c.add_entries(files),
        }
    }

    fn remove_entry(&mut self, path: &str) -> Result<bool, ContainerError> {
        match self {
            Self::Tar(c) => c.remove_entry(path),
            Self::Zip(c) => c.remove_entry(path),
        }
    }

    fn to_bytes(&self) -> Result<Bytes, ContainerError> {
        match self {
            Self::Tar(c) => c.to_bytes(),
            Self::Zip(c) => c.to_bytes(),
        }
    }

    fn entry(&self, path: &str) -> Result<Option<Entry>, ContainerError> {
        match self {
            Self::Tar(c) => c.entry(path),
            Self::Zip(c) => c.entry(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::NullListener;
    use tempfile::tempdir;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo.txt"), "foo").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/bar.txt"), "bar").unwrap();
        std::fs::write(dir.path().join("nested/deeper/baz.bin"), [0u8, 1, 2, 255]).unwrap();
        dir
    }

    fn file_paths(package: &Package) -> Vec<String> {
        let mut paths: Vec<String> = package
            .entries()
            .unwrap()
            .into_iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.normalized_path())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn round_trip_every_format() {
        let dir = fixture_dir();
        for format in [ArchiveFormat::Tar, ArchiveFormat::TarGz, ArchiveFormat::Zip] {
            let package = Package::create_with_format(dir.path(), format).unwrap();
            let reloaded = Package::load(package.to_bytes().unwrap()).unwrap();
            assert_eq!(reloaded.format(), format);
            assert_eq!(
                file_paths(&reloaded),
                vec!["foo.txt", "nested/bar.txt", "nested/deeper/baz.bin"]
            );
            assert_eq!(reloaded.content("foo.txt").unwrap().as_ref(), b"foo");
            assert_eq!(
                reloaded.content("./nested/deeper/baz.bin").unwrap().as_ref(),
                &[0u8, 1, 2, 255]
            );
        }
    }

    #[test]
    fn add_entry_overwrites_or_appends() {
        let dir = fixture_dir();
        for format in [ArchiveFormat::TarGz, ArchiveFormat::Zip] {
            let mut package = Package::create_with_format(dir.path(), format).unwrap();
            let before = package.entries().unwrap().len();

            package.add_entry("/foo.txt", "changed".into()).unwrap();
            assert_eq!(package.entries().unwrap().len(), before);
            assert_eq!(package.content("foo.txt").unwrap().as_ref(), b"changed");

            let stored = package.add_entry("new.txt", "new".into()).unwrap();
            assert_eq!(stored, "new.txt");
            assert_eq!(package.entries().unwrap().len(), before + 1);
        }
    }

    #[test]
    fn missing_entry_is_none_but_content_errors() {
        let mut package = Package::empty(ArchiveFormat::Zip);
        package
            .add_entries(vec![("dir/file".to_string(), "x".into())])
            .unwrap();
        assert!(package.entry("missing").unwrap().is_none());
        assert!(matches!(
            package.content("missing"),
            Err(ContainerError::EntryNotFound(_))
        ));
    }

    #[test]
    fn load_rejects_garbage() {
        assert!(matches!(
            Package::load(b"definitely not an archive".to_vec()),
            Err(ContainerError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn hint_must_agree_with_content() {
        let dir = fixture_dir();
        let zip = Package::create_with_format(dir.path(), ArchiveFormat::Zip).unwrap();
        let err = Package::load_with_hint(zip.to_bytes().unwrap(), "release.tar.gz").unwrap_err();
        assert!(matches!(
            err,
            ContainerError::FormatMismatch {
                hinted: ArchiveFormat::TarGz,
                detected: ArchiveFormat::Zip
            }
        ));
    }

    #[test]
    fn write_package_guards_extension_and_overwrite() {
        let dir = fixture_dir();
        let out = tempdir().unwrap();
        let package = Package::create(dir.path()).unwrap();

        let plain = out.path().join("pkg.tar");
        assert!(matches!(
            package.write_package(&plain, WriteOptions::default()),
            Err(ContainerError::CompressionMismatch { gzip: true, .. })
        ));

        package
            .write_package(
                &plain,
                WriteOptions {
                    overwrite: false,
                    compression: Some(false),
                },
            )
            .unwrap();
        let reloaded = Package::from_file(&plain).unwrap();
        assert_eq!(reloaded.format(), ArchiveFormat::Tar);
        assert_eq!(reloaded.content("foo.txt").unwrap().as_ref(), b"foo");

        let gz = out.path().join("pkg.tgz");
        package.write_package(&gz, WriteOptions::default()).unwrap();
        assert!(matches!(
            package.write_package(&gz, WriteOptions::default()),
            Err(ContainerError::TargetExists(_))
        ));
        package
            .write_package(
                &gz,
                WriteOptions {
                    overwrite: true,
                    compression: None,
                },
            )
            .unwrap();
    }

    #[test]
    fn extract_materializes_files() {
        let dir = fixture_dir();
        let package = Package::create(dir.path()).unwrap();
        let dest = tempdir().unwrap();
        std::fs::write(dest.path().join("foo.txt"), "stale").unwrap();

        let files = package.extract(dest.path(), &NullListener).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(
            std::fs::read_to_string(dest.path().join("foo.txt")).unwrap(),
            "foo"
        );
        assert_eq!(
            std::fs::read(dest.path().join("nested/deeper/baz.bin")).unwrap(),
            vec![0u8, 1, 2, 255]
        );
    }
}
