//! Moving entries between containers and the filesystem.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{ContainerError, Entry, EntryFile, normalize_path};
use crate::listener::{Event, Listener};

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether this is an executable
    pub is_executable: bool,
}

/// Every regular file below `dir` as `(root-relative path, file)`, sorted by
/// path so archives built from the same tree are identical.
pub(crate) fn collect_dir(dir: &Path) -> Result<Vec<(String, EntryFile)>, ContainerError> {
    if !dir.is_dir() {
        return Err(ContainerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ContainerError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| ContainerError::UnsafePath(entry.path().display().to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut file = EntryFile::new(fs::read(entry.path())?);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = entry.metadata().map_err(|e| ContainerError::Io(e.into()))?;
            file = file.with_mode(metadata.permissions().mode() & 0o7777);
        }
        files.push((relative, file));
    }

    tracing::debug!(dir = %dir.display(), files = files.len(), "collected directory");
    Ok(files)
}

/// Write `entries` below `dest`, overwriting existing files.
///
/// Entries whose path would escape `dest` abort the extraction.
pub(crate) fn extract_entries(
    entries: &[Entry],
    dest: &Path,
    listener: &dyn Listener,
) -> Result<Vec<ExtractedFile>, ContainerError> {
    fs::create_dir_all(dest)?;

    let total = entries.len();
    let mut extracted = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let normalized = normalize_path(&entry.relative_path);
        let relative_path = safe_relative_path(&normalized)?;
        let absolute_path = dest.join(&relative_path);

        if entry.is_directory {
            fs::create_dir_all(&absolute_path)?;
        } else if !normalized.is_empty() {
            if let Some(parent) = absolute_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&absolute_path, entry.content())?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.mode {
                    fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
                }
            }

            extracted.push(ExtractedFile {
                is_executable: entry.mode.is_some_and(|m| m & 0o111 != 0),
                relative_path,
                absolute_path,
            });
        }

        listener.on_event(&Event::ExtractProgress {
            path: normalized,
            current: i + 1,
            total,
        });
    }

    Ok(extracted)
}

/// Reject anything that is not a plain relative path (zip slip).
fn safe_relative_path(normalized: &str) -> Result<PathBuf, ContainerError> {
    let path = PathBuf::from(normalized);
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Ok(path)
    } else {
        Err(ContainerError::UnsafePath(normalized.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::tests::RecordingListener;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn file(path: &str, content: &'static [u8]) -> Entry {
        Entry::new(path.to_string(), false, Some(0o644), Bytes::from_static(content))
    }

    #[test]
    fn collect_is_sorted_and_relative() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/inner.txt"), "i").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let files = collect_dir(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b/inner.txt"]);
    }

    #[test]
    fn collect_rejects_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(collect_dir(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn extract_rejects_parent_components() {
        let dest = tempdir().unwrap();
        let entries = vec![file("ok.txt", b"ok"), file("../evil.txt", b"x")];
        let err = extract_entries(&entries, dest.path(), &crate::listener::NullListener).unwrap_err();
        assert!(matches!(err, ContainerError::UnsafePath(ref p) if p == "../evil.txt"));
        assert!(!dest.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn absolute_entries_land_inside_dest() {
        let dest = tempdir().unwrap();
        let files = extract_entries(&[file("/etc/conf", b"c")], dest.path(), &crate::listener::NullListener).unwrap();
        assert_eq!(files[0].absolute_path, dest.path().join("etc/conf"));
    }

    #[test]
    fn extract_reports_progress_per_entry() {
        let dest = tempdir().unwrap();
        let listener = RecordingListener::default();
        let entries = vec![
            Entry::new("dir/".to_string(), true, None, Bytes::new()),
            file("dir/a", b"a"),
        ];
        let files = extract_entries(&entries, dest.path(), &listener).unwrap();
        assert_eq!(files.len(), 1);

        let events = listener.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::ExtractProgress {
                path: "dir/a".to_string(),
                current: 2,
                total: 2
            }
        );
    }
}
