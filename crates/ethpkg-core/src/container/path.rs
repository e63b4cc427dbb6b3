//! Archive path normalization.

use ethpkg_schema::{META_DIR, NESTED_MANIFEST};

/// Canonical form of an archive path: forward slashes, no leading `/` or
/// `./`, no empty or `.` components, no trailing slash.
///
/// `./x`, `x` and `/x` all normalize to `x`. `..` is preserved so callers
/// that touch the filesystem can reject it.
pub fn normalize_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Folder prefix (with trailing `/`) that holds the metadata directory for
/// a set of normalized file paths, or `""` at the root.
///
/// The layout is npm-style when there is no root manifest but a top-level
/// folder contains one.
pub fn manifest_root<I, S>(files: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let files: Vec<S> = files.into_iter().collect();
    if files.iter().any(|p| p.as_ref() == NESTED_MANIFEST) {
        return String::new();
    }
    files
        .iter()
        .find_map(|p| {
            let (folder, rest) = p.as_ref().split_once('/')?;
            (rest == NESTED_MANIFEST).then(|| format!("{folder}/"))
        })
        .unwrap_or_default()
}

/// Whether a normalized path lies in the reserved metadata directory: at
/// the archive root (`_META_/...`), or below `root` when the package uses
/// an npm-style folder (`package/_META_/...`).
///
/// `_META_` directories anywhere else are ordinary content.
pub fn is_metadata_path(normalized: &str, root: &str) -> bool {
    if normalized.split('/').next() == Some(META_DIR) {
        return true;
    }
    !root.is_empty()
        && normalized
            .strip_prefix(root)
            .and_then(|rest| rest.split_once('/'))
            .is_some_and(|(dir, tail)| dir == META_DIR && !tail.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_forms_normalize_equal() {
        assert_eq!(normalize_path("./x"), "x");
        assert_eq!(normalize_path("/x"), "x");
        assert_eq!(normalize_path("x"), "x");
        assert_eq!(normalize_path("a//b/./c/"), "a/b/c");
        assert_eq!(normalize_path("a\\b"), "a/b");
    }

    #[test]
    fn parent_components_survive() {
        assert_eq!(normalize_path("../evil"), "../evil");
    }

    #[test]
    fn metadata_detection() {
        assert!(is_metadata_path("_META_/_sig_0xabc.json", ""));
        assert!(is_metadata_path("_META_", ""));
        assert!(is_metadata_path("_META_/_checksums.json", "package/"));
        assert!(is_metadata_path("package/_META_/_checksums.json", "package/"));
        assert!(!is_metadata_path("package/_META_", "package/"));
        assert!(!is_metadata_path("a/b/_META_/x", "a/"));
        assert!(!is_metadata_path("_META_x/file", ""));
        assert!(!is_metadata_path("foo.txt", ""));
    }

    #[test]
    fn nested_meta_outside_the_root_is_content() {
        assert!(!is_metadata_path("lib/_META_/evil.js", ""));
        assert!(!is_metadata_path("lib/_META_/evil.js", "package/"));
        assert!(!is_metadata_path("package/_META_/x", ""));
    }

    #[test]
    fn manifest_root_detection() {
        assert_eq!(manifest_root(["package/package.json", "package/index.js"]), "package/");
        assert_eq!(manifest_root(["package.json", "lib/package.json"]), "");
        assert_eq!(manifest_root(["lib/a.js", "lib/deep/package.json"]), "");
        assert_eq!(manifest_root(Vec::<String>::new()), "");
    }
}
