//! Directory listings over flat path keys.
//!
//! Mutable trees store one key per file and no directory records; directories
//! exist only as shared path prefixes.

use std::collections::BTreeSet;

/// Normalize a directory path to a key prefix.
///
/// Leading and trailing separators are stripped and exactly one trailing `/`
/// is appended. The root normalizes to `""`, which prefixes every path.
pub fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Returns true if any of `paths` lies below directory `dir`.
pub fn has_directory<'a>(paths: impl IntoIterator<Item = &'a str>, dir: &str) -> bool {
    let prefix = normalize_dir(dir);
    prefix.is_empty() || paths.into_iter().any(|p| p.starts_with(&prefix))
}

/// List `paths` the way a directory read would.
///
/// - `None`: every path, sorted (recursive listing).
/// - `Some(dir)`: the first segment below `dir` of every path under it,
///   deduplicated and sorted (one level, like `ls`).
pub fn list_directory<'a>(
    paths: impl IntoIterator<Item = &'a str>,
    dir: Option<&str>,
) -> Vec<String> {
    let Some(dir) = dir else {
        let all: BTreeSet<&str> = paths.into_iter().collect();
        return all.into_iter().map(str::to_string).collect();
    };

    let prefix = normalize_dir(dir);
    let mut entries = BTreeSet::new();
    for path in paths {
        let Some(tail) = path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        // A file directly in `dir`, or the name of the subdirectory holding it.
        let segment = tail.split('/').next().unwrap_or(tail);
        if !segment.is_empty() {
            entries.insert(segment);
        }
    }
    entries.into_iter().map(str::to_string).collect()
}
