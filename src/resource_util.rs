//! Pure helpers for manipulating repository paths.
//!
//! Paths are `/`-separated strings. Absolute paths start with `/`; the root
//! is `/` itself.

/// Normalizes a path by collapsing `.` and `..` segments and redundant slashes.
///
/// Returns `None` when a `..` segment would climb above the first segment.
/// A trailing slash is dropped (except for the root).
///
/// # Examples
/// ```
/// use vpb::resource_util::normalize;
/// assert_eq!(normalize("//a/./b/../c").as_deref(), Some("/a/c"));
/// assert_eq!(normalize("/.."), None);
/// ```
pub fn normalize(path: &str) -> Option<String> {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        Some(format!("/{joined}"))
    } else {
        Some(joined)
    }
}

/// Returns the parent of a path, or `None` for the root and single relative segments.
///
/// The path is normalized first, so `parent_path("/a/b/")` is `/a`.
pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize(path)?;
    if normalized == "/" || normalized.is_empty() {
        return None;
    }

    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None => None,
    }
}

/// Returns the last segment of a path (empty for the root).
pub fn name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Joins a parent path and a relative name without doubling the separator.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns true when `path` is `ancestor` itself or lies below it.
pub fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}
