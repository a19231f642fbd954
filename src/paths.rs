use std::path::{Path, PathBuf};

/// Canonical absolute form of a path-like input.
///
/// `~/` is expanded against `$HOME`. Existing paths are canonicalized (symlinks
/// resolved); paths that do not exist yet are made absolute against the current
/// directory without touching the filesystem.
pub fn resolve(raw: impl AsRef<Path>) -> PathBuf {
    let p = expand_tilde(raw.as_ref());
    if let Ok(canon) = p.canonicalize() {
        return canon;
    }
    std::path::absolute(&p).unwrap_or(p)
}

pub fn resolve_all<I, P>(raw: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    raw.into_iter().map(resolve).collect()
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

pub fn display_key(path: &Path) -> String {
    path.display().to_string()
}
