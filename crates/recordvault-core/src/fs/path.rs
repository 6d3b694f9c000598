#![forbid(unsafe_code)]

//! Confinement of caller-supplied relative paths.

use relative_path::{Component, RelativePath, RelativePathBuf};
use std::path::{Path, PathBuf};

/// Join an untrusted `user_path` onto `root` so that the result can never
/// leave `root`.
///
/// The input is treated as absolute within `root`: leading separators are
/// ignored, `.` segments are dropped, and each `..` removes the previous
/// segment, or nothing when it would climb above `root`. Backslashes count
/// as separators so the same input confines identically on every platform.
///
/// Malicious input is neutralized rather than rejected; this function never
/// fails and performs no I/O.
///
/// # Examples
///
/// ```
/// use recordvault_core::fs::path::confine;
/// use std::path::Path;
///
/// let root = Path::new("/srv/data");
/// assert_eq!(confine(root, "../../etc/passwd"), Path::new("/srv/data/etc/passwd"));
/// assert_eq!(confine(root, "/notes/./a/../b"), Path::new("/srv/data/notes/b"));
/// assert_eq!(confine(root, ""), Path::new("/srv/data"));
/// ```
pub fn confine(root: &Path, user_path: &str) -> PathBuf {
    confined_relative(user_path).to_path(root)
}

/// The normalized, escape-free relative form of `user_path`.
pub fn confined_relative(user_path: &str) -> RelativePathBuf {
    let unified = user_path.replace('\\', "/");

    let mut confined = RelativePathBuf::new();
    for component in RelativePath::new(&unified).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                confined.pop();
            }
            Component::Normal(name) => confined.push(name),
        }
    }
    confined
}
