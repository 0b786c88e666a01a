//! Discovery of the symbolic links that take part in resolving a path.

use std::fs;
use std::path::{Path, PathBuf};

/// Upper bound on recorded links; a chain longer than this is a loop.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// One hop of a resolution chain: `link` was a symbolic link pointing at
/// `target` when the chain was traced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkEdge {
    pub link: PathBuf,
    /// Raw value returned by `read_link`, relative targets included.
    pub target: PathBuf,
}

/// Links resolving a path, leaf-most first. Computed once per watch and only
/// ever compared against afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymlinkChain(Vec<SymlinkEdge>);

impl SymlinkChain {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SymlinkEdge> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a SymlinkChain {
    type Item = &'a SymlinkEdge;
    type IntoIter = std::slice::Iter<'a, SymlinkEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Walk outward from `path`, recording every symbolic link met on the path
/// itself and on its ancestor directories.
///
/// A link's target becomes the next cursor, so multi-hop chains are followed;
/// anything that is not a link (or does not exist) hands over to its parent
/// directory until the root is reached.
pub fn trace_symlinks(path: &Path) -> SymlinkChain {
    let mut edges = Vec::new();
    let mut cursor = path.to_path_buf();

    loop {
        match fs::read_link(&cursor) {
            Ok(target) => {
                if edges.len() == MAX_SYMLINK_HOPS {
                    tracing::warn!(
                        path = %path.display(),
                        hops = MAX_SYMLINK_HOPS,
                        "symlink chain too long, stopping trace",
                    );
                    break;
                }
                let next = resolve_target(&cursor, &target);
                tracing::debug!(
                    link = %cursor.display(),
                    target = %target.display(),
                    "traced symlink",
                );
                edges.push(SymlinkEdge {
                    link: cursor,
                    target,
                });
                cursor = next;
            }
            Err(_) => match cursor.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    cursor = parent.to_path_buf();
                }
                _ => break,
            },
        }
    }

    SymlinkChain(edges)
}

fn resolve_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match link.parent() {
        Some(parent) => parent.join(target),
        None => target.to_path_buf(),
    }
}
