//! Workspace path confinement for the file tools.
//!
//! Every path the model supplies is interpreted relative to the sandbox root.
//! Resolution is lexical first (rejecting any `..` that climbs above the
//! root), then the deepest existing ancestor is canonicalized so a symlink
//! inside the workspace cannot point the tools elsewhere.

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create the root directory if needed and pin its canonical form.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            ToolError::io(
                format!("failed to create workspace directory '{}'", root.display()),
                e,
            )
        })?;
        let root = root.canonicalize().map_err(|e| {
            ToolError::io(
                format!("failed to resolve workspace directory '{}'", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workspace-relative path to an absolute path inside the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let requested_path = Path::new(requested);

        let relative = if requested_path.is_absolute() {
            requested_path.strip_prefix(&self.root).map_err(|_| {
                ToolError::validation(format!(
                    "invalid path: '{}' resolves outside the workspace directory",
                    requested
                ))
            })?
        } else {
            requested_path
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ToolError::validation(format!(
                            "invalid path: '{}' attempts to traverse outside the workspace",
                            requested
                        )));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::validation(format!(
                        "invalid path: '{}' resolves outside the workspace directory",
                        requested
                    )));
                }
            }
        }

        let full = if normalized.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        self.check_existing_ancestor(&full, requested)?;
        Ok(full)
    }

    /// Workspace-relative display form of an absolute path, with `/` separators.
    pub fn relative_display(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        parts.join("/")
    }

    fn check_existing_ancestor(&self, full: &Path, requested: &str) -> Result<(), ToolError> {
        self.check_existing_ancestor_at(full, requested, 0)
    }

    /// Canonicalize the deepest entry that exists on disk. A dangling symlink
    /// counts as existing: its target is followed lexically and checked in
    /// turn, since a later write would create that target.
    fn check_existing_ancestor_at(
        &self,
        full: &Path,
        requested: &str,
        depth: usize,
    ) -> Result<(), ToolError> {
        if depth > MAX_SYMLINK_HOPS {
            return Err(ToolError::validation(format!(
                "invalid path: '{}' has too many levels of symbolic links",
                requested
            )));
        }

        let mut probe = Some(full);
        while let Some(candidate) = probe {
            let meta = match std::fs::symlink_metadata(candidate) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    probe = candidate.parent();
                    continue;
                }
                Err(e) => {
                    return Err(ToolError::io(format!("failed to resolve path '{}'", requested), e))
                }
            };

            match candidate.canonicalize() {
                Ok(canonical) => {
                    if !canonical.starts_with(&self.root) {
                        return Err(self.outside(requested));
                    }
                    return Ok(());
                }
                Err(_) if meta.file_type().is_symlink() => {
                    let target = std::fs::read_link(candidate).map_err(|e| {
                        ToolError::io(format!("failed to resolve path '{}'", requested), e)
                    })?;
                    let base = candidate
                        .parent()
                        .unwrap_or(Path::new("/"))
                        .canonicalize()
                        .map_err(|e| {
                            ToolError::io(format!("failed to resolve path '{}'", requested), e)
                        })?;
                    let mut followed = normalize_lexically(&base.join(target));
                    if let Ok(rest) = full.strip_prefix(candidate) {
                        if !rest.as_os_str().is_empty() {
                            followed.push(rest);
                        }
                    }
                    return self.check_existing_ancestor_at(&followed, requested, depth + 1);
                }
                Err(e) => {
                    return Err(ToolError::io(format!("failed to resolve path '{}'", requested), e))
                }
            }
        }
        Ok(())
    }

    fn outside(&self, requested: &str) -> ToolError {
        ToolError::validation(format!(
            "invalid path: '{}' resolves outside the workspace directory",
            requested
        ))
    }
}

const MAX_SYMLINK_HOPS: usize = 40;

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
