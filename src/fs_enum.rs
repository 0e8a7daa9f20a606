use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
// Directory enumeration for the served root (one level, no traversal)

/// Source of the entry names a client may list and fetch.
pub trait DirectoryLister {
    /// Names of the entries directly under the served directory, in
    /// enumeration order.
    fn list_entries(&self) -> io::Result<Vec<String>>;

    /// Directory that entry names are relative to
    fn root(&self) -> &Path;
}

/// Enumerates the immediate children of a directory on disk
#[derive(Debug, Clone)]
pub struct DirLister {
    root: PathBuf,
}

impl DirLister {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl DirectoryLister for DirLister {
    fn list_entries(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
        {
            let entry = entry.map_err(io::Error::from)?;
            // Names that are not valid UTF-8 cannot be requested over the wire
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Exact name match against the enumerated entries (no `stat`)
pub fn contains_entry(lister: &dyn DirectoryLister, name: &str) -> io::Result<bool> {
    Ok(lister.list_entries()?.iter().any(|e| e == name))
}
