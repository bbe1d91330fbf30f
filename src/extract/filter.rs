//! File filtering for the extractor's walk.
//!
//! Deterministic precedence:
//! 1. Not a regular file
//! 2. Hard internal ignores (`.git/`, `node_modules/`, database files, ...)
//! 3. Resolves outside the project root
//! 4. Include patterns (if any are configured)
//! 5. Exclude patterns
//!
//! Same inputs always produce the same decision.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

use crate::diagnostics::SkipReason;
use crate::filesystem::FileSystem;
use crate::paths::{normalize_lexically, validate_path_within_root, PathValidationError};

/// Directories that are never scanned.
const INTERNAL_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".svelte-kit",
    ".gqlforge",
    "target",
    "node_modules",
    "dist",
];

/// File suffixes that are never scanned.
const INTERNAL_IGNORE_EXTS: &[&str] = &[".db", ".db-journal", ".db-wal", ".db-shm", ".sqlite", ".sqlite3"];

/// Include/exclude decision for walked paths.
pub struct FileFilter {
    root: PathBuf,
    /// Empty set means "include everything"
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileFilter {
    /// Compile `include` / `exclude` globs, interpreted relative to `root`.
    pub fn new(root: &Path, include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(Self::compile(include)?)
        };
        Ok(Self {
            root: normalize_lexically(root),
            include,
            exclude: Self::compile(exclude)?,
        })
    }

    fn compile(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
            let glob = Glob::new(pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reason `path` must not be scanned, or `None` to scan it.
    pub fn should_skip(&self, fs: &dyn FileSystem, path: &Path) -> Option<SkipReason> {
        match fs.stat(path) {
            Ok(stat) if stat.is_file => {}
            _ => return Some(SkipReason::NotAFile),
        }

        if self.is_internal_ignore(path) {
            return Some(SkipReason::IgnoredInternal);
        }

        if !self.is_within_root(path) {
            return Some(SkipReason::OutsideRoot);
        }

        let relative = self.relative_path(path);
        if let Some(include) = &self.include {
            if !include.is_match(&relative) {
                return Some(SkipReason::NotIncluded);
            }
        }

        if self.exclude.is_match(&relative) {
            return Some(SkipReason::ExcludedByGlob);
        }

        None
    }

    fn is_internal_ignore(&self, path: &Path) -> bool {
        if let Some(file_name) = path.file_name() {
            let file_name = file_name.to_string_lossy();
            if INTERNAL_IGNORE_EXTS.iter().any(|ext| file_name.ends_with(ext)) {
                return true;
            }
        }

        let normalized = normalize_lexically(path);
        let relative = normalized.strip_prefix(&self.root).unwrap_or(&normalized);
        relative.components().any(|component| match component {
            std::path::Component::Normal(dir) => INTERNAL_IGNORE_DIRS.contains(&dir.to_string_lossy().as_ref()),
            _ => false,
        })
    }

    /// Symlinks are resolved when the path exists on disk; virtual paths fall
    /// back to a lexical check.
    fn is_within_root(&self, path: &Path) -> bool {
        match validate_path_within_root(path, &self.root) {
            Ok(_) => true,
            Err(PathValidationError::OutsideRoot(..)) => false,
            Err(PathValidationError::CannotCanonicalize(_)) => normalize_lexically(path).starts_with(&self.root),
        }
    }

    /// Path relative to root, with forward slashes.
    fn relative_path(&self, path: &Path) -> String {
        let normalized = normalize_lexically(path);
        normalized
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| normalized.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::OsFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "graphql(`query A { a }`)").unwrap();
        path
    }

    #[test]
    fn test_internal_ignores() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let filter = FileFilter::new(root, &[], &[]).unwrap();

        let git = touch(root, ".git/config");
        let modules = touch(root, "node_modules/lib/index.js");
        let db = touch(root, "ir.db");

        assert_eq!(filter.should_skip(&OsFileSystem, &git), Some(SkipReason::IgnoredInternal));
        assert_eq!(filter.should_skip(&OsFileSystem, &modules), Some(SkipReason::IgnoredInternal));
        assert_eq!(filter.should_skip(&OsFileSystem, &db), Some(SkipReason::IgnoredInternal));
    }

    #[test]
    fn test_directories_are_not_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        let filter = FileFilter::new(temp.path(), &[], &[]).unwrap();
        assert_eq!(
            filter.should_skip(&OsFileSystem, &temp.path().join("src")),
            Some(SkipReason::NotAFile)
        );
    }

    #[test]
    fn test_include_then_exclude() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let filter = FileFilter::new(
            root,
            &["src/**/*.{ts,graphql}".to_string()],
            &["src/generated/**".to_string()],
        )
        .unwrap();

        let kept = touch(root, "src/routes/page.ts");
        let other = touch(root, "src/routes/page.rs");
        let generated = touch(root, "src/generated/types.ts");
        let outside_include = touch(root, "scripts/build.ts");

        assert_eq!(filter.should_skip(&OsFileSystem, &kept), None);
        assert_eq!(filter.should_skip(&OsFileSystem, &other), Some(SkipReason::NotIncluded));
        assert_eq!(filter.should_skip(&OsFileSystem, &generated), Some(SkipReason::ExcludedByGlob));
        assert_eq!(filter.should_skip(&OsFileSystem, &outside_include), Some(SkipReason::NotIncluded));
    }

    #[test]
    fn test_empty_include_accepts_everything() {
        let temp = TempDir::new().unwrap();
        let filter = FileFilter::new(temp.path(), &[], &[]).unwrap();
        let file = touch(temp.path(), "anything/at/all.svelte");
        assert_eq!(filter.should_skip(&OsFileSystem, &file), None);
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(FileFilter::new(temp.path(), &["src/[".to_string()], &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("project");
        fs::create_dir(&root).unwrap();
        let secret = touch(outer.path(), "secret.ts");
        std::os::unix::fs::symlink(&secret, root.join("link.ts")).unwrap();

        let filter = FileFilter::new(&root, &[], &[]).unwrap();
        assert_eq!(
            filter.should_skip(&OsFileSystem, &root.join("link.ts")),
            Some(SkipReason::OutsideRoot)
        );
    }
}
