//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern, PatternError};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Options shared by every source glob: `*` never crosses a directory
/// separator, `**` must be used for recursion.
pub fn source_match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Join `pattern` onto `base`, escaping glob metacharacters in `base` so
/// only `pattern` is interpreted.
pub fn rooted_pattern(base: &Path, pattern: &str) -> String {
    let escaped = Pattern::escape(&base.to_string_lossy());
    Path::new(&escaped).join(pattern).to_string_lossy().into_owned()
}

/// Find regular files matching a glob pattern relative to a base directory.
///
/// Unreadable entries are logged and skipped.
pub fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, PatternError> {
    let pattern_str = rooted_pattern(base, pattern);

    let mut results = Vec::new();
    for entry in glob_with(&pattern_str, source_match_options())? {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    results.push(path);
                }
            }
            Err(e) => {
                tracing::warn!("glob error: {}", e);
            }
        }
    }

    Ok(results)
}

/// Object file path for `source`, mirroring its location under `root`.
///
/// Sources outside `root` keep only their file name.
pub fn object_path(obj_dir: &Path, root: &Path, source: &Path, extension: &str) -> PathBuf {
    let relative = source
        .strip_prefix(root)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| source.file_name().map(PathBuf::from))
        .unwrap_or_else(|| source.to_path_buf());

    let mut object = obj_dir.join(relative);
    let file_name = match object.file_name() {
        Some(name) => format!("{}.{}", name.to_string_lossy(), extension),
        None => format!("out.{}", extension),
    };
    object.set_file_name(file_name);
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_glob_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("Mongo.cpp"), "").unwrap();
        fs::write(src.join("Collection.cpp"), "").unwrap();
        fs::write(src.join("readme.txt"), "").unwrap();
        fs::write(src.join("nested/Deep.cpp"), "").unwrap();

        let files = glob_files(tmp.path(), "src/*.cpp").unwrap();
        assert_eq!(files.len(), 2);

        let recursive = glob_files(tmp.path(), "src/**/*.cpp").unwrap();
        assert_eq!(recursive.len(), 3);
    }

    #[test]
    fn test_glob_files_escapes_base() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("mongo[1]");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("Mongo.cpp"), "").unwrap();

        let files = glob_files(&base, "*.cpp").unwrap();
        assert_eq!(files, vec![base.join("Mongo.cpp")]);
        assert_eq!(rooted_pattern(Path::new("/src/a[b]"), "*.c"), "/src/a[[]b[]]/*.c");
    }

    #[test]
    fn test_glob_files_invalid_pattern() {
        let tmp = TempDir::new().unwrap();
        assert!(glob_files(tmp.path(), "[*.cpp").is_err());
    }

    #[test]
    fn test_object_path_mirrors_source_tree() {
        let obj = object_path(
            Path::new("/out/mongocpp/obj"),
            Path::new("/src"),
            Path::new("/src/bson/MongoBson.cpp"),
            "o",
        );
        assert_eq!(obj, PathBuf::from("/out/mongocpp/obj/bson/MongoBson.cpp.o"));

        let outside = object_path(
            Path::new("/out/obj"),
            Path::new("/src"),
            Path::new("/elsewhere/Mongo.cpp"),
            "o",
        );
        assert_eq!(outside, PathBuf::from("/out/obj/Mongo.cpp.o"));
    }
}
