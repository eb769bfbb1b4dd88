//! Directory discovery helpers.

use std::io;
use std::path::{Path, PathBuf};

/// Extensions accepted as still frames and calibration images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Files directly inside `dir` whose extension matches one of `exts`
/// (case-insensitive), sorted by path.
pub fn scan_dir(dir: &Path, exts: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_extension(&path, exts) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Subdirectories of `dir`, sorted by path.
pub fn scan_subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Recording tag: the file or directory name up to its last `_`
/// (`trial1_L` -> `trial1`). Names without `_` are their own tag.
pub fn recording_tag(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_str()?;
    Some(match name.rfind('_') {
        Some(at) => name[..at].to_string(),
        None => name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_extension_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.png", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();
        let found = scan_dir(dir.path(), IMAGE_EXTENSIONS).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.png", "b.PNG", "c.jpeg"]);
    }

    #[test]
    fn lists_only_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("trial2_R")).unwrap();
        std::fs::create_dir(dir.path().join("trial2_L")).unwrap();
        std::fs::write(dir.path().join("trial2_X.json"), b"{}").unwrap();
        let dirs = scan_subdirs(dir.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("trial2_L"));
    }

    #[test]
    fn tag_drops_last_suffix() {
        assert_eq!(recording_tag(Path::new("/v/reef_a_L")).unwrap(), "reef_a");
        assert_eq!(recording_tag(Path::new("clip_R.mp4")).unwrap(), "clip");
        assert_eq!(recording_tag(Path::new("plain")).unwrap(), "plain");
    }
}
