use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Image files directly inside `directory` with an allowed extension, sorted by path.
///
/// Subdirectories are not descended into. `extensions` are compared
/// case-insensitively and carry no leading dot.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let access_error = |source: io::Error| Error::DirectoryAccess {
        path: directory.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(directory).map_err(access_error)?;
    if !metadata.is_dir() {
        return Err(access_error(io::Error::other("not a directory")));
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = entry.map_err(|e| access_error(io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                images.push(path.to_path_buf());
            }
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_discover_images_is_flat() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("photo3.jpeg")).unwrap();
        File::create(dir.path().join("document.txt")).unwrap();
        File::create(dir.path().join("noext")).unwrap();

        fs::create_dir(dir.path().join("subdir")).unwrap();
        File::create(dir.path().join("subdir/photo4.jpeg")).unwrap();
        fs::create_dir(dir.path().join("folder.png")).unwrap();

        let images = discover_images(dir.path(), &extensions()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["photo1.jpg", "photo2.PNG", "photo3.jpeg"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let result = discover_images(&dir.path().join("absent"), &extensions());
        assert!(matches!(result, Err(Error::DirectoryAccess { .. })));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        File::create(&file).unwrap();
        let result = discover_images(&file, &extensions());
        assert!(matches!(result, Err(Error::DirectoryAccess { .. })));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(discover_images(dir.path(), &extensions()).unwrap().is_empty());
    }
}
