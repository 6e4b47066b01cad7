use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use walkdir::WalkDir;

use crate::errors::{Result, SegMaskError};
use crate::traits::OutputPathGenerator;

/// True when the extension of `path` names a format this build can both decode and encode.
pub fn is_supported_image_format(path: &Path) -> bool {
    ImageFormat::from_path(path)
        .map(|format| format.reading_enabled() && format.writing_enabled())
        .unwrap_or(false)
}

/// Lists the images to segment.
///
/// A file is returned as is. A directory yields its immediate regular files with a supported
/// extension, sorted by path; subdirectories are not descended into.
pub fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(input).map_err(|source| SegMaskError::FileSystem {
        path: input.to_path_buf(),
        operation: "reading input metadata".to_string(),
        source,
    })?;
    if !metadata.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| SegMaskError::FileSystem {
            path: e.path().unwrap_or(input).to_path_buf(),
            operation: "listing input directory".to_string(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && is_supported_image_format(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Places each mask in one output directory under the input's file name.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    dir: PathBuf,
    extension: Option<String>,
}

impl OutputPaths {
    /// Creates `dir` if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SegMaskError::FileSystem {
            path: dir.clone(),
            operation: "creating output directory".to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            extension: None,
        })
    }

    /// Replaces the extension of every output name. `None` keeps the input's extension.
    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, input: &Path) -> PathBuf {
        let path = self.dir.join(input.file_name().unwrap_or_default());
        match &self.extension {
            Some(extension) => path.with_extension(extension),
            None => path,
        }
    }
}

impl OutputPathGenerator for OutputPaths {
    fn output_path(&self, input: &Path) -> PathBuf {
        self.get(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_supported_formats() {
        let test_cases = [
            ("test.jpg", true),
            ("test.JPEG", true),
            ("test.png", true),
            ("test.txt", false),
            ("test", false),
        ];

        for (filename, expected) in test_cases {
            assert_eq!(
                is_supported_image_format(Path::new(filename)),
                expected,
                "{filename}"
            );
        }
    }

    #[test]
    fn directory_listing_is_filtered_sorted_and_flat() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        for name in ["b.png", "a.jpg", "notes.txt", "c.png"] {
            fs::write(root.join(name), b"")?;
        }
        fs::create_dir(root.join("nested"))?;
        fs::write(root.join("nested").join("d.png"), b"")?;

        let files = collect_inputs(root)?;
        assert_eq!(
            files,
            vec![root.join("a.jpg"), root.join("b.png"), root.join("c.png")]
        );
        Ok(())
    }

    #[test]
    fn single_file_is_returned_unfiltered() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("photo.png");
        fs::write(&file, b"")?;

        assert_eq!(collect_inputs(&file)?, vec![file]);
        Ok(())
    }

    #[test]
    fn missing_input_is_a_filesystem_error() {
        assert!(matches!(
            collect_inputs(Path::new("no/such/input")),
            Err(SegMaskError::FileSystem { .. })
        ));
    }

    #[test]
    fn output_paths_create_the_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("masks").join("run1");
        let outputs = OutputPaths::new(&dir)?;

        assert!(dir.is_dir());
        assert_eq!(outputs.dir(), dir);
        assert_eq!(outputs.get(Path::new("in/cat.jpg")), dir.join("cat.jpg"));
        assert_eq!(outputs.output_path(Path::new("dog.png")), dir.join("dog.png"));
        Ok(())
    }

    #[test]
    fn output_format_replaces_the_extension() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let outputs = OutputPaths::new(temp_dir.path())?.with_extension(Some("png".into()));

        assert_eq!(
            outputs.get(Path::new("in/cat.jpg")),
            temp_dir.path().join("cat.png")
        );
        Ok(())
    }
}
