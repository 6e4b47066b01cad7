//! Pre-trained model catalog.
//!
//! Pre-trained models live in a single directory as `<id>.onnx`. The table below is the
//! only place that knows which architectures exist and which of them need a batch of at
//! least two.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::{Result, SegMaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub description: &'static str,
    pub min_batch_size: usize,
}

impl CatalogEntry {
    pub fn path_in(&self, model_root: &Path) -> PathBuf {
        model_root.join(self.id).with_extension("onnx")
    }
}

pub const PRETRAINED_MODELS: &[CatalogEntry] = &[
    CatalogEntry {
        id: "unet",
        description: "classical UNet",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "unetpp",
        description: "UNet++",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "deeplabv3",
        description: "DeepLabV3",
        min_batch_size: 2,
    },
    CatalogEntry {
        id: "deeplabv3p",
        description: "DeepLabV3+",
        min_batch_size: 2,
    },
    CatalogEntry {
        id: "runet",
        description: "recurrent UNet",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "aunet",
        description: "UNet with attention",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "raunet",
        description: "recurrent UNet with attention",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "pspnet",
        description: "PSPNet",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "fpn",
        description: "FPN",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "manet",
        description: "MANet",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "linknet",
        description: "LinkNet",
        min_batch_size: 1,
    },
    CatalogEntry {
        id: "panet",
        description: "PANet",
        min_batch_size: 2,
    },
];

/// `UNet++` and `unetpp` name the same entry.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '+' { 'p' } else { c.to_ascii_lowercase() })
        .collect()
}

pub fn lookup(name: &str) -> Option<&'static CatalogEntry> {
    let id = normalize_name(name);
    PRETRAINED_MODELS.iter().find(|entry| entry.id == id)
}

/// Where a model comes from and how small its batches may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub path: PathBuf,
    pub min_batch_size: usize,
}

/// Resolves a `--model` argument: an existing file wins, otherwise the catalog is
/// consulted.
pub fn resolve(model: &str, model_root: &Path) -> Result<ModelSource> {
    let as_path = Path::new(model);
    if as_path.is_file() {
        return Ok(ModelSource {
            path: as_path.to_path_buf(),
            min_batch_size: 1,
        });
    }

    let entry = lookup(model).ok_or_else(|| SegMaskError::ModelLoad {
        message: format!(
            "`{model}` is neither a model file nor a pre-trained model (available: {})",
            PRETRAINED_MODELS
                .iter()
                .map(|entry| entry.id)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        source: None,
    })?;
    info!(
        model = entry.id,
        architecture = entry.description,
        min_batch_size = entry.min_batch_size,
        "using pre-trained model"
    );

    Ok(ModelSource {
        path: entry.path_in(model_root),
        min_batch_size: entry.min_batch_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("UNet++"), "unetpp");
        assert_eq!(normalize_name("DeepLabV3+"), "deeplabv3p");
        assert_eq!(lookup("UNet++").map(|e| e.id), Some("unetpp"));
        assert_eq!(lookup("raunet").map(|e| e.description), Some("recurrent UNet with attention"));
        assert!(lookup("segformer").is_none());
    }

    #[test]
    fn only_some_architectures_need_pairs() {
        let pairs: Vec<_> = PRETRAINED_MODELS
            .iter()
            .filter(|e| e.min_batch_size == 2)
            .map(|e| e.id)
            .collect();
        assert_eq!(pairs, ["deeplabv3", "deeplabv3p", "panet"]);
    }

    #[test]
    fn catalog_names_resolve_under_model_root() -> Result<()> {
        let source = resolve("DeepLabV3+", Path::new("/models"))?;
        assert_eq!(source.path, PathBuf::from("/models/deeplabv3p.onnx"));
        assert_eq!(source.min_batch_size, 2);
        Ok(())
    }

    #[test]
    fn existing_file_takes_precedence() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let custom = temp_dir.path().join("panet");
        std::fs::write(&custom, b"not really a graph")?;

        let source = resolve(custom.to_str().unwrap(), Path::new("/models"))?;
        assert_eq!(source.path, custom);
        assert_eq!(source.min_batch_size, 1);
        Ok(())
    }

    #[test]
    fn unknown_model_is_a_load_error() {
        assert!(matches!(
            resolve("nope", Path::new("/models")),
            Err(SegMaskError::ModelLoad { .. })
        ));
    }
}
