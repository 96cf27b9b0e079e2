//! Asset loading
//!
//! Meshes come from Wavefront OBJ files and textures from any format the
//! `image` crate decodes. The renderer only sees the [`AssetLoader`] trait,
//! so tests and embedders can supply assets without touching the filesystem.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::ObjLoader;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::render::Mesh;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed content
    #[error("Parse error: {0}")]
    Parse(String),
    /// Well-formed but unusable content
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// Decoder failure
    #[error("Load failed: {0}")]
    LoadFailed(String),
}

/// Source of mesh and texture data
pub trait AssetLoader {
    /// Load a triangle mesh
    fn load_mesh(&self, path: &str) -> Result<Mesh, AssetError>;

    /// Load and decode a texture to RGBA8
    fn load_texture(&self, path: &str) -> Result<ImageData, AssetError>;
}

/// Loads assets from files relative to a root directory
#[derive(Debug, Clone)]
pub struct FileAssetLoader {
    root: PathBuf,
}

impl FileAssetLoader {
    /// Create a loader resolving paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for FileAssetLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AssetLoader for FileAssetLoader {
    fn load_mesh(&self, path: &str) -> Result<Mesh, AssetError> {
        ObjLoader::load_obj(self.resolve(path))
    }

    fn load_texture(&self, path: &str) -> Result<ImageData, AssetError> {
        ImageData::from_file(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let loader = FileAssetLoader::new("/data/assets");
        assert_eq!(loader.resolve("models/cube.obj"), PathBuf::from("/data/assets/models/cube.obj"));
        assert_eq!(loader.resolve("/abs/tex.png"), PathBuf::from("/abs/tex.png"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = FileAssetLoader::new(std::env::temp_dir());
        let err = loader.load_mesh("definitely-not-here-7f3a.obj").unwrap_err();
        assert!(matches!(err, AssetError::Io(_)));
    }
}
