//! Linear-scan index: the reference implementation of the query contract.

use std::path::Path;

use crate::error::ManifestError;
use crate::manifest::{TileManifest, TileMeta, Viewport};

use super::TileIndex;

/// Index that answers queries by scanning the whole manifest.
#[derive(Debug, Clone, Default)]
pub struct LinearIndex {
    manifest: TileManifest,
}

impl LinearIndex {
    pub fn from_manifest(manifest: TileManifest) -> Self {
        Self { manifest }
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        Ok(Self::from_manifest(TileManifest::load(path)?))
    }

    pub fn manifest(&self) -> &TileManifest {
        &self.manifest
    }
}

impl TileIndex for LinearIndex {
    fn tiles(&self) -> &[TileMeta] {
        self.manifest.tiles()
    }

    fn query(&self, vp: &Viewport) -> Vec<TileMeta> {
        self.manifest
            .tiles()
            .iter()
            .filter(|tile| tile.intersects(vp))
            .cloned()
            .collect()
    }

    fn map_width(&self) -> i32 {
        self.manifest.map_width()
    }

    fn map_height(&self) -> i32 {
        self.manifest.map_height()
    }
}
