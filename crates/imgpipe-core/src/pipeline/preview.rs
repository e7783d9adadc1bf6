//! Revocable preview handles for ingested images.
//!
//! Every successful ingest hands out one [`PreviewHandle`]: an opaque
//! `preview:<n>` reference plus an optional WebP thumbnail data URL. Handles
//! stay registered until revoked, either explicitly or when the handle is
//! dropped. Resetting a run calls [`PreviewRegistry::revoke_all`], after
//! which no reference is outstanding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PreviewConfig;

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Option<String>>>,
}

impl RegistryInner {
    fn live(&self) -> MutexGuard<'_, HashMap<u64, Option<String>>> {
        // A poisoned map is still a valid map of ids
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Issues and tracks preview handles. Clones share state.
#[derive(Clone, Debug)]
pub struct PreviewRegistry {
    config: PreviewConfig,
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    /// Create a registry with the given preview settings.
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RegistryInner::default()),
        }
    }

    /// Register a preview for `image` and return its handle.
    pub fn acquire(&self, image: &DynamicImage) -> PreviewHandle {
        let data_url = if self.config.enabled {
            thumbnail_data_url(image, self.config.size)
        } else {
            None
        };
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live().insert(id, data_url);
        tracing::trace!("Preview acquired: preview:{id}");
        PreviewHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Number of handles not yet revoked.
    pub fn outstanding(&self) -> usize {
        self.inner.live().len()
    }

    /// Revoke every outstanding handle. Returns how many were revoked.
    pub fn revoke_all(&self) -> usize {
        let mut live = self.inner.live();
        let count = live.len();
        live.clear();
        if count > 0 {
            tracing::debug!("Revoked {count} outstanding preview handle(s)");
        }
        count
    }

    /// Look up the thumbnail data URL of a live handle.
    pub fn data_url(&self, handle: &PreviewHandle) -> Option<String> {
        self.inner.live().get(&handle.id).cloned().flatten()
    }
}

/// A transient reference to an ingested image's preview.
///
/// Revoked when dropped, so a handle can never outlive its use.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    registry: Arc<RegistryInner>,
}

impl PreviewHandle {
    /// The reference string, e.g. `preview:3`.
    pub fn url(&self) -> String {
        format!("preview:{}", self.id)
    }

    /// Whether the registry still holds this handle.
    pub fn is_live(&self) -> bool {
        self.registry.live().contains_key(&self.id)
    }

    /// Release the handle now.
    pub fn revoke(self) {
        drop(self);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.live().remove(&self.id);
    }
}

impl std::fmt::Debug for RegistryInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("outstanding", &self.live().len())
            .finish()
    }
}

/// Downscale (longest edge = `size`) and encode as a WebP data URL.
fn thumbnail_data_url(image: &DynamicImage, size: u32) -> Option<String> {
    let thumbnail = image.thumbnail(size, size);
    let mut buffer = Cursor::new(Vec::new());
    thumbnail
        .to_rgba8()
        .write_to(&mut buffer, ImageFormat::WebP)
        .ok()?;
    Some(format!(
        "data:image/webp;base64,{}",
        BASE64.encode(buffer.into_inner())
    ))
}
