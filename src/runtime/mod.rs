//! Runtime-daemon client boundary.
//!
//! The sweep core only sees the [`RuntimeClient`] trait and the plain record
//! types below, so tests can substitute a scripted in-memory runtime. The
//! real implementation lives in [`docker`].

pub mod docker;

use crate::core::errors::Result;

/// A non-intermediate image as reported by the runtime daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Unique image identifier.
    pub id: String,
    /// `repository:tag` names, in daemon order. May be empty.
    pub repo_tags: Vec<String>,
}

/// A container as reported by the listing call. The image reference is not
/// part of the listing; it is resolved via [`RuntimeClient::inspect_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Unique container identifier.
    pub id: String,
}

/// Container detail from inspection, carrying the resolved image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetail {
    /// Unique container identifier.
    pub id: String,
    /// The image this container was created from. Never changes.
    pub image_id: String,
}

/// Blocking operations the sweep consumes from the runtime daemon.
///
/// Semantics the implementations must honor:
/// - `list_images` returns only non-intermediate (top-level) images.
/// - `list_containers` returns containers in **all** lifecycle states; a
///   stopped container still holds its image.
/// - `inspect_container` fails if the container vanished since listing.
pub trait RuntimeClient {
    /// List all non-intermediate images.
    fn list_images(&self) -> Result<Vec<ImageRecord>>;
    /// List containers in every lifecycle state.
    fn list_containers(&self) -> Result<Vec<ContainerRecord>>;
    /// Resolve a container's image reference.
    fn inspect_container(&self, id: &str) -> Result<ContainerDetail>;
    /// Delete an image by identifier.
    fn remove_image(&self, id: &str) -> Result<()>;
}
