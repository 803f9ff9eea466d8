//! Docker implementation of the runtime-client boundary.
//!
//! `bollard` is async; the sweep is deliberately synchronous (one pass at a
//! time, blocking calls, no overlap). `DockerRuntime` bridges the two with a
//! dedicated current-thread tokio runtime and `block_on` per call, so the
//! rest of the crate never sees a future.

#![allow(missing_docs)]

use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use tokio::runtime::Runtime;

use crate::core::errors::{ReaperError, Result};
use crate::runtime::{ContainerDetail, ContainerRecord, ImageRecord, RuntimeClient};

/// Blocking Docker client for the sweep loop.
pub struct DockerRuntime {
    docker: Docker,
    rt: Runtime,
}

impl DockerRuntime {
    /// Connect to the daemon at `host` and verify it responds to a ping.
    ///
    /// Accepted host forms: `unix://PATH`, `tcp://ADDR`, `http://ADDR`, or an
    /// empty string for the client library's local defaults (honors
    /// `DOCKER_HOST`). A failure here is fatal to the process; there is no
    /// point starting the sweep loop without a reachable daemon.
    pub fn connect(host: &str, timeout_secs: u64) -> Result<Self> {
        let host = host.trim();
        let connect_err = |e: bollard::errors::Error| ReaperError::Connect {
            host: host.to_string(),
            details: e.to_string(),
        };

        let docker = if host.is_empty() {
            Docker::connect_with_local_defaults().map_err(connect_err)?
        } else if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_unix(path, timeout_secs, API_DEFAULT_VERSION)
                .map_err(connect_err)?
        } else {
            Docker::connect_with_http(host, timeout_secs, API_DEFAULT_VERSION)
                .map_err(connect_err)?
        };

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ReaperError::Runtime {
                details: format!("failed to build tokio runtime: {e}"),
            })?;

        rt.block_on(docker.ping()).map_err(|e| ReaperError::Connect {
            host: host.to_string(),
            details: format!("ping failed: {e}"),
        })?;

        Ok(Self { docker, rt })
    }
}

impl RuntimeClient for DockerRuntime {
    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        // all=false: top-level images only, never intermediate build layers.
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        let images = self
            .rt
            .block_on(self.docker.list_images(Some(options)))
            .map_err(|e| ReaperError::Enumeration {
                what: "images",
                details: e.to_string(),
            })?;

        Ok(images
            .into_iter()
            .map(|img| ImageRecord {
                id: img.id,
                repo_tags: img.repo_tags,
            })
            .collect())
    }

    fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        // all=true: stopped and paused containers still hold their image.
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .rt
            .block_on(self.docker.list_containers(Some(options)))
            .map_err(|e| ReaperError::Enumeration {
                what: "containers",
                details: e.to_string(),
            })?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(|id| ContainerRecord { id })
            .collect())
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        let inspect_err = |details: String| ReaperError::Inspect {
            container: id.to_string(),
            details,
        };

        let detail = self
            .rt
            .block_on(
                self.docker
                    .inspect_container(id, None::<InspectContainerOptions>),
            )
            .map_err(|e| inspect_err(e.to_string()))?;

        let image_id = detail
            .image
            .ok_or_else(|| inspect_err("inspect response carries no image id".to_string()))?;

        Ok(ContainerDetail {
            id: detail.id.unwrap_or_else(|| id.to_string()),
            image_id,
        })
    }

    fn remove_image(&self, id: &str) -> Result<()> {
        // No force, no noprune: same call shape as a plain `docker rmi`.
        // The daemon refusing an in-use image is an extra safety net on top
        // of the sweep's own re-check.
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.rt
            .block_on(self.docker.remove_image(id, Some(options), None))
            .map_err(|e| ReaperError::Removal {
                image: id.to_string(),
                details: e.to_string(),
            })?;
        Ok(())
    }
}
