//! Resource enumeration and usage tracking.
//!
//! `resolve_usage` is deliberately all-or-nothing: if resolving any single
//! container fails (it vanished between listing and inspection, say), the
//! whole batch is invalid and the caller must retry the pass. Partial usage
//! information would risk deleting an image wrongly believed unreferenced,
//! so availability is traded for deletion safety here. Do not soften this
//! to partial-success semantics.

use std::collections::HashSet;

use crate::core::errors::Result;
use crate::runtime::{ImageRecord, RuntimeClient};

/// Point-in-time snapshot of all non-intermediate images.
pub fn snapshot_images(client: &dyn RuntimeClient) -> Result<Vec<ImageRecord>> {
    client.list_images()
}

/// Resolve the set of image ids referenced by at least one container, in any
/// lifecycle state.
///
/// Fails with `Enumeration` if the container listing fails, or `Inspect` if
/// any single container cannot be resolved.
pub fn resolve_usage(client: &dyn RuntimeClient) -> Result<HashSet<String>> {
    let containers = client.list_containers()?;
    let mut in_use = HashSet::with_capacity(containers.len());
    for container in &containers {
        let detail = client.inspect_container(&container.id)?;
        in_use.insert(detail.image_id);
    }
    Ok(in_use)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::core::errors::ReaperError;
    use crate::runtime::{ContainerDetail, ContainerRecord};

    /// Minimal scripted client: fixed containers, optionally failing the
    /// inspection of one id.
    struct ScriptedClient {
        containers: Vec<(&'static str, &'static str)>,
        fail_inspect: Option<&'static str>,
        inspected: RefCell<Vec<String>>,
    }

    impl RuntimeClient for ScriptedClient {
        fn list_images(&self) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }

        fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
            Ok(self
                .containers
                .iter()
                .map(|&(id, _)| ContainerRecord { id: id.to_string() })
                .collect())
        }

        fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
            self.inspected.borrow_mut().push(id.to_string());
            if self.fail_inspect == Some(id) {
                return Err(ReaperError::Inspect {
                    container: id.to_string(),
                    details: "no such container".to_string(),
                });
            }
            let image = self
                .containers
                .iter()
                .find(|&&(cid, _)| cid == id)
                .map(|&(_, img)| img)
                .unwrap();
            Ok(ContainerDetail {
                id: id.to_string(),
                image_id: image.to_string(),
            })
        }

        fn remove_image(&self, _id: &str) -> Result<()> {
            unreachable!("usage resolution never removes images")
        }
    }

    #[test]
    fn collects_image_ids_of_all_containers() {
        let client = ScriptedClient {
            containers: vec![("c1", "i1"), ("c2", "i1"), ("c3", "i2")],
            fail_inspect: None,
            inspected: RefCell::new(Vec::new()),
        };
        let in_use = resolve_usage(&client).unwrap();
        assert_eq!(in_use.len(), 2);
        assert!(in_use.contains("i1"));
        assert!(in_use.contains("i2"));
    }

    #[test]
    fn no_containers_means_empty_usage() {
        let client = ScriptedClient {
            containers: vec![],
            fail_inspect: None,
            inspected: RefCell::new(Vec::new()),
        };
        assert!(resolve_usage(&client).unwrap().is_empty());
    }

    #[test]
    fn single_inspect_failure_invalidates_whole_batch() {
        let client = ScriptedClient {
            containers: vec![("c1", "i1"), ("c2", "i2"), ("c3", "i3")],
            fail_inspect: Some("c2"),
            inspected: RefCell::new(Vec::new()),
        };
        let err = resolve_usage(&client).unwrap_err();
        assert_eq!(err.code(), "IMR-2102");
        // The batch aborts at the failing container; c3 is never inspected.
        assert_eq!(*client.inspected.borrow(), vec!["c1", "c2"]);
    }
}
