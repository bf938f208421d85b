//! Preloaded image check.
//!
//! Node images ship with the container images of their Kubernetes version.
//! A missing image is an error; nothing is pulled.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::node::{args, Node};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct CriImageList {
    #[serde(default)]
    images: Vec<CriImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CriImage {
    #[serde(default)]
    repo_tags: Vec<String>,
}

/// Images kubeadm needs for the node's Kubernetes version.
fn required_images(node: &Node) -> Result<Vec<String>> {
    let version = node.kubernetes_version()?.to_string();
    let out = node.exec(
        "kubeadm",
        &args(&["config", "images", "list", "--kubernetes-version", &version]),
    )?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Repo tags of the images present in the node's container runtime.
fn present_images(node: &Node) -> Result<BTreeSet<String>> {
    let out = node.exec("crictl", &args(&["images", "-o", "json"]))?;
    let list: CriImageList = serde_json::from_str(&out).map_err(|e| Error::UnexpectedOutput {
        node: node.name().clone(),
        operation: "crictl images -o json".to_string(),
        message: e.to_string(),
    })?;
    Ok(list
        .images
        .into_iter()
        .flat_map(|i| i.repo_tags)
        .collect())
}

/// Fails with [`Error::MissingImage`] for the first required image the node lacks.
pub(crate) fn check_images(node: &Node) -> Result<()> {
    let required = required_images(node)?;
    let present = present_images(node)?;
    debug!(
        node = %node.name(),
        required = required.len(),
        present = present.len(),
        "checking images"
    );

    match required.into_iter().find(|image| !present.contains(image)) {
        Some(image) => Err(Error::MissingImage {
            node: node.name().clone(),
            image,
        }),
        None => Ok(()),
    }
}
