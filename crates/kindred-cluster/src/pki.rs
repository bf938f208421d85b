//! Control-plane certificate distribution.
//!
//! Certificates are generated by kubeadm on the bootstrap control plane; this
//! module only knows which of them a joining control plane needs and how to
//! move them there.

use std::collections::BTreeSet;
use std::fmt::Debug;

use tracing::{debug, info};

use crate::constants::PKI_DIR;
use crate::node::Node;
use crate::{Error, Result};

/// Which shared certificate files a joining control plane needs.
pub trait PkiProvider: Debug + Send + Sync {
    /// Files relative to the PKI directory, e.g. `etcd/ca.crt`.
    fn shared_files(&self, external_etcd: bool) -> Vec<String>;
}

/// The shared certificate bundle of a kubeadm control plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeadmPki;

impl PkiProvider for KubeadmPki {
    fn shared_files(&self, external_etcd: bool) -> Vec<String> {
        let mut files = vec![
            "ca.crt",
            "ca.key",
            "sa.key",
            "sa.pub",
            "front-proxy-ca.crt",
            "front-proxy-ca.key",
        ];
        if external_etcd {
            files.extend(["etcd/ca.crt", "apiserver-etcd-client.crt", "apiserver-etcd-client.key"]);
        } else {
            files.extend(["etcd/ca.crt", "etcd/ca.key"]);
        }
        files.into_iter().map(String::from).collect()
    }
}

/// Copies the shared certificates from `source` to `target`, simulating the
/// manual copy an operator does when automatic distribution is off.
pub(crate) fn copy_certificates(
    pki: &dyn PkiProvider,
    external_etcd: bool,
    source: &Node,
    target: &Node,
) -> Result<()> {
    let files = pki.shared_files(external_etcd);
    info!(from = %source.name(), to = %target.name(), files = files.len(), "copying certificates");

    let staging = tempfile::tempdir().map_err(|e| Error::io(std::env::temp_dir(), e))?;

    let remote_dirs: BTreeSet<String> = files
        .iter()
        .map(|f| match f.rsplit_once('/') {
            Some((dir, _)) => format!("{PKI_DIR}/{dir}"),
            None => PKI_DIR.to_string(),
        })
        .collect();
    for dir in &remote_dirs {
        target.mkdir_all(dir)?;
    }

    for (i, file) in files.iter().enumerate() {
        let remote = format!("{PKI_DIR}/{file}");
        let local = staging.path().join(format!("{i}-{}", file.replace('/', "-")));
        debug!(file = %remote, "copying certificate");
        source.copy_from(&remote, &local)?;
        target.copy_to(&local, &remote)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacked_etcd_bundle_has_etcd_ca_key_pair() {
        let files = KubeadmPki.shared_files(false);
        assert!(files.contains(&"etcd/ca.key".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("apiserver-etcd-client")));
        assert_eq!(files.len(), 8);
    }

    #[test]
    fn external_etcd_bundle_has_client_cert_instead_of_ca_key() {
        let files = KubeadmPki.shared_files(true);
        assert!(files.contains(&"etcd/ca.crt".to_string()));
        assert!(!files.contains(&"etcd/ca.key".to_string()));
        assert!(files.contains(&"apiserver-etcd-client.key".to_string()));
        assert_eq!(files.len(), 9);
    }
}
