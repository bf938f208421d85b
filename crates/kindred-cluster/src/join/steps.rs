//! Individual join steps shared by control planes and workers.

use std::fs;
use std::path::Path;

use kindred_types::{JoinPhase, KubeVersion};
use tracing::{debug, info};

use super::JoinOptions;
use crate::constants::{
    IGNORE_PREFLIGHT_ERRORS_FLAG, KUBEADM_CONFIG_PATH, KUSTOMIZE_MIN_VERSION, PATCHES_DIR,
    PATCHES_FLAG_GA_VERSION, PATCHES_MIN_VERSION,
};
use crate::node::Node;
use crate::{Error, Result};

/// Rejects options the node's kubeadm is too old for.
///
/// Runs before anything is staged on the node.
pub fn check_version_gates(node: &Node, options: &JoinOptions) -> Result<()> {
    let gates = [
        (options.kustomize_dir.is_some(), "kustomize", KUSTOMIZE_MIN_VERSION),
        (options.patches_dir.is_some(), "patches", PATCHES_MIN_VERSION),
    ];

    for (requested, feature, required) in gates {
        if !requested {
            continue;
        }
        let found = node.kubeadm_version()?;
        if !found.is_at_least(required) {
            return Err(Error::VersionSkew {
                node: node.name().clone(),
                feature,
                required,
                found: found.clone(),
            });
        }
    }
    Ok(())
}

/// Arguments of `kubeadm join`, or of one of its phases when `phase` is set.
///
/// `kubeadm_version` picks the patches flag spelling; `None` means the node
/// gets no overlays or patches.
pub fn kubeadm_join_args(
    phase: Option<JoinPhase>,
    options: &JoinOptions,
    kubeadm_version: Option<&KubeVersion>,
) -> Vec<String> {
    let mut args = vec!["join".to_string()];
    if let Some(phase) = phase {
        args.extend(phase.kubeadm_args().iter().map(|a| (*a).to_string()));
    }
    args.push(format!("--config={KUBEADM_CONFIG_PATH}"));
    args.push(format!("--v={}", options.verbosity));

    if phase.is_none_or(JoinPhase::runs_preflight) {
        args.push(IGNORE_PREFLIGHT_ERRORS_FLAG.to_string());
    }

    if let Some(version) = kubeadm_version {
        if phase.is_none_or(JoinPhase::accepts_patches) {
            if options.kustomize_dir.is_some() {
                args.extend(["-k".to_string(), PATCHES_DIR.to_string()]);
            }
            if options.patches_dir.is_some() {
                let flag = if version.is_at_least(PATCHES_FLAG_GA_VERSION) {
                    "--patches"
                } else {
                    "--experimental-patches"
                };
                args.extend([flag.to_string(), PATCHES_DIR.to_string()]);
            }
        }
    }
    args
}

/// Copies every file under `local_dir` to the node's patches directory.
pub(super) fn stage_directory(node: &Node, local_dir: &Path) -> Result<usize> {
    info!(node = %node.name(), dir = %local_dir.display(), "staging patches");
    node.mkdir_all(PATCHES_DIR)?;
    copy_tree(node, local_dir, PATCHES_DIR)
}

fn copy_tree(node: &Node, local_dir: &Path, remote_dir: &str) -> Result<usize> {
    let mut entries = fs::read_dir(local_dir)
        .map_err(|e| Error::io(local_dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(local_dir, e))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut copied = 0;
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let remote = format!("{remote_dir}/{name}");
        let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;

        if file_type.is_dir() {
            node.mkdir_all(&remote)?;
            copied += copy_tree(node, &path, &remote)?;
        } else {
            debug!(node = %node.name(), file = %remote, "staging file");
            node.copy_to(&path, &remote)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Runs kubeadm on the node.
pub(super) fn run_kubeadm(node: &Node, args: &[String]) -> Result<()> {
    info!(node = %node.name(), args = ?args, "running kubeadm");
    node.exec("kubeadm", args).map(|_| ())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn options() -> JoinOptions {
        JoinOptions {
            verbosity: 2,
            ..JoinOptions::default()
        }
    }

    fn v(s: &str) -> KubeVersion {
        s.parse().unwrap()
    }

    #[test]
    fn composite_join_ignores_preflight_errors() {
        assert_eq!(
            kubeadm_join_args(None, &options(), None),
            vec![
                "join",
                "--config=/kind/kubeadm.conf",
                "--v=2",
                "--ignore-preflight-errors=all"
            ]
        );
    }

    #[test_case(
        JoinPhase::Preflight,
        "join phase preflight --config=/kind/kubeadm.conf --v=2 --ignore-preflight-errors=all";
        "preflight"
    )]
    #[test_case(
        JoinPhase::ControlPlanePrepare,
        "join phase control-plane-prepare all --config=/kind/kubeadm.conf --v=2 \
         -k /kinder/patches --patches /kinder/patches";
        "prepare"
    )]
    #[test_case(
        JoinPhase::KubeletStart,
        "join phase kubelet-start --config=/kind/kubeadm.conf --v=2";
        "kubelet start"
    )]
    #[test_case(
        JoinPhase::ControlPlaneJoin,
        "join phase control-plane-join all --config=/kind/kubeadm.conf --v=2 \
         -k /kinder/patches --patches /kinder/patches";
        "control plane join"
    )]
    fn phase_args(phase: JoinPhase, expected: &str) {
        let options = JoinOptions {
            kustomize_dir: Some("/tmp/k".into()),
            patches_dir: Some("/tmp/p".into()),
            ..options()
        };
        assert_eq!(
            kubeadm_join_args(Some(phase), &options, Some(&v("v1.29.0"))).join(" "),
            expected
        );
    }

    #[test_case("v1.19.0", "--experimental-patches"; "before ga")]
    #[test_case("v1.21.9", "--experimental-patches"; "last experimental")]
    #[test_case("v1.22.0-alpha.1", "--patches"; "ga prerelease")]
    fn patches_flag_spelling(version: &str, flag: &str) {
        let options = JoinOptions {
            patches_dir: Some("/tmp/p".into()),
            ..options()
        };
        let args = kubeadm_join_args(None, &options, Some(&v(version)));
        assert!(args.contains(&flag.to_string()), "{args:?}");
    }

    #[test]
    fn no_patch_flags_without_version() {
        let options = JoinOptions {
            kustomize_dir: Some("/tmp/k".into()),
            ..options()
        };
        let args = kubeadm_join_args(None, &options, None);
        assert!(!args.contains(&"-k".to_string()));
    }
}
