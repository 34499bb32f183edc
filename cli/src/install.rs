use anyhow::{anyhow, Result};
use cloud_utils::run_command;
use log::info;
use orchestrator::ClusterDescriptor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Write a kubeconfig for a managed cluster and install the GitOps toolkit into it. Any command
/// exiting non-zero fails the install.
pub(crate) fn install_gitops(cluster: &ClusterDescriptor, region: &str) -> Result<()> {
    let kubeconfig = expand_home(&cluster.credential_path)?;
    info!(
        "Writing kubeconfig for '{}' to '{}'",
        cluster.name,
        kubeconfig.display()
    );
    run_command(
        Command::new("aws")
            .args(["eks", "update-kubeconfig", "--name", &cluster.name])
            .args(["--region", region])
            .arg("--kubeconfig")
            .arg(&kubeconfig),
        "aws eks update-kubeconfig",
    )?;

    info!("Checking cluster prerequisites");
    run_command(flux(&kubeconfig).args(["check", "--pre"]), "flux check --pre")?;

    info!("Installing the GitOps toolkit");
    run_command(flux(&kubeconfig).arg("install"), "flux install")?;
    info!("GitOps toolkit installed into '{}'", cluster.name);
    Ok(())
}

fn flux(kubeconfig: &Path) -> Command {
    let mut command = Command::new("flux");
    command.arg("--kubeconfig").arg(kubeconfig);
    command
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| anyhow!("Unable to determine the home directory")),
        None => Ok(PathBuf::from(path)),
    }
}

#[test]
fn home_is_expanded() {
    let home = dirs::home_dir().unwrap();
    assert_eq!(
        expand_home("~/.kube/config-demo").unwrap(),
        home.join(".kube/config-demo")
    );
    assert_eq!(
        expand_home("/etc/rancher/k3s/k3s.yaml").unwrap(),
        PathBuf::from("/etc/rancher/k3s/k3s.yaml")
    );
}
