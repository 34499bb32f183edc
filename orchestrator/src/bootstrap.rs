/*!

The first-boot script of a single-node cluster. It installs a single-node Kubernetes
distribution, then the GitOps toolkit, and records the cluster name on the node and in a
`cluster-info` config map. The session manager agent is installed if the image lacks it. The
orchestrator treats the rendered script as opaque user data.

!*/

/// The GitOps components to install on the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub cluster: String,
    pub kubeconfig_path: String,
    /// Extra commands to run after the toolkit is installed.
    pub extra_commands: Vec<String>,
}

impl BootstrapOptions {
    pub fn new<S1, S2>(cluster: S1, kubeconfig_path: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            cluster: cluster.into(),
            kubeconfig_path: kubeconfig_path.into(),
            extra_commands: Vec::new(),
        }
    }
}

pub fn render(options: &BootstrapOptions) -> String {
    let extra = options.extra_commands.join("\n");
    format!(
        r#"#!/bin/bash
set -euxo pipefail
exec > >(tee /var/log/xstrapolate-bootstrap.log) 2>&1

CLUSTER_NAME="{cluster}"
export KUBECONFIG="{kubeconfig}"

dnf install -y --allowerasing curl tar

# Session manager access
if ! systemctl is-active --quiet amazon-ssm-agent; then
    dnf install -y amazon-ssm-agent
    systemctl enable --now amazon-ssm-agent
fi

# Kubernetes
curl -sfL https://get.k3s.io | \
    INSTALL_K3S_EXEC="--write-kubeconfig-mode 644 --node-name ${{CLUSTER_NAME}}" sh -
until kubectl get nodes >/dev/null 2>&1; do sleep 5; done
kubectl wait --for=condition=Ready node --all --timeout=300s

# GitOps toolkit
curl -s https://fluxcd.io/install.sh | bash
flux check --pre --kubeconfig "${{KUBECONFIG}}"
flux install --kubeconfig "${{KUBECONFIG}}"

cat > /tmp/cluster-info.yaml <<EOF
apiVersion: v1
kind: ConfigMap
metadata:
  name: cluster-info
  namespace: flux-system
data:
  cluster-name: "${{CLUSTER_NAME}}"
  created-by: "xstrapolate"
EOF
kubectl apply -f /tmp/cluster-info.yaml
{extra}
echo "${{CLUSTER_NAME}}" > /etc/xstrapolate-cluster
echo "xstrapolate bootstrap of ${{CLUSTER_NAME}} finished"
"#,
        cluster = options.cluster,
        kubeconfig = options.kubeconfig_path,
        extra = extra,
    )
}

#[test]
fn script_embeds_cluster_and_installer() {
    let script = render(&BootstrapOptions::new("demo", "/etc/rancher/k3s/k3s.yaml"));
    assert!(script.starts_with("#!/bin/bash"));
    assert!(script.contains("CLUSTER_NAME=\"demo\""));
    assert!(script.contains("export KUBECONFIG=\"/etc/rancher/k3s/k3s.yaml\""));
    assert!(script.contains("flux install --kubeconfig \"${KUBECONFIG}\""));
    assert!(script.contains("--node-name ${CLUSTER_NAME}"));
}

#[test]
fn script_keeps_session_access_and_records_the_cluster() {
    let script = render(&BootstrapOptions::new("demo", "/etc/rancher/k3s/k3s.yaml"));
    let agent = script.find("systemctl is-active --quiet amazon-ssm-agent").unwrap();
    let k3s = script.find("get.k3s.io").unwrap();
    assert!(agent < k3s);
    assert!(script.contains("dnf install -y amazon-ssm-agent"));

    let flux = script.find("flux install").unwrap();
    let info = script.find("name: cluster-info").unwrap();
    assert!(flux < info);
    assert!(script.contains("namespace: flux-system"));
    assert!(script.contains("cluster-name: \"${CLUSTER_NAME}\""));
    assert!(script.contains("created-by: \"xstrapolate\""));
    assert!(script.contains("kubectl apply -f /tmp/cluster-info.yaml"));
}

#[test]
fn script_appends_extra_commands() {
    let mut options = BootstrapOptions::new("demo", "/etc/rancher/k3s/k3s.yaml");
    options
        .extra_commands
        .push("flux create source git infra --url=https://example.com/infra".to_string());
    let script = render(&options);
    let flux = script.find("flux install").unwrap();
    let extra = script.find("flux create source").unwrap();
    assert!(flux < extra);
}
