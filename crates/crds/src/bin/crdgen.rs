//! Prints the CRD manifests as a multi-document YAML stream.

use crds::{ClusterTemplate, ProvisioningRequest};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [ProvisioningRequest::crd(), ClusterTemplate::crd()];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
