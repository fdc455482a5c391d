//! Prints the CRD manifests for every resource in this crate as a
//! multi-document YAML stream.
//!
//! ```text
//! cargo run -p crds --bin crdgen > deploy/crds.yaml
//! ```

use crds::{FeatureGate, KubeletConfig, MachineConfig, MachineConfigPool};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        MachineConfigPool::crd(),
        KubeletConfig::crd(),
        FeatureGate::crd(),
        MachineConfig::crd(),
    ];

    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }

    Ok(())
}
