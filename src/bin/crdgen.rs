use cluster_deletion::crd::Cluster;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Cluster::crd())?);
    Ok(())
}
