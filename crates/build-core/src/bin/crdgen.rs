use build_core::crds::BuildRequest;
use kube::CustomResourceExt;

/// Prints the BuildRequest CRD, e.g. `cargo run --bin crdgen | kubectl apply -f -`
fn main() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&BuildRequest::crd())?);
    Ok(())
}
