//! CRD YAML Generator
//!
//! Prints the Jaeger CRD manifest.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/jaegertracing.io_jaegers.yaml

use jaeger_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
