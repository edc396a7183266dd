// build.rs
fn main() {
    // Generate build info (consumed by `procwarden check` and the HTTP index)
    if let Err(e) = vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
    {
        println!("cargo:warning=Unable to generate build info: {e}");
    }

    println!("cargo:rerun-if-changed=data/policy-linux.toml");
    println!("cargo:rerun-if-changed=data/policy-windows.toml");
}
