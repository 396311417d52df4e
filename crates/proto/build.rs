//! Build script for nodewatch-proto.
//!
//! Compiles the protobuf definitions into Rust code with tonic-build.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo::rerun-if-changed=../../proto/nodewatch/v1/nodewatch.proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../../proto/nodewatch/v1/nodewatch.proto"], &["../../proto"])?;

    Ok(())
}
