use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    let protos: Vec<PathBuf> = [
        "envoy/service/discovery/v3/ads.proto",
        "federation/v1alpha1/exported_service.proto",
        "federation/mesh/v1alpha1/mesh.proto",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    // Fall back to the vendored protoc when the host does not provide one.
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;
        std::env::set_var("PROTOC", protoc);
    }
    let well_known = protoc_bin_vendored::include_path()
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;

    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    let mut config = prost_build::Config::new();
    config.disable_comments(["."]);
    // Map fields encode in key order so identical snapshots are byte-identical.
    config.btree_map(["."]);
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            ".federation",
            "#[derive(serde::Serialize)]\n#[serde(rename_all = \"camelCase\")]",
        )
        .field_attribute(
            ".federation.mesh.v1alpha1.PatchValue.filter_chain_match",
            "#[serde(rename = \"filter_chain_match\")]",
        )
        .field_attribute(
            ".federation.mesh.v1alpha1.ServerNamesMatch.server_names",
            "#[serde(rename = \"server_names\")]",
        )
        .include_file("mod.rs")
        .compile_protos_with_config(config, &protos, &[PathBuf::from("."), well_known])?;
    Ok(())
}
