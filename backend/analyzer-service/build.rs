fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile proto files
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["../proto/services/recommendation_service.proto"],
            &["../proto/services"],
        )?;
    println!("cargo:rerun-if-changed=migrations");
    Ok(())
}
