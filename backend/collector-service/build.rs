fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile proto files
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["../proto/services/collector_service.proto"],
            &["../proto/services"],
        )?;
    Ok(())
}
