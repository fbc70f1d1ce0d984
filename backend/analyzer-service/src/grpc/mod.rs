// gRPC module - exports server implementation

mod server;

pub use server::{recommendation, RecommendationsImpl};

// Re-export proto types for convenience
pub use recommendation::recommendations_controller_client::RecommendationsControllerClient;
pub use recommendation::recommendations_controller_server::RecommendationsControllerServer;
