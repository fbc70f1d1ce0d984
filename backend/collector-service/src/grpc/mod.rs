// gRPC module - exports server implementation

mod server;

pub use server::{collector, UserActionControllerImpl};

// Re-export proto types for convenience
pub use collector::user_action_controller_client::UserActionControllerClient;
pub use collector::user_action_controller_server::UserActionControllerServer;
