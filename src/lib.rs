pub mod config;
pub mod error;
pub mod generation;
pub mod model;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::ModelHandle;
pub use server::build_router;
pub use store::ConversationStore;
