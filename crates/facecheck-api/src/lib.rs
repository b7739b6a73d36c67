//! facecheck-api: HTTP front-end for face registration and check-in.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use engine::{spawn_engine, DecodedImage, DescriptorExtractor, EngineHandle};
pub use routes::create_router;
pub use state::AppState;
