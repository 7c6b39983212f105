pub mod handler;
pub mod server;

pub use server::{CollectorServer, CollectorState, build_router};
