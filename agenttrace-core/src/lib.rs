pub mod config;
pub mod domain;
pub mod error;
pub mod traits;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::*;
pub use traits::*;
