pub mod config;
pub mod error;
pub mod relay;

pub use error::{ProtocolError, RelayError};
pub type Result<T> = std::result::Result<T, RelayError>;
pub use config::Settings;

pub use relay::{Connection, ConnectionRegistry, RelayServer};
