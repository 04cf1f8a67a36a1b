pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod providers;
pub mod stream;
pub mod translate;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use generator::{CompatContentGenerator, ContentGenerator};
pub use logging::CallLog;
pub use providers::{ProviderKind, ResolvedProvider};
pub use stream::ResponseStream;
