//! Investigation service adapters.

pub mod http_client;
pub mod mock;
pub mod retry;

pub use http_client::HttpInvestigationClient;
pub use mock::{MockInvestigationClient, MockScenario};
pub use retry::RetryPolicy;
