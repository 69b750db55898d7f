pub mod countries;
pub mod provider_request;
pub mod proxy;

pub use countries::*;
pub use provider_request::*;
pub use proxy::*;
