pub mod provider_request;
pub mod proxy;

pub use provider_request::ProviderRequestRepository;
pub use proxy::{ProxyOrder, ProxyQuery, ProxyRepository, MANUAL_PROVIDER, MANUAL_VOTES};
