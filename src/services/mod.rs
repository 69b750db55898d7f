//! Services built on the repositories

pub mod proxies_list;

pub use proxies_list::{ProxiesList, SessionFilter, SessionState, SessionStats};
