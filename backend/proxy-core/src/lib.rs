pub mod config;
pub mod error;
pub mod logger;
pub mod provider;
pub mod proxy;

#[cfg(test)]
mod tests;

pub use proxy::{EventReceiver, Proxy, ProxyEvent, ProxyState, WatchExit};

pub const PROXY_URL_SCHEME: &str = "https";
// TODO: make the scheme part of ProxyConfig once non-TLS listeners are exposed
pub const PROXY_URL_PREFIX: &str = const_format::concatcp!(PROXY_URL_SCHEME, "://");
