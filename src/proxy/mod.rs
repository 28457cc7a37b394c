pub mod forwarder;

pub use forwarder::{build_proxy_client, ProxyClient, ReverseProxyForward};
