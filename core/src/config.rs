//! Explicit configuration records.
//!
//! Spec §9 singles out the source's dynamic named-parameter configuration
//! keys (`PORT`, `BINDTO`, ...) as a pattern to re-architect into a closed,
//! validated Rust record. [`PluginConfig`] is that record: every key the
//! source recognized becomes a documented, typed, defaulted field. No
//! concrete plugin ships with this core (spec §1 Non-goals), but the
//! contract a plugin's configuration must satisfy does.
use std::net::IpAddr;
use std::time::Duration;

/// Configuration accepted by a wire-protocol plugin at initialization.
///
/// Every field corresponds 1:1 to one of the recognized keys in spec §9:
/// `PORT, BINDTO, BINDTO6, EXTERNAL_HOSTNAME, USE_IPv4, USE_IPv6,
/// MAX_CONNECTIONS, FILTER, EMAIL, MTU, RATELIMIT, SERVER, PIPE, TIMEOUT`.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    /// `PORT`: the local port the plugin should bind to, if applicable.
    pub port: Option<u16>,
    /// `BINDTO`: the local IPv4 address to bind to.
    pub bindto: Option<IpAddr>,
    /// `BINDTO6`: the local IPv6 address to bind to.
    pub bindto6: Option<IpAddr>,
    /// `EXTERNAL_HOSTNAME`: the hostname peers should use to reach us.
    pub external_hostname: Option<String>,
    /// `USE_IPv4`: whether IPv4 is enabled for this plugin.
    pub use_ipv4: bool,
    /// `USE_IPv6`: whether IPv6 is enabled for this plugin.
    pub use_ipv6: bool,
    /// `MAX_CONNECTIONS`: the maximum number of concurrent sessions.
    pub max_connections: u32,
    /// `FILTER`: an opaque address-filter expression, plugin-interpreted.
    pub filter: Option<String>,
    /// `EMAIL`: the mail address used by mail-based plugins.
    pub email: Option<String>,
    /// `MTU`: the maximum transmission unit in bytes, if bounded.
    pub mtu: Option<u32>,
    /// `RATELIMIT`: the inbound rate limit in bytes/ms (spec §4.8).
    pub ratelimit: Option<u32>,
    /// `SERVER`: an upstream relay server address, for plugins that need one.
    pub server: Option<String>,
    /// `PIPE`: a local named pipe path, for plugins using pipe dispatch.
    pub pipe: Option<String>,
    /// `TIMEOUT`: a plugin-specific operation timeout.
    pub timeout: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            port: None,
            bindto: None,
            bindto6: None,
            external_hostname: None,
            use_ipv4: true,
            use_ipv6: true,
            max_connections: 128,
            filter: None,
            email: None,
            mtu: None,
            ratelimit: None,
            server: None,
            pipe: None,
            timeout: Duration::from_secs(30),
        }
    }
}
