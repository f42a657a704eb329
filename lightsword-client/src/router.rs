//! Per-connection routing: straight to the destination or through the relay

use crate::config::{ProxyMode, ServerConfig};

/// Relay addresses that mean the relay runs on this machine
const LOCAL_SERVERS: [&str; 3] = ["127.0.0.1", "localhost", "::1"];

/// Destination fragments treated as private/loopback when bypassing.
///
/// Matched by substring, not by prefix or CIDR: `10.` also matches
/// `8.110.2.3` and `172.16.` matches `172.16.example.com`.
const LOCAL_AREAS: [&str; 7] = [
    "10.",
    "192.168.",
    "localhost",
    "127.0.0.1",
    "172.16.",
    "::1",
    "169.254.0.0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Relay,
}

#[derive(Debug, Clone)]
pub struct Router {
    relay_is_local: bool,
    bypass_local: bool,
    mode: ProxyMode,
    black_list: Vec<String>,
    white_list: Vec<String>,
}

impl Router {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            relay_is_local: LOCAL_SERVERS
                .iter()
                .any(|s| config.server_addr.contains(s)),
            bypass_local: config.bypass_local,
            mode: config.proxy_mode,
            black_list: config.black_list.clone(),
            white_list: config.white_list.clone(),
        }
    }

    pub fn route(&self, host: &str) -> Route {
        if self.relay_is_local {
            return Route::Direct;
        }
        if self.bypass_local && LOCAL_AREAS.iter().any(|s| host.contains(s)) {
            return Route::Direct;
        }

        match self.mode {
            ProxyMode::Blacklist if matches_suffix(&self.black_list, host) => Route::Direct,
            ProxyMode::Whitelist if matches_suffix(&self.white_list, host) => Route::Relay,
            // unlisted hosts take the relay default in every mode
            ProxyMode::Global | ProxyMode::Blacklist | ProxyMode::Whitelist => Route::Relay,
        }
    }
}

fn matches_suffix(list: &[String], host: &str) -> bool {
    list.iter().any(|suffix| host.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: ProxyMode) -> ServerConfig {
        let mut c = ServerConfig::new("relay.example.net", 8900, "pw");
        c.proxy_mode = mode;
        c.black_list = vec!["cn".into(), "intranet.corp".into()];
        c.white_list = vec!["google.com".into()];
        c
    }

    #[test]
    fn test_local_relay_goes_direct() {
        for addr in ["127.0.0.1", "localhost", "::1"] {
            let mut c = config(ProxyMode::Global);
            c.server_addr = addr.into();
            assert_eq!(Router::new(&c).route("example.com"), Route::Direct);
        }
    }

    #[test]
    fn test_bypass_local_any_mode() {
        for mode in [ProxyMode::Global, ProxyMode::Blacklist, ProxyMode::Whitelist] {
            let router = Router::new(&config(mode));
            for host in [
                "10.0.0.8",
                "192.168.1.1",
                "172.16.4.4",
                "169.254.0.0",
                "localhost",
                "127.0.0.1",
                "::1",
            ] {
                assert_eq!(router.route(host), Route::Direct, "{host} in {mode:?}");
            }
        }
    }

    #[test]
    fn test_bypass_is_substring_match() {
        let router = Router::new(&config(ProxyMode::Global));
        assert_eq!(router.route("8.110.2.3"), Route::Direct);
        assert_eq!(router.route("172.16.example.com"), Route::Direct);
        assert_eq!(router.route("host10.example.com"), Route::Direct);
        // "172.16." is not a substring of "172.160."
        assert_eq!(router.route("172.160.1.1"), Route::Relay);
        assert_eq!(router.route("8.8.8.8"), Route::Relay);
    }

    #[test]
    fn test_bypass_disabled() {
        let mut c = config(ProxyMode::Global);
        c.bypass_local = false;
        assert_eq!(Router::new(&c).route("192.168.1.1"), Route::Relay);
    }

    #[test]
    fn test_blacklist_suffix_goes_direct() {
        let router = Router::new(&config(ProxyMode::Blacklist));
        assert_eq!(router.route("www.baidu.cn"), Route::Direct);
        assert_eq!(router.route("git.intranet.corp"), Route::Direct);
        assert_eq!(router.route("example.com"), Route::Relay);
    }

    #[test]
    fn test_whitelist_and_global() {
        let router = Router::new(&config(ProxyMode::Whitelist));
        assert_eq!(router.route("mail.google.com"), Route::Relay);
        assert_eq!(router.route("example.org"), Route::Relay);
        // blacklist entries have no effect outside blacklist mode
        assert_eq!(router.route("www.baidu.cn"), Route::Relay);

        let router = Router::new(&config(ProxyMode::Global));
        assert_eq!(router.route("www.baidu.cn"), Route::Relay);
    }

    #[test]
    fn test_empty_lists_match_nothing() {
        let mut c = config(ProxyMode::Blacklist);
        c.black_list.clear();
        assert_eq!(Router::new(&c).route("www.baidu.cn"), Route::Relay);
    }
}
