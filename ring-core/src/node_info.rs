use serde::{Deserialize, Serialize};

/// Immutable coordinates of a ring member.
///
/// `socket_host`/`socket_port` are stored separately from `http_host`
/// because the peer channel runs on its own port; the host portion is
/// derived from `http_host` by the caller that first learns of a peer
/// (see `NodeInfo::from_http_host`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: u64,
    pub http_host: String,
    pub socket_host: String,
    pub socket_port: u16,
}

impl NodeInfo {
    pub fn new(node_id: u64, http_host: impl Into<String>, socket_host: impl Into<String>, socket_port: u16) -> Self {
        NodeInfo {
            node_id,
            http_host: http_host.into(),
            socket_host: socket_host.into(),
            socket_port,
        }
    }

    /// Builds a `NodeInfo` from an HTTP host URL plus a separately-known
    /// peer port, stripping the scheme and any port from `http_host` to
    /// get the bare host used for the socket connection.
    pub fn from_http_host(node_id: u64, http_host: impl Into<String>, socket_port: u16) -> Self {
        let http_host = http_host.into();
        let socket_host = bare_host(&http_host);
        NodeInfo {
            node_id,
            http_host,
            socket_host,
            socket_port,
        }
    }

    pub fn socket_addr(&self) -> (String, u16) {
        (self.socket_host.clone(), self.socket_port)
    }
}

/// Strips a `scheme://` prefix and any trailing `:port` from a URL-like
/// host string, e.g. `http://10.0.0.1:8000` -> `10.0.0.1`.
fn bare_host(url: &str) -> String {
    let without_scheme = url.split("://").last().unwrap_or(url);
    match without_scheme.rsplit_once(':') {
        Some((host, _port)) => host.to_string(),
        None => without_scheme.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_port() {
        let info = NodeInfo::from_http_host(1, "http://192.168.56.103:8000", 9001);
        assert_eq!(info.socket_host, "192.168.56.103");
        assert_eq!(info.socket_addr(), ("192.168.56.103".to_string(), 9001));
    }

    #[test]
    fn bare_host_without_scheme() {
        assert_eq!(bare_host("127.0.0.1:8000"), "127.0.0.1");
        assert_eq!(bare_host("127.0.0.1"), "127.0.0.1");
    }
}
