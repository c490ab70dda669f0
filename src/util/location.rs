//! Listener location syntax
//!
//! A location is an optional `tcp:`, `udp:` or `unix:` prefix (any case)
//! followed by an address or a filesystem path. No prefix means TCP.

use std::fmt;

/// Transport named by a location prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Unix,
}

impl Protocol {
    fn from_prefix(prefix: &str) -> Option<Self> {
        if prefix.eq_ignore_ascii_case("tcp") {
            Some(Self::Tcp)
        } else if prefix.eq_ignore_ascii_case("udp") {
            Some(Self::Udp)
        } else if prefix.eq_ignore_ascii_case("unix") {
            Some(Self::Unix)
        } else {
            None
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

/// A parsed listener location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub protocol: Protocol,
    /// Socket address for tcp/udp, filesystem path for unix
    pub address: String,
}

impl Location {
    /// Parse a location string. Never fails: anything without a known
    /// prefix is taken as a TCP address.
    pub fn parse(location: &str) -> Self {
        if let Some((prefix, rest)) = location.split_once(':') {
            if let Some(protocol) = Protocol::from_prefix(prefix) {
                return Self {
                    protocol,
                    address: rest.to_string(),
                };
            }
        }
        Self {
            protocol: Protocol::Tcp,
            address: location.to_string(),
        }
    }

    /// Port embedded in a tcp/udp address, if any
    pub fn port(&self) -> Option<u16> {
        if self.protocol == Protocol::Unix {
            return None;
        }
        let addr = self.address.as_str();
        let port = if let Some(rest) = addr.strip_prefix('[') {
            rest.split_once("]:")?.1
        } else {
            let (host, port) = addr.rsplit_once(':')?;
            if host.contains(':') {
                return None;
            }
            port
        };
        port.parse().ok()
    }

    /// Address in a form `tokio::net::TcpListener::bind` accepts.
    /// A bare `:port` binds every interface.
    pub fn bind_address(&self) -> String {
        if self.address.starts_with(':') {
            format!("0.0.0.0{}", self.address)
        } else {
            self.address.clone()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocol_is_tcp() {
        let loc = Location::parse("127.0.0.1:1965");
        assert_eq!(loc.protocol, Protocol::Tcp);
        assert_eq!(loc.address, "127.0.0.1:1965");
        assert_eq!(loc.port(), Some(1965));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let loc = Location::parse("UNIX:/run/bergelmir.sock");
        assert_eq!(loc.protocol, Protocol::Unix);
        assert_eq!(loc.address, "/run/bergelmir.sock");
        assert_eq!(loc.port(), None);

        assert_eq!(Location::parse("Udp:0.0.0.0:53").protocol, Protocol::Udp);
        assert_eq!(Location::parse("tcp:[::1]:1965").port(), Some(1965));
    }

    #[test]
    fn test_missing_port() {
        assert_eq!(Location::parse("localhost").port(), None);
        assert_eq!(Location::parse("::1").port(), None);
    }

    #[test]
    fn test_bare_port_binds_all_interfaces() {
        assert_eq!(Location::parse(":1965").bind_address(), "0.0.0.0:1965");
        assert_eq!(Location::parse(":1965").port(), Some(1965));
    }
}
