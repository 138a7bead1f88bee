use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

const SCHEME: &str = "tcp://";

/// A TCP endpoint, written `tcp://host:port`.
///
/// Host `*` or `0.0.0.0` binds every interface. Port `0` asks the bind to
/// pick an ephemeral port; the bound socket reports the resolved one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Loopback endpoint on `port`.
    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// Endpoint covering every local interface on `port`.
    pub fn any(port: u16) -> Self {
        Self::new("*", port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same host, different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    pub fn is_wildcard_host(&self) -> bool {
        self.host == "*" || self.host == "0.0.0.0"
    }

    /// Address string handed to a bind call.
    pub(crate) fn bind_address(&self) -> String {
        let host = if self.is_wildcard_host() {
            "*"
        } else {
            self.host.as_str()
        };
        if self.port == 0 {
            format!("{SCHEME}{host}:*")
        } else {
            format!("{SCHEME}{host}:{}", self.port)
        }
    }

    /// Address string handed to a connect call. Wildcard hosts and port 0
    /// cannot be connected to.
    pub fn connect_address(&self) -> Result<String, TransportError> {
        if self.port == 0 || self.is_wildcard_host() {
            return Err(TransportError::InvalidEndpoint(self.to_string()));
        }
        Ok(self.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(input.to_string());
        let trimmed = input.trim();

        let rest = match trimmed.strip_prefix(SCHEME) {
            Some(rest) => rest,
            None if trimmed.contains("://") => return Err(invalid()),
            None => trimmed,
        };

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = if port == "*" {
            0
        } else {
            port.parse::<u16>().map_err(|_| invalid())?
        };

        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_scheme() {
        let a: Endpoint = "tcp://192.168.1.20:5556".parse().unwrap();
        let b: Endpoint = "192.168.1.20:5556".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.host(), "192.168.1.20");
        assert_eq!(a.port(), 5556);
    }

    #[test]
    fn display_roundtrips() {
        let ep = Endpoint::new("robot.local", 5555);
        assert_eq!(ep.to_string(), "tcp://robot.local:5555");
        assert_eq!(ep.to_string().parse::<Endpoint>().unwrap(), ep);
    }

    #[test]
    fn wildcard_port_parses_as_zero() {
        let ep: Endpoint = "tcp://127.0.0.1:*".parse().unwrap();
        assert_eq!(ep.port(), 0);
        assert_eq!(ep.bind_address(), "tcp://127.0.0.1:*");
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!("ipc:///tmp/sock:1".parse::<Endpoint>().is_err());
        assert!("localhost".parse::<Endpoint>().is_err());
        assert!(":5555".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn bind_address_normalizes_wildcard_host() {
        assert_eq!(Endpoint::any(5555).bind_address(), "tcp://*:5555");
        assert_eq!(
            Endpoint::new("0.0.0.0", 5555).bind_address(),
            "tcp://*:5555"
        );
    }

    #[test]
    fn connect_address_rejects_unresolved_endpoints() {
        assert!(Endpoint::any(5555).connect_address().is_err());
        assert!(Endpoint::localhost(0).connect_address().is_err());
        assert_eq!(
            Endpoint::localhost(5555).connect_address().unwrap(),
            "tcp://127.0.0.1:5555"
        );
    }
}
