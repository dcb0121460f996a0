// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// A listen address in `host:port` form.
///
/// Flag values come in three shapes, all normalized at parse time:
///  - `"5678"` (a bare port) becomes `":5678"`
///  - `":5678"` stays as-is and binds every interface
///  - `"127.0.0.1:1234"` stays as-is
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPort(String);

impl HostPort {
    /// Returns true when no endpoint was configured at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve to a bindable socket address. An empty host binds all
    /// interfaces.
    pub fn to_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        anyhow::ensure!(!self.0.is_empty(), "no host-port configured");
        let candidate = match self.0.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.0.clone(),
        };
        candidate
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("host-port '{}' did not resolve", self.0))
    }
}

impl FromStr for HostPort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(HostPort(String::new()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let port: u16 = s.parse()?;
            return Ok(HostPort(format!(":{port}")));
        }
        anyhow::ensure!(
            s.contains(':'),
            "host-port '{s}' is neither a port nor host:port"
        );
        Ok(HostPort(s.to_string()))
    }
}

impl Display for HostPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_port_gets_colon_prefix() {
        let hp: HostPort = "5678".parse().unwrap();
        assert_eq!(":5678", hp.as_str());
    }

    #[test]
    fn test_host_and_port_pass_through() {
        for case in ["127.0.0.1:1234", "0.0.0.0:3456", ":9411"] {
            let hp: HostPort = case.parse().unwrap();
            assert_eq!(case, hp.as_str());
        }
    }

    #[test]
    fn test_empty_is_disabled() {
        let hp: HostPort = "".parse().unwrap();
        assert!(hp.is_empty());
        assert!(hp.to_socket_addr().is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!("not a port".parse::<HostPort>().is_err());
        assert!("99999".parse::<HostPort>().is_err());
    }

    #[test]
    fn test_socket_addr_binds_all_interfaces_without_host() {
        let hp: HostPort = "5678".parse().unwrap();
        let addr = hp.to_socket_addr().unwrap();
        assert_eq!("0.0.0.0:5678", addr.to_string());
    }
}
