//! Canonical CIDR subnets.

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

use crate::BouncerError;

/// A subnet in canonical form: host bits zeroed, prefix length kept.
///
/// `192.168.1.5/24` and `192.168.1.1/24` both canonicalize to `192.168.1.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subnet(IpNet);

impl Subnet {
    /// Parse CIDR text. A bare address without `/prefix` is rejected.
    pub fn parse(input: &str) -> Result<Self, BouncerError> {
        let net = input
            .trim()
            .parse::<IpNet>()
            .map_err(|e| BouncerError::invalid_subnet(input, e))?;
        Ok(Self(net.trunc()))
    }

    /// Whether `ip` falls inside this subnet. IPv4-mapped IPv6 addresses match IPv4 subnets.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip.to_canonical())
    }

    /// Whether either subnet contains the other.
    pub fn overlaps(&self, other: &Subnet) -> bool {
        self.0.contains(&other.0) || other.0.contains(&self.0)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parse an IP address, folding IPv4-mapped IPv6 to IPv4.
pub fn parse_ip(input: &str) -> Result<IpAddr, BouncerError> {
    input
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| BouncerError::InvalidIp(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_bits_are_masked() {
        assert_eq!(Subnet::parse("192.168.1.5/24").unwrap().to_string(), "192.168.1.0/24");
        assert_eq!(Subnet::parse("192.168.1.1/24").unwrap(), Subnet::parse("192.168.1.0/24").unwrap());
        assert_eq!(Subnet::parse(" 10.0.0.5/24 ").unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(Subnet::parse("10.1.2.3/32").unwrap().to_string(), "10.1.2.3/32");
        assert_eq!(Subnet::parse("2001:db8:aa::1/32").unwrap().to_string(), "2001:db8::/32");
    }

    #[test]
    fn canonical_form_is_idempotent() {
        let once = Subnet::parse("172.16.33.9/12").unwrap();
        let twice = Subnet::parse(&once.to_string()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.to_string(), "172.16.0.0/12");
    }

    #[test]
    fn rejects_malformed_cidr() {
        for bad in ["", "1.2.3.4", "1.2.3.0/33", "300.1.1.0/24", "abc/8", "1.2.3.0/"] {
            let err = Subnet::parse(bad).unwrap_err();
            assert!(err.is_input_error(), "{bad:?} should be an input error");
        }
    }

    #[test]
    fn containment() {
        let net = Subnet::parse("192.168.1.0/24").unwrap();
        assert!(net.contains(parse_ip("192.168.1.200").unwrap()));
        assert!(!net.contains(parse_ip("192.168.2.1").unwrap()));
        assert!(!net.contains(parse_ip("2001:db8::1").unwrap()));
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_subnet() {
        let net = Subnet::parse("1.2.3.0/24").unwrap();
        let mapped: IpAddr = "::ffff:1.2.3.4".parse().unwrap();
        assert!(net.contains(mapped));
        assert_eq!(parse_ip("::ffff:1.2.3.4").unwrap().to_string(), "1.2.3.4");
    }

    #[test]
    fn overlap_is_symmetric() {
        let wide = Subnet::parse("10.0.0.0/8").unwrap();
        let narrow = Subnet::parse("10.20.0.0/16").unwrap();
        let apart = Subnet::parse("11.0.0.0/8").unwrap();
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&apart));
    }

    #[test]
    fn rejects_malformed_ip() {
        assert!(matches!(parse_ip("999.0.0.1"), Err(BouncerError::InvalidIp(_))));
        assert!(parse_ip("").is_err());
    }
}
