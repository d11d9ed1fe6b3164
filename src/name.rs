//! Domain name canonicalisation. Names coming off the wire are lower cased
//! without a trailing dot; the hosts database, the cache and the routing
//! table key on the lower cased, dot terminated form.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Lower cased, dot terminated form of `name`.
pub fn canonical(name: &str) -> String {
    let name = name.to_lowercase();
    if name.ends_with('.') {
        name
    } else {
        format!("{name}.")
    }
}

/// Lower cased form of `name` without the trailing dot, as it appears in a
/// message.
pub fn wire(name: &str) -> String {
    let name = name.to_lowercase();
    name.strip_suffix('.').map(str::to_string).unwrap_or(name)
}

/// Canonical form of a user supplied name, or `None` when it cannot be a
/// domain name.
pub fn canonicalize(name: &str) -> Option<String> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return None;
    }
    let valid = trimmed.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });
    valid.then(|| canonical(name))
}

/// Number of labels, the root excluded.
pub fn label_count(name: &str) -> usize {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        0
    } else {
        name.split('.').count()
    }
}

/// Address encoded in a reverse lookup name, either the dotted octets of
/// `in-addr.arpa.` or the nibbles of `ip6.arpa.`.
pub fn reverse_address(qname: &str) -> Option<IpAddr> {
    let qname = canonical(qname);
    if let Some(rest) = qname.strip_suffix(".in-addr.arpa.") {
        let mut octets = [0u8; 4];
        let mut parts = rest.split('.');
        // reversed on the wire, least significant octet first
        for octet in octets.iter_mut().rev() {
            *octet = parts.next()?.parse().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    if let Some(rest) = qname.strip_suffix(".ip6.arpa.") {
        let mut value: u128 = 0;
        let mut count = 0;
        // reversed on the wire, least significant nibble first
        for nibble in rest.split('.') {
            if nibble.len() != 1 || count >= 32 {
                return None;
            }
            let digit = u128::from_str_radix(nibble, 16).ok()?;
            value |= digit << (count * 4);
            count += 1;
        }
        if count != 32 {
            return None;
        }
        return Some(IpAddr::V6(Ipv6Addr::from(value)));
    }
    None
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn should_canonicalise_case_and_dot() {
        assert_eq!(super::canonical("Example.COM"), "example.com.");
        assert_eq!(super::canonical("example.com."), "example.com.");
        assert_eq!(super::wire("Example.COM."), "example.com");
    }

    #[test]
    fn should_validate_user_supplied_names() {
        assert_eq!(
            super::canonicalize("corp.example"),
            Some("corp.example.".to_string())
        );
        assert_eq!(super::canonicalize(""), None);
        assert_eq!(super::canonicalize("foo..bar"), None);
        assert_eq!(super::canonicalize("foo bar"), None);
    }

    #[test]
    fn should_count_labels() {
        assert_eq!(super::label_count("db"), 1);
        assert_eq!(super::label_count("db.svc.local."), 3);
        assert_eq!(super::label_count("."), 0);
    }

    #[test]
    fn should_reverse_ipv4_names() {
        assert_eq!(
            super::reverse_address("5.0.0.10.in-addr.arpa."),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        );
        assert_eq!(super::reverse_address("5.0.10.in-addr.arpa."), None);
        assert_eq!(super::reverse_address("foo.example.com."), None);
    }

    #[test]
    fn should_reverse_ipv6_names() {
        let qname = "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa.";
        assert_eq!(
            super::reverse_address(qname),
            Some(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
        assert_eq!(super::reverse_address("1.0.0.ip6.arpa."), None);
    }
}
