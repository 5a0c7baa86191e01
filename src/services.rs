/// Well-known service labels for the default port set.
const SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (135, "RPC"),
    (139, "NetBIOS"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "SQL Server"),
    (1521, "Oracle"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (8080, "HTTP Proxy"),
];

/// Best-effort service label for a TCP port. Returns `"Unknown"` for unlisted ports.
pub fn service_name(port: u16) -> &'static str {
    SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|idx| SERVICES[idx].1)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_for_lookup() {
        assert!(SERVICES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn known_and_unknown_ports() {
        assert_eq!(service_name(22), "SSH");
        assert_eq!(service_name(8080), "HTTP Proxy");
        assert_eq!(service_name(1433), "SQL Server");
        assert_eq!(service_name(31337), "Unknown");
    }
}
