use std::net::IpAddr;

/// Second-level labels that act as public suffixes under a country code,
/// e.g. `co.kr`, `com.cn`. Not a full public suffix list, but enough to keep
/// subdomain bucketing under the right apex for common registries.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "ac.cn", "com.cn", "edu.cn", "gov.cn", "net.cn", "org.cn",
    "ac.kr", "co.kr", "go.kr", "ne.kr", "or.kr", "re.kr",
    "ac.jp", "co.jp", "go.jp", "ne.jp", "or.jp",
    "ac.uk", "co.uk", "gov.uk", "ltd.uk", "me.uk", "net.uk", "org.uk", "plc.uk",
    "com.au", "edu.au", "gov.au", "net.au", "org.au",
    "co.nz", "govt.nz", "net.nz", "org.nz",
    "com.br", "gov.br", "net.br", "org.br",
    "com.hk", "edu.hk", "gov.hk", "net.hk", "org.hk",
    "com.tw", "edu.tw", "gov.tw", "net.tw", "org.tw",
    "com.sg", "edu.sg", "gov.sg", "net.sg", "org.sg",
    "co.in", "gov.in", "net.in", "org.in",
    "co.id", "go.id", "or.id",
    "co.za", "gov.za", "org.za",
    "com.mx", "gob.mx", "org.mx",
    "com.tr", "gov.tr", "org.tr",
    "com.ru", "org.ru",
    "co.il", "org.il",
    "co.th", "go.th", "in.th",
    "com.my", "gov.my", "org.my",
    "com.vn", "gov.vn",
    "com.ar", "gob.ar",
];

/// Returns the registrable domain (eTLD+1) for `hostname`.
///
/// IP literals and single-label names are returned unchanged.
pub fn root_domain(hostname: &str) -> String {
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels = host.split('.').collect::<Vec<_>>();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len().saturating_sub(keep)..].join(".")
}

/// True when `hostname` sits strictly below `root` (the apex itself is not a subdomain).
pub fn is_subdomain_of(hostname: &str, root: &str) -> bool {
    if root.is_empty() {
        return false;
    }
    let host = hostname.to_ascii_lowercase();
    let root = root.to_ascii_lowercase();
    host.len() > root.len() && host.ends_with(&format!(".{root}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_domain_plain() {
        assert_eq!(root_domain("www.example.com"), "example.com");
        assert_eq!(root_domain("a.b.example.com"), "example.com");
        assert_eq!(root_domain("example.com"), "example.com");
    }

    #[test]
    fn test_root_domain_multi_label_suffix() {
        assert_eq!(root_domain("witcher.kro.kr"), "kro.kr");
        assert_eq!(root_domain("shop.naver.co.kr"), "naver.co.kr");
        assert_eq!(root_domain("news.sina.com.cn"), "sina.com.cn");
        assert_eq!(root_domain("naver.co.kr"), "naver.co.kr");
    }

    #[test]
    fn test_root_domain_ip_and_single_label() {
        assert_eq!(root_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(root_domain("localhost"), "localhost");
        assert_eq!(root_domain("[::1]"), "[::1]");
    }

    #[test]
    fn test_is_subdomain_of() {
        assert!(is_subdomain_of("api.example.com", "example.com"));
        assert!(!is_subdomain_of("example.com", "example.com"));
        assert!(!is_subdomain_of("badexample.com", "example.com"));
        assert!(!is_subdomain_of("api.example.com", ""));
    }
}
