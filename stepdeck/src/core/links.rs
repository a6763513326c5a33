//! URL building for browser-facing actions.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Append `params` to `url_or_route` as a form-encoded query string.
pub fn with_query(url_or_route: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return url_or_route.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let separator = if url_or_route.contains('?') { '&' } else { '?' };
    format!("{url_or_route}{separator}{query}")
}

/// Decide which URL a `VisitUrl` action targets.
///
/// Without `use_proxy` the input is returned untouched. With it, an explicit
/// `host` wins, then the configured proxy host, then the literal input.
pub fn resolve_visit_url(
    url_or_path: &str,
    use_proxy: bool,
    host: Option<&str>,
    proxy_host: Option<&str>,
) -> String {
    if !use_proxy {
        return url_or_path.to_string();
    }
    let chosen = host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .or_else(|| proxy_host.map(str::trim).filter(|h| !h.is_empty()));
    match chosen {
        Some(base) => join_host(base, url_or_path),
        None => url_or_path.to_string(),
    }
}

fn join_host(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{host}{path}")
    } else {
        format!("{host}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_encoded_and_appended() {
        let params = BTreeMap::from([
            ("q".to_string(), "a b".to_string()),
            ("page".to_string(), "2".to_string()),
        ]);
        assert_eq!(with_query("/search", &params), "/search?page=2&q=a+b");
        assert_eq!(with_query("/search?x=1", &params), "/search?x=1&page=2&q=a+b");
    }

    #[test]
    fn explicit_host_wins_and_trailing_slash_is_trimmed() {
        let url = resolve_visit_url("/admin", true, Some("https://demo.test/"), Some("http://proxy"));
        assert_eq!(url, "https://demo.test/admin");
    }

    #[test]
    fn proxy_host_is_used_when_no_explicit_host() {
        let url = resolve_visit_url("admin", true, None, Some("http://proxy:7080"));
        assert_eq!(url, "http://proxy:7080/admin");
    }

    #[test]
    fn literal_input_without_proxy() {
        assert_eq!(resolve_visit_url("/admin", false, Some("http://h"), None), "/admin");
        assert_eq!(resolve_visit_url("/admin", true, Some("  "), None), "/admin");
    }
}
