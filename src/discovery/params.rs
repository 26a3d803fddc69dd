use std::collections::HashSet;

use url::Url;

use crate::models::{ApiEndpoint, ParameterizedUrl};

/// Parameters that paginate or localize rather than feed application logic.
pub const NOISE_PARAMETERS: [&str; 4] = ["page", "limit", "offset", "lang"];

const API_MARKERS: [&str; 5] = ["/api/", "/v1/", "/v2/", "/rest/", "/graphql"];

fn is_noise(name: &str) -> bool {
    NOISE_PARAMETERS.iter().any(|noise| noise.eq_ignore_ascii_case(name))
}

/// Ordered, unique, non-noise query parameter names of `url`.
pub fn parameter_names(url: &Url) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (key, _) in url.query_pairs() {
        if key.is_empty() || is_noise(&key) || names.iter().any(|n| n.as_str() == &*key) {
            continue;
        }
        names.push(key.into_owned());
    }
    names
}

/// Keep the first URL per (host, path, sorted parameter names).
pub fn extract_parameterized_urls<'a, I>(urls: I) -> Vec<ParameterizedUrl>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen: HashSet<(String, String, Vec<String>)> = HashSet::new();
    let mut out = Vec::new();

    for raw in urls {
        let Ok(parsed) = Url::parse(raw) else {
            continue;
        };
        let parameters = parameter_names(&parsed);
        if parameters.is_empty() {
            continue;
        }

        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => continue,
        };
        let mut sorted = parameters.clone();
        sorted.sort();

        if seen.insert((host, parsed.path().to_string(), sorted)) {
            out.push(ParameterizedUrl { url: raw.clone(), parameters });
        }
    }
    out
}

/// URLs whose path looks like an API route.
pub fn classify_api_endpoints<'a, I>(urls: I) -> Vec<ApiEndpoint>
where
    I: IntoIterator<Item = &'a String>,
{
    urls.into_iter()
        .filter_map(|raw| {
            let path = Url::parse(raw).ok()?.path().to_ascii_lowercase();
            let marker = API_MARKERS.iter().find(|m| path.contains(*m))?;
            Some(ApiEndpoint { url: raw.clone(), marker: marker.to_string() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn set(urls: &[&str]) -> BTreeSet<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extraction_dedups_by_host_path_and_names() {
        let urls = set(&["http://a.test/?id=1", "http://a.test/?id=2&lang=en", "http://a.test/x?foo=bar"]);
        let result = extract_parameterized_urls(&urls);
        assert_eq!(
            result,
            vec![
                ParameterizedUrl { url: "http://a.test/?id=1".into(), parameters: vec!["id".into()] },
                ParameterizedUrl { url: "http://a.test/x?foo=bar".into(), parameters: vec!["foo".into()] },
            ]
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let urls = set(&["http://a.test/s?q=1&sort=asc", "http://a.test/s?sort=desc&q=2", "http://b.test/?x=1"]);
        let first = extract_parameterized_urls(&urls);
        let again = extract_parameterized_urls(&urls);
        assert_eq!(first, again);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_noise_parameters_dropped_case_insensitively() {
        let urls = set(&["http://a.test/list?PAGE=2&Limit=10&OffSet=5&LANG=de", "http://a.test/item?Page=1&id=4"]);
        let result = extract_parameterized_urls(&urls);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parameters, vec!["id"]);
    }

    #[test]
    fn test_parameter_names_are_unique_and_ordered() {
        let url = Url::parse("http://a.test/?b=1&a=2&b=3&=4").unwrap();
        assert_eq!(parameter_names(&url), vec!["b", "a"]);
    }

    #[test]
    fn test_explicit_port_is_part_of_the_key() {
        let urls = set(&["http://a.test/?id=1", "http://a.test:8080/?id=1"]);
        assert_eq!(extract_parameterized_urls(&urls).len(), 2);
    }

    #[test]
    fn test_classify_api_endpoints() {
        let urls = set(&["https://a.test/api/users", "https://a.test/V2/items", "https://a.test/about", "https://a.test/graphql"]);
        let endpoints = classify_api_endpoints(&urls);
        let markers: Vec<_> = endpoints.iter().map(|e| e.marker.as_str()).collect();
        assert_eq!(markers, vec!["/v2/", "/api/", "/graphql"]);
    }
}
