//! Request query-string helpers.

use url::form_urlencoded;

/// Parse a raw query string into decoded key/value pairs, in order.
///
/// A leading `?` is ignored. A bare key (`?wsdl`) yields an empty value.
pub fn parse_query_string(raw: &str) -> Vec<(String, String)> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    form_urlencoded::parse(raw.as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// First value for `key`, compared ASCII case-insensitively.
pub fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let pairs = parse_query_string("?wsdl&id=5&name=a%20b&=x&flag=");
        assert_eq!(
            pairs,
            vec![
                ("wsdl".to_string(), String::new()),
                ("id".to_string(), "5".to_string()),
                ("name".to_string(), "a b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
        assert!(parse_query_string("").is_empty());
    }

    #[test]
    fn test_query_value_case_insensitive() {
        let pairs = parse_query_string("Format=xml&format=json");
        assert_eq!(query_value(&pairs, "FORMAT"), Some("xml"));
        assert_eq!(query_value(&pairs, "missing"), None);
    }
}
