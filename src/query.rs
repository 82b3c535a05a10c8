use std::fmt;

use url::form_urlencoded;


/// A decoded query string preserving parameter order
///
/// Keys and values are stored percent-decoded; `encode()` re-encodes
/// with the `application/x-www-form-urlencoded` rules (unreserved
/// characters literal, space as `+`). Duplicate keys are kept, lookups
/// return the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryString {
    params: Vec<(String, String)>,
}

impl QueryString {
    pub fn new() -> QueryString {
        QueryString { params: Vec::new() }
    }

    /// Decodes `a=b&c=d`; accepts both `+` and `%20` for space
    pub fn decode(raw: &str) -> QueryString {
        let params = form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        QueryString { params: params }
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.params.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| &v[..])
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn iter(&self) -> ::std::slice::Iter<(String, String)> {
        self.params.iter()
    }

    /// Re-encodes into canonical `k=v&k2=v2` form
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for &(ref k, ref v) in &self.params {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod test {
    use super::QueryString;

    #[test]
    fn decode_basics() {
        let q = QueryString::decode("a=1&b=two&a=3");
        assert_eq!(q.len(), 3);
        assert_eq!(q.get("a"), Some("1"));
        assert_eq!(q.get("b"), Some("two"));
        assert_eq!(q.get("missing"), None);
    }

    #[test]
    fn decode_escapes() {
        let q = QueryString::decode("name=hello+world&x=%41%42");
        assert_eq!(q.get("name"), Some("hello world"));
        assert_eq!(q.get("x"), Some("AB"));
        let q = QueryString::decode("sp=a%20b");
        assert_eq!(q.get("sp"), Some("a b"));
    }

    #[test]
    fn encode_round_trip() {
        for canonical in &["a=1&b=two", "name=hello+world", "k=%26%3D"] {
            let decoded = QueryString::decode(canonical);
            assert_eq!(&decoded.encode(), canonical);
        }
    }

    #[test]
    fn order_is_preserved() {
        let mut q = QueryString::new();
        q.append("z", "1");
        q.append("a", "2");
        assert_eq!(q.encode(), "z=1&a=2");
    }
}
