//! Namespace, label and annotation rewriting
//!
//! Mappings are supplied as ordered `find:replace` pairs. Order matters for
//! key rewriting: when two pairs could both match a key, the earlier pair is
//! applied first and the later one sees the already-rewritten key.

use std::collections::BTreeMap;

use crate::error::Error;

/// Parse `find:replace` entries for the given flag, preserving order.
///
/// Each entry must contain exactly one `:` with non-empty text on both sides.
pub fn parse_mappings(flag: &str, entries: &[String]) -> Result<Vec<(String, String)>, Error> {
    entries
        .iter()
        .map(|entry| {
            let mut parts = entry.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(find), Some(replace), None) if !find.is_empty() && !replace.is_empty() => {
                    Ok((find.to_string(), replace.to_string()))
                }
                _ => Err(Error::config(format!("invalid {} mapping {:?}", flag, entry))),
            }
        })
        .collect()
}

/// Rewrites substrings of map keys (labels, annotations)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapper {
    pairs: Vec<(String, String)>,
}

impl KeyMapper {
    /// Create a key mapper from ordered find/replace pairs.
    ///
    /// Pairs with an empty find string are dropped: they would match between
    /// every character of every key.
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self {
            pairs: pairs.into_iter().filter(|(find, _)| !find.is_empty()).collect(),
        }
    }

    /// Check if no pairs are configured
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rewrite a single key by running it through every pair in order
    pub fn map_key(&self, key: &str) -> String {
        let mut current = key.to_string();
        for (find, replace) in &self.pairs {
            if current.contains(find.as_str()) {
                current = current.replace(find.as_str(), replace);
            }
        }
        current
    }

    /// Rewrite every key of `data`, keeping values under the renamed keys.
    pub fn apply(&self, data: BTreeMap<String, String>) -> BTreeMap<String, String> {
        if self.is_empty() {
            return data;
        }
        data.into_iter()
            .map(|(key, value)| (self.map_key(&key), value))
            .collect()
    }
}

/// Maps source namespaces to target namespaces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMapper {
    mappings: BTreeMap<String, String>,
}

impl NamespaceMapper {
    /// Create a namespace mapper from source/target pairs.
    ///
    /// If a source namespace is listed twice the last entry wins.
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self {
            mappings: pairs.into_iter().collect(),
        }
    }

    /// The namespace an item from `original` lands in
    pub fn target<'a>(&'a self, original: &'a str) -> &'a str {
        self.mappings
            .get(original)
            .map(String::as_str)
            .unwrap_or(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(f, r)| (f.to_string(), r.to_string()))
            .collect()
    }

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_mappings_preserves_order() {
        let entries = vec!["foo.io:bar.io".to_string(), "baz.io:zoo.io".to_string()];
        let parsed = parse_mappings("label", &entries).unwrap();
        assert_eq!(parsed, pairs(&[("foo.io", "bar.io"), ("baz.io", "zoo.io")]));
    }

    #[test]
    fn test_parse_mappings_rejects_malformed_entries() {
        for entry in ["no-separator", "a:b:c", ":b", "a:", ":"] {
            let err = parse_mappings("namespace", &[entry.to_string()]).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("invalid configuration: invalid namespace mapping {:?}", entry)
            );
        }
    }

    #[test]
    fn test_key_mapper_single_pair() {
        let mapper = KeyMapper::new(pairs(&[("foo.io", "bar.io")]));
        assert_eq!(mapper.map_key("foo.io/a"), "bar.io/a");
        assert_eq!(mapper.map_key("a.foo.io"), "a.bar.io");
        assert_eq!(mapper.map_key("no.match"), "no.match");
    }

    #[test]
    fn test_key_mapper_multiple_pairs() {
        let mapper = KeyMapper::new(pairs(&[("foo.io", "bar.io"), ("baz.io", "zoo.io")]));
        let updated = mapper.apply(map(&[
            ("a.foo.io", "1"),
            ("a.baz.io", "2"),
            ("plain", "3"),
        ]));
        assert_eq!(
            updated,
            map(&[("a.bar.io", "1"), ("a.zoo.io", "2"), ("plain", "3")])
        );
    }

    #[test]
    fn test_key_mapper_replaces_every_occurrence() {
        let mapper = KeyMapper::new(pairs(&[("foo.example.com", "bar.io")]));
        let updated = mapper.apply(map(&[
            ("a", "b"),
            ("widget.foo.example.com/color", "blue"),
            ("fromble.foo.example.com/shape", "circle"),
            ("foo.example.com/foo.example.com", "twice"),
        ]));
        assert_eq!(
            updated,
            map(&[
                ("a", "b"),
                ("widget.bar.io/color", "blue"),
                ("fromble.bar.io/shape", "circle"),
                ("bar.io/bar.io", "twice"),
            ])
        );
    }

    #[test]
    fn test_key_mapper_earlier_pair_wins_on_overlap() {
        // the first pair consumes the text the second one would have matched
        let mapper = KeyMapper::new(pairs(&[
            ("my.example.com", "example.io"),
            ("example.com", "other.net"),
        ]));
        assert_eq!(mapper.map_key("pre.my.example.com/color"), "pre.example.io/color");

        let reversed = KeyMapper::new(pairs(&[
            ("example.com", "other.net"),
            ("my.example.com", "example.io"),
        ]));
        assert_eq!(reversed.map_key("pre.my.example.com/color"), "pre.my.other.net/color");
    }

    #[test]
    fn test_key_mapper_empty_is_identity() {
        let mapper = KeyMapper::default();
        let data = map(&[("foo.io/a", "x")]);
        assert_eq!(mapper.apply(data.clone()), data);
        assert!(mapper.apply(BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_key_mapper_ignores_empty_find() {
        let mapper = KeyMapper::new(vec![
            ("".to_string(), "x".to_string()),
            ("old".to_string(), "new".to_string()),
        ]);

        assert_eq!(mapper.map_key("abc"), "abc");
        assert_eq!(mapper.map_key("old.io/a"), "new.io/a");

        let only_empty = KeyMapper::new(vec![("".to_string(), "x".to_string())]);
        assert!(only_empty.is_empty());
    }

    #[test]
    fn test_namespace_mapper() {
        let mapper =
            NamespaceMapper::new(pairs(&[("old-ns-1", "new-ns-1"), ("old-ns-2", "new-ns-2")]));
        assert_eq!(mapper.target("old-ns-1"), "new-ns-1");
        assert_eq!(mapper.target("old-ns-2"), "new-ns-2");
        assert_eq!(mapper.target("unmapped"), "unmapped");
        assert_eq!(mapper.target(""), "");
    }
}
