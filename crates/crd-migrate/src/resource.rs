//! Resource kind and group/version identifiers

use std::fmt;
use std::str::FromStr;

use kube::discovery::ApiResource;

use crate::error::Error;

/// An API group and version, e.g. `widgets.example.com/v1`.
///
/// Custom resources are never served from the core group, so parsing
/// requires a group. An empty `group` still renders as the bare version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group (empty for the core group)
    pub group: String,
    /// API version
    pub version: String,
}

impl GroupVersion {
    /// Create a group/version from its parts
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// The apiVersion string carried by objects in this group/version
    pub fn api_version(&self) -> String {
        self.to_string()
    }

    /// Build an ApiResource for a kind served by this group/version
    pub fn api_resource(&self, kind: &ResourceKind) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: kind.kind.clone(),
            plural: kind.name.clone(),
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}/{}", self.group, self.version)
        }
    }
}

impl FromStr for GroupVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::config(format!("invalid group/version {:?}", s));

        if s.is_empty() {
            return Err(invalid());
        }

        match s.split_once('/') {
            None => Err(Error::config(format!(
                "group/version {:?} names the core group, which serves no custom resources",
                s
            ))),
            Some((group, version)) => {
                if group.is_empty() || version.is_empty() || version.contains('/') {
                    return Err(invalid());
                }
                Ok(Self::new(group, version))
            }
        }
    }
}

/// A resource kind served by an API group, as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// Plural resource name used in URLs and listings (e.g. "widgets")
    pub name: String,
    /// Kind label carried by objects (e.g. "Widget")
    pub kind: String,
    /// Whether instances live in namespaces
    pub namespaced: bool,
}

impl ResourceKind {
    /// Create a resource kind
    pub fn new(name: impl Into<String>, kind: impl Into<String>, namespaced: bool) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            namespaced,
        }
    }

    /// Name of the CustomResourceDefinition backing this kind in `group`
    pub fn definition_name(&self, group: &str) -> String {
        format!("{}.{}", self.name, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_version() {
        let gv: GroupVersion = "widgets.example.com/v1beta1".parse().unwrap();
        assert_eq!(gv.group, "widgets.example.com");
        assert_eq!(gv.version, "v1beta1");
        assert_eq!(gv.api_version(), "widgets.example.com/v1beta1");
    }

    #[test]
    fn test_parse_core_group_version_is_rejected() {
        let err = "v1".parse::<GroupVersion>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: group/version \"v1\" names the core group, \
             which serves no custom resources"
        );
    }

    #[test]
    fn test_core_group_display() {
        assert_eq!(GroupVersion::new("", "v1").to_string(), "v1");
    }

    #[test]
    fn test_parse_invalid_group_version() {
        for input in ["", "v1", "/v1", "old/", "a/b/c"] {
            let err = input.parse::<GroupVersion>().unwrap_err();
            assert!(matches!(err, Error::Config { .. }), "{input:?} should fail");
        }
    }

    #[test]
    fn test_api_resource_uses_discovered_plural() {
        let gv = GroupVersion::new("new", "v1");
        let kind = ResourceKind::new("proxies", "Proxy", true);
        let ar = gv.api_resource(&kind);
        assert_eq!(ar.api_version, "new/v1");
        assert_eq!(ar.plural, "proxies");
        assert_eq!(ar.kind, "Proxy");
    }

    #[test]
    fn test_definition_name() {
        let kind = ResourceKind::new("foos", "Foo", false);
        assert_eq!(kind.definition_name("new.example.com"), "foos.new.example.com");
    }
}
