use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a plugin type.
///
/// Plugins declare theirs as a constant, e.g.
/// `pub const ID: PluginId = PluginId::new("zoom");`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(Cow<'static, str>);

impl PluginId {
    pub const fn new(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PluginId {
    fn from(id: &'static str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(Cow::Owned(id))
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZOOM: PluginId = PluginId::new("zoom");

    #[test]
    fn borrowed_and_owned_ids_compare_equal() {
        assert_eq!(ZOOM, PluginId::from("zoom".to_string()));
        assert_eq!(ZOOM.to_string(), "zoom");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ZOOM).unwrap();
        assert_eq!(json, "\"zoom\"");

        let parsed: PluginId = serde_json::from_str("\"selection\"").unwrap();
        assert_eq!(parsed.as_str(), "selection");
    }
}
