//! The element selector vocabulary accepted by `Handle::filter`.

use serde_json::Value;

use crate::adapter::ElementClass;
use crate::types::{attr_str, Attributes, ElementKind};

/// Error type for selector parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    /// The selector is outside the supported vocabulary.
    #[error("Unsupported selector: {0:?}")]
    Unsupported(String),
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `*` or empty.
    All,
    /// `node` or `edge`.
    Kind(ElementKind),
    /// `:selected`.
    Selected,
    /// `node:selected` or `edge:selected`.
    KindSelected(ElementKind),
    /// `.hidden` or `.selected`.
    Class(ElementClass),
    /// `[key='value']`, optionally prefixed with `node` or `edge`.
    Attr {
        /// Kind restriction.
        kind: Option<ElementKind>,
        /// Attribute name.
        key: String,
        /// Expected value, compared as text.
        value: String,
    },
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let s = input.trim();
        let unsupported = || SelectorError::Unsupported(input.to_string());

        match s {
            "" | "*" => return Ok(Self::All),
            ":selected" => return Ok(Self::Selected),
            ".hidden" => return Ok(Self::Class(ElementClass::Hidden)),
            ".selected" => return Ok(Self::Class(ElementClass::Selected)),
            _ => {}
        }
        if let Some(kind) = ElementKind::from_str(s) {
            return Ok(Self::Kind(kind));
        }
        if let Some(kind) = s.strip_suffix(":selected").and_then(ElementKind::from_str) {
            return Ok(Self::KindSelected(kind));
        }

        let attr_regex = regex_lite::Regex::new(
            r#"^(node|edge)?\s*\[\s*([A-Za-z_][\w.-]*)\s*=\s*['"]?([^'"\]]*)['"]?\s*\]$"#,
        )
        .map_err(|_| unsupported())?;
        let caps = attr_regex.captures(s).ok_or_else(unsupported)?;
        Ok(Self::Attr {
            kind: caps.get(1).and_then(|m| ElementKind::from_str(m.as_str())),
            key: caps[2].to_string(),
            value: caps[3].to_string(),
        })
    }

    /// Whether an element matches.
    pub fn matches(
        &self,
        kind: ElementKind,
        attrs: &Attributes,
        selected: bool,
        hidden: bool,
    ) -> bool {
        match self {
            Self::All => true,
            Self::Kind(k) => *k == kind,
            Self::Selected | Self::Class(ElementClass::Selected) => selected,
            Self::KindSelected(k) => *k == kind && selected,
            Self::Class(ElementClass::Hidden) => hidden,
            Self::Attr { kind: k, key, value } => {
                k.map_or(true, |k| k == kind) && attr_text(attrs, key).as_deref() == Some(value)
            }
        }
    }
}

fn attr_text(attrs: &Attributes, key: &str) -> Option<String> {
    if let Some(s) = attr_str(attrs, key) {
        return Some(s.to_string());
    }
    match attrs.get(key)? {
        Value::Null => None,
        v => Some(v.to_string()),
    }
}
