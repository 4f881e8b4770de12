//! Selector descriptors
//!
//! A selector is a string plus a tag saying how to interpret it. The tag
//! decides which lookup path the resolver takes and whether the lookup
//! produces one element or many.

use std::fmt;

/// How a selector string should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorKind {
    /// Plain CSS match, first hit wins
    Css,
    /// XPath match, first hit in document order
    XPath,
    /// Element id (sugar for `#id` CSS)
    Id,
    /// Class name (sugar for `.class` CSS)
    Class,
    /// All CSS matches
    CssAll,
    /// All XPath matches in document order
    XPathAll,
}

impl SelectorKind {
    /// True for the kinds that resolve to a list rather than a single element
    pub fn is_bulk(&self) -> bool {
        matches!(self, SelectorKind::CssAll | SelectorKind::XPathAll)
    }

    /// True for the XPath-interpreted kinds
    pub fn is_xpath(&self) -> bool {
        matches!(self, SelectorKind::XPath | SelectorKind::XPathAll)
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectorKind::Css => "css",
            SelectorKind::XPath => "xpath",
            SelectorKind::Id => "id",
            SelectorKind::Class => "class",
            SelectorKind::CssAll => "css-all",
            SelectorKind::XPathAll => "xpath-all",
        };
        f.write_str(name)
    }
}

/// A selector expression plus its interpretation tag
///
/// Passed by reference into every action; the action layer never retains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub expr: String,
    pub kind: SelectorKind,
}

impl Selector {
    pub fn new(expr: impl Into<String>, kind: SelectorKind) -> Self {
        Self {
            expr: expr.into(),
            kind,
        }
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::Css)
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::XPath)
    }

    pub fn id(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::Id)
    }

    pub fn class(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::Class)
    }

    pub fn css_all(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::CssAll)
    }

    pub fn xpath_all(expr: impl Into<String>) -> Self {
        Self::new(expr, SelectorKind::XPathAll)
    }

    /// The CSS expression this selector lowers to, for the kinds that are
    /// CSS at heart. `Id`/`Class` get their `#`/`.` prefix here.
    pub fn as_css(&self) -> Option<String> {
        match self.kind {
            SelectorKind::Css | SelectorKind::CssAll => Some(self.expr.clone()),
            SelectorKind::Id => Some(format!("#{}", self.expr)),
            SelectorKind::Class => Some(format!(".{}", self.expr)),
            SelectorKind::XPath | SelectorKind::XPathAll => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expr, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_and_class_lower_to_css() {
        assert_eq!(Selector::id("email").as_css().unwrap(), "#email");
        assert_eq!(Selector::class("foo").as_css().unwrap(), ".foo");
        assert_eq!(Selector::css(".foo").as_css().unwrap(), ".foo");
    }

    #[test]
    fn test_xpath_has_no_css_form() {
        assert!(Selector::xpath("//div").as_css().is_none());
        assert!(Selector::xpath_all("//div").as_css().is_none());
    }

    #[test]
    fn test_bulk_kinds() {
        assert!(SelectorKind::CssAll.is_bulk());
        assert!(SelectorKind::XPathAll.is_bulk());
        assert!(!SelectorKind::Css.is_bulk());
        assert!(!SelectorKind::Id.is_bulk());
    }
}
