//! XML name validation: NameStartChar / NameChar per XML 1.0 (5th edition),
//! the NCName restriction, QName splitting and the reserved `xml` / `xmlns`
//! prefix rules enforced at node-creation time.

use std::fmt;

use crate::error::{DomException, Result};

/// `http://www.w3.org/XML/1998/namespace`, the namespace the `xml` prefix is
/// permanently bound to.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// `http://www.w3.org/2000/xmlns/`, the namespace of namespace declarations.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

// https://www.w3.org/TR/xml/#NT-NameStartChar
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':'
        | 'A'..='Z'
        | '_'
        | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

// https://www.w3.org/TR/xml/#NT-NameChar
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-'
            | '.'
            | '0'..='9'
            | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// An XML Name: NameStartChar followed by NameChars.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// An NCName is a Name with no colon anywhere.
pub fn is_ncname(s: &str) -> bool {
    !s.contains(':') && is_name(s)
}

/// Splits a qualified name on its first colon into `(prefix, local)`.
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// A QName: optional prefix, a colon, then the local part, each a non-empty
/// NCName.
pub fn is_qname(s: &str) -> bool {
    match split_qname(s) {
        (Some(prefix), local) => is_ncname(prefix) && is_ncname(local),
        (None, local) => is_ncname(local),
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if is_name(name) {
        Ok(())
    } else {
        Err(DomException::InvalidCharacter(format!(
            "'{name}' is not a valid XML name"
        )))
    }
}

/// Processing-instruction targets beginning with `xml` (any case) are
/// reserved and rejected at creation.
pub fn validate_pi_target(target: &str) -> Result<()> {
    validate_name(target)?;
    if target.len() >= 3 && target[..3].eq_ignore_ascii_case("xml") {
        return Err(DomException::InvalidCharacter(format!(
            "processing instruction target '{target}' is reserved"
        )));
    }
    Ok(())
}

/// Checks a `(namespaceURI, qualifiedName)` pair for namespace-aware node
/// creation and returns the validated `(prefix, local)` split.
///
/// Enforced, in order: the qualified name is a QName; a prefix requires a
/// namespace; `xml` pairs only with the XML namespace; `xmlns` (prefix or
/// whole name) pairs only with the XMLNS namespace; and neither reserved URI
/// may be bound through any other name.
pub fn validate_qualified_name<'a>(
    namespace: Option<&str>,
    qname: &'a str,
) -> Result<(Option<&'a str>, &'a str)> {
    if !is_qname(qname) {
        return Err(DomException::InvalidCharacter(format!(
            "'{qname}' is not a valid qualified name"
        )));
    }

    let (prefix, local) = split_qname(qname);
    let ns = namespace.filter(|ns| !ns.is_empty());

    if prefix.is_some() && ns.is_none() {
        return Err(DomException::Namespace(format!(
            "prefixed name '{qname}' requires a namespace"
        )));
    }

    if prefix == Some("xml") && ns != Some(XML_NAMESPACE) {
        return Err(DomException::Namespace(
            "the 'xml' prefix is bound to the XML namespace".into(),
        ));
    }

    let is_xmlns_name = prefix == Some("xmlns") || qname == "xmlns";
    if is_xmlns_name && ns != Some(XMLNS_NAMESPACE) {
        return Err(DomException::Namespace(
            "'xmlns' names belong to the XMLNS namespace".into(),
        ));
    }
    if !is_xmlns_name && ns == Some(XMLNS_NAMESPACE) {
        return Err(DomException::Namespace(
            "the XMLNS namespace is reserved for 'xmlns' names".into(),
        ));
    }
    if ns == Some(XML_NAMESPACE) && prefix != Some("xml") {
        return Err(DomException::Namespace(
            "the XML namespace is reserved for the 'xml' prefix".into(),
        ));
    }

    Ok((prefix, local))
}

/// An expanded element or attribute name: optional namespace URI, optional
/// prefix, and the local part. `node_name` composes `prefix:local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualName {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
}

impl QualName {
    pub fn new(ns: Option<String>, prefix: Option<String>, local: String) -> Self {
        Self { ns, prefix, local }
    }

    /// A name with no namespace, parsed from its string form. A colon is
    /// kept as part of the stored prefix without binding any URI, which is
    /// how level-1 creation paths behave.
    pub fn plain(qname: &str) -> Self {
        let (prefix, local) = split_qname(qname);
        Self {
            ns: None,
            prefix: prefix.map(str::to_owned),
            local: local.to_owned(),
        }
    }

    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }

    pub fn ns_str(&self) -> Option<&str> {
        self.ns.as_deref()
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}:")?;
        }
        f.write_str(&self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_predicates() {
        assert!(is_name("doc"));
        assert!(is_name("xml:lang"));
        assert!(is_name("_a-b.c"));
        assert!(is_name("\u{C9}l\u{E9}ment"));
        assert!(!is_name("9pin"));
        assert!(!is_name(""));
        assert!(!is_name("a b"));

        assert!(is_ncname("local"));
        assert!(!is_ncname("p:local"));

        assert!(is_qname("p:local"));
        assert!(!is_qname(":local"));
        assert!(!is_qname("p:"));
        assert!(!is_qname("a:b:c"));
    }

    #[test]
    fn qualified_name_rules() {
        assert!(validate_qualified_name(Some("urn:x"), "p:a").is_ok());
        assert!(validate_qualified_name(None, "a").is_ok());

        // Prefix without a namespace.
        assert!(matches!(
            validate_qualified_name(None, "p:a"),
            Err(DomException::Namespace(_))
        ));

        // The reserved pairings, both directions.
        assert!(validate_qualified_name(Some(XML_NAMESPACE), "xml:lang").is_ok());
        assert!(validate_qualified_name(Some("urn:x"), "xml:lang").is_err());
        assert!(validate_qualified_name(Some(XML_NAMESPACE), "p:a").is_err());
        assert!(validate_qualified_name(Some(XMLNS_NAMESPACE), "xmlns").is_ok());
        assert!(validate_qualified_name(Some(XMLNS_NAMESPACE), "xmlns:p").is_ok());
        assert!(validate_qualified_name(Some("urn:x"), "xmlns:p").is_err());
        assert!(validate_qualified_name(Some(XMLNS_NAMESPACE), "p:a").is_err());
    }

    #[test]
    fn pi_targets() {
        assert!(validate_pi_target("style").is_ok());
        assert!(validate_pi_target("xml").is_err());
        assert!(validate_pi_target("XmL-stylesheet").is_err());
    }
}
