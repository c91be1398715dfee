//! Escaping and serialization. The escape table is the crate's wire
//! contract and is applied identically in text and attribute contexts.

use std::fmt::Write;

use crate::document::Document;
use crate::node::{NodeData, NodeRef};

/// Escapes a string for text or attribute context:
///
/// `<` `>` `&` become entity references, quotes become `&#34;`/`&#39;`,
/// tab/LF/CR become hex character references, every other C0 control is
/// replaced with U+FFFD, and everything else passes through.
pub fn escape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\u{0}'..='\u{1F}' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

/// The references [`escape_str`] can emit plus the two named quote forms.
const ENTITIES: [(&str, char); 11] = [
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&amp;", '&'),
    ("&quot;", '"'),
    ("&apos;", '\''),
    ("&#34;", '"'),
    ("&#39;", '\''),
    ("&#x9;", '\t'),
    ("&#xA;", '\n'),
    ("&#xD;", '\r'),
    ("&#xFFFD;", '\u{FFFD}'),
];

/// Reverses [`escape_str`]. Unrecognized references and a trailing `&`
/// without its `;` pass through verbatim, so the function is total.
pub fn unescape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        match ENTITIES.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, c)) => {
                out.push(*c);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn write_node(node: &NodeRef, out: &mut String) {
    match node.data_ref() {
        NodeData::Document(_) => {
            for child in node.children_snapshot() {
                write_node(&child, out);
            }
        }
        NodeData::DocumentFragment => {
            for child in node.children_snapshot() {
                write_node(&child, out);
            }
        }
        NodeData::DocumentType(dt) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(&dt.name);
            match (dt.public_id.is_empty(), dt.system_id.is_empty()) {
                (false, _) => {
                    let _ = write!(out, " PUBLIC \"{}\" \"{}\"", dt.public_id, dt.system_id);
                }
                (true, false) => {
                    let _ = write!(out, " SYSTEM \"{}\"", dt.system_id);
                }
                (true, true) => {}
            }
            out.push('>');
        }
        NodeData::Element(el) => {
            out.push('<');
            out.push_str(&el.name.borrow().qualified());
            for attr in el.attrs.borrow().iter() {
                let _ = write!(
                    out,
                    " {}=\"{}\"",
                    attr.node_name(),
                    escape_str(&attr.node_value().unwrap_or_default())
                );
            }
            let children = node.children_snapshot();
            if children.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in children {
                    write_node(&child, out);
                }
                out.push_str("</");
                out.push_str(&el.name.borrow().qualified());
                out.push('>');
            }
        }
        NodeData::Attribute(_) => {
            out.push_str(&escape_str(&node.node_value().unwrap_or_default()));
        }
        NodeData::Text(data) => out.push_str(&escape_str(&data.borrow())),
        NodeData::CDataSection(data) => {
            out.push_str("<![CDATA[");
            out.push_str(&data.borrow());
            out.push_str("]]>");
        }
        NodeData::Comment(data) => {
            out.push_str("<!--");
            out.push_str(&data.borrow());
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            let data = data.borrow();
            if !data.is_empty() {
                out.push(' ');
                out.push_str(&data);
            }
            out.push_str("?>");
        }
        NodeData::EntityReference(entity_name) => {
            out.push('&');
            out.push_str(entity_name);
            out.push(';');
        }
        NodeData::Entity { .. } | NodeData::Notation { .. } | NodeData::Namespace(_) => {}
    }
}

impl NodeRef {
    /// Serializes this node and its subtree to markup.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }

    /// Serializes the node's children only.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in self.children_snapshot() {
            write_node(&child, &mut out);
        }
        out
    }
}

impl Document {
    /// Serializes the whole document. The XML declaration appears when the
    /// source carried one or the encoding is not the UTF-8 default.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if self.has_xml_decl() || self.character_set() != "UTF-8" {
            out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        }
        write_node(&self.as_node(), &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn escape_table_is_exact() {
        assert_eq!(
            escape_str("a<b & \"c\"\n"),
            "a&lt;b &amp; &#34;c&#34;&#xA;"
        );
        assert_eq!(escape_str(">'\t\r"), "&gt;&#39;&#x9;&#xD;");
        assert_eq!(escape_str("\u{1}\u{1F}"), "\u{FFFD}\u{FFFD}");
        assert_eq!(escape_str("plain ü"), "plain ü");
    }

    #[test]
    fn unescape_inverts_escape() {
        let samples = [
            "a<b & \"c\"\n",
            "nothing special",
            "<>&'\"\t\n\r",
            "mixed &amp; matched",
        ];
        for sample in samples {
            assert_eq!(unescape_str(&escape_str(sample)), sample);
        }
        // The named quote forms are recognized on input.
        assert_eq!(unescape_str("&quot;&apos;"), "\"'");
    }

    #[test]
    fn lone_ampersand_passes_through() {
        assert_eq!(unescape_str("fish & chips"), "fish & chips");
        assert_eq!(unescape_str("trailing &"), "trailing &");
        assert_eq!(unescape_str("&unknown;"), "&unknown;");
    }

    #[test]
    fn serializes_structure() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        root.set_attribute("a", "1<2").unwrap();
        root.append(&["text & more".into()]).unwrap();
        let child = doc.create_element("empty").unwrap();
        root.append_child(&child).unwrap();
        root.append_child(&doc.create_comment("note")).unwrap();
        root.append_child(&doc.create_cdata_section("raw <stuff>").unwrap())
            .unwrap();

        assert_eq!(
            doc.to_xml(),
            "<r a=\"1&lt;2\">text &amp; more<empty/><!--note--><![CDATA[raw <stuff>]]></r>"
        );
    }

    #[test]
    fn xml_decl_follows_decoding() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        assert_eq!(doc.to_xml(), "<r/>");

        doc.set_has_xml_decl(true);
        assert_eq!(
            doc.to_xml(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>"
        );
    }
}
