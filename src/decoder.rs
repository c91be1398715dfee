//! Decoder adapter: drives the mutation primitives from a stream of XML
//! events. Encoding is recognized from the BOM (UTF-8, UTF-16 BE/LE),
//! falling back to UTF-8; internal `<!ENTITY>` declarations feed the
//! document's entity table.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, trace};

use crate::document::Document;
use crate::error::ParseError;
use crate::name::{self, XMLNS_NAMESPACE};
use crate::node::NodeRef;

/// Caller knobs for decoding.
#[derive(Default)]
pub struct ParseOptions {
    /// Entity overrides consulted before the document's own declarations.
    pub entities: HashMap<String, String>,
}

/// Parses a document from a buffered byte stream.
pub fn parse_document<R: BufRead>(reader: R) -> Result<Document, ParseError> {
    parse_document_with(reader, &ParseOptions::default())
}

/// Parses a document from a string slice.
pub fn parse_str(input: &str) -> Result<Document, ParseError> {
    parse_document(input.as_bytes())
}

pub fn parse_document_with<R: BufRead>(
    reader: R,
    options: &ParseOptions,
) -> Result<Document, ParseError> {
    Builder::new(options).run(Reader::from_reader(reader))
}

fn doctype_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)^\s*([^\s\[>]+)(?:\s+PUBLIC\s+(?:"([^"]*)"|'([^']*)')\s+(?:"([^"]*)"|'([^']*)')|\s+SYSTEM\s+(?:"([^"]*)"|'([^']*)'))?"#,
        )
        .unwrap()
    })
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<!ENTITY\s+([^\s%][^\s]*)\s+(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

const BUILTIN_ENTITIES: [(&str, &str); 5] = [
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("apos", "'"),
    ("quot", "\""),
];

struct Builder {
    doc: Document,
    /// Open-element chain; the document node sits at the bottom.
    stack: Vec<NodeRef>,
    /// One prefix→URI layer per open element. `None` value = undeclared.
    scopes: Vec<HashMap<Option<String>, Option<String>>>,
    /// Effective entity table: caller overrides shadow internal-subset
    /// declarations.
    entities: HashMap<String, String>,
}

impl Builder {
    fn new(options: &ParseOptions) -> Self {
        let doc = Document::new();
        let root = doc.as_node();
        Self {
            doc,
            stack: vec![root],
            scopes: Vec::new(),
            entities: options.entities.clone(),
        }
    }

    fn parent(&self) -> &NodeRef {
        self.stack.last().expect("document node never pops")
    }

    fn syntax<R: BufRead>(reader: &Reader<R>, message: impl ToString) -> ParseError {
        ParseError::Syntax {
            position: reader.buffer_position(),
            message: message.to_string(),
        }
    }

    fn resolve_entity(&self, entity_name: &str) -> Option<&str> {
        BUILTIN_ENTITIES
            .iter()
            .find(|(known, _)| *known == entity_name)
            .map(|(_, value)| *value)
            .or_else(|| self.entities.get(entity_name).map(String::as_str))
    }

    fn unescape(&self, raw: &str) -> Result<String, ParseError> {
        let mut unknown = None;
        let resolved = quick_xml::escape::unescape_with(raw, |ent: &str| {
            let hit = self.resolve_entity(ent);
            if hit.is_none() {
                unknown = Some(ent.to_owned());
            }
            hit
        });
        match resolved {
            Ok(text) => Ok(text.into_owned()),
            Err(_) => Err(ParseError::UnknownEntity(
                unknown.unwrap_or_else(|| raw.to_owned()),
            )),
        }
    }

    /// Nearest binding for a prefix (`None` = default namespace).
    fn lookup(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(name::XML_NAMESPACE.to_owned());
        }
        if prefix == Some("xmlns") {
            return Some(XMLNS_NAMESPACE.to_owned());
        }
        for layer in self.scopes.iter().rev() {
            if let Some(binding) = layer.get(&prefix.map(str::to_owned)) {
                return binding.clone();
            }
        }
        None
    }

    fn read_tag<R: BufRead>(
        &self,
        reader: &Reader<R>,
        tag: &BytesStart<'_>,
    ) -> Result<(String, Vec<(String, String)>), ParseError> {
        let qname = reader
            .decoder()
            .decode(tag.name().as_ref())
            .map_err(|e| Self::syntax(reader, e))?
            .into_owned();
        let mut attrs = Vec::new();
        for attr in tag.attributes() {
            let attr = attr.map_err(|e| Self::syntax(reader, e))?;
            let attr_name = reader
                .decoder()
                .decode(attr.key.as_ref())
                .map_err(|e| Self::syntax(reader, e))?
                .into_owned();
            let raw_value = reader
                .decoder()
                .decode(&attr.value)
                .map_err(|e| Self::syntax(reader, e))?
                .into_owned();
            attrs.push((attr_name, self.unescape(&raw_value)?));
        }
        Ok((qname, attrs))
    }

    fn open_element(
        &mut self,
        qname: &str,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    ) -> Result<(), ParseError> {
        // Namespace declarations on this tag come into scope before the
        // tag's own name resolves.
        let mut layer = HashMap::new();
        for (attr_name, value) in &attrs {
            if attr_name == "xmlns" {
                let binding = (!value.is_empty()).then(|| value.clone());
                layer.insert(None, binding);
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                layer.insert(Some(prefix.to_owned()), Some(value.clone()));
            }
        }
        self.scopes.push(layer);

        let (prefix, _) = name::split_qname(qname);
        let ns = match prefix {
            Some(prefix) => {
                Some(self.lookup(Some(prefix)).ok_or_else(|| ParseError::Syntax {
                    position: 0,
                    message: format!("undeclared namespace prefix '{prefix}'"),
                })?)
            }
            None => self.lookup(None),
        };
        let element = match &ns {
            Some(uri) => self.doc.create_element_ns(Some(uri), qname)?,
            None => self.doc.create_element(qname)?,
        };

        for (attr_name, value) in attrs {
            if attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
                element.set_attribute_ns(Some(XMLNS_NAMESPACE), &attr_name, &value)?;
                continue;
            }
            match name::split_qname(&attr_name) {
                (Some(prefix), _) => {
                    let uri = self.lookup(Some(prefix)).ok_or_else(|| ParseError::Syntax {
                        position: 0,
                        message: format!("undeclared namespace prefix '{prefix}'"),
                    })?;
                    element.set_attribute_ns(Some(&uri), &attr_name, &value)?;
                }
                (None, _) => element.set_attribute(&attr_name, &value)?,
            }
        }

        crate::mutation::append_child(self.parent(), &element)?;
        if self_closing {
            self.scopes.pop();
        } else {
            self.stack.push(element);
        }
        Ok(())
    }

    fn close_element(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
            self.scopes.pop();
        }
    }

    fn handle_doctype(&mut self, text: &str) -> Result<(), ParseError> {
        let captures = match doctype_re().captures(text) {
            Some(captures) => captures,
            None => return Ok(()),
        };
        let doctype_name = captures.get(1).map_or("", |m| m.as_str());
        let public_id = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map_or("", |m| m.as_str());
        let system_id = captures
            .get(4)
            .or_else(|| captures.get(5))
            .or_else(|| captures.get(6))
            .or_else(|| captures.get(7))
            .map_or("", |m| m.as_str());

        let doctype = self
            .doc
            .create_document_type(doctype_name, public_id, system_id)?;
        self.doc.append_child(&doctype)?;

        // Internal-subset entity declarations; caller-supplied overrides
        // win over these.
        for entity in entity_re().captures_iter(text) {
            let entity_name = entity.get(1).map_or("", |m| m.as_str());
            let raw_value = entity
                .get(2)
                .or_else(|| entity.get(3))
                .map_or("", |m| m.as_str());
            let value = quick_xml::escape::unescape(raw_value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw_value.to_owned());
            trace!(entity = entity_name, "declared internal entity");
            self.doc.declare_entity(entity_name, &value);
            if let crate::node::NodeData::DocumentType(dt) = doctype.data_ref() {
                dt.entities
                    .borrow_mut()
                    .push(self.doc.create_entity_node(entity_name, &value));
            }
            self.entities
                .entry(entity_name.to_owned())
                .or_insert(value);
        }
        debug!(doctype = doctype_name, "parsed doctype");
        Ok(())
    }

    fn run<R: BufRead>(mut self, mut reader: Reader<R>) -> Result<Document, ParseError> {
        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| Self::syntax(&reader, e))?;
            match event {
                Event::Decl(decl) => {
                    self.doc.set_has_xml_decl(true);
                    if let Some(Ok(label)) = decl.encoding() {
                        let label = reader
                            .decoder()
                            .decode(&label)
                            .map_err(|e| Self::syntax(&reader, e))?;
                        self.doc.set_character_set(&label.to_uppercase());
                    }
                }
                Event::DocType(text) => {
                    let text = reader
                        .decoder()
                        .decode(&text)
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    self.handle_doctype(&text)?;
                }
                Event::Start(tag) => {
                    let (qname, attrs) = self.read_tag(&reader, &tag)?;
                    self.open_element(&qname, attrs, false)?;
                }
                Event::Empty(tag) => {
                    let (qname, attrs) = self.read_tag(&reader, &tag)?;
                    self.open_element(&qname, attrs, true)?;
                }
                Event::End(_) => self.close_element(),
                Event::Text(text) => {
                    let raw = reader
                        .decoder()
                        .decode(&text)
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let decoded = self.unescape(&raw)?;
                    if self.parent().is_document() {
                        if !decoded.trim().is_empty() {
                            return Err(Self::syntax(&reader, "text outside document element"));
                        }
                    } else {
                        let node = self.doc.create_text_node(&decoded);
                        crate::mutation::append_child(self.parent(), &node)?;
                    }
                }
                Event::GeneralRef(entity) => {
                    let entity_name = reader
                        .decoder()
                        .decode(entity.as_ref())
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let resolved = if let Some(body) = entity_name.strip_prefix('#') {
                        char_reference(body)
                            .ok_or_else(|| Self::syntax(&reader, "bad character reference"))?
                            .to_string()
                    } else {
                        self.resolve_entity(&entity_name)
                            .map(str::to_owned)
                            .ok_or(ParseError::UnknownEntity(entity_name))?
                    };
                    if !self.parent().is_document() {
                        let node = self.doc.create_text_node(&resolved);
                        crate::mutation::append_child(self.parent(), &node)?;
                    }
                }
                Event::CData(data) => {
                    let content = reader
                        .decoder()
                        .decode(&data)
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let node = self.doc.create_cdata_section(&content)?;
                    crate::mutation::append_child(self.parent(), &node)?;
                }
                Event::Comment(text) => {
                    let content = reader
                        .decoder()
                        .decode(&text)
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let node = self.doc.create_comment(&content);
                    crate::mutation::append_child(self.parent(), &node)?;
                }
                Event::PI(pi) => {
                    let target = reader
                        .decoder()
                        .decode(pi.target())
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let data = reader
                        .decoder()
                        .decode(pi.content())
                        .map_err(|e| Self::syntax(&reader, e))?
                        .into_owned();
                    let node = self.doc.create_processing_instruction(&target, &data)?;
                    crate::mutation::append_child(self.parent(), &node)?;
                }
                Event::Eof => break,
            }
            buf.clear();
        }

        // Record the decoder's final view of the encoding (BOM-driven for
        // UTF-16 inputs).
        let label = reader.decoder().encoding().name().to_uppercase();
        if label != "UTF-8" {
            self.doc.set_character_set(&label);
        }
        debug!("document decoded");
        Ok(self.doc)
    }
}

/// `#…` / `#x…` character reference bodies.
fn char_reference(body: &str) -> Option<char> {
    let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_tree() {
        let doc = parse_str(r#"<?xml version="1.0"?><r a="1"><b>text</b><!--c--><?pi data?></r>"#)
            .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.node_name(), "r");
        assert_eq!(root.get_attribute("a").as_deref(), Some("1"));
        assert_eq!(root.child_count(), 3);
        assert_eq!(root.first_child().unwrap().text_content().as_deref(), Some("text"));
        assert!(doc.has_xml_decl());
    }

    #[test]
    fn resolves_namespaces_in_scope() {
        let doc = parse_str(
            r#"<r xmlns="urn:default" xmlns:p="urn:p"><p:a q="1"/><b/></r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.namespace_uri().as_deref(), Some("urn:default"));

        let a = root.first_element_child().unwrap();
        assert_eq!(a.namespace_uri().as_deref(), Some("urn:p"));
        assert_eq!(a.local_name().as_deref(), Some("a"));
        // Unprefixed attributes take no namespace.
        assert!(a.get_attribute_node("q").unwrap().namespace_uri().is_none());

        let b = a.next_element_sibling().unwrap();
        assert_eq!(b.namespace_uri().as_deref(), Some("urn:default"));
    }

    #[test]
    fn internal_entities_resolve() {
        let doc = parse_str(
            r#"<!DOCTYPE r [<!ENTITY who "world">]><r>hello &who;</r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert_eq!(root.text_content().as_deref(), Some("hello world"));
    }

    #[test]
    fn unknown_entity_fails_unless_supplied() {
        let err = parse_str(r#"<r>&mystery;</r>"#).unwrap_err();
        assert!(matches!(err, ParseError::UnknownEntity(_)));

        let mut options = ParseOptions::default();
        options
            .entities
            .insert("mystery".to_owned(), "solved".to_owned());
        let doc = parse_document_with(r#"<r>&mystery;</r>"#.as_bytes(), &options).unwrap();
        assert_eq!(
            doc.document_element().unwrap().text_content().as_deref(),
            Some("solved")
        );
    }

    #[test]
    fn doctype_ids_are_captured() {
        let doc = parse_str(
            r#"<!DOCTYPE r PUBLIC "-//X//DTD//EN" "http://x/r.dtd"><r/>"#,
        )
        .unwrap();
        let doctype = doc.doctype().unwrap();
        assert_eq!(doctype.node_name(), "r");
    }

    #[test]
    fn cdata_round_trips() {
        let doc = parse_str("<r><![CDATA[a < b & c]]></r>").unwrap();
        let root = doc.document_element().unwrap();
        let cdata = root.first_child().unwrap();
        assert_eq!(cdata.node_type(), crate::node::node_type::CDATA_SECTION);
        assert_eq!(cdata.data().as_deref(), Some("a < b & c"));
        assert_eq!(doc.to_xml(), "<r><![CDATA[a < b & c]]></r>");
    }

    #[test]
    fn utf16_bom_is_recognized() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<r>héllo</r>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let doc = parse_document(bytes.as_slice()).unwrap();
        assert_eq!(doc.character_set(), "UTF-16LE");
        assert_eq!(
            doc.document_element().unwrap().text_content().as_deref(),
            Some("héllo")
        );
    }
}
