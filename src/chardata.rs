//! CharacterData operations. Offsets and counts are expressed in UTF-16
//! code units, as the DOM requires, and are mapped onto the UTF-8 payload
//! on entry; out-of-range offsets raise `IndexSize`.

use crate::error::{DomException, Result};
use crate::node::{new_node, NodeData, NodeRef};

fn payload(node: &NodeRef) -> Result<&std::cell::RefCell<String>> {
    match node.data_ref() {
        NodeData::Text(data)
        | NodeData::CDataSection(data)
        | NodeData::Comment(data) => Ok(data),
        NodeData::ProcessingInstruction { data, .. } => Ok(data),
        _ => Err(DomException::NotSupported(
            "node does not carry character data".into(),
        )),
    }
}

/// UTF-16 length of a string.
fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Maps a UTF-16 offset to a byte index, erroring past the end. An offset
/// landing inside a surrogate pair resolves to the pair's start.
fn byte_offset(s: &str, offset: usize) -> Result<usize> {
    let mut units = 0;
    for (bytes, c) in s.char_indices() {
        if units >= offset {
            return Ok(bytes);
        }
        units += c.len_utf16();
    }
    if offset <= units {
        Ok(s.len())
    } else {
        Err(DomException::IndexSize(format!(
            "offset {offset} exceeds length {units}"
        )))
    }
}

impl NodeRef {
    /// The character data payload.
    pub fn data(&self) -> Option<String> {
        payload(self).ok().map(|data| data.borrow().clone())
    }

    pub fn set_data(&self, value: &str) -> Result<()> {
        *payload(self)?.borrow_mut() = value.to_owned();
        self.bump_version();
        Ok(())
    }

    /// Payload length in UTF-16 code units.
    pub fn length(&self) -> Result<usize> {
        Ok(utf16_len(&payload(self)?.borrow()))
    }

    /// `substringData(offset, count)`. A count reaching past the end is
    /// clamped; an offset past the end errors. `substring_data(len, k)` is
    /// therefore the empty string for any `k`.
    pub fn substring_data(&self, offset: usize, count: usize) -> Result<String> {
        let data = payload(self)?.borrow();
        let start = byte_offset(&data, offset)?;
        let end = byte_offset(&data, offset.saturating_add(count)).unwrap_or(data.len());
        Ok(data[start..end].to_owned())
    }

    pub fn append_data(&self, value: &str) -> Result<()> {
        payload(self)?.borrow_mut().push_str(value);
        self.bump_version();
        Ok(())
    }

    /// `insert_data(length, s)` appends; one past that errors.
    pub fn insert_data(&self, offset: usize, value: &str) -> Result<()> {
        let cell = payload(self)?;
        let mut data = cell.borrow_mut();
        let at = byte_offset(&data, offset)?;
        data.insert_str(at, value);
        drop(data);
        self.bump_version();
        Ok(())
    }

    pub fn delete_data(&self, offset: usize, count: usize) -> Result<()> {
        let cell = payload(self)?;
        let mut data = cell.borrow_mut();
        let start = byte_offset(&data, offset)?;
        let end = byte_offset(&data, offset.saturating_add(count)).unwrap_or(data.len());
        data.replace_range(start..end, "");
        drop(data);
        self.bump_version();
        Ok(())
    }

    pub fn replace_data(&self, offset: usize, count: usize, value: &str) -> Result<()> {
        let cell = payload(self)?;
        let mut data = cell.borrow_mut();
        let start = byte_offset(&data, offset)?;
        let end = byte_offset(&data, offset.saturating_add(count)).unwrap_or(data.len());
        data.replace_range(start..end, value);
        drop(data);
        self.bump_version();
        Ok(())
    }

    /// Shortens this text node to `[0, offset)` and returns a new sibling
    /// carrying `[offset, end)`, inserted immediately after when attached.
    pub fn split_text(&self, offset: usize) -> Result<NodeRef> {
        let cell = match self.data_ref() {
            NodeData::Text(data) => data,
            _ => {
                return Err(DomException::NotSupported(
                    "splitText applies to text nodes".into(),
                ))
            }
        };

        let tail = {
            let mut data = cell.borrow_mut();
            let at = byte_offset(&data, offset)?;
            data.split_off(at)
        };

        let sibling = new_node(NodeData::Text(std::cell::RefCell::new(tail)));
        sibling.set_owner(self.owner_document_node().as_ref());

        if let Some(parent) = self.parent_node() {
            let next = self.next_sibling();
            crate::mutation::insert_before(&parent, &sibling, next.as_ref())?;
        }
        self.bump_version();
        Ok(sibling)
    }

    /// Concatenated data of this text node and its contiguous text-node
    /// siblings on both sides.
    pub fn whole_text(&self) -> Result<String> {
        if !self.is_text() {
            return Err(DomException::NotSupported(
                "wholeText applies to text nodes".into(),
            ));
        }

        let mut first = self.clone();
        while let Some(prev) = first.previous_sibling().filter(NodeRef::is_text) {
            first = prev;
        }

        let mut out = String::new();
        let mut current = Some(first);
        while let Some(node) = current.filter(NodeRef::is_text) {
            out.push_str(&node.data().unwrap_or_default());
            current = node.next_sibling();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::error::DomException;

    #[test]
    fn offsets_count_utf16_units() {
        let doc = Document::new();
        // "a" + surrogate pair (2 units) + "b"
        let text = doc.create_text_node("a\u{1F600}b");
        assert_eq!(text.length().unwrap(), 4);
        assert_eq!(text.substring_data(1, 2).unwrap(), "\u{1F600}");
        assert_eq!(text.substring_data(3, 5).unwrap(), "b");
    }

    #[test]
    fn boundary_conditions() {
        let doc = Document::new();
        let text = doc.create_text_node("abcd");

        // substring_data(len, k) is empty for any k.
        assert_eq!(text.substring_data(4, 10).unwrap(), "");
        // insert_data(len, s) appends; one past errors.
        text.insert_data(4, "e").unwrap();
        assert_eq!(text.data().as_deref(), Some("abcde"));
        assert!(matches!(
            text.insert_data(6, "x"),
            Err(DomException::IndexSize(_))
        ));

        text.delete_data(1, 2).unwrap();
        assert_eq!(text.data().as_deref(), Some("ade"));
        text.replace_data(1, 1, "XY").unwrap();
        assert_eq!(text.data().as_deref(), Some("aXYe"));
    }

    #[test]
    fn split_text_inserts_sibling() {
        let doc = Document::new();
        let root = doc.create_element("r").unwrap();
        doc.append_child(&root).unwrap();
        let text = doc.create_text_node("hello world");
        crate::mutation::append_child(&root, &text).unwrap();

        let tail = text.split_text(5).unwrap();
        assert_eq!(text.data().as_deref(), Some("hello"));
        assert_eq!(tail.data().as_deref(), Some(" world"));
        assert!(text.next_sibling().unwrap().is_same_node(&tail));
        assert_eq!(root.child_count(), 2);
    }
}
