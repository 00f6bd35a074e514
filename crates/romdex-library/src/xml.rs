//! Streaming record reader for catalog and game-list documents
//!
//! Both documents are a flat list of records (`<system>`, `<game>`) under a
//! root element. Each record is collected into a small element tree so the
//! parsers can map it onto their intermediate schema. A syntax error stops
//! the stream but keeps every record completed before it.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::BufRead;

/// An element with its attributes, text and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let mut attributes = Vec::new();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = match attr.unescape_value() {
                Ok(v) => v.to_string(),
                Err(_) => String::from_utf8_lossy(&attr.value).to_string(),
            };
            attributes.push((key, value));
        }

        Self {
            name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Attribute value by name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content, `None` when blank
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() { None } else { Some(text) }
    }

    /// Trimmed text of the first child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlNode::text)
    }
}

/// Records read from a document
#[derive(Debug, Default)]
pub struct Records {
    pub nodes: Vec<XmlNode>,
    /// The syntax error that ended the stream early, if any
    pub error: Option<quick_xml::Error>,
}

/// Collect every `record_tag` element in the document
pub fn read_records<R: BufRead>(reader: R, record_tag: &str) -> Records {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut records = Records::default();
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        let event = match xml.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                if !stack.is_empty() {
                    tracing::debug!("Dropping incomplete <{}> record", record_tag);
                }
                records.error = Some(e);
                break;
            }
        };

        match event {
            Event::Start(ref e) => {
                let node = XmlNode::from_start(e);
                if !stack.is_empty() || node.name == record_tag {
                    stack.push(node);
                }
            }
            Event::Empty(ref e) => {
                let node = XmlNode::from_start(e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                } else if node.name == record_tag {
                    records.nodes.push(node);
                }
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    match e.unescape() {
                        Ok(text) => current.text.push_str(&text),
                        Err(_) => current.text.push_str(&String::from_utf8_lossy(e)),
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => records.nodes.push(node),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_records_with_children() {
        let xml = r#"<?xml version="1.0"?>
<gameList>
    <provider><system>SNES</system></provider>
    <game id="42" source="ScreenScraper.fr">
        <path>./mario.sfc</path>
        <name>Super Mario &amp; Friends</name>
        <desc><![CDATA[Jump <high>]]></desc>
    </game>
    <folder><path>./hacks</path></folder>
    <game><path>./zelda.sfc</path><hidden/></game>
</gameList>"#;

        let records = read_records(xml.as_bytes(), "game");
        assert!(records.error.is_none());
        assert_eq!(records.nodes.len(), 2);

        let first = &records.nodes[0];
        assert_eq!(first.attr("id"), Some("42"));
        assert_eq!(first.child_text("path"), Some("./mario.sfc"));
        assert_eq!(first.child_text("name"), Some("Super Mario & Friends"));
        assert_eq!(first.child_text("desc"), Some("Jump <high>"));
        assert_eq!(first.child_text("missing"), None);

        let second = &records.nodes[1];
        assert!(second.child("hidden").is_some());
        assert_eq!(second.child_text("hidden"), None);
    }

    #[test]
    fn test_syntax_error_keeps_completed_records() {
        let xml = r#"<gameList>
    <game><path>./a.nes</path></game>
    <game><path>./b.nes</path></game>
    <game><path>./c.nes</oops></game>
    <game><path>./d.nes</path></game>
</gameList>"#;

        let records = read_records(xml.as_bytes(), "game");
        assert!(records.error.is_some());
        let paths: Vec<_> = records
            .nodes
            .iter()
            .filter_map(|n| n.child_text("path"))
            .collect();
        assert_eq!(paths, vec!["./a.nes", "./b.nes"]);
    }

    #[test]
    fn test_nested_children_named() {
        let xml = r#"<systemList><system>
            <emulators>
                <emulator name="libretro"><cores><core>a</core><core>b</core></cores></emulator>
            </emulators>
        </system></systemList>"#;

        let records = read_records(xml.as_bytes(), "system");
        let cores: Vec<_> = records.nodes[0]
            .child("emulators")
            .and_then(|e| e.child("emulator"))
            .and_then(|e| e.child("cores"))
            .map(|c| c.children_named("core").filter_map(XmlNode::text).collect())
            .unwrap_or_default();
        assert_eq!(cores, vec!["a", "b"]);
    }
}
