// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An owned XML element tree for NUnit engine records and result documents.
//!
//! Engine records are small and arrive one at a time, so each is parsed
//! eagerly into an [`XmlNode`] that every consumer can walk without
//! re-parsing.

use crate::errors::{XmlParseError, XmlWriteError};
use indexmap::IndexMap;
use quick_xml::{
    Reader, Writer,
    events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::io;

/// Elements whose text content NUnit writes as CDATA.
static CDATA_ELEMENTS: &[&str] = &["message", "stack-trace", "output", "reason"];

/// A single XML element with its attributes, child elements and text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attributes: IndexMap<String, String>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    /// Creates an element with no attributes, children or text.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parses a single record or document.
    ///
    /// Whitespace-only text between elements is dropped. Anything after the
    /// root element closes is ignored.
    pub fn parse(input: &str) -> Result<Self, XmlParseError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<XmlNode> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let node = Self::from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or(XmlParseError::NoRootElement)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        let text = text.unescape()?;
                        if !text.trim().is_empty() {
                            node.text.push_str(&text);
                        }
                    }
                }
                Event::CData(cdata) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&cdata));
                    }
                }
                Event::Eof => {
                    return Err(match stack.pop() {
                        Some(node) => XmlParseError::Unclosed { name: node.name },
                        None => XmlParseError::NoRootElement,
                    });
                }
                _ => {}
            }
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlParseError> {
        let mut node = Self::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.insert(key, value);
        }
        Ok(node)
    }

    /// Returns the element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of an attribute.
    ///
    /// An attribute that is present but empty returns `Some("")`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Iterates over attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sets an attribute, keeping its original position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`Self::set_attr`].
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Returns the concatenated text and CDATA content of this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the text content of this element.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Builder-style variant of [`Self::set_text`].
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Returns all child elements.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Appends a child element.
    pub fn push_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Builder-style variant of [`Self::push_child`].
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.push_child(child);
        self
    }

    /// Returns the first child element with this name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Iterates over child elements with this name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follows a `/`-separated path of child element names, e.g. `failure/message`.
    pub fn path(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Returns the text of the element at `path`, if it exists.
    pub fn path_text(&self, path: &str) -> Option<&str> {
        self.path(path).map(XmlNode::text)
    }

    /// Collects every descendant element with this name, depth first.
    ///
    /// Matching elements are not searched further.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            } else {
                child.collect_descendants(name, out);
            }
        }
    }

    /// Writes this element as a standalone document with an XML declaration.
    pub fn write_document(&self, writer: impl io::Write) -> Result<(), XmlWriteError> {
        let mut writer = Writer::new_with_indent(writer, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_element(&mut writer)?;
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }

    /// Serializes this element without a declaration or indentation.
    pub fn to_xml_string(&self) -> Result<String, XmlWriteError> {
        let mut writer = Writer::new(Vec::new());
        self.write_element(&mut writer)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    pub(crate) fn write_element<W: io::Write>(
        &self,
        writer: &mut Writer<W>,
    ) -> Result<(), XmlWriteError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if !self.text.is_empty() {
            if CDATA_ELEMENTS.contains(&self.name.as_str()) {
                write_cdata(&self.text, writer)?;
            } else {
                writer.write_event(Event::Text(BytesText::new(&self.text)))?;
            }
        }
        for child in &self.children {
            child.write_element(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// Writes `text` as one or more CDATA sections.
///
/// A section cannot contain `]]>`, so the text is split after the `]]` of
/// every occurrence and the `>` starts the next section.
pub(crate) fn write_cdata<W: io::Write>(
    text: &str,
    writer: &mut Writer<W>,
) -> Result<(), XmlWriteError> {
    for section in cdata_sections(text) {
        writer.write_event(Event::CData(BytesCData::new(section)))?;
    }
    Ok(())
}

fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    while let Some(idx) = text[start..].find("]]>") {
        let end = start + idx + 2;
        sections.push(&text[start..end]);
        start = end;
    }
    sections.push(&text[start..]);
    sections
}
