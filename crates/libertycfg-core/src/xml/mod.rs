//! Owned XML element tree for configuration content
//!
//! quick-xml is an event parser; configuration merging needs a mutable
//! tree, so events are materialized into [`XmlElement`] nodes. Attribute
//! order is preserved (`IndexMap`), and every element carries the line and
//! column it was parsed from for jump-to-definition style diagnostics.

use crate::error::ConfigError;
use crate::result::Result;
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::Path;

/// Source coordinates of a parsed node, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
}

/// A child of an element
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

/// One XML element: name, ordered attributes, children
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<XmlNode>,
    pub source: Option<SourcePos>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            source: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    /// Concatenated text content of direct Text children, trimmed
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out.trim().to_string()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a, 'b>(
        &'a self,
        name: &'b str,
    ) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'b> {
        self.child_elements().filter(move |e| e.name == name)
    }

    pub fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.children_named(name).next()
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.child_elements_mut().find(|e| e.name == name)
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn push_comment(&mut self, comment: impl Into<String>) {
        self.children.push(XmlNode::Comment(comment.into()));
    }
}

/// 1-based line and column of a byte offset
fn line_col(src: &str, offset: usize) -> (u32, u32) {
    let clamped = offset.min(src.len());
    let mut line = 1u32;
    let mut col = 1u32;
    for b in src.as_bytes()[..clamped].iter() {
        if *b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn parse_failure(path: &Path, src: &str, offset: usize, message: impl std::fmt::Display) -> ConfigError {
    let (line, col) = line_col(src, offset);
    ConfigError::parse_error(path, message.to_string(), line, col)
}

/// Parse an XML document into its root element.
///
/// Non-fatal oddities (unexpected top-level text, stray end tags already
/// rejected by quick-xml) are logged; real syntax errors surface as
/// [`ConfigError::Parse`] with source coordinates.
pub fn parse_document(src: &str, path: &Path) -> Result<XmlElement> {
    let mut reader = Reader::from_str(src);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let offset = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| parse_failure(path, src, reader.buffer_position() as usize, e))?;
        match event {
            Event::Start(start) => {
                let element = element_from_start(&start, src, offset, path)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start, src, offset, path)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(parse_failure(path, src, offset, "unmatched end tag"));
                };
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| parse_failure(path, src, offset, e))?;
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(value.into_owned());
                } else if !value.trim().is_empty() {
                    tracing::warn!("{}: text outside root element ignored", path.display());
                }
            }
            Event::Comment(comment) => {
                let value = String::from_utf8_lossy(comment.as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.push_comment(value);
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(String::from_utf8_lossy(data.as_ref()).into_owned());
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(parse_failure(path, src, src.len(), "unclosed element"));
    }
    root.ok_or_else(|| ConfigError::MissingRoot {
        path: path.to_path_buf(),
    })
}

fn element_from_start(
    start: &BytesStart<'_>,
    src: &str,
    offset: usize,
    path: &Path,
) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    let (line, col) = line_col(src, offset);
    element.source = Some(SourcePos { line, col });
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_failure(path, src, offset, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| parse_failure(path, src, offset, e))?
            .into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        tracing::warn!("multiple root elements, keeping the first");
    }
}

fn write_failure(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::internal_error(format!("XML write failed: {e}"))
}

/// Serialize a root element to an indented document with an XML declaration
pub fn serialize_document(root: &XmlElement) -> Result<String> {
    let mut writer = quick_xml::Writer::new_with_indent(Vec::new(), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_failure)?;
    write_element(&mut writer, root)?;
    let bytes = writer.into_inner();
    let mut text = String::from_utf8(bytes)
        .map_err(|e| ConfigError::internal_error(format!("non UTF-8 output: {e}")))?;
    text.push('\n');
    Ok(text)
}

fn write_element<W: std::io::Write>(
    writer: &mut quick_xml::Writer<W>,
    element: &XmlElement,
) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_failure)?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(write_failure)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(write_failure)?,
            XmlNode::Comment(c) => {
                // "--" terminates a comment early, soften it
                let safe = c.replace("--", "- -");
                writer
                    .write_event(Event::Comment(BytesText::from_escaped(safe.as_str())))
                    .map_err(write_failure)?;
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_failure)?;
    Ok(())
}
