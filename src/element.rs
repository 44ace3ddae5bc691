//! Minimal XML element tree used for WFA request and response bodies.
//!
//! An [`Element`] exposes dict-like access through [`Element::get`] and
//! [`Element::set`]; structured values are described by [`ElementValue`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{Result, WfaError};

/// A named XML node with attributes, optional text and ordered children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    text: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

/// Result of [`Element::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementEntry<'a> {
    /// A child element that has children of its own.
    Node(&'a Element),
    /// Text of a leaf child, or an attribute value.
    Text(&'a str),
}

impl<'a> ElementEntry<'a> {
    /// Text value, if the entry is not a node.
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            ElementEntry::Text(text) => Some(text),
            ElementEntry::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&'a Element> {
        match self {
            ElementEntry::Node(node) => Some(node),
            ElementEntry::Text(_) => None,
        }
    }
}

/// Value accepted by [`Element::set`] and [`Element::translate_struct`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    Empty,
    Text(String),
    Node(Element),
    /// Keys become child tag names, in order.
    Map(Vec<(String, ElementValue)>),
    /// Items become repeated siblings.
    List(Vec<ElementValue>),
}

impl ElementValue {
    /// Build a [`ElementValue::Map`] from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<ElementValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        ElementValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a [`ElementValue::List`] from items.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<ElementValue>,
        I: IntoIterator<Item = V>,
    {
        ElementValue::List(items.into_iter().map(Into::into).collect())
    }

    fn type_name(&self) -> &'static str {
        match self {
            ElementValue::Empty => "empty",
            ElementValue::Text(_) => "text",
            ElementValue::Node(_) => "element",
            ElementValue::Map(_) => "map",
            ElementValue::List(_) => "list",
        }
    }
}

impl From<&str> for ElementValue {
    fn from(value: &str) -> Self {
        ElementValue::Text(value.to_string())
    }
}

impl From<String> for ElementValue {
    fn from(value: String) -> Self {
        ElementValue::Text(value)
    }
}

impl From<&String> for ElementValue {
    fn from(value: &String) -> Self {
        ElementValue::Text(value.clone())
    }
}

impl From<u64> for ElementValue {
    fn from(value: u64) -> Self {
        ElementValue::Text(value.to_string())
    }
}

impl From<i64> for ElementValue {
    fn from(value: i64) -> Self {
        ElementValue::Text(value.to_string())
    }
}

impl From<f64> for ElementValue {
    fn from(value: f64) -> Self {
        ElementValue::Text(value.to_string())
    }
}

impl From<Element> for ElementValue {
    fn from(value: Element) -> Self {
        ElementValue::Node(value)
    }
}

impl<T: Into<ElementValue>> From<Option<T>> for ElementValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ElementValue::Empty)
    }
}

impl From<Vec<ElementValue>> for ElementValue {
    fn from(value: Vec<ElementValue>) -> Self {
        ElementValue::List(value)
    }
}

impl From<BTreeMap<String, String>> for ElementValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        ElementValue::map(value)
    }
}

impl From<HashMap<String, String>> for ElementValue {
    fn from(value: HashMap<String, String>) -> Self {
        let ordered: BTreeMap<String, String> = value.into_iter().collect();
        ElementValue::map(ordered)
    }
}

/// Options for [`Element::serialize`].
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    pub pretty: bool,
    pub encoding: String,
    /// Emit an XML declaration marked `standalone="yes"`.
    pub standalone: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            encoding: "UTF-8".to_string(),
            standalone: false,
        }
    }
}

impl SerializeOptions {
    pub fn standalone() -> Self {
        Self {
            standalone: true,
            ..Self::default()
        }
    }
}

fn xml_error<E: fmt::Display>(err: E) -> WfaError {
    WfaError::Xml(err.to_string())
}

/// Local part of a possibly namespaced tag (`atom:link`, `{uri}link`).
fn local_name(tag: &str) -> &str {
    if let Some(rest) = tag.strip_prefix('{') {
        return rest.split_once('}').map(|(_, local)| local).unwrap_or(tag);
    }
    tag.rsplit_once(':').map(|(_, local)| local).unwrap_or(tag)
}

impl Element {
    /// Create an empty element named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a node with one text child per `(name, value)` pair.
    ///
    /// Empty values still produce an (empty) child element.
    pub fn build_node(tag: &str, children: &[(&str, &str)]) -> Self {
        let mut parent = Element::new(tag);
        for (name, value) in children {
            parent.add_new_child(name, value, false);
        }
        parent
    }

    /// Parse an XML document into its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| WfaError::Xml("unbalanced closing tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text.unescape().map_err(xml_error)?;
                        current.push_text(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        let data = data.into_inner();
                        current.push_text(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(WfaError::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| WfaError::Xml("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(xml_error)?
            .to_string();
        let mut element = Element::new(name);

        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(key).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            element.add_attribute(key, value);
        }

        Ok(element)
    }

    fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(element);
        } else if root.is_none() {
            *root = Some(element);
        } else {
            return Err(WfaError::Xml("multiple root elements".to_string()));
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        // Indentation between child elements is not content.
        if text.trim().is_empty() {
            return;
        }
        match self.text.as_mut() {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Tag name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text content of the element itself.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_content(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// Add an attribute, replacing any existing one with the same name.
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn add_attributes<K, V, I>(&mut self, attrs: I)
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (name, value) in attrs {
            self.add_attribute(name, value);
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k == name)
    }

    /// Value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }

    /// Append `child` after the existing children.
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Append `<name>content</name>`.
    ///
    /// With `convert`, `&lt;`/`&gt;` entity references in `content` are turned
    /// back into characters first.
    pub fn add_new_child(&mut self, name: &str, content: &str, convert: bool) {
        let mut child = Element::new(name);
        let content = if convert {
            content.replace("&lt;", "<").replace("&gt;", ">")
        } else {
            content.to_string()
        };
        if !content.is_empty() {
            child.set_content(content);
        }
        self.add_child(child);
    }

    /// Append a node built with [`Element::build_node`].
    pub fn add_node_with_children(&mut self, tag: &str, children: &[(&str, &str)]) {
        self.add_child(Element::build_node(tag, children));
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child whose tag or local name equals `name`.
    pub fn find_child_by_tag_name(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| child.name == name || local_name(&child.name) == name)
    }

    /// Text of the first child named `name`.
    pub fn child_content(&self, name: &str) -> Option<&str> {
        self.find_child_by_tag_name(name)
            .and_then(|child| child.content())
    }

    /// Dict-like lookup: child with children, then child text, then attribute.
    pub fn get(&self, key: &str) -> Result<ElementEntry<'_>> {
        if let Some(child) = self.find_child_by_tag_name(key) {
            if child.children.is_empty() {
                return Ok(ElementEntry::Text(child.content().unwrap_or("")));
            }
            return Ok(ElementEntry::Node(child));
        }
        if let Some(value) = self.attribute(key) {
            return Ok(ElementEntry::Text(value));
        }
        Err(WfaError::ElementNotFound(key.to_string()))
    }

    /// Dict-like insertion of `value` as a new child named `key`.
    pub fn set(&mut self, key: &str, value: impl Into<ElementValue>) -> Result<()> {
        if key.is_empty() {
            return Err(WfaError::InvalidKey);
        }

        let mut child = Element::new(key);
        match value.into() {
            ElementValue::Empty => {}
            ElementValue::Text(text) => {
                if !text.is_empty() {
                    child.set_content(text);
                }
            }
            ElementValue::Node(node) => child.add_child(node),
            container => child.translate_struct(container)?,
        }
        self.add_child(child);
        Ok(())
    }

    /// Append a map or list as nested child elements.
    ///
    /// ```
    /// use wfa_share::element::{Element, ElementValue};
    ///
    /// let mut root = Element::new("root");
    /// root.translate_struct(ElementValue::list([
    ///     ElementValue::map([("elem1", "vl1"), ("elem2", "vl2")]),
    ///     ElementValue::map([("elem1", "vl3")]),
    /// ]))
    /// .unwrap();
    /// assert_eq!(
    ///     root.to_string(),
    ///     "<root><elem1>vl1</elem1><elem2>vl2</elem2><elem1>vl3</elem1></root>"
    /// );
    /// ```
    pub fn translate_struct(&mut self, value: ElementValue) -> Result<()> {
        match value {
            ElementValue::List(items) => {
                for item in items {
                    match item {
                        ElementValue::Map(_) | ElementValue::List(_) => {
                            self.translate_struct(item)?
                        }
                        ElementValue::Text(tag) => {
                            if tag.is_empty() {
                                return Err(WfaError::InvalidKey);
                            }
                            self.add_child(Element::new(tag));
                        }
                        ElementValue::Node(node) => self.add_child(node),
                        ElementValue::Empty => {}
                    }
                }
                Ok(())
            }
            ElementValue::Map(entries) => {
                for (key, item) in entries {
                    if key.is_empty() {
                        return Err(WfaError::InvalidKey);
                    }
                    let mut child = Element::new(key);
                    match item {
                        ElementValue::Map(_) | ElementValue::List(_) => {
                            child.translate_struct(item)?
                        }
                        ElementValue::Text(text) => {
                            if !text.is_empty() {
                                child.set_content(text);
                            }
                        }
                        ElementValue::Node(node) => child.add_child(node),
                        ElementValue::Empty => {}
                    }
                    self.add_child(child);
                }
                Ok(())
            }
            other => Err(WfaError::UnsupportedType(other.type_name().to_string())),
        }
    }

    /// Render the element (and its subtree) as XML.
    pub fn serialize(&self, options: &SerializeOptions) -> Result<String> {
        let mut writer = if options.pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        if options.standalone {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    "1.0",
                    Some(options.encoding.as_str()),
                    Some("yes"),
                )))
                .map_err(xml_error)?;
        }
        self.write_to(&mut writer)?;

        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = self.text.as_deref().filter(|t| !t.is_empty());
        if self.children.is_empty() && text.is_none() {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)?;
        Ok(())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xml = self
            .serialize(&SerializeOptions::default())
            .map_err(|_| fmt::Error)?;
        f.write_str(&xml)
    }
}
