// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::str;

use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use slotmap::{new_key_type, SlotMap};

const DEFAULT_VERSION: &str = "1.0";
const DEFAULT_ENCODING: &str = "UTF-8";

new_key_type! {
    /// An opaque handle to a node within a [`Document`]. Two handles are equal only if they
    /// refer to the same node, regardless of what the nodes contain.
    pub struct NodeId;
}

/// Errors produced while reading or writing a document.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("Invalid UTF-8 in document: {0}")]
    Utf8(#[from] str::Utf8Error),

    #[error("Unexpected closing tag </{0}>")]
    UnexpectedEnd(String),

    #[error("Element <{0}> is never closed")]
    Unclosed(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Document has more than one root element")]
    MultipleRoots,

    #[error("Unable to write document: {0}")]
    Write(String),
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

impl Element {
    fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Gets the tag name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the attributes of the element in source order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Declaration {
            version: DEFAULT_VERSION.to_string(),
            encoding: Some(DEFAULT_ENCODING.to_string()),
            standalone: None,
        }
    }
}

/// A mutable XML document. Nodes are stored in an arena and addressed by [`NodeId`], so
/// handles stay valid while other parts of the tree are rewritten.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    declaration: Declaration,
    top_level: Vec<NodeId>,
    root: NodeId,
}

impl Document {
    /// Parses a document from a string. Whitespace is preserved as text nodes.
    pub fn parse(xml: &str) -> Result<Document, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let mut declaration: Option<Declaration> = None;
        let mut top_level: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let node = match reader.read_event()? {
                Event::Eof => break,
                Event::Decl(decl) => {
                    declaration = Some(read_declaration(&decl)?);
                    continue;
                }
                Event::Start(start) => {
                    let id = nodes.insert(Node::Element(read_element(&start)?));
                    attach(&mut nodes, &mut top_level, &mut root, stack.last().copied(), id)?;
                    stack.push(id);
                    continue;
                }
                Event::End(end) => {
                    let name = str::from_utf8(end.name().as_ref())?.to_string();
                    match stack.pop() {
                        Some(id) if element_name(&nodes, id) == Some(name.as_str()) => {}
                        _ => return Err(XmlError::UnexpectedEnd(name)),
                    }
                    continue;
                }
                Event::Empty(start) => Node::Element(read_element(&start)?),
                Event::Text(text) => {
                    let value = text.unescape()?.into_owned();
                    if stack.is_empty() {
                        // Whitespace between top level nodes is regenerated on write.
                        continue;
                    }
                    Node::Text(value)
                }
                Event::CData(data) => Node::CData(str::from_utf8(&data)?.to_string()),
                Event::Comment(text) => Node::Comment(str::from_utf8(&text)?.to_string()),
                Event::PI(text) => Node::ProcessingInstruction(str::from_utf8(&text)?.to_string()),
                Event::DocType(text) => Node::DocType(str::from_utf8(&text)?.to_string()),
            };
            let id = nodes.insert(node);
            attach(&mut nodes, &mut top_level, &mut root, stack.last().copied(), id)?;
        }

        if let Some(unclosed) = stack.last() {
            return Err(XmlError::Unclosed(
                element_name(&nodes, *unclosed).unwrap_or_default().to_string(),
            ));
        }

        Ok(Document {
            nodes,
            declaration: declaration.unwrap_or_default(),
            top_level,
            root: root.ok_or(XmlError::NoRoot)?,
        })
    }

    /// Serializes the document, including the XML declaration.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new(
                &self.declaration.version,
                self.declaration.encoding.as_deref(),
                self.declaration.standalone.as_deref(),
            )),
        )?;
        for id in self.top_level.iter() {
            writer.get_mut().push(b'\n');
            self.write_node(&mut writer, *id)?;
        }
        writer.get_mut().push(b'\n');

        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), XmlError> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };

        match node {
            Node::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for (key, value) in element.attributes.iter() {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if element.children.is_empty() {
                    return emit(writer, Event::Empty(start));
                }
                emit(writer, Event::Start(start))?;
                for child in element.children.iter() {
                    self.write_node(writer, *child)?;
                }
                emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
            }
            Node::Text(text) => emit(
                writer,
                Event::Text(BytesText::from_escaped(partial_escape(text))),
            ),
            Node::CData(text) => emit(writer, Event::CData(BytesCData::new(text.as_str()))),
            Node::Comment(text) => emit(
                writer,
                Event::Comment(BytesText::from_escaped(text.as_str())),
            ),
            Node::ProcessingInstruction(text) => {
                emit(writer, Event::PI(BytesText::from_escaped(text.as_str())))
            }
            Node::DocType(text) => emit(
                writer,
                Event::DocType(BytesText::from_escaped(text.as_str())),
            ),
        }
    }

    /// Gets the root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns true if the handle refers to a live node in this document.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Gets the node behind the handle.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Gets the element behind the handle, if it is an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.nodes.get(id) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Gets the tag name of an element.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        element_name(&self.nodes, id)
    }

    /// Gets the direct children of a node. Non-elements have no children.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id)
            .map(|element| element.children.as_slice())
            .unwrap_or_default()
    }

    /// Iterates over the direct element children of a node.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
    }

    /// Finds the first direct child element with the given name.
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|child| self.name(*child) == Some(name))
    }

    /// Lists every descendant of a node in document order. The node itself is excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            found.push(next);
            pending.extend(self.children(next).iter().rev().copied());
        }
        found
    }

    /// Lists every descendant element with the given name in document order.
    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.name(*node) == Some(name))
            .collect()
    }

    /// Finds the first descendant element with the given name in document order.
    pub fn find_descendant(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.descendants_named(id, name).into_iter().next()
    }

    /// Resolves a path such as `["Staff", "Instrument", "trackName"]`: the first segment
    /// matches any descendant, every later segment a direct child of the previous match.
    /// Returns the first match in document order.
    pub fn find_path(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        let (first, rest) = path.split_first()?;
        self.descendants_named(id, first)
            .into_iter()
            .find_map(|start| self.follow(start, rest))
    }

    fn follow(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        match path.split_first() {
            None => Some(id),
            Some((name, rest)) => self
                .child_elements(id)
                .filter(|child| self.name(*child) == Some(*name))
                .find_map(|child| self.follow(child, rest)),
        }
    }

    /// Gets an attribute value of an element.
    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute on an element, replacing any existing value in place.
    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        match element.attributes.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element
                .attributes
                .push((key.to_string(), value.to_string())),
        }
    }

    /// Gets the concatenated direct text content of an element, or None if it has none.
    pub fn text(&self, id: NodeId) -> Option<String> {
        let mut text: Option<String> = None;
        for child in self.children(id) {
            if let Some(Node::Text(value) | Node::CData(value)) = self.nodes.get(*child) {
                text.get_or_insert_with(String::new).push_str(value);
            }
        }
        text
    }

    /// Replaces the direct text content of an element.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let text_children: Vec<NodeId> = self
            .children(id)
            .iter()
            .copied()
            .filter(|child| matches!(self.nodes.get(*child), Some(Node::Text(_) | Node::CData(_))))
            .collect();
        for child in text_children {
            self.remove_child(id, child);
        }
        if text.is_empty() || self.element(id).is_none() {
            return;
        }

        let text_node = self.nodes.insert(Node::Text(text.to_string()));
        if let Some(element) = self.element_mut(id) {
            element.children.insert(0, text_node);
        }
    }

    /// Appends a new, empty element as the last child of `parent`. If `parent` is not an
    /// element, nothing is inserted and the returned handle is null.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = self.nodes.insert(Node::Element(Element::new(name)));
        match self.element_mut(parent) {
            Some(element) => element.children.push(id),
            None => {
                self.nodes.remove(id);
                return NodeId::default();
            }
        }
        id
    }

    /// Detaches `child` from `parent` and frees its whole subtree. Returns false if
    /// `child` was not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(element) = self.element_mut(parent) else {
            return false;
        };
        let Some(position) = element.children.iter().position(|id| *id == child) else {
            return false;
        };
        element.children.remove(position);

        for id in self.descendants(child) {
            self.nodes.remove(id);
        }
        self.nodes.remove(child);
        true
    }
}

fn element_name(nodes: &SlotMap<NodeId, Node>, id: NodeId) -> Option<&str> {
    match nodes.get(id) {
        Some(Node::Element(element)) => Some(element.name.as_str()),
        _ => None,
    }
}

fn read_element(start: &BytesStart) -> Result<Element, XmlError> {
    let mut element = Element::new(str::from_utf8(start.name().as_ref())?);
    for attribute in start.attributes() {
        let attribute = attribute?;
        element.attributes.push((
            str::from_utf8(attribute.key.as_ref())?.to_string(),
            attribute.unescape_value()?.into_owned(),
        ));
    }
    Ok(element)
}

fn read_declaration(decl: &BytesDecl) -> Result<Declaration, XmlError> {
    let version = str::from_utf8(&decl.version()?)?.to_string();
    let encoding = match decl.encoding() {
        Some(encoding) => Some(str::from_utf8(&encoding?)?.to_string()),
        None => None,
    };
    let standalone = match decl.standalone() {
        Some(standalone) => Some(str::from_utf8(&standalone?)?.to_string()),
        None => None,
    };
    Ok(Declaration {
        version,
        encoding,
        standalone,
    })
}

fn attach(
    nodes: &mut SlotMap<NodeId, Node>,
    top_level: &mut Vec<NodeId>,
    root: &mut Option<NodeId>,
    parent: Option<NodeId>,
    id: NodeId,
) -> Result<(), XmlError> {
    if let Some(parent) = parent {
        if let Some(Node::Element(element)) = nodes.get_mut(parent) {
            element.children.push(id);
        }
        return Ok(());
    }

    if matches!(nodes.get(id), Some(Node::Element(_))) {
        if root.is_some() {
            return Err(XmlError::MultipleRoots);
        }
        *root = Some(id);
    }
    top_level.push(id);
    Ok(())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}
