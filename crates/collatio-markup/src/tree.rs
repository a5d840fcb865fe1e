//! Arena tree over a markup fragment.
//!
//! The tree is built from `quick-xml` events. Every parsed node remembers the
//! source text it came from, so serialization of an untouched tree reproduces
//! the input byte for byte. Editing an element's attributes drops its raw start
//! tag and the element is written canonically from then on.

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::conventions::{VOID_ELEMENTS, WRAPPER_TAG};
use crate::error::MarkupError;

/// Index of a node inside its [`Tree`].
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Closing {
    /// End tag exactly as it appeared in the source.
    Raw(String),
    /// Written as `<name/>`.
    SelfClosing,
    /// Never closed in the source (lenient parse, HTML void elements).
    Omitted,
    /// Built in code; closed with `</name>`.
    Canonical,
}

/// An element node: name plus attributes in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    raw_start: Option<String>,
    closing: Closing,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            raw_start: None,
            closing: Closing::Canonical,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Sets an attribute, keeping the position of an existing one.
    ///
    /// Returns `false` when the attribute already had this value; the element
    /// then keeps its raw start tag.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, current)) if *current == value => return false,
            Some((_, current)) => *current = value,
            None => self.attributes.push((name.to_string(), value)),
        }
        self.raw_start = None;
        true
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map_or(false, |classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Appends `class` to the class list unless already present.
    pub fn add_class(&mut self, class: &str) -> bool {
        if self.has_class(class) {
            return false;
        }
        let classes = match self.attr("class").map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attr("class", classes)
    }

    fn start_tag(&self) -> Cow<'_, str> {
        if let Some(raw) = &self.raw_start {
            return Cow::Borrowed(raw);
        }
        let mut tag = format!("<{}", self.name);
        for (key, value) in &self.attributes {
            tag.push(' ');
            tag.push_str(key);
            tag.push_str("=\"");
            tag.push_str(&escape(value));
            tag.push('"');
        }
        if self.closing == Closing::SelfClosing {
            tag.push_str("/>");
        } else {
            tag.push('>');
        }
        Cow::Owned(tag)
    }

    fn write_end(&self, out: &mut String) {
        match &self.closing {
            Closing::Raw(raw) => out.push_str(raw),
            Closing::Canonical => {
                out.push_str("</");
                out.push_str(&self.name);
                out.push('>');
            }
            Closing::SelfClosing | Closing::Omitted => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Document,
    Element(Element),
    /// Character data, kept escaped exactly as written.
    Text(String),
    /// Content of a `<![CDATA[...]]>` section.
    CData(String),
    /// Comments, processing instructions, doctypes and stray end tags.
    Verbatim(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed markup fragment.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    wrapper: Option<NodeId>,
}

/// Parses `markup` into a tree.
///
/// - `lenient` tolerates unknown entities (`&nbsp;`), unclosed elements, stray
///   end tags, HTML void elements and valueless attributes.
/// - `wrap_root` surrounds the input with a synthetic element so fragments
///   without a single top element keep a common parent.
pub fn parse(markup: &str, lenient: bool, wrap_root: bool) -> Result<Tree, MarkupError> {
    let (source, skip): (Cow<'_, str>, usize) = if wrap_root {
        (
            Cow::Owned(format!("<{WRAPPER_TAG}>{markup}</{WRAPPER_TAG}>")),
            WRAPPER_TAG.len() + 2,
        )
    } else {
        (Cow::Borrowed(markup), 0)
    };

    let mut reader = Reader::from_str(&source);
    reader
        .trim_text(false)
        .expand_empty_elements(false)
        .check_end_names(!lenient);

    let mut tree = Tree::new();
    let mut open: Vec<NodeId> = vec![Tree::DOCUMENT];

    loop {
        let start = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|err| MarkupError::at(&source, reader.buffer_position(), skip, err.to_string()))?;
        let position = reader.buffer_position();
        // Source text of the event; names in end tags are trimmed by the reader.
        let verbatim = |rebuilt: String| {
            source
                .get(start..position)
                .map_or(rebuilt, str::to_string)
        };
        let parent = open.last().copied().unwrap_or(Tree::DOCUMENT);

        match event {
            Event::Start(tag) => {
                let element = element_from_tag(&tag, lenient, Closing::Omitted)
                    .map_err(|message| MarkupError::at(&source, position, skip, message))?;
                let void = lenient && VOID_ELEMENTS.contains(&element.name.to_ascii_lowercase().as_str());
                let id = tree.push(parent, NodeKind::Element(element));
                if !void {
                    open.push(id);
                }
            }
            Event::Empty(tag) => {
                let element = element_from_tag(&tag, lenient, Closing::SelfClosing)
                    .map_err(|message| MarkupError::at(&source, position, skip, message))?;
                tree.push(parent, NodeKind::Element(element));
            }
            Event::End(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                let raw = verbatim(format!("</{}>", String::from_utf8_lossy(&tag)));
                let matching = open.iter().rposition(|&id| {
                    tree.element(id).map_or(false, |element| element.name == name)
                });
                match matching {
                    Some(index) => {
                        let id = open[index];
                        if let NodeKind::Element(element) = &mut tree.nodes[id].kind {
                            element.closing = Closing::Raw(raw);
                        }
                        open.truncate(index);
                    }
                    None if lenient => {
                        tree.push(parent, NodeKind::Verbatim(raw));
                    }
                    None => {
                        return Err(MarkupError::at(
                            &source,
                            position,
                            skip,
                            format!("unexpected closing tag </{name}>"),
                        ));
                    }
                }
            }
            Event::Text(text) => {
                let raw = String::from_utf8_lossy(&text).into_owned();
                if !lenient {
                    unescape(&raw)
                        .map_err(|err| MarkupError::at(&source, position, skip, err.to_string()))?;
                }
                tree.push(parent, NodeKind::Text(raw));
            }
            Event::CData(data) => {
                let inner = String::from_utf8_lossy(&data).into_owned();
                tree.push(parent, NodeKind::CData(inner));
            }
            Event::Comment(comment) => {
                let raw = verbatim(format!("<!--{}-->", String::from_utf8_lossy(&comment)));
                tree.push(parent, NodeKind::Verbatim(raw));
            }
            Event::PI(pi) => {
                let raw = verbatim(format!("<?{}?>", String::from_utf8_lossy(&pi)));
                tree.push(parent, NodeKind::Verbatim(raw));
            }
            Event::Decl(decl) => {
                let raw = verbatim(format!("<?{}?>", String::from_utf8_lossy(&decl)));
                tree.push(parent, NodeKind::Verbatim(raw));
            }
            Event::DocType(doctype) => {
                let raw = verbatim(format!("<!DOCTYPE {}>", String::from_utf8_lossy(&doctype)));
                tree.push(parent, NodeKind::Verbatim(raw));
            }
            Event::Eof => break,
        }
    }

    if !lenient && open.len() > 1 {
        let name = open
            .last()
            .and_then(|&id| tree.element(id))
            .map(|element| element.name.clone())
            .unwrap_or_default();
        return Err(MarkupError::at(
            &source,
            source.len(),
            skip,
            format!("unclosed element <{name}>"),
        ));
    }

    if wrap_root {
        tree.wrapper = tree.nodes[Tree::DOCUMENT]
            .children
            .iter()
            .copied()
            .find(|&id| tree.element(id).map_or(false, |e| e.name == WRAPPER_TAG));
    }

    Ok(tree)
}

/// Lenient parse of a stored fragment, wrapped in a synthetic root.
pub fn parse_fragment(markup: &str) -> Result<Tree, MarkupError> {
    parse(markup, true, true)
}

fn element_from_tag(
    tag: &BytesStart<'_>,
    lenient: bool,
    closing: Closing,
) -> Result<Element, String> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let inner = String::from_utf8_lossy(tag);
    let raw_start = match closing {
        Closing::SelfClosing => format!("<{inner}/>"),
        _ => format!("<{inner}>"),
    };

    let mut attributes = Vec::new();
    let iter = if lenient {
        tag.html_attributes()
    } else {
        tag.attributes()
    };
    for attr in iter {
        match attr {
            Ok(attr) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let raw_value = String::from_utf8_lossy(&attr.value);
                let value = if lenient {
                    decode_text(&raw_value).into_owned()
                } else {
                    unescape(&raw_value)
                        .map_err(|err| err.to_string())?
                        .into_owned()
                };
                attributes.push((key, value));
            }
            // The raw start tag still carries whatever could not be read.
            Err(_) if lenient => continue,
            Err(err) => return Err(err.to_string()),
        }
    }

    Ok(Element {
        name,
        attributes,
        raw_start: Some(raw_start),
        closing,
    })
}

/// Decodes character and entity references, leaving unknown ones untouched.
pub fn decode_text(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail[1..]
            .find(';')
            .filter(|&end| end > 0 && end <= 32)
            .and_then(|end| resolve_reference(&tail[1..1 + end]).map(|text| (text, end + 2)));
        match decoded {
            Some((text, consumed)) => {
                out.push_str(&text);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_reference(name: &str) -> Option<Cow<'static, str>> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(|c| Cow::Owned(c.to_string()));
    }
    let text = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        "nbsp" => "\u{a0}",
        "shy" => "\u{ad}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "middot" => "\u{b7}",
        "sect" => "\u{a7}",
        "para" => "\u{b6}",
        "empty" => "\u{2205}",
        _ => return None,
    };
    Some(Cow::Borrowed(text))
}

impl Tree {
    pub const DOCUMENT: NodeId = 0;

    fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            wrapper: None,
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// The synthetic wrapper element, when the tree was parsed with `wrap_root`.
    pub fn wrapper(&self) -> Option<NodeId> {
        self.wrapper
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// All nodes below `id` in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    /// Elements matching `predicate`, in document order. The synthetic wrapper
    /// never matches.
    pub fn find_elements(&self, predicate: impl Fn(&Element) -> bool) -> Vec<NodeId> {
        self.find_elements_under(Self::DOCUMENT, predicate)
    }

    pub fn find_elements_under(
        &self,
        id: NodeId,
        predicate: impl Fn(&Element) -> bool,
    ) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&node| Some(node) != self.wrapper)
            .filter(|&node| self.element(node).map_or(false, &predicate))
            .collect()
    }

    /// Decoded text of `id` and all its descendants. Text following the
    /// element (its tail) is a sibling node and never included.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        for node in self.descendants(id) {
            match &self.nodes[node].kind {
                NodeKind::Text(raw) => text.push_str(&decode_text(raw)),
                NodeKind::CData(inner) => text.push_str(inner),
                _ => {}
            }
        }
        text
    }

    /// Adds a detached element; attach it with [`Tree::append_child`] or
    /// [`Tree::insert_after`].
    pub fn create_element(&mut self, element: Element) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Element(element),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&child| child != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        if let NodeKind::Element(element) = &mut self.nodes[parent].kind {
            if element.closing == Closing::SelfClosing {
                element.raw_start = None;
                element.closing = Closing::Canonical;
            }
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Appends plain `text` (escaped on the way in) as the last child of `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Text(partial_escape(text).into_owned()),
            parent: None,
            children: Vec::new(),
        });
        self.append_child(parent, id);
        id
    }

    /// Places `node` right after `anchor`, before the anchor's tail.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        let Some(parent) = self.nodes[anchor].parent else {
            return;
        };
        self.detach(node);
        let siblings = &mut self.nodes[parent].children;
        let index = siblings
            .iter()
            .position(|&id| id == anchor)
            .map_or(siblings.len(), |index| index + 1);
        siblings.insert(index, node);
        self.nodes[node].parent = Some(parent);
    }

    /// Replaces everything inside `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[id].children);
        for child in children {
            self.nodes[child].parent = None;
        }
        self.append_text(id, text);
    }

    /// Serializes the whole tree; `remove_wrapper` drops the synthetic root
    /// tags and keeps everything between them untouched.
    pub fn serialize(&self, remove_wrapper: bool) -> String {
        let mut out = String::new();
        self.write_node(Self::DOCUMENT, remove_wrapper, &mut out);
        out
    }

    /// Outer markup of a single node.
    pub fn serialize_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, false, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, remove_wrapper: bool, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Document => self.write_children(node, remove_wrapper, out),
            NodeKind::Element(element) => {
                let strip = remove_wrapper && self.wrapper == Some(id);
                if !strip {
                    out.push_str(&element.start_tag());
                }
                self.write_children(node, remove_wrapper, out);
                if !strip {
                    element.write_end(out);
                }
            }
            NodeKind::Text(raw) | NodeKind::Verbatim(raw) => out.push_str(raw),
            NodeKind::CData(inner) => {
                out.push_str("<![CDATA[");
                out.push_str(inner);
                out.push_str("]]>");
            }
        }
    }

    fn write_children(&self, node: &Node, remove_wrapper: bool, out: &mut String) {
        for &child in &node.children {
            self.write_node(child, remove_wrapper, out);
        }
    }
}
