//! Node type of the binary stanza format.
//!
//! A node has a tag, an attribute map and optional content. Content is a single value
//! or an ordered list of child nodes.

use std::fmt;

use indexmap::IndexMap;

use crate::types::Jid;

/// Tag of the empty-list sentinel node.
pub const EMPTY_LIST_TAG: &str = "0";

/// Attributes of a node, kept in insertion order.
pub type Attrs = IndexMap<String, AttrValue>;

/// Possible values for node attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Bytes(Vec<u8>),
    Jid(Jid),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttrValue::Bytes(bytes)
    }
}

impl From<Jid> for AttrValue {
    fn from(jid: Jid) -> Self {
        AttrValue::Jid(jid)
    }
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_jid(&self) -> Option<&Jid> {
        match self {
            AttrValue::Jid(jid) => Some(jid),
            _ => None,
        }
    }
}

/// Content of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeContent {
    #[default]
    None,
    Text(String),
    Bytes(Vec<u8>),
    Jid(Jid),
    Children(Vec<Node>),
}

impl NodeContent {
    pub fn is_none(&self) -> bool {
        matches!(self, NodeContent::None)
    }
}

/// Node represents one element of a stanza tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: NodeContent,
}

impl Node {
    /// Create a new node with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Attrs::new(),
            content: NodeContent::None,
        }
    }

    /// The empty-list sentinel, encoded as a fixed two byte marker.
    pub fn empty_list() -> Self {
        Self::new(EMPTY_LIST_TAG)
    }

    /// Returns true for the empty-list sentinel.
    pub fn is_empty_list(&self) -> bool {
        self.tag == EMPTY_LIST_TAG && self.attrs.is_empty() && self.content.is_none()
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style content setter.
    pub fn with_content(mut self, content: NodeContent) -> Self {
        self.content = content;
        self
    }

    /// Builder-style children setter.
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = NodeContent::Children(children);
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Get an attribute as text.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    /// Get an attribute as a JID.
    pub fn attr_jid(&self, key: &str) -> Option<&Jid> {
        self.attrs.get(key).and_then(AttrValue::as_jid)
    }

    /// Add a child node, replacing any non-list content.
    pub fn add_child(&mut self, child: Node) {
        match &mut self.content {
            NodeContent::Children(children) => children.push(child),
            _ => self.content = NodeContent::Children(vec![child]),
        }
    }

    /// Children if content is a list.
    pub fn children(&self) -> &[Node] {
        match &self.content {
            NodeContent::Children(children) => children,
            _ => &[],
        }
    }

    pub fn children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children().iter().filter(move |node| node.tag == tag)
    }

    pub fn child_by_tag(&self, tag: &str) -> Option<&Node> {
        self.children().iter().find(|node| node.tag == tag)
    }

    /// Bytes content if present.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            NodeContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Number of list entries the node occupies on the wire: tag, key/value pairs, content.
    pub fn wire_size(&self) -> usize {
        1 + 2 * self.attrs.len() + usize::from(!self.content.is_none())
    }

    fn write_xml(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}<{}", self.tag)?;
        for (key, value) in &self.attrs {
            match value {
                AttrValue::Text(text) => write!(f, " {key}=\"{text}\"")?,
                AttrValue::Bytes(bytes) => write!(f, " {key}=\"{}\"", hex::encode(bytes))?,
                AttrValue::Jid(jid) => write!(f, " {key}=\"{jid}\"")?,
            }
        }
        match &self.content {
            NodeContent::None => write!(f, "/>"),
            NodeContent::Text(text) => write!(f, ">{text}</{}>", self.tag),
            NodeContent::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) if text.chars().all(|c| !c.is_control()) => {
                    write!(f, ">{text}</{}>", self.tag)
                }
                _ => write!(f, "><!-- {} bytes -->{}</{}>", bytes.len(), hex::encode(bytes), self.tag),
            },
            NodeContent::Jid(jid) => write!(f, ">{jid}</{}>", self.tag),
            NodeContent::Children(children) => {
                writeln!(f, ">")?;
                for child in children {
                    child.write_xml(f, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{indent}</{}>", self.tag)
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_xml(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Server;

    #[test]
    fn test_node_creation() {
        let node = Node::new("message")
            .with_attr("id", "123")
            .with_attr("to", Jid::new("123", Server::User));

        assert_eq!(node.tag, "message");
        assert_eq!(node.attr_str("id"), Some("123"));
        assert_eq!(node.attr_jid("to").map(ToString::to_string).as_deref(), Some("123@s.whatsapp.net"));
        assert_eq!(node.wire_size(), 5);
    }

    #[test]
    fn test_node_children() {
        let mut parent = Node::new("iq");
        parent.add_child(Node::new("query"));
        parent.add_child(Node::new("result"));
        parent.add_child(Node::new("query"));

        assert_eq!(parent.children().len(), 3);
        assert_eq!(parent.children_by_tag("query").count(), 2);
        assert_eq!(parent.child_by_tag("result").map(|n| n.tag.as_str()), Some("result"));
        assert_eq!(parent.wire_size(), 2);
    }

    #[test]
    fn test_attribute_order_does_not_affect_equality() {
        let a = Node::new("iq").with_attr("id", "1").with_attr("type", "get");
        let b = Node::new("iq").with_attr("type", "get").with_attr("id", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_list_sentinel() {
        assert!(Node::empty_list().is_empty_list());
        assert!(!Node::new("0").with_attr("a", "b").is_empty_list());
    }

    #[test]
    fn test_display() {
        let node = Node::new("iq")
            .with_attr("id", "1")
            .with_children(vec![Node::new("ping").with_content(NodeContent::Bytes(vec![0, 1]))]);
        assert_eq!(
            node.to_string(),
            "<iq id=\"1\">\n  <ping><!-- 2 bytes -->0001</ping>\n</iq>"
        );
    }
}
