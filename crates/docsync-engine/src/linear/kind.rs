use serde::{Deserialize, Serialize};

/// Every kind of node the engine knows about.
///
/// The set is closed: structural rules are answered by the capability methods
/// below rather than by looking types up at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Root of the tree. Never appears in linear data.
    Document,
    Div,
    List,
    ListItem,
    BlockQuote,
    Paragraph,
    Heading,
    Preformatted,
    Image,
    Break,
    /// A run of characters. Never appears as a marker in linear data.
    Text,
}

impl NodeKind {
    /// Branches whose children are other branches
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            NodeKind::Document
                | NodeKind::Div
                | NodeKind::List
                | NodeKind::ListItem
                | NodeKind::BlockQuote
        )
    }

    /// Branches whose children are text runs and inline leaves
    pub fn is_content_branch(self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::Preformatted
        )
    }

    /// Atomic elements that sit inside content branches (open + close, no children)
    pub fn is_inline_leaf(self) -> bool {
        matches!(self, NodeKind::Image | NodeKind::Break)
    }

    pub fn can_contain_text(self) -> bool {
        self.is_content_branch()
    }

    /// Whether `self` may appear as a marker pair in linear data
    pub fn is_marker(self) -> bool {
        !matches!(self, NodeKind::Document | NodeKind::Text)
    }

    /// Whether a node of kind `child` may be a direct child of `self`
    pub fn can_contain(self, child: NodeKind) -> bool {
        if self.is_structural() {
            (child.is_structural() && child != NodeKind::Document) || child.is_content_branch()
        } else if self.is_content_branch() {
            child == NodeKind::Text || child.is_inline_leaf()
        } else {
            false
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Div => "div",
            NodeKind::List => "list",
            NodeKind::ListItem => "listItem",
            NodeKind::BlockQuote => "blockQuote",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Preformatted => "preformatted",
            NodeKind::Image => "image",
            NodeKind::Break => "break",
            NodeKind::Text => "text",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
