use crate::span::Span;
use crate::{AssignmentId, RuleId};

/// What produced a non-terminal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Rule(RuleId),
    Assignment(AssignmentId),
    /// Text matched by a repetition separator.
    Separator,
}

/// A node of the concrete parse tree. Groups, sequences and choices leave no
/// node of their own; their matches become children of the enclosing rule or
/// assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseNode<'a> {
    /// A string or regex match. `rule` is the rule whose body matched it.
    Terminal { rule: RuleId, span: Span<'a> },
    NonTerminal {
        kind: NodeKind,
        span: Span<'a>,
        children: Vec<ParseNode<'a>>,
    },
}

impl<'a> ParseNode<'a> {
    pub fn span(&self) -> Span<'a> {
        match self {
            ParseNode::Terminal { span, .. } | ParseNode::NonTerminal { span, .. } => *span,
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.span().as_str()
    }

    pub fn children(&self) -> &[ParseNode<'a>] {
        match self {
            ParseNode::Terminal { .. } => &[],
            ParseNode::NonTerminal { children, .. } => children,
        }
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            ParseNode::Terminal { .. } => None,
            ParseNode::NonTerminal { kind, .. } => Some(*kind),
        }
    }

    /// The rule that produced this node, if it is a rule invocation.
    pub fn rule(&self) -> Option<RuleId> {
        match self.kind() {
            Some(NodeKind::Rule(rule)) => Some(rule),
            _ => None,
        }
    }

    pub fn is_separator(&self) -> bool {
        self.kind() == Some(NodeKind::Separator)
    }

    /// Concatenated text of every terminal below this node, leaving out the
    /// whitespace and comments skipped between them.
    pub fn text(&self) -> String {
        self.iter()
            .filter_map(|node| match node {
                ParseNode::Terminal { span, .. } => Some(span.as_str()),
                ParseNode::NonTerminal { .. } => None,
            })
            .collect()
    }

    /// Depth-first, pre-order iteration starting with this node.
    pub fn iter(&self) -> DfsParseTreeIterator<'_, 'a> {
        DfsParseTreeIterator { stack: vec![self] }
    }
}

/// Pre-order walk over a parse tree.
pub struct DfsParseTreeIterator<'t, 'a> {
    stack: Vec<&'t ParseNode<'a>>,
}

impl<'t, 'a> Iterator for DfsParseTreeIterator<'t, 'a> {
    type Item = &'t ParseNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}
