//! Syntax model for the rewriting engine.
//!
//! Nodes live in a per-file arena ([`SyntaxTree`]) and refer to their
//! children by [`NodeId`]. A node exclusively owns its direct children; parent
//! links are kept out of the node itself, in the attribute bags.
//!
//! Rules may read any node and allocate new ones. Editing the child slots of
//! an existing node is reserved to the dispatcher and the commanders, which
//! is what lets the printer tell preserved subtrees from rewritten ones.

pub mod lexer;
pub mod parser;
pub mod token;
pub mod walk;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use parser::{ParseError, ParsedFile, ScriptParser, SourceParser};
pub use token::{Token, TokenKind, TokenSpan, TokenStream};

/// Stable identity of a node within one file's arena
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Identical,
    NotIdentical,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Concat,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "===" => BinaryOp::Identical,
            "!==" => BinaryOp::NotIdentical,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            "." => BinaryOp::Concat,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Concat => ".",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }

    /// Binding power; higher binds tighter. All operators are left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Identical | BinaryOp::NotIdentical | BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => 4,
            BinaryOp::Concat => 5,
            BinaryOp::Add | BinaryOp::Subtract => 6,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 7,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastType {
    Array,
    String,
    Int,
    Bool,
}

impl CastType {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "array" => Some(CastType::Array),
            "string" => Some(CastType::String),
            "int" => Some(CastType::Int),
            "bool" => Some(CastType::Bool),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            CastType::Array => "array",
            CastType::String => "string",
            CastType::Int => "int",
            CastType::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteStyle {
    Single,
    Double,
}

impl QuoteStyle {
    pub fn char(self) -> char {
        match self {
            QuoteStyle::Single => '\'',
            QuoteStyle::Double => '"',
        }
    }
}

/// Fieldless discriminant of [`Node`], used to register rule interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Program,
    ClassDecl,
    PropertyDecl,
    FunctionDecl,
    Param,
    Block,
    If,
    Return,
    Echo,
    ExprStmt,
    Assign,
    Binary,
    Unary,
    Cast,
    Call,
    MethodCall,
    New,
    ClassConstFetch,
    PropertyFetch,
    ArrayDimFetch,
    Array,
    Variable,
    String,
    Number,
    Bool,
    Null,
}

impl NodeKind {
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeKind::Program
                | NodeKind::ClassDecl
                | NodeKind::PropertyDecl
                | NodeKind::FunctionDecl
                | NodeKind::Block
                | NodeKind::If
                | NodeKind::Return
                | NodeKind::Echo
                | NodeKind::ExprStmt
        )
    }

    pub fn is_expression(self) -> bool {
        !self.is_statement() && self != NodeKind::Param
    }

    /// Kinds whose children form exactly one ordered sequence
    pub fn is_sequence(self) -> bool {
        matches!(
            self,
            NodeKind::Program
                | NodeKind::Block
                | NodeKind::ClassDecl
                | NodeKind::Echo
                | NodeKind::Call
                | NodeKind::New
                | NodeKind::Array
        )
    }

    /// Kinds whose sequence holds statements
    pub fn is_statement_list(self) -> bool {
        matches!(self, NodeKind::Program | NodeKind::Block)
    }

    /// Whether a sequence of this kind may directly hold a node of `child`
    pub fn accepts_in_sequence(self, child: NodeKind) -> bool {
        match self {
            NodeKind::Program | NodeKind::Block => child.is_statement() && child != NodeKind::Program,
            NodeKind::ClassDecl => matches!(child, NodeKind::PropertyDecl | NodeKind::FunctionDecl),
            NodeKind::FunctionDecl => child == NodeKind::Param,
            NodeKind::Echo
            | NodeKind::Call
            | NodeKind::MethodCall
            | NodeKind::New
            | NodeKind::Array => child.is_expression(),
            _ => false,
        }
    }
}

/// Structural requirement of a child slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotShape {
    /// Exactly one child
    Required,
    /// Zero or one child
    Optional,
    /// Any number of children
    List,
    /// At least one child
    NonEmptyList,
}

/// Read view of one child slot
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub shape: SlotShape,
    pub ids: &'a [NodeId],
}

pub(crate) enum SlotMut<'a> {
    One(&'a mut NodeId),
    Maybe(&'a mut Option<NodeId>),
    Many(&'a mut Vec<NodeId>, bool),
}

/// One syntactic construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Program {
        stmts: Vec<NodeId>,
    },
    ClassDecl {
        name: String,
        members: Vec<NodeId>,
    },
    PropertyDecl {
        modifiers: Vec<String>,
        /// As written, including a leading `$` if present
        name: String,
        default: Option<NodeId>,
    },
    FunctionDecl {
        modifiers: Vec<String>,
        name: String,
        params: Vec<NodeId>,
        body: NodeId,
    },
    Param {
        name: String,
    },
    Block {
        stmts: Vec<NodeId>,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Return {
        value: Option<NodeId>,
    },
    Echo {
        values: Vec<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Cast {
        ty: CastType,
        expr: NodeId,
    },
    Call {
        name: String,
        args: Vec<NodeId>,
    },
    MethodCall {
        object: NodeId,
        method: String,
        args: Vec<NodeId>,
    },
    New {
        class: String,
        args: Vec<NodeId>,
    },
    ClassConstFetch {
        class: String,
        constant: String,
    },
    PropertyFetch {
        object: NodeId,
        property: String,
    },
    ArrayDimFetch {
        array: NodeId,
        /// `None` for the append form `a[]`
        index: Option<NodeId>,
    },
    Array {
        items: Vec<NodeId>,
    },
    Variable {
        /// As written, including a leading `$` if present
        name: String,
    },
    String {
        /// Raw text between the quotes
        value: String,
        quote: QuoteStyle,
    },
    Number {
        value: i64,
    },
    Bool {
        value: bool,
    },
    Null,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Program { .. } => NodeKind::Program,
            Node::ClassDecl { .. } => NodeKind::ClassDecl,
            Node::PropertyDecl { .. } => NodeKind::PropertyDecl,
            Node::FunctionDecl { .. } => NodeKind::FunctionDecl,
            Node::Param { .. } => NodeKind::Param,
            Node::Block { .. } => NodeKind::Block,
            Node::If { .. } => NodeKind::If,
            Node::Return { .. } => NodeKind::Return,
            Node::Echo { .. } => NodeKind::Echo,
            Node::ExprStmt { .. } => NodeKind::ExprStmt,
            Node::Assign { .. } => NodeKind::Assign,
            Node::Binary { .. } => NodeKind::Binary,
            Node::Unary { .. } => NodeKind::Unary,
            Node::Cast { .. } => NodeKind::Cast,
            Node::Call { .. } => NodeKind::Call,
            Node::MethodCall { .. } => NodeKind::MethodCall,
            Node::New { .. } => NodeKind::New,
            Node::ClassConstFetch { .. } => NodeKind::ClassConstFetch,
            Node::PropertyFetch { .. } => NodeKind::PropertyFetch,
            Node::ArrayDimFetch { .. } => NodeKind::ArrayDimFetch,
            Node::Array { .. } => NodeKind::Array,
            Node::Variable { .. } => NodeKind::Variable,
            Node::String { .. } => NodeKind::String,
            Node::Number { .. } => NodeKind::Number,
            Node::Bool { .. } => NodeKind::Bool,
            Node::Null => NodeKind::Null,
        }
    }

    /// Child slots in source order
    pub fn slots(&self) -> Vec<Slot<'_>> {
        fn one(id: &NodeId) -> Slot<'_> {
            Slot {
                shape: SlotShape::Required,
                ids: std::slice::from_ref(id),
            }
        }
        fn maybe(id: &Option<NodeId>) -> Slot<'_> {
            Slot {
                shape: SlotShape::Optional,
                ids: id.as_slice(),
            }
        }
        fn many(ids: &[NodeId]) -> Slot<'_> {
            Slot {
                shape: SlotShape::List,
                ids,
            }
        }

        match self {
            Node::Program { stmts } | Node::Block { stmts } => vec![many(stmts)],
            Node::ClassDecl { members, .. } => vec![many(members)],
            Node::PropertyDecl { default, .. } => vec![maybe(default)],
            Node::FunctionDecl { params, body, .. } => vec![many(params), one(body)],
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => vec![one(condition), one(then_branch), maybe(else_branch)],
            Node::Return { value } => vec![maybe(value)],
            Node::Echo { values } => vec![Slot {
                shape: SlotShape::NonEmptyList,
                ids: values,
            }],
            Node::ExprStmt { expr } => vec![one(expr)],
            Node::Assign { target, value } => vec![one(target), one(value)],
            Node::Binary { left, right, .. } => vec![one(left), one(right)],
            Node::Unary { operand, .. } => vec![one(operand)],
            Node::Cast { expr, .. } => vec![one(expr)],
            Node::Call { args, .. } | Node::New { args, .. } => vec![many(args)],
            Node::MethodCall { object, args, .. } => vec![one(object), many(args)],
            Node::PropertyFetch { object, .. } => vec![one(object)],
            Node::ArrayDimFetch { array, index } => vec![one(array), maybe(index)],
            Node::Array { items } => vec![many(items)],
            Node::Param { .. }
            | Node::ClassConstFetch { .. }
            | Node::Variable { .. }
            | Node::String { .. }
            | Node::Number { .. }
            | Node::Bool { .. }
            | Node::Null => Vec::new(),
        }
    }

    pub(crate) fn slots_mut(&mut self) -> Vec<SlotMut<'_>> {
        match self {
            Node::Program { stmts } | Node::Block { stmts } => vec![SlotMut::Many(stmts, false)],
            Node::ClassDecl { members, .. } => vec![SlotMut::Many(members, false)],
            Node::PropertyDecl { default, .. } => vec![SlotMut::Maybe(default)],
            Node::FunctionDecl { params, body, .. } => {
                vec![SlotMut::Many(params, false), SlotMut::One(body)]
            }
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => vec![
                SlotMut::One(condition),
                SlotMut::One(then_branch),
                SlotMut::Maybe(else_branch),
            ],
            Node::Return { value } => vec![SlotMut::Maybe(value)],
            Node::Echo { values } => vec![SlotMut::Many(values, true)],
            Node::ExprStmt { expr } => vec![SlotMut::One(expr)],
            Node::Assign { target, value } => vec![SlotMut::One(target), SlotMut::One(value)],
            Node::Binary { left, right, .. } => vec![SlotMut::One(left), SlotMut::One(right)],
            Node::Unary { operand, .. } => vec![SlotMut::One(operand)],
            Node::Cast { expr, .. } => vec![SlotMut::One(expr)],
            Node::Call { args, .. } | Node::New { args, .. } => vec![SlotMut::Many(args, false)],
            Node::MethodCall { object, args, .. } => {
                vec![SlotMut::One(object), SlotMut::Many(args, false)]
            }
            Node::PropertyFetch { object, .. } => vec![SlotMut::One(object)],
            Node::ArrayDimFetch { array, index } => {
                vec![SlotMut::One(array), SlotMut::Maybe(index)]
            }
            Node::Array { items } => vec![SlotMut::Many(items, false)],
            Node::Param { .. }
            | Node::ClassConstFetch { .. }
            | Node::Variable { .. }
            | Node::String { .. }
            | Node::Number { .. }
            | Node::Bool { .. }
            | Node::Null => Vec::new(),
        }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<NodeId> {
        self.slots()
            .into_iter()
            .flat_map(|slot| slot.ids.iter().copied())
            .collect()
    }

    /// Shape of the slot currently holding `child`
    pub fn slot_shape_of(&self, child: NodeId) -> Option<SlotShape> {
        self.slots()
            .into_iter()
            .find(|slot| slot.ids.contains(&child))
            .map(|slot| slot.shape)
    }

    /// Swap `old` for `new` wherever it sits. Returns whether it was found.
    pub(crate) fn replace_child(&mut self, old: NodeId, new: NodeId) -> bool {
        for slot in self.slots_mut() {
            match slot {
                SlotMut::One(id) if *id == old => {
                    *id = new;
                    return true;
                }
                SlotMut::Maybe(id) if *id == Some(old) => {
                    *id = Some(new);
                    return true;
                }
                SlotMut::Many(ids, _) => {
                    if let Some(position) = ids.iter().position(|id| *id == old) {
                        ids[position] = new;
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Detach `child` from its slot.
    ///
    /// Fails with the slot's shape when the removal would leave this node
    /// structurally invalid, and with `None` when `child` is not a child.
    pub(crate) fn remove_child(&mut self, child: NodeId) -> Result<(), Option<SlotShape>> {
        for slot in self.slots_mut() {
            match slot {
                SlotMut::One(id) if *id == child => return Err(Some(SlotShape::Required)),
                SlotMut::Maybe(id) if *id == Some(child) => {
                    *id = None;
                    return Ok(());
                }
                SlotMut::Many(ids, non_empty) => {
                    if let Some(position) = ids.iter().position(|id| *id == child) {
                        if non_empty && ids.len() == 1 {
                            return Err(Some(SlotShape::NonEmptyList));
                        }
                        ids.remove(position);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(None)
    }

    /// The sequence slot holding `child`, if `child` sits in one
    pub(crate) fn sequence_containing_mut(&mut self, child: NodeId) -> Option<&mut Vec<NodeId>> {
        self.slots_mut().into_iter().find_map(|slot| match slot {
            SlotMut::Many(ids, _) if ids.contains(&child) => Some(ids),
            _ => None,
        })
    }

    /// Member list of a class declaration
    pub(crate) fn members_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Node::ClassDecl { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Name of a variable without its `$` sigil
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Node::Variable { name } => Some(name.trim_start_matches('$')),
            _ => None,
        }
    }

    pub fn variable(name: impl Into<String>) -> Node {
        Node::Variable { name: name.into() }
    }

    pub fn string(value: impl Into<String>, quote: QuoteStyle) -> Node {
        Node::String {
            value: value.into(),
            quote,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<NodeId>) -> Node {
        Node::Call {
            name: name.into(),
            args,
        }
    }

    pub fn empty_array() -> Node {
        Node::Array { items: Vec::new() }
    }
}

/// Arena holding every node of one file
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and return its identity
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Root of the tree. An empty arena reports a placeholder id 0.
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId::new(0))
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children()
    }

    /// Number of allocated nodes, reachable or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reachable from `id`, in pre-order, including `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Copy a subtree, giving every copied node a fresh identity
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let mut copy = self.node(id).clone();
        for slot in copy.slots_mut() {
            match slot {
                SlotMut::One(child) => *child = self.deep_clone(*child),
                SlotMut::Maybe(child) => {
                    if let Some(inner) = child {
                        *inner = self.deep_clone(*inner);
                    }
                }
                SlotMut::Many(children, _) => {
                    for child in children.iter_mut() {
                        *child = self.deep_clone(*child);
                    }
                }
            }
        }
        self.alloc(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (SyntaxTree, NodeId, NodeId, NodeId) {
        let mut tree = SyntaxTree::new();
        let var = tree.alloc(Node::variable("a"));
        let value = tree.alloc(Node::string("", QuoteStyle::Single));
        let assign = tree.alloc(Node::Assign { target: var, value });
        let stmt = tree.alloc(Node::ExprStmt { expr: assign });
        let program = tree.alloc(Node::Program { stmts: vec![stmt] });
        tree.set_root(program);
        (tree, assign, value, stmt)
    }

    #[test]
    fn test_children_in_source_order() {
        let (tree, assign, value, _) = sample();
        let children = tree.children(assign);
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], value);
    }

    #[test]
    fn test_remove_required_child_is_rejected() {
        let (mut tree, assign, value, _) = sample();
        let result = tree.node_mut(assign).remove_child(value);
        assert_eq!(result, Err(Some(SlotShape::Required)));
    }

    #[test]
    fn test_remove_from_non_empty_list() {
        let mut tree = SyntaxTree::new();
        let a = tree.alloc(Node::Number { value: 1 });
        let echo = tree.alloc(Node::Echo { values: vec![a] });
        assert_eq!(
            tree.node_mut(echo).remove_child(a),
            Err(Some(SlotShape::NonEmptyList))
        );
    }

    #[test]
    fn test_deep_clone_gives_fresh_identities() {
        let (mut tree, assign, _, _) = sample();
        let before = tree.len();
        let copy = tree.deep_clone(assign);
        assert_ne!(copy, assign);
        assert_eq!(tree.len(), before + 3);
        assert_eq!(tree.kind(copy), NodeKind::Assign);
        assert!(tree
            .children(copy)
            .iter()
            .all(|child| child.index() >= before));
    }

    #[test]
    fn test_replace_child() {
        let (mut tree, assign, value, _) = sample();
        let array = tree.alloc(Node::empty_array());
        assert!(tree.node_mut(assign).replace_child(value, array));
        assert_eq!(tree.children(assign)[1], array);
    }

    #[test]
    fn test_descendants_pre_order() {
        let (tree, assign, _, stmt) = sample();
        let order = tree.descendants(tree.root());
        assert_eq!(order[1], stmt);
        assert_eq!(order[2], assign);
    }
}
