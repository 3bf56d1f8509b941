/*!
# Rule Context

What a rule may see and do while it is being applied.
*/

use crate::attributes::{AttributeBag, Attributes, FileId, TypeHandle};
use crate::commander::Commanders;
use crate::config::LanguageVersion;
use crate::syntax::{Node, NodeId, NodeKind, SyntaxTree, TokenStream};
use crate::types::TypeResolver;

/// Per-call view handed to a rule.
///
/// Reads are unrestricted. Writes are limited to allocating fresh nodes and
/// queueing structural edits; existing nodes are never edited in place.
pub struct RuleContext<'a> {
    tree: &'a mut SyntaxTree,
    attrs: &'a Attributes,
    tokens: &'a TokenStream,
    resolver: &'a dyn TypeResolver,
    commanders: &'a mut Commanders,
    file: &'a FileId,
    version: LanguageVersion,
}

impl<'a> RuleContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: &'a mut SyntaxTree,
        attrs: &'a Attributes,
        tokens: &'a TokenStream,
        resolver: &'a dyn TypeResolver,
        commanders: &'a mut Commanders,
        file: &'a FileId,
        version: LanguageVersion,
    ) -> Self {
        Self {
            tree,
            attrs,
            tokens,
            resolver,
            commanders,
            file,
            version,
        }
    }

    // ---- reading ----

    pub fn tree(&self) -> &SyntaxTree {
        &*self.tree
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.tree.node(id)
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.tree.kind(id)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id)
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn attributes(&self) -> &Attributes {
        self.attrs
    }

    pub fn bag(&self, id: NodeId) -> Option<&AttributeBag> {
        self.attrs.get(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.attrs.parent(id)
    }

    pub fn file(&self) -> &FileId {
        self.file
    }

    /// Source text a parsed node came from; `None` for rewritten nodes
    pub fn original_text(&self, id: NodeId) -> Option<&str> {
        self.attrs
            .original_span(id)
            .map(|span| self.tokens.span_text(span))
    }

    /// Static type of an expression, asked of the resolver against the
    /// current tree
    pub fn static_type(&self, id: NodeId) -> Option<TypeHandle> {
        self.resolver.resolve_type(&*self.tree, self.attrs, id)
    }

    pub fn is_scope_known(&self, id: NodeId) -> bool {
        self.attrs.scope(id).is_known()
    }

    pub fn version(&self) -> LanguageVersion {
        self.version
    }

    pub fn is_at_least(&self, version: LanguageVersion) -> bool {
        self.version >= version
    }

    /// Nearest node at or above `id` sitting directly in a statement list
    pub fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        self.attrs.enclosing_statement(&*self.tree, id)
    }

    /// Statements before `stmt` in its list, nearest first
    pub fn previous_statements(&self, stmt: NodeId) -> Vec<NodeId> {
        match self.attrs.statement_position(&*self.tree, stmt) {
            Some((owner, index)) => {
                let mut before = self.tree.children(owner);
                before.truncate(index);
                before.reverse();
                before
            }
            None => Vec::new(),
        }
    }

    /// Statements after `stmt` in its list, in source order
    pub fn next_statements(&self, stmt: NodeId) -> Vec<NodeId> {
        match self.attrs.statement_position(&*self.tree, stmt) {
            Some((owner, index)) => self.tree.children(owner).split_off(index + 1),
            None => Vec::new(),
        }
    }

    /// Whether `id` or one of its ancestors is already queued for removal
    pub fn is_removed(&self, id: NodeId) -> bool {
        let removal = &self.commanders.removal;
        removal.is_queued(id) || self.attrs.ancestors(id).any(|a| removal.is_queued(a))
    }

    // ---- building ----

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.tree.alloc(node)
    }

    /// Copy a subtree under fresh identities
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        self.tree.deep_clone(id)
    }

    // ---- deferred edits ----

    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        self.commanders.insertion.insert_before(anchor, node);
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        self.commanders.insertion.insert_after(anchor, node);
    }

    pub fn add_member(&mut self, owner: NodeId, member: NodeId) {
        self.commanders.members.add_member(owner, member);
    }

    pub fn remove(&mut self, target: NodeId) {
        self.commanders.removal.remove(target);
    }
}
