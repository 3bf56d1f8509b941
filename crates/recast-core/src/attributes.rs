/*!
# Attribute Bags

Per-node metadata kept beside the syntax arena rather than inside it. Bags are
attached by node identity: two structurally equal nodes never share a bag.

The decorator fills every reachable node's bag before any rule runs, so
`parent` (absent only on the root), `enclosing_scope`, `source_file` and,
for parsed nodes, `original_span` can be relied on during dispatch.
*/

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::syntax::{NodeId, NodeKind, SyntaxTree, TokenSpan};

/// Identity of the file a tree was parsed from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Arc<str>);

impl FileId {
    pub fn new(path: impl AsRef<str>) -> Self {
        FileId(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque scope identity handed out by the type resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeHandle(pub u32);

/// Enclosing scope of a node; `Unknown` when the resolver could not tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Known(ScopeHandle),
    Unknown,
}

impl Scope {
    pub fn is_known(self) -> bool {
        matches!(self, Scope::Known(_))
    }
}

/// Static type answer from the type resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeHandle {
    String,
    Int,
    Bool,
    Null,
    Array,
    /// Class name without a leading backslash
    Object(String),
}

impl TypeHandle {
    /// Whether this is an object of `class`, compared by short or full name
    pub fn is_object_of(&self, class: &str) -> bool {
        match self {
            TypeHandle::Object(name) => {
                let name = name.trim_start_matches('\\');
                let class = class.trim_start_matches('\\');
                name.eq_ignore_ascii_case(class)
                    || short_name(name).eq_ignore_ascii_case(short_name(class))
            }
            _ => false,
        }
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// Metadata attached to one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeBag {
    pub parent: Option<NodeId>,
    pub enclosing_scope: Scope,
    pub source_file: FileId,
    /// Token range this node was parsed from; never set on rewritten nodes
    pub original_span: Option<TokenSpan>,
    pub resolved_type: Option<TypeHandle>,
    pub enclosing_class: Option<String>,
    pub enclosing_function: Option<String>,
}

impl AttributeBag {
    pub fn new(source_file: FileId) -> Self {
        Self {
            parent: None,
            enclosing_scope: Scope::Unknown,
            source_file,
            original_span: None,
            resolved_type: None,
            enclosing_class: None,
            enclosing_function: None,
        }
    }

    /// Copy of this bag for a node that takes this node's place. The
    /// original span stays behind: a replacement has no source text.
    pub fn mirrored(&self) -> Self {
        Self {
            original_span: None,
            resolved_type: None,
            ..self.clone()
        }
    }
}

/// Bags for every node of one arena, indexed by `NodeId`
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    bags: Vec<Option<AttributeBag>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&AttributeBag> {
        self.bags.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut AttributeBag> {
        self.bags.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|bag| bag.parent)
    }

    pub fn original_span(&self, id: NodeId) -> Option<TokenSpan> {
        self.get(id).and_then(|bag| bag.original_span)
    }

    pub fn scope(&self, id: NodeId) -> Scope {
        self.get(id).map_or(Scope::Unknown, |bag| bag.enclosing_scope)
    }

    pub fn insert(&mut self, id: NodeId, bag: AttributeBag) {
        if self.bags.len() <= id.index() {
            self.bags.resize(id.index() + 1, None);
        }
        self.bags[id.index()] = Some(bag);
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Hook a (possibly fresh) subtree into the tree under `parent`.
    ///
    /// Every node in the subtree gets its parent link set. Nodes without a
    /// bag receive a mirror of `template`'s bag; nodes that already have one
    /// (reused original nodes) keep their span and scope.
    pub fn adopt(&mut self, tree: &SyntaxTree, root: NodeId, parent: Option<NodeId>, template: NodeId) {
        let template_bag = match self.get(template).or_else(|| parent.and_then(|p| self.get(p))) {
            Some(bag) => bag.mirrored(),
            None => return,
        };
        let mut stack = vec![(root, parent)];
        while let Some((id, parent)) = stack.pop() {
            match self.get_mut(id) {
                Some(bag) => bag.parent = parent,
                None => {
                    let mut bag = template_bag.clone();
                    bag.parent = parent;
                    self.insert(id, bag);
                }
            }
            stack.extend(tree.children(id).into_iter().map(|child| (child, Some(id))));
        }
    }

    /// Nearest node at or above `id` that sits directly in a statement list
    pub fn enclosing_statement(&self, tree: &SyntaxTree, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&node| {
                self.parent(node)
                    .is_some_and(|parent| tree.kind(parent).is_statement_list())
            })
    }

    /// Statement list holding `stmt` and its index there
    pub fn statement_position(&self, tree: &SyntaxTree, stmt: NodeId) -> Option<(NodeId, usize)> {
        let owner = self.parent(stmt)?;
        if !tree.kind(owner).is_statement_list() {
            return None;
        }
        let index = tree.children(owner).iter().position(|&s| s == stmt)?;
        Some((owner, index))
    }

    /// Nearest ancestor of the given kind
    pub fn enclosing_of_kind(&self, tree: &SyntaxTree, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id).find(|&node| tree.kind(node) == kind)
    }

    /// Number of populated bags
    pub fn len(&self) -> usize {
        self.bags.iter().filter(|bag| bag.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rewire parent links of `id`'s direct children after a slot edit
pub(crate) fn relink_children(attrs: &mut Attributes, tree: &SyntaxTree, id: NodeId) {
    for child in tree.children(id) {
        if let Some(bag) = attrs.get_mut(child) {
            bag.parent = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Node, QuoteStyle};

    fn bag(parent: Option<NodeId>) -> AttributeBag {
        AttributeBag {
            parent,
            enclosing_scope: Scope::Known(ScopeHandle(0)),
            original_span: Some(TokenSpan::new(0, 3)),
            ..AttributeBag::new(FileId::new("test.php"))
        }
    }

    #[test]
    fn test_mirror_drops_original_span() {
        let original = bag(Some(NodeId::new(4)));
        let mirror = original.mirrored();
        assert_eq!(mirror.parent, original.parent);
        assert_eq!(mirror.enclosing_scope, original.enclosing_scope);
        assert_eq!(mirror.source_file, original.source_file);
        assert_eq!(mirror.original_span, None);
    }

    #[test]
    fn test_adopt_fresh_subtree() {
        let mut tree = SyntaxTree::new();
        let old = tree.alloc(Node::string("", QuoteStyle::Single));
        let item = tree.alloc(Node::Number { value: 1 });
        let array = tree.alloc(Node::Array { items: vec![item] });

        let mut attrs = Attributes::new();
        attrs.insert(old, bag(Some(NodeId::new(9))));
        attrs.adopt(&tree, array, Some(NodeId::new(9)), old);

        assert_eq!(attrs.parent(array), Some(NodeId::new(9)));
        assert_eq!(attrs.parent(item), Some(array));
        assert_eq!(attrs.original_span(array), None);
        assert!(attrs.scope(item).is_known());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut attrs = Attributes::new();
        attrs.insert(NodeId::new(0), bag(None));
        attrs.insert(NodeId::new(1), bag(Some(NodeId::new(0))));
        attrs.insert(NodeId::new(2), bag(Some(NodeId::new(1))));
        let chain: Vec<NodeId> = attrs.ancestors(NodeId::new(2)).collect();
        assert_eq!(chain, vec![NodeId::new(1), NodeId::new(0)]);
    }

    #[test]
    fn test_object_type_matches_short_name() {
        let ty = TypeHandle::Object("Symfony\\Component\\HttpFoundation\\Response".into());
        assert!(ty.is_object_of("Response"));
        assert!(ty.is_object_of("\\Symfony\\Component\\HttpFoundation\\Response"));
        assert!(!ty.is_object_of("Request"));
    }

    #[test]
    fn test_file_id_serializes_as_path() {
        let file = FileId::new("src/a.php");
        let json = serde_json::to_string(&file).unwrap();
        assert_eq!(json, "\"src/a.php\"");
        let back: FileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, file);
    }
}
