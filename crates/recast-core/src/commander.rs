/*!
# Mutation Commanders

Rules never change the shape of the tree while it is being walked. Structural
edits they ask for are recorded here and applied after the pass, in three
independent queues:

- [`NodeAddingCommander`] splices new siblings before or after an anchor
- [`PropertyAddingCommander`] appends members to a class declaration
- [`NodeRemovingCommander`] detaches nodes from their parent

Each queue applies in enqueue order and is drained by `apply`, whether or
not applying succeeds, so nothing carries over to the next file.
*/

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::attributes::{relink_children, Attributes};
use crate::syntax::{Node, NodeId, NodeKind, SlotShape, SyntaxTree};

/// A deferred structural edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationCommand {
    InsertBefore { anchor: NodeId, node: NodeId },
    InsertAfter { anchor: NodeId, node: NodeId },
    AddMember { owner: NodeId, member: NodeId },
    Remove { target: NodeId },
}

/// Applying a command would break the tree's structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("removing {target} would empty a required child slot of {parent}")]
    RequiredChild { target: NodeId, parent: NodeId },

    #[error("removing {target} would empty the non-empty list of {parent}")]
    EmptySequence { target: NodeId, parent: NodeId },

    #[error("no sequence near {anchor} accepts {node}")]
    NoSequence { anchor: NodeId, node: NodeId },

    #[error("{owner} is not a class declaration and cannot take members")]
    NotAMemberOwner { owner: NodeId },

    #[error("{node} is not attached to the tree")]
    Detached { node: NodeId },
}

impl CommandError {
    /// A removal that would leave a required slot or non-empty list empty.
    /// The other variants are edits that could not be placed at all.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CommandError::RequiredChild { .. } | CommandError::EmptySequence { .. }
        )
    }
}

/// A queue of deferred edits of one family
pub trait Commander {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply and drain the queue. Returns the number of edits performed.
    fn apply(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<usize, CommandError>;

    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Before,
    After,
}

/// Inserts sibling nodes next to an anchor
#[derive(Debug, Default)]
pub struct NodeAddingCommander {
    queue: Vec<(Placement, NodeId, NodeId)>,
}

impl NodeAddingCommander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        self.queue.push((Placement::Before, anchor, node));
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        self.queue.push((Placement::After, anchor, node));
    }

    pub fn commands(&self) -> impl Iterator<Item = MutationCommand> + '_ {
        self.queue.iter().map(|&(placement, anchor, node)| match placement {
            Placement::Before => MutationCommand::InsertBefore { anchor, node },
            Placement::After => MutationCommand::InsertAfter { anchor, node },
        })
    }

    /// Point insertions anchored on `old` at `new`
    pub fn retarget(&mut self, old: NodeId, new: NodeId) {
        for (_, anchor, _) in self.queue.iter_mut().filter(|(_, anchor, _)| *anchor == old) {
            *anchor = new;
        }
    }

    fn truncate(&mut self, len: usize) {
        self.queue.truncate(len);
    }

    /// Climb from `anchor` to the nearest sequence able to hold `node`.
    /// Returns the sequence owner, the sequence member to insert next to and
    /// whether `node` needs an expression-statement wrapper.
    fn site(
        tree: &mut SyntaxTree,
        attrs: &Attributes,
        anchor: NodeId,
        node: NodeId,
    ) -> Result<(NodeId, NodeId, bool), CommandError> {
        let kind = tree.kind(node);
        let mut current = anchor;
        loop {
            let parent = attrs
                .parent(current)
                .ok_or(CommandError::Detached { node: current })?;
            let owner = tree.kind(parent);
            let in_sequence = tree.node_mut(parent).sequence_containing_mut(current).is_some();
            if in_sequence {
                if owner.accepts_in_sequence(kind) {
                    return Ok((parent, current, false));
                }
                if owner.is_statement_list() && kind.is_expression() {
                    return Ok((parent, current, true));
                }
            }
            if owner == NodeKind::Program {
                return Err(CommandError::NoSequence { anchor, node });
            }
            current = parent;
        }
    }
}

impl Commander for NodeAddingCommander {
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn apply(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<usize, CommandError> {
        let queue = std::mem::take(&mut self.queue);
        // Last node inserted after each site, so repeated InsertAfter on one
        // anchor keeps enqueue order.
        let mut last_after: HashMap<NodeId, NodeId> = HashMap::new();
        let mut applied = 0;

        for (placement, anchor, node) in queue {
            let (owner, site, wrap) = Self::site(tree, attrs, anchor, node)?;
            let inserted = if wrap {
                tree.alloc(Node::ExprStmt { expr: node })
            } else {
                node
            };

            let sequence = tree
                .node_mut(owner)
                .sequence_containing_mut(site)
                .ok_or(CommandError::NoSequence { anchor, node })?;
            // Recomputed at apply time: earlier insertions shift indices
            let index = match placement {
                Placement::Before => sequence.iter().position(|&id| id == site),
                Placement::After => {
                    let after = last_after
                        .get(&site)
                        .filter(|id| sequence.contains(*id))
                        .copied()
                        .unwrap_or(site);
                    sequence.iter().position(|&id| id == after).map(|i| i + 1)
                }
            }
            .ok_or(CommandError::Detached { node: site })?;
            sequence.insert(index, inserted);

            if placement == Placement::After {
                last_after.insert(site, inserted);
            }
            attrs.adopt(tree, inserted, Some(owner), site);
            trace!(%owner, %site, node = %inserted, index, "inserted node");
            applied += 1;
        }
        Ok(applied)
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Appends members to class declarations, once per member identity
#[derive(Debug, Default)]
pub struct PropertyAddingCommander {
    queue: Vec<(NodeId, NodeId)>,
}

impl PropertyAddingCommander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&mut self, owner: NodeId, member: NodeId) {
        self.queue.push((owner, member));
    }

    pub fn commands(&self) -> impl Iterator<Item = MutationCommand> + '_ {
        self.queue
            .iter()
            .map(|&(owner, member)| MutationCommand::AddMember { owner, member })
    }

    pub fn retarget(&mut self, old: NodeId, new: NodeId) {
        for (owner, _) in self.queue.iter_mut().filter(|(owner, _)| *owner == old) {
            *owner = new;
        }
    }

    fn truncate(&mut self, len: usize) {
        self.queue.truncate(len);
    }
}

impl Commander for PropertyAddingCommander {
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn apply(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<usize, CommandError> {
        let queue = std::mem::take(&mut self.queue);
        let mut applied = 0;
        for (owner, member) in queue {
            let members = tree
                .node_mut(owner)
                .members_mut()
                .ok_or(CommandError::NotAMemberOwner { owner })?;
            if members.contains(&member) {
                continue;
            }
            members.push(member);
            attrs.adopt(tree, member, Some(owner), owner);
            trace!(%owner, %member, "added member");
            applied += 1;
        }
        Ok(applied)
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Detaches nodes from their parents
#[derive(Debug, Default)]
pub struct NodeRemovingCommander {
    queue: Vec<NodeId>,
    queued: HashSet<NodeId>,
}

impl NodeRemovingCommander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, target: NodeId) {
        if self.queued.insert(target) {
            self.queue.push(target);
        }
    }

    pub fn is_queued(&self, target: NodeId) -> bool {
        self.queued.contains(&target)
    }

    pub fn commands(&self) -> impl Iterator<Item = MutationCommand> + '_ {
        self.queue
            .iter()
            .map(|&target| MutationCommand::Remove { target })
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.queue.len() {
            return;
        }
        for target in self.queue.drain(len..) {
            self.queued.remove(&target);
        }
    }
}

impl Commander for NodeRemovingCommander {
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn apply(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<usize, CommandError> {
        let queue = std::mem::take(&mut self.queue);
        let queued = std::mem::take(&mut self.queued);
        let mut applied = 0;
        for target in queue {
            // Goes away with its removed ancestor
            if attrs.ancestors(target).any(|ancestor| queued.contains(&ancestor)) {
                continue;
            }
            let parent = attrs
                .parent(target)
                .ok_or(CommandError::Detached { node: target })?;
            match tree.node_mut(parent).remove_child(target) {
                Ok(()) => {}
                Err(Some(SlotShape::NonEmptyList)) => {
                    return Err(CommandError::EmptySequence { target, parent })
                }
                Err(Some(_)) => return Err(CommandError::RequiredChild { target, parent }),
                Err(None) => return Err(CommandError::Detached { node: target }),
            }
            relink_children(attrs, tree, parent);
            trace!(%parent, %target, "removed node");
            applied += 1;
        }
        Ok(applied)
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.queued.clear();
    }
}

/// Counts of edits applied in one commit
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub inserted: usize,
    pub members_added: usize,
    pub removed: usize,
}

impl CommitReport {
    pub fn total(&self) -> usize {
        self.inserted + self.members_added + self.removed
    }
}

/// Queue lengths at one moment, used to drop a failed rule's edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    insertion: usize,
    members: usize,
    removal: usize,
}

/// The three queues, applied together after a dispatch pass
#[derive(Debug, Default)]
pub struct Commanders {
    pub insertion: NodeAddingCommander,
    pub members: PropertyAddingCommander,
    pub removal: NodeRemovingCommander,
}

impl Commanders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion.is_empty() && self.members.is_empty() && self.removal.is_empty()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            insertion: self.insertion.len(),
            members: self.members.len(),
            removal: self.removal.len(),
        }
    }

    /// Forget everything enqueued since `checkpoint`
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.insertion.truncate(checkpoint.insertion);
        self.members.truncate(checkpoint.members);
        self.removal.truncate(checkpoint.removal);
    }

    /// Carry edits anchored on a replaced node over to its replacement
    pub fn retarget(&mut self, old: NodeId, new: NodeId) {
        self.insertion.retarget(old, new);
        self.members.retarget(old, new);
    }

    /// Every pending command, in application order
    pub fn pending(&self) -> Vec<MutationCommand> {
        self.insertion
            .commands()
            .chain(self.members.commands())
            .chain(self.removal.commands())
            .collect()
    }

    /// Apply insertions, then member additions, then removals. All queues
    /// are empty afterwards, even when an edit fails.
    pub fn apply(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<CommitReport, CommandError> {
        let result = self.apply_in_order(tree, attrs);
        self.clear();
        let report = result?;
        if report.total() > 0 {
            debug!(
                inserted = report.inserted,
                members = report.members_added,
                removed = report.removed,
                "applied commanders"
            );
        }
        Ok(report)
    }

    fn apply_in_order(&mut self, tree: &mut SyntaxTree, attrs: &mut Attributes) -> Result<CommitReport, CommandError> {
        Ok(CommitReport {
            inserted: self.insertion.apply(tree, attrs)?,
            members_added: self.members.apply(tree, attrs)?,
            removed: self.removal.apply(tree, attrs)?,
        })
    }

    pub fn clear(&mut self) {
        self.insertion.clear();
        self.members.clear();
        self.removal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FileId;
    use crate::decorator::ScopeDecorator;
    use crate::syntax::{ScriptParser, SourceParser};
    use crate::types::LocalTypeResolver;

    fn setup(source: &str) -> (SyntaxTree, Attributes) {
        let file = ScriptParser::new().parse(source).unwrap();
        let decorated =
            ScopeDecorator::new(&LocalTypeResolver).decorate(&file, &FileId::new("c.php"));
        (file.tree, decorated.attributes)
    }

    fn stmts(tree: &SyntaxTree) -> Vec<NodeId> {
        tree.children(tree.root())
    }

    fn echo(tree: &mut SyntaxTree, value: i64) -> NodeId {
        let number = tree.alloc(Node::Number { value });
        tree.alloc(Node::Echo {
            values: vec![number],
        })
    }

    #[test]
    fn test_insert_after_keeps_enqueue_order() {
        let (mut tree, mut attrs) = setup("a();\nb();");
        let anchor = stmts(&tree)[0];
        let x = echo(&mut tree, 1);
        let y = echo(&mut tree, 2);

        let mut commanders = Commanders::new();
        commanders.insertion.insert_after(anchor, x);
        commanders.insertion.insert_after(anchor, y);
        let report = commanders.apply(&mut tree, &mut attrs).unwrap();

        assert_eq!(report.inserted, 2);
        let after = stmts(&tree);
        assert_eq!(after[0], anchor);
        assert_eq!(after[1], x);
        assert_eq!(after[2], y);
        assert_eq!(attrs.parent(x), Some(tree.root()));
        assert!(commanders.is_empty());
    }

    #[test]
    fn test_insert_before_expression_anchor_climbs_to_statement() {
        let (mut tree, mut attrs) = setup("a = 1;\nb = 2;");
        let second = stmts(&tree)[1];
        let call = tree.alloc(Node::call("log", Vec::new()));
        let anchor = tree.children(second)[0];

        let mut commanders = Commanders::new();
        commanders.insertion.insert_before(anchor, call);
        commanders.apply(&mut tree, &mut attrs).unwrap();

        let after = stmts(&tree);
        assert_eq!(after.len(), 3);
        assert_eq!(tree.kind(after[1]), NodeKind::ExprStmt);
        assert_eq!(tree.children(after[1]), vec![call]);
        assert_eq!(after[2], second);
    }

    #[test]
    fn test_add_member_deduplicates_by_identity() {
        let (mut tree, mut attrs) = setup("class A {\n}");
        let class = stmts(&tree)[0];
        let member = tree.alloc(Node::PropertyDecl {
            modifiers: vec!["private".into()],
            name: "$cache".into(),
            default: None,
        });
        let twin = tree.alloc(Node::PropertyDecl {
            modifiers: vec!["private".into()],
            name: "$cache".into(),
            default: None,
        });

        let mut commanders = Commanders::new();
        commanders.members.add_member(class, member);
        commanders.members.add_member(class, member);
        commanders.members.add_member(class, twin);
        let report = commanders.apply(&mut tree, &mut attrs).unwrap();

        assert_eq!(report.members_added, 2);
        assert_eq!(tree.children(class), vec![member, twin]);
    }

    #[test]
    fn test_add_member_to_non_class_fails() {
        let (mut tree, mut attrs) = setup("a();");
        let stmt = stmts(&tree)[0];
        let member = tree.alloc(Node::Param { name: "$x".into() });
        let mut commanders = Commanders::new();
        commanders.members.add_member(stmt, member);
        assert_eq!(
            commanders.apply(&mut tree, &mut attrs),
            Err(CommandError::NotAMemberOwner { owner: stmt })
        );
    }

    #[test]
    fn test_remove_last_echo_value_is_a_violation() {
        let (mut tree, mut attrs) = setup("echo 1;");
        let echo = stmts(&tree)[0];
        let value = tree.children(echo)[0];

        let mut commanders = Commanders::new();
        commanders.removal.remove(value);
        let err = commanders.apply(&mut tree, &mut attrs).unwrap_err();
        assert_eq!(
            err,
            CommandError::EmptySequence {
                target: value,
                parent: echo
            }
        );
        // Queues are drained on failure too
        assert!(commanders.is_empty());
        assert!(!commanders.removal.is_queued(value));
    }

    #[test]
    fn test_remove_required_child_is_a_violation() {
        let (mut tree, mut attrs) = setup("a = 1;");
        let stmt = stmts(&tree)[0];
        let assign = tree.children(stmt)[0];
        let mut commanders = Commanders::new();
        commanders.removal.remove(assign);
        assert!(matches!(
            commanders.apply(&mut tree, &mut attrs),
            Err(CommandError::RequiredChild { .. })
        ));
    }

    #[test]
    fn test_remove_statement_and_nested_target() {
        let (mut tree, mut attrs) = setup("a(1, 2);\nb();");
        let first = stmts(&tree)[0];
        let call = tree.children(first)[0];
        let arg = tree.children(call)[0];

        let mut commanders = Commanders::new();
        commanders.removal.remove(first);
        commanders.removal.remove(arg);
        commanders.removal.remove(first);
        let report = commanders.apply(&mut tree, &mut attrs).unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(stmts(&tree).len(), 1);
    }

    #[test]
    fn test_rollback_drops_later_edits_only() {
        let (mut tree, mut attrs) = setup("a();\nb();");
        let first = stmts(&tree)[0];
        let second = stmts(&tree)[1];
        let kept = echo(&mut tree, 1);
        let dropped = echo(&mut tree, 2);

        let mut commanders = Commanders::new();
        commanders.insertion.insert_after(first, kept);
        let checkpoint = commanders.checkpoint();
        commanders.insertion.insert_after(first, dropped);
        commanders.removal.remove(second);
        commanders.rollback(checkpoint);

        assert_eq!(commanders.checkpoint(), checkpoint);
        assert!(!commanders.removal.is_queued(second));
        commanders.apply(&mut tree, &mut attrs).unwrap();
        assert_eq!(stmts(&tree), vec![first, kept, second]);
    }

    #[test]
    fn test_retarget_moves_insertion_anchor() {
        let (mut tree, mut attrs) = setup("a();\nc();");
        let first = stmts(&tree)[0];
        let call = tree.alloc(Node::call("b", Vec::new()));
        let replacement = tree.alloc(Node::ExprStmt { expr: call });
        let inserted = echo(&mut tree, 1);

        let mut commanders = Commanders::new();
        commanders.insertion.insert_after(first, inserted);
        let root = tree.root();
        assert!(tree.node_mut(root).replace_child(first, replacement));
        attrs.adopt(&tree, replacement, Some(root), first);
        commanders.retarget(first, replacement);
        commanders.apply(&mut tree, &mut attrs).unwrap();

        assert_eq!(stmts(&tree)[..2], [replacement, inserted]);
    }

    #[test]
    fn test_only_removals_are_structural() {
        let node = NodeId::new(1);
        assert!(CommandError::RequiredChild { target: node, parent: node }.is_structural());
        assert!(!CommandError::NoSequence { anchor: node, node }.is_structural());
        assert!(!CommandError::Detached { node }.is_structural());
    }

    #[test]
    fn test_empty_queues_are_a_no_op() {
        let (mut tree, mut attrs) = setup("a();");
        let before = stmts(&tree);
        let report = Commanders::new().apply(&mut tree, &mut attrs).unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(stmts(&tree), before);
    }
}
