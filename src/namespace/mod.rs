//! The namespace: hash-indexed name service, in-evaluation-order list, and the tree built after
//! loading (spec §3 "Namespace node", §4.3).

use crate::{
    arena::{Arena, ArenaIndex, ArenaSnapshot},
    hash::hash_path,
    name_object::{AmlName, NameSeg, NamePrefix},
    object::Object,
    AmlError,
};
use alloc::vec::Vec;
use bitflags::bitflags;

/// A handle to a [`NamespaceNode`] stored in the namespace's arena. Stable across scope
/// push/pop; invalidated (by convention, never dereferenced again) once the node is released.
pub type NodeHandle = ArenaIndex;

bitflags! {
    /// Scope-inheritance flags (spec §3 "Scope stack").
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ScopeFlags: u8 {
        /// Nodes created here are released when the scope pops (method-local scopes).
        const TEMPORARY = 1 << 0;
        /// Don't inherit the parent's flags; start fresh.
        const SWITCH = 1 << 1;
        /// A boundary scope search does not walk up past (reserved for future load-time scoping).
        const BOUNDARY = 1 << 2;
    }

    /// Search behavior flags for [`Namespace::search`] (spec §4.3).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SearchFlags: u8 {
        /// Restrict a single-segment relative search to the declaring scope only (used when
        /// creating a name, per ACPI 5.3).
        const NAME_CREATION = 1 << 0;
        /// Don't chase an `Alias` target; return the alias node itself.
        const NO_ALIAS_RESOLUTION = 1 << 1;
    }
}

pub const BUCKET_COUNT: usize = 64;

/// The level type a node's declaring construct implies (used by device-tree traversal during
/// `_INI`/`_REG`, mirroring the teacher's `LevelType`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LevelType {
    Scope,
    Device,
    Processor,
    PowerResource,
    ThermalZone,
    MethodLocals,
}

pub struct NamespaceNode {
    pub absolute_path: AmlName,
    pub hash: u32,
    pub object: Option<Object>,
    pub level_type: LevelType,
    pub flags: ScopeFlags,

    // Bucket doubly-linked list (by index into the bucket vec).
    pub bucket_next: Option<NodeHandle>,

    // In-evaluation-order list.
    pub order_next: Option<NodeHandle>,

    // Tree links, populated by `build_tree`.
    pub parent: Option<NodeHandle>,
    pub first_child: Option<NodeHandle>,
    pub next_sibling: Option<NodeHandle>,
    pub depth: u32,
    pub is_present: bool,

    /// True once this node has been linked into a temporary (method-local) scope's release list.
    pub temporary: bool,
    pub refcount: u32,
}

impl NamespaceNode {
    pub fn last_segment(&self) -> NameSeg {
        self.absolute_path.last_segment().unwrap_or(NameSeg::EMPTY)
    }
}

pub struct ScopeFrame {
    pub absolute_path: AmlName,
    pub hash: u32,
    pub flags: ScopeFlags,
    /// Head of the list of nodes created while this scope was active (used to release
    /// method-local nodes on pop).
    pub temp_nodes: Vec<NodeHandle>,
}

pub struct Namespace {
    arena: Arena<NamespaceNode>,
    buckets: [Option<NodeHandle>; BUCKET_COUNT],
    order_head: Option<NodeHandle>,
    order_tail: Option<NodeHandle>,
    root: NodeHandle,
    scope_stack: Vec<ScopeFrame>,
    pub tree_max_depth: u32,
}

impl Namespace {
    pub fn new() -> Namespace {
        let mut arena = Arena::new();
        let root_path = AmlName::root();
        let root_hash = hash_path(root_path.as_segment_slice());
        let root = arena.alloc(NamespaceNode {
            absolute_path: root_path.clone(),
            hash: root_hash,
            object: None,
            level_type: LevelType::Scope,
            flags: ScopeFlags::empty(),
            bucket_next: None,
            order_next: None,
            parent: None,
            first_child: None,
            next_sibling: None,
            depth: 1,
            is_present: true,
            temporary: false,
            refcount: 1,
        });

        let mut buckets = [None; BUCKET_COUNT];
        let bucket_idx = (root_hash as usize) % BUCKET_COUNT;
        buckets[bucket_idx] = Some(root);

        Namespace {
            arena,
            buckets,
            order_head: Some(root),
            order_tail: Some(root),
            root,
            scope_stack: alloc::vec![ScopeFrame {
                absolute_path: root_path,
                hash: root_hash,
                flags: ScopeFlags::empty(),
                temp_nodes: Vec::new(),
            }],
            tree_max_depth: 1,
        }
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&NamespaceNode> {
        self.arena.get(handle)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut NamespaceNode> {
        self.arena.get_mut(handle)
    }

    pub fn current_scope(&self) -> &AmlName {
        &self.scope_stack.last().expect("scope stack is never empty").absolute_path
    }

    fn bucket_for(hash: u32) -> usize {
        (hash as usize) % BUCKET_COUNT
    }

    fn lookup_absolute(&self, path: &AmlName) -> Option<NodeHandle> {
        let hash = hash_path(path.as_segment_slice());
        let mut cursor = self.buckets[Self::bucket_for(hash)];
        while let Some(handle) = cursor {
            let node = self.arena.get(handle).expect("bucket list points at freed node");
            if node.hash == hash && node.absolute_path == *path {
                return Some(handle);
            }
            cursor = node.bucket_next;
        }
        None
    }

    /// Creates a new node at `absolute_path`, under `level_type`. Fails on a colliding absolute
    /// path (spec §3 invariant: "Absolute paths are unique").
    pub fn create_node(
        &mut self,
        absolute_path: AmlName,
        level_type: LevelType,
    ) -> Result<NodeHandle, AmlError> {
        if self.lookup_absolute(&absolute_path).is_some() {
            return Err(AmlError::NameCollision(absolute_path));
        }

        let hash = hash_path(absolute_path.as_segment_slice());
        let depth = absolute_path.segments.len() as u32 + 1;
        let frame_flags = self.scope_stack.last().unwrap().flags;
        let temporary = frame_flags.contains(ScopeFlags::TEMPORARY);

        let handle = self.arena.alloc(NamespaceNode {
            absolute_path: absolute_path.clone(),
            hash,
            object: None,
            level_type,
            flags: frame_flags,
            bucket_next: None,
            order_next: None,
            parent: None,
            first_child: None,
            next_sibling: None,
            depth,
            is_present: false,
            temporary,
            refcount: 1,
        });

        // Bucket: head insertion.
        let bucket_idx = Self::bucket_for(hash);
        if let Some(node) = self.arena.get_mut(handle) {
            node.bucket_next = self.buckets[bucket_idx];
        }
        self.buckets[bucket_idx] = Some(handle);

        // In-order list: tail insertion.
        if let Some(tail) = self.order_tail {
            self.arena.get_mut(tail).unwrap().order_next = Some(handle);
        } else {
            self.order_head = Some(handle);
        }
        self.order_tail = Some(handle);

        // If the parent is already present in the tree, link immediately; otherwise this is
        // deferred to `build_tree`.
        if let Ok(parent_path) = absolute_path.parent() {
            if let Some(parent_handle) = self.lookup_absolute(&parent_path) {
                if self.arena.get(parent_handle).map(|n| n.is_present).unwrap_or(false) {
                    self.link_under_parent(handle, parent_handle);
                }
            }
        } else {
            // Root has no parent; nothing to link.
        }

        if temporary {
            self.scope_stack.last_mut().unwrap().temp_nodes.push(handle);
        }

        Ok(handle)
    }

    fn link_under_parent(&mut self, handle: NodeHandle, parent: NodeHandle) {
        let parent_depth = self.arena.get(parent).unwrap().depth;
        let old_first_child = self.arena.get(parent).unwrap().first_child;
        {
            let node = self.arena.get_mut(handle).unwrap();
            node.parent = Some(parent);
            node.next_sibling = old_first_child;
            node.depth = parent_depth + 1;
            node.is_present = true;
        }
        self.arena.get_mut(parent).unwrap().first_child = Some(handle);
        self.tree_max_depth = self.tree_max_depth.max(parent_depth + 1);
    }

    /// Builds the final presence tree by walking the in-order list once everything has been
    /// declared, linking any ancestor whose presence bit is still clear (spec §4.3 "Tree build").
    pub fn build_tree(&mut self) -> Result<(), AmlError> {
        let mut cursor = self.order_head;
        while let Some(handle) = cursor {
            let path = self.arena.get(handle).unwrap().absolute_path.clone();
            self.link_ancestors_and_self(&path)?;
            cursor = self.arena.get(handle).unwrap().order_next;
        }
        Ok(())
    }

    fn link_ancestors_and_self(&mut self, path: &AmlName) -> Result<(), AmlError> {
        // Walk from root downward, collecting the chain of ancestor paths.
        let mut chain = Vec::new();
        let mut cur = path.clone();
        loop {
            chain.push(cur.clone());
            match cur.parent() {
                Ok(parent) => cur = parent,
                Err(_) => break,
            }
        }
        chain.reverse(); // root-first

        let mut last_present = self.root;
        for ancestor_path in chain {
            let handle = match self.lookup_absolute(&ancestor_path) {
                Some(h) => h,
                None => continue, // not declared (e.g. implicit intermediate scope never created)
            };
            if !self.arena.get(handle).unwrap().is_present {
                if handle != self.root {
                    self.link_under_parent(handle, last_present);
                }
            }
            last_present = handle;
        }
        Ok(())
    }

    /// Applies the ACPI §5.3 search rules (spec §4.3 "Search").
    pub fn search(&self, name: &AmlName, active_scope: &AmlName, flags: SearchFlags) -> Result<NodeHandle, AmlError> {
        let handle = if name.is_absolute() || name.segments.len() > 1 || matches!(name.prefix, NamePrefix::Parent(_))
        {
            let absolute = name.resolve(active_scope)?;
            self.lookup_absolute(&absolute).ok_or_else(|| AmlError::ValueDoesNotExist(absolute))?
        } else if name.segments.is_empty() {
            return Err(AmlError::EmptyNamesAreInvalid);
        } else {
            let seg = name.segments[0];
            if flags.contains(SearchFlags::NAME_CREATION) {
                let absolute = name.resolve(active_scope)?;
                self.lookup_absolute(&absolute).ok_or_else(|| AmlError::ValueDoesNotExist(absolute))?
            } else {
                self.walk_up_search(seg, active_scope)?
            }
        };

        if !flags.contains(SearchFlags::NO_ALIAS_RESOLUTION) && !flags.contains(SearchFlags::NAME_CREATION) {
            if let Some(Object::Alias { target }) = self.arena.get(handle).and_then(|n| n.object.as_ref()) {
                let target = target.clone();
                return self.search(&target, active_scope, flags);
            }
        }

        Ok(handle)
    }

    fn walk_up_search(&self, seg: NameSeg, active_scope: &AmlName) -> Result<NodeHandle, AmlError> {
        let mut scope = active_scope.clone();
        loop {
            let mut candidate = scope.clone();
            candidate.segments.push(seg);
            if let Some(handle) = self.lookup_absolute(&candidate) {
                return Ok(handle);
            }
            if scope.segments.is_empty() {
                break;
            }
            scope = scope.parent()?;
        }
        Err(AmlError::ValueDoesNotExist({
            let mut name = AmlName::root();
            name.segments.push(seg);
            name
        }))
    }

    pub fn get_by_path(&self, path: &AmlName) -> Result<&Object, AmlError> {
        let handle = self.search(path, &AmlName::root(), SearchFlags::empty())?;
        self.arena.get(handle).and_then(|n| n.object.as_ref()).ok_or_else(|| AmlError::ValueDoesNotExist(path.clone()))
    }

    pub fn set_object(&mut self, handle: NodeHandle, object: Object) -> Result<(), AmlError> {
        self.arena.get_mut(handle).ok_or(AmlError::TriedToRemoveRootNamespace)?.object = Some(object);
        Ok(())
    }

    // --- Scope stack (spec §3 "Scope stack") ---

    pub fn push_scope(&mut self, name: &AmlName, flags: ScopeFlags) -> Result<(), AmlError> {
        let absolute = name.resolve(self.current_scope())?;
        let hash = hash_path(absolute.as_segment_slice());
        let parent_flags = self.scope_stack.last().unwrap().flags;
        let inherited = if flags.contains(ScopeFlags::SWITCH) { flags } else { parent_flags | flags };

        self.scope_stack.push(ScopeFrame { absolute_path: absolute, hash, flags: inherited, temp_nodes: Vec::new() });
        Ok(())
    }

    /// Pops the current scope, releasing temporary nodes created within it. The root scope can
    /// never be popped.
    pub fn pop_scope(&mut self) -> Result<(), AmlError> {
        if self.scope_stack.len() <= 1 {
            return Err(AmlError::TriedToRemoveRootNamespace);
        }
        let frame = self.scope_stack.pop().unwrap();
        for handle in frame.temp_nodes {
            self.release_node(handle)?;
        }
        Ok(())
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_stack.len()
    }

    /// Exposes the backing arena's bump cursor so [`crate::snapshot::SnapshotStack`] can nest a
    /// transactional level over namespace-node allocation too (spec §4.8).
    pub fn snapshot_arena(&mut self) -> ArenaSnapshot {
        self.arena.snapshot()
    }

    pub fn commit_arena(&mut self, snapshot: ArenaSnapshot) {
        self.arena.commit(snapshot)
    }

    pub fn rollback_arena(&mut self, snapshot: ArenaSnapshot) {
        self.arena.rollback(snapshot)
    }

    /// Detaches and frees a node: removes it from its hash bucket, the in-order list, and the
    /// tree. Reference-counted; only the last release actually detaches.
    pub fn release_node(&mut self, handle: NodeHandle) -> Result<(), AmlError> {
        let refcount = {
            let node = self.arena.get_mut(handle).ok_or(AmlError::TriedToRemoveRootNamespace)?;
            node.refcount = node.refcount.saturating_sub(1);
            node.refcount
        };
        if refcount > 0 {
            return Ok(());
        }

        let hash = self.arena.get(handle).unwrap().hash;
        let bucket_idx = Self::bucket_for(hash);

        // Unlink from bucket list.
        let mut cursor = self.buckets[bucket_idx];
        let mut prev: Option<NodeHandle> = None;
        while let Some(h) = cursor {
            if h == handle {
                let next = self.arena.get(h).unwrap().bucket_next;
                match prev {
                    Some(p) => self.arena.get_mut(p).unwrap().bucket_next = next,
                    None => self.buckets[bucket_idx] = next,
                }
                break;
            }
            prev = Some(h);
            cursor = self.arena.get(h).unwrap().bucket_next;
        }

        // Unlink from in-order list.
        let mut cursor = self.order_head;
        let mut prev: Option<NodeHandle> = None;
        while let Some(h) = cursor {
            let next = self.arena.get(h).unwrap().order_next;
            if h == handle {
                match prev {
                    Some(p) => self.arena.get_mut(p).unwrap().order_next = next,
                    None => self.order_head = next,
                }
                if self.order_tail == Some(h) {
                    self.order_tail = prev;
                }
                break;
            }
            prev = Some(h);
            cursor = next;
        }

        // Unlink from tree: splice children out from under parent, dropping them too (ACPI
        // semantics: destroying a node destroys its sub-tree; callers are expected to release
        // leaves before their parent when that matters).
        if let Some(parent) = self.arena.get(handle).unwrap().parent {
            let mut cursor = self.arena.get(parent).unwrap().first_child;
            let mut prev: Option<NodeHandle> = None;
            while let Some(h) = cursor {
                let next = self.arena.get(h).unwrap().next_sibling;
                if h == handle {
                    match prev {
                        Some(p) => self.arena.get_mut(p).unwrap().next_sibling = next,
                        None => self.arena.get_mut(parent).unwrap().first_child = next,
                    }
                    break;
                }
                prev = Some(h);
                cursor = next;
            }
        }

        self.arena.free(handle);
        Ok(())
    }

    /// Runs `f` over every present node in the tree, depth-first, pre-order; `f` returns whether
    /// to descend into that node's children (mirrors the teacher's device-initialization
    /// traversal).
    pub fn traverse(&self, mut f: impl FnMut(&AmlName, &NamespaceNode) -> Result<bool, AmlError>) -> Result<(), AmlError> {
        self.traverse_from(self.root, &mut f)
    }

    fn traverse_from(&self, handle: NodeHandle, f: &mut impl FnMut(&AmlName, &NamespaceNode) -> Result<bool, AmlError>) -> Result<(), AmlError> {
        let node = self.arena.get(handle).unwrap();
        let descend = f(&node.absolute_path, node)?;
        if descend {
            let mut child = node.first_child;
            while let Some(c) = child {
                self.traverse_from(c, f)?;
                child = self.arena.get(c).unwrap().next_sibling;
            }
        }
        Ok(())
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    fn path(s: &str) -> AmlName {
        AmlName::from_str(s).unwrap()
    }

    #[test]
    fn name_uniqueness() {
        let mut ns = Namespace::new();
        ns.create_node(path("\\_SB"), LevelType::Scope).unwrap();
        assert!(ns.create_node(path("\\_SB"), LevelType::Scope).is_err());
    }

    #[test]
    fn hash_path_agreement() {
        let mut ns = Namespace::new();
        let handle = ns.create_node(path("\\_SB.PCI0"), LevelType::Device).unwrap();
        let node = ns.get(handle).unwrap();
        assert_eq!(node.hash, hash_path(node.absolute_path.as_segment_slice()));
        assert_eq!(ns.lookup_absolute(&path("\\_SB.PCI0")), Some(handle));
    }

    /// Scenario S3: name search walk-up.
    #[test]
    fn s3_name_search_walk_up() {
        let mut ns = Namespace::new();
        ns.create_node(path("\\_SB"), LevelType::Scope).unwrap();
        ns.create_node(path("\\_SB.PCI0"), LevelType::Device).unwrap();
        ns.create_node(path("\\_SB.PCI0.DEV0"), LevelType::Device).unwrap();
        ns.create_node(path("\\_SB.PCI0.DEV0.FOO"), LevelType::MethodLocals).unwrap();
        ns.create_node(path("\\_SB.PCI0.BAR"), LevelType::MethodLocals).unwrap();

        // Searching "FOO" from within BAR's scope must fail: FOO lives under DEV0, not PCI0.
        let bar_scope = path("\\_SB.PCI0.BAR");
        let result = ns.search(&path("FOO"), &bar_scope, SearchFlags::empty());
        assert!(result.is_err());

        // Declaring FOO directly under PCI0 makes the same lookup succeed.
        let foo_under_pci0 = ns.create_node(path("\\_SB.PCI0.FOO"), LevelType::MethodLocals).unwrap();
        let result = ns.search(&path("FOO"), &bar_scope, SearchFlags::empty()).unwrap();
        assert_eq!(result, foo_under_pci0);
    }

    #[test]
    fn tree_build_links_intermediate_ancestors() {
        let mut ns = Namespace::new();
        ns.create_node(path("\\_SB.PCI0.DEV0"), LevelType::Device).unwrap();
        ns.create_node(path("\\_SB"), LevelType::Scope).unwrap();
        ns.create_node(path("\\_SB.PCI0"), LevelType::Device).unwrap();
        ns.build_tree().unwrap();

        let dev0 = ns.lookup_absolute(&path("\\_SB.PCI0.DEV0")).unwrap();
        let node = ns.get(dev0).unwrap();
        assert!(node.is_present);
        assert_eq!(node.depth, 4); // root=1, _SB=2, PCI0=3, DEV0=4
    }

    #[test]
    fn pop_scope_releases_temporary_nodes() {
        let mut ns = Namespace::new();
        ns.push_scope(&path("\\TEMP"), ScopeFlags::TEMPORARY).unwrap();
        ns.create_node(path("\\TEMP.LOCAL"), LevelType::MethodLocals).unwrap();
        assert!(ns.lookup_absolute(&path("\\TEMP.LOCAL")).is_some());
        ns.pop_scope().unwrap();
        assert!(ns.lookup_absolute(&path("\\TEMP.LOCAL")).is_none());
    }

    #[test]
    fn root_scope_cannot_be_popped() {
        let mut ns = Namespace::new();
        assert!(ns.pop_scope().is_err());
    }
}
