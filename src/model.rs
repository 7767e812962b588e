//! The entry tree: an arena of nodes addressed by `NodeId`, plus the `Model`
//! façade that holds the root and delegates to storage.
//!
//! Parent back-references are plain `NodeId`s into the arena rather than
//! owning pointers, so the tree can never form a reference cycle and needs
//! no `Rc`/`RefCell` bookkeeping. The arena is append-and-detach: `add` and
//! `replace` allocate new slots, `remove` recycles the freed slot onto a
//! free list.

use chrono::{DateTime, Utc};
use failure::Fail;

use crate::path;
use crate::schema::{Kind, PropertyDef};

/// Handle into the tree's arena. Stable across mutations that don't touch
/// the referenced node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ModelError {
	#[fail(display = "entry name must not be empty")]
	EmptyName,
	#[fail(display = "no entry named '{}' (element {} of path '{}')", element, index, full_path)]
	NotFound {
		index: usize,
		element: String,
		full_path: String,
	},
	#[fail(
		display = "'{}' is not a container (element {} of path '{}')",
		element, index, full_path
	)]
	NotAContainer {
		index: usize,
		element: String,
		full_path: String,
	},
	#[fail(display = "an entry already exists at '{}'", 0)]
	Duplicate(String),
	#[fail(display = "cannot move '{}' under its own descendant '{}'", 0, 1)]
	CyclicMove(String, String),
	#[fail(display = "'{}' is a non-empty container", 0)]
	NonEmptyContainer(String),
	#[fail(
		display = "cannot replace non-empty container '{}' with a non-container entry",
		0
	)]
	NonEmptyContainerReplace(String),
}

/// The mutable attributes every non-root entry carries, independent of kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
	pub name: String,
	pub description: Option<String>,
	pub updated: Option<DateTime<Utc>>,
	pub notes: Option<String>,
}

impl Header {
	pub fn new(name: impl Into<String>) -> Self {
		Header {
			name: name.into(),
			description: None,
			updated: None,
			notes: None,
		}
	}
}

/// A kind's optional properties, stored positionally against
/// `kind.properties()` so the set of valid property names stays driven by
/// the schema table rather than by a free-form string map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryData {
	kind: Kind,
	properties: Vec<Option<String>>,
}

impl EntryData {
	pub fn new(kind: Kind) -> Self {
		EntryData {
			properties: vec![None; kind.properties().len()],
			kind,
		}
	}

	pub fn kind(&self) -> Kind {
		self.kind
	}

	pub fn get(&self, cli_name: &str) -> Option<&str> {
		let index = self.kind.properties().iter().position(|p| p.cli_name == cli_name)?;
		self.properties[index].as_deref()
	}

	/// Sets a property by its command-line name. Returns `false` (and does
	/// nothing) if `cli_name` is not part of this kind's schema.
	pub fn set(&mut self, cli_name: &str, value: Option<String>) -> bool {
		match self.kind.properties().iter().position(|p| p.cli_name == cli_name) {
			Some(index) => {
				self.properties[index] = value;
				true
			}
			None => false,
		}
	}

	/// Present properties, in schema order, paired with their definitions.
	pub fn iter_present(&self) -> impl Iterator<Item = (PropertyDef, &str)> {
		self.kind
			.properties()
			.iter()
			.zip(self.properties.iter())
			.filter_map(|(def, value)| value.as_deref().map(|v| (*def, v)))
	}

	pub fn property(&self, field_id: &str) -> Option<(PropertyDef, Option<&str>)> {
		let (index, def) = self
			.kind
			.properties()
			.iter()
			.enumerate()
			.find(|(_, p)| p.field_id == field_id)?;
		Some((*def, self.properties[index].as_deref()))
	}
}

/// An entry that has not (yet) been attached to a parent container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedEntry {
	pub header: Header,
	pub data: EntryData,
}

enum NodeEntry {
	Root,
	Entry { header: Header, data: EntryData },
}

struct Node {
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	entry: NodeEntry,
}

impl Node {
	fn name(&self) -> Option<&str> {
		match &self.entry {
			NodeEntry::Root => None,
			NodeEntry::Entry { header, .. } => Some(&header.name),
		}
	}
}

/// The arena holding the whole tree. Index 0 is always the root and is
/// never freed.
pub struct Tree {
	nodes: Vec<Option<Node>>,
	free: Vec<usize>,
}

impl Default for Tree {
	fn default() -> Self {
		Self::new()
	}
}

impl Tree {
	pub fn new() -> Self {
		Tree {
			nodes: vec![Some(Node {
				parent: None,
				children: Vec::new(),
				entry: NodeEntry::Root,
			})],
			free: Vec::new(),
		}
	}

	pub fn root(&self) -> NodeId {
		NodeId(0)
	}

	pub fn is_root(&self, id: NodeId) -> bool {
		id.0 == 0
	}

	fn node(&self, id: NodeId) -> &Node {
		self.nodes[id.0].as_ref().expect("dangling NodeId")
	}

	fn node_mut(&mut self, id: NodeId) -> &mut Node {
		self.nodes[id.0].as_mut().expect("dangling NodeId")
	}

	pub fn name(&self, id: NodeId) -> Option<&str> {
		self.node(id).name()
	}

	pub fn header(&self, id: NodeId) -> Option<&Header> {
		match &self.node(id).entry {
			NodeEntry::Root => None,
			NodeEntry::Entry { header, .. } => Some(header),
		}
	}

	pub fn header_mut(&mut self, id: NodeId) -> Option<&mut Header> {
		match &mut self.node_mut(id).entry {
			NodeEntry::Root => None,
			NodeEntry::Entry { header, .. } => Some(header),
		}
	}

	pub fn data(&self, id: NodeId) -> Option<&EntryData> {
		match &self.node(id).entry {
			NodeEntry::Root => None,
			NodeEntry::Entry { data, .. } => Some(data),
		}
	}

	pub fn data_mut(&mut self, id: NodeId) -> Option<&mut EntryData> {
		match &mut self.node_mut(id).entry {
			NodeEntry::Root => None,
			NodeEntry::Entry { data, .. } => Some(data),
		}
	}

	pub fn children(&self, id: NodeId) -> &[NodeId] {
		&self.node(id).children
	}

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.node(id).parent
	}

	pub fn is_container(&self, id: NodeId) -> bool {
		match &self.node(id).entry {
			NodeEntry::Root => true,
			NodeEntry::Entry { data, .. } => data.kind().is_folder(),
		}
	}

	fn ancestor_names(&self, id: NodeId) -> Vec<String> {
		let mut names = Vec::new();
		let mut current = id;
		while !self.is_root(current) {
			names.push(self.node(current).name().unwrap().to_string());
			current = self.node(current).parent.expect("non-root entry always has a parent");
		}
		names.reverse();
		names
	}

	pub fn full_path(&self, id: NodeId) -> String {
		path::encode(&self.ancestor_names(id))
	}

	fn path_under(&self, parent: NodeId, name: &str) -> String {
		let mut elements = self.ancestor_names(parent);
		elements.push(name.to_string());
		path::encode(&elements)
	}

	fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
		let children = &self.node(parent).children;
		let names: Vec<&str> = children.iter().map(|&id| self.node(id).name().unwrap()).collect();
		names.binary_search_by(|n| (*n).cmp(name)).ok().map(|pos| children[pos])
	}

	fn insert_sorted(&mut self, parent: NodeId, child: NodeId, name: &str) {
		let names: Vec<String> = self
			.node(parent)
			.children
			.iter()
			.map(|&id| self.node(id).name().unwrap().to_string())
			.collect();
		let pos = names.binary_search_by(|n| n.as_str().cmp(name)).unwrap_or_else(|e| e);
		self.node_mut(parent).children.insert(pos, child);
	}

	fn detach_from_parent(&mut self, parent: NodeId, child: NodeId) {
		let children = &mut self.node_mut(parent).children;
		if let Some(pos) = children.iter().position(|&id| id == child) {
			children.remove(pos);
		}
	}

	fn alloc(&mut self, node: Node) -> NodeId {
		if let Some(idx) = self.free.pop() {
			self.nodes[idx] = Some(node);
			NodeId(idx)
		} else {
			self.nodes.push(Some(node));
			NodeId(self.nodes.len() - 1)
		}
	}

	fn free_slot(&mut self, id: NodeId) -> Node {
		let node = self.nodes[id.0].take().expect("freed node must exist");
		self.free.push(id.0);
		node
	}

	fn is_descendant_or_self(&self, candidate: NodeId, ancestor: NodeId) -> bool {
		let mut current = Some(candidate);
		while let Some(id) = current {
			if id == ancestor {
				return true;
			}
			current = self.node(id).parent;
		}
		false
	}

	/// Walks the tree per element of `elements`, descending into
	/// containers. Fails with `NotFound` if a named child is absent, or
	/// `NotAContainer` if a non-terminal element resolves to a leaf.
	pub fn lookup(&self, elements: &[String]) -> Result<NodeId, ModelError> {
		let full_path = path::encode(elements);
		let mut current = self.root();
		for (index, element) in elements.iter().enumerate() {
			if !self.is_container(current) {
				return Err(ModelError::NotAContainer {
					index,
					element: element.clone(),
					full_path,
				});
			}
			current = self.child_by_name(current, element).ok_or_else(|| ModelError::NotFound {
				index,
				element: element.clone(),
				full_path: full_path.clone(),
			})?;
		}
		Ok(current)
	}

	/// Attaches a detached entry under `parent` without checking for a
	/// duplicate sibling name. Used only by the XML reader: duplicate-named
	/// siblings are accepted when parsing a document, even though `add`
	/// rejects them at mutation time.
	pub(crate) fn insert_unchecked(&mut self, parent: NodeId, detached: DetachedEntry) -> NodeId {
		let name = detached.header.name.clone();
		let id = self.alloc(Node {
			parent: Some(parent),
			children: Vec::new(),
			entry: NodeEntry::Entry {
				header: detached.header,
				data: detached.data,
			},
		});
		self.insert_sorted(parent, id, &name);
		id
	}

	/// Attaches a detached entry under `parent`, preserving sort order.
	pub fn add(&mut self, parent: NodeId, detached: DetachedEntry) -> Result<NodeId, ModelError> {
		let name = detached.header.name.clone();
		if name.is_empty() {
			return Err(ModelError::EmptyName);
		}
		if !self.is_container(parent) {
			return Err(ModelError::NotAContainer {
				index: 0,
				element: name,
				full_path: self.full_path(parent),
			});
		}
		if self.child_by_name(parent, &name).is_some() {
			return Err(ModelError::Duplicate(self.path_under(parent, &name)));
		}
		let id = self.alloc(Node {
			parent: Some(parent),
			children: Vec::new(),
			entry: NodeEntry::Entry {
				header: detached.header,
				data: detached.data,
			},
		});
		self.insert_sorted(parent, id, &name);
		Ok(id)
	}

	/// Reparents an already-attached entry under `new_parent`.
	pub fn move_entry(&mut self, entry: NodeId, new_parent: NodeId) -> Result<(), ModelError> {
		if self.is_descendant_or_self(new_parent, entry) {
			return Err(ModelError::CyclicMove(self.full_path(entry), self.full_path(new_parent)));
		}
		let name = self.node(entry).name().expect("move target is never root").to_string();
		if self.child_by_name(new_parent, &name).is_some() {
			return Err(ModelError::Duplicate(self.path_under(new_parent, &name)));
		}
		let old_parent = self.node(entry).parent.expect("non-root entry always has a parent");
		self.detach_from_parent(old_parent, entry);
		self.node_mut(entry).parent = Some(new_parent);
		self.insert_sorted(new_parent, entry, &name);
		Ok(())
	}

	/// Detaches and drops `entry`. Fails if it is a non-empty container.
	pub fn remove(&mut self, entry: NodeId) -> Result<DetachedEntry, ModelError> {
		if self.is_container(entry) && !self.node(entry).children.is_empty() {
			return Err(ModelError::NonEmptyContainer(self.full_path(entry)));
		}
		let parent = self.node(entry).parent.expect("non-root entry always has a parent");
		self.detach_from_parent(parent, entry);
		match self.free_slot(entry).entry {
			NodeEntry::Entry { header, data } => Ok(DetachedEntry { header, data }),
			NodeEntry::Root => unreachable!("root is never attached as a child"),
		}
	}

	/// Swaps `old` for `new_detached` at the same tree position. Children
	/// transfer across only when both the old and new entries are Folders.
	pub fn replace(&mut self, old: NodeId, new_detached: DetachedEntry) -> Result<NodeId, ModelError> {
		let old_name = self.node(old).name().expect("replace target is never root").to_string();
		let new_name = new_detached.header.name.clone();
		if new_name.is_empty() {
			return Err(ModelError::EmptyName);
		}
		let parent = self.node(old).parent.expect("non-root entry always has a parent");
		if new_name != old_name && self.child_by_name(parent, &new_name).is_some() {
			return Err(ModelError::Duplicate(self.path_under(parent, &new_name)));
		}
		let old_is_container = self.is_container(old);
		let old_has_children = !self.node(old).children.is_empty();
		let new_is_container = new_detached.data.kind().is_folder();
		if old_is_container && old_has_children && !new_is_container {
			return Err(ModelError::NonEmptyContainerReplace(self.full_path(old)));
		}

		let transferred_children = if old_is_container && new_is_container {
			std::mem::take(&mut self.node_mut(old).children)
		} else {
			Vec::new()
		};

		let new_id = self.alloc(Node {
			parent: Some(parent),
			children: transferred_children,
			entry: NodeEntry::Entry {
				header: new_detached.header,
				data: new_detached.data,
			},
		});
		let kids = self.node(new_id).children.clone();
		for kid in kids {
			self.node_mut(kid).parent = Some(new_id);
		}

		if new_name == old_name {
			let children = &mut self.node_mut(parent).children;
			let pos = children
				.iter()
				.position(|&id| id == old)
				.expect("old entry must be a child of its parent");
			children[pos] = new_id;
		} else {
			self.detach_from_parent(parent, old);
			self.insert_sorted(parent, new_id, &new_name);
		}

		self.free_slot(old);
		Ok(new_id)
	}
}

/// Holds the current root and delegates structural operations to the tree,
/// storage reads/writes to the storage façade.
pub struct Model {
	tree: Tree,
}

impl Default for Model {
	fn default() -> Self {
		Self::new()
	}
}

impl Model {
	pub fn new() -> Self {
		Model { tree: Tree::new() }
	}

	pub fn from_tree(tree: Tree) -> Self {
		Model { tree }
	}

	pub fn tree(&self) -> &Tree {
		&self.tree
	}

	pub fn tree_mut(&mut self) -> &mut Tree {
		&mut self.tree
	}

	pub fn set_tree(&mut self, tree: Tree) {
		self.tree = tree;
	}

	pub fn lookup(&self, path_string: &str) -> crate::common::Result<NodeId> {
		let elements = path::decode(path_string)?;
		Ok(self.tree.lookup(&elements)?)
	}

	/// Splits `path_string` into parent path and leaf name, resolves the
	/// parent, and attaches a new entry built from `header` and `data`.
	pub fn add_entry(
		&mut self,
		path_string: &str,
		mut header: Header,
		data: EntryData,
	) -> crate::common::Result<NodeId> {
		let elements = path::decode(path_string)?;
		let (leaf, parent_elements) = elements.split_last().expect("path::decode never returns empty");
		header.name = leaf.clone();
		let parent = self.tree.lookup(parent_elements)?;
		Ok(self.tree.add(parent, DetachedEntry { header, data })?)
	}

	pub fn move_entry(&mut self, from_path: &str, to_path: &str) -> crate::common::Result<()> {
		let entry = self.lookup(from_path)?;
		let new_parent = self.lookup(to_path)?;
		Ok(self.tree.move_entry(entry, new_parent)?)
	}

	pub fn remove_entry(&mut self, path_string: &str) -> crate::common::Result<DetachedEntry> {
		let entry = self.lookup(path_string)?;
		Ok(self.tree.remove(entry)?)
	}

	pub fn replace_entry(
		&mut self,
		path_string: &str,
		new_header: Header,
		data: EntryData,
	) -> crate::common::Result<NodeId> {
		let old = self.lookup(path_string)?;
		Ok(self.tree.replace(old, DetachedEntry { header: new_header, data })?)
	}

	/// Depth-first traversal of the whole tree, recursing from the root.
	pub fn visit_all<V: crate::visitor::Visitor + ?Sized>(&self, visitor: &mut V) {
		crate::visitor::visit(&self.tree, self.tree.root(), crate::visitor::TraversalMode::Recursive, visitor);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::Kind;

	fn folder(name: &str) -> DetachedEntry {
		DetachedEntry {
			header: Header::new(name),
			data: EntryData::new(Kind::Folder),
		}
	}

	fn generic(name: &str) -> DetachedEntry {
		DetachedEntry {
			header: Header::new(name),
			data: EntryData::new(Kind::Generic),
		}
	}

	#[test]
	fn add_preserves_sort_order() {
		let mut tree = Tree::new();
		let root = tree.root();
		tree.add(root, generic("bob")).unwrap();
		tree.add(root, generic("alice")).unwrap();
		tree.add(root, generic("carol")).unwrap();
		let names: Vec<&str> = tree.children(root).iter().map(|&id| tree.name(id).unwrap()).collect();
		assert_eq!(names, vec!["alice", "bob", "carol"]);
	}

	#[test]
	fn add_rejects_empty_name() {
		let mut tree = Tree::new();
		let root = tree.root();
		let err = tree.add(root, generic("")).unwrap_err();
		assert_eq!(err, ModelError::EmptyName);
	}

	#[test]
	fn add_rejects_duplicate_sibling_name() {
		let mut tree = Tree::new();
		let root = tree.root();
		tree.add(root, generic("dup")).unwrap();
		let err = tree.add(root, generic("dup")).unwrap_err();
		assert_eq!(err, ModelError::Duplicate("dup".to_string()));
	}

	#[test]
	fn lookup_nested_path() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.add(f1, generic("E1")).unwrap();
		let found = tree.lookup(&["F1".to_string(), "E1".to_string()]).unwrap();
		assert_eq!(tree.name(found), Some("E1"));
	}

	#[test]
	fn lookup_missing_component_fails_not_found() {
		let tree = Tree::new();
		let err = tree.lookup(&["nope".to_string()]).unwrap_err();
		match err {
			ModelError::NotFound { index, element, .. } => {
				assert_eq!(index, 0);
				assert_eq!(element, "nope");
			}
			other => panic!("unexpected error: {:?}", other),
		}
	}

	#[test]
	fn lookup_descending_into_leaf_fails_not_a_container() {
		let mut tree = Tree::new();
		let root = tree.root();
		tree.add(root, generic("leaf")).unwrap();
		let err = tree
			.lookup(&["leaf".to_string(), "further".to_string()])
			.unwrap_err();
		assert!(matches!(err, ModelError::NotAContainer { index: 1, .. }));
	}

	#[test]
	fn remove_fails_on_non_empty_container() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.add(f1, generic("child")).unwrap();
		let err = tree.remove(f1).unwrap_err();
		assert_eq!(err, ModelError::NonEmptyContainer("F1".to_string()));
	}

	#[test]
	fn remove_empty_container_succeeds() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.remove(f1).unwrap();
		assert!(tree.children(root).is_empty());
	}

	#[test]
	fn cyclic_move_is_rejected() {
		// root -> F1 -> F2
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		let f2 = tree.add(f1, folder("F2")).unwrap();
		let err = tree.move_entry(f1, f2).unwrap_err();
		assert_eq!(err, ModelError::CyclicMove("F1".to_string(), "F1/F2".to_string()));
	}

	#[test]
	fn move_changes_parent_and_resorts() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		let f2 = tree.add(root, folder("F2")).unwrap();
		let e = tree.add(f1, generic("E")).unwrap();
		tree.move_entry(e, f2).unwrap();
		assert!(tree.children(f1).is_empty());
		assert_eq!(tree.children(f2), &[e]);
		assert_eq!(tree.parent(e), Some(f2));
	}

	#[test]
	fn replace_same_name_preserves_index() {
		let mut tree = Tree::new();
		let root = tree.root();
		tree.add(root, generic("a")).unwrap();
		let b = tree.add(root, generic("b")).unwrap();
		tree.add(root, generic("c")).unwrap();
		let new_b = tree
			.replace(
				b,
				DetachedEntry {
					header: Header::new("b"),
					data: EntryData::new(Kind::Website),
				},
			)
			.unwrap();
		let names: Vec<&str> = tree.children(root).iter().map(|&id| tree.name(id).unwrap()).collect();
		assert_eq!(names, vec!["a", "b", "c"]);
		assert_eq!(tree.data(new_b).unwrap().kind(), Kind::Website);
	}

	#[test]
	fn replace_transfers_children_between_folders() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		let child = tree.add(f1, generic("child")).unwrap();
		let new_f1 = tree.replace(f1, folder("F1")).unwrap();
		assert_eq!(tree.children(new_f1), &[child]);
		assert_eq!(tree.parent(child), Some(new_f1));
	}

	#[test]
	fn replace_non_empty_folder_with_non_folder_fails() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.add(f1, generic("child")).unwrap();
		let err = tree.replace(f1, generic("F1")).unwrap_err();
		assert_eq!(err, ModelError::NonEmptyContainerReplace("F1".to_string()));
	}

	#[test]
	fn property_carry_over_across_kind_change() {
		let mut data = EntryData::new(Kind::Generic);
		data.set("hostname", Some("H".to_string()));
		data.set("username", Some("U".to_string()));
		data.set("password", Some("P".to_string()));

		let mut website = EntryData::new(Kind::Website);
		for (def, value) in data.iter_present() {
			website.set(def.cli_name, Some(value.to_string()));
		}
		website.set("url", Some("X".to_string()));
		website.set("username", Some("U2".to_string()));

		assert_eq!(website.get("url"), Some("X"));
		assert_eq!(website.get("username"), Some("U2"));
		assert_eq!(website.get("password"), Some("P"));
		assert_eq!(website.get("hostname"), None);
	}
}
