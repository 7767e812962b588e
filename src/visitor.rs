//! Depth-first, pre-order traversal of a tree, dispatching one callback per
//! entry kind rather than a single generic "visit entry" callback — the
//! dynamic dispatch over kinds the model traffics in is resolved once, here,
//! into a static match, so every implementor of `Visitor` gets exhaustive
//! per-kind handling for free.

use crate::model::{EntryData, Header, NodeId, Tree};
use crate::schema::Kind;

/// How far a single `visit` call descends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalMode {
	/// Visit only the target entry; do not descend into its children.
	Single,
	/// Visit the target entry and all of its descendants.
	Recursive,
}

/// One callback per entry kind, plus container-boundary callbacks.
///
/// `on_root` and `on_folder` are the only callbacks that produce
/// `ParentData`; leaf account kinds have nothing to hand down since they
/// are never themselves descended into. Default bodies are no-ops so a
/// renderer only needs to override the handlers it cares about.
pub trait Visitor {
	type ParentData;

	fn on_root(&mut self) -> Self::ParentData;
	fn on_folder(&mut self, header: &Header) -> Self::ParentData;

	fn on_credit_card(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_crypto_key(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_database(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_door(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_email(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_ftp(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_generic(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_phone(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_remote_desktop(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_shell(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_vnc(&mut self, _header: &Header, _data: &EntryData) {}
	fn on_website(&mut self, _header: &Header, _data: &EntryData) {}

	/// Called after the container's own per-kind callback, before its
	/// children (if any are visited).
	fn enter_container(&mut self, parent_data: Self::ParentData);
	/// Called after a container's children (if visited), closing the
	/// scope opened by the matching `enter_container`.
	fn leave_container(&mut self);
}

fn dispatch<V: Visitor + ?Sized>(tree: &Tree, id: NodeId, visitor: &mut V) -> Option<V::ParentData> {
	if tree.is_root(id) {
		return Some(visitor.on_root());
	}
	let header = tree.header(id).expect("non-root node always has a header");
	let data = tree.data(id).expect("non-root node always has data");
	match data.kind() {
		Kind::Folder => Some(visitor.on_folder(header)),
		Kind::CreditCard => {
			visitor.on_credit_card(header, data);
			None
		}
		Kind::CryptoKey => {
			visitor.on_crypto_key(header, data);
			None
		}
		Kind::Database => {
			visitor.on_database(header, data);
			None
		}
		Kind::Door => {
			visitor.on_door(header, data);
			None
		}
		Kind::Email => {
			visitor.on_email(header, data);
			None
		}
		Kind::Ftp => {
			visitor.on_ftp(header, data);
			None
		}
		Kind::Generic => {
			visitor.on_generic(header, data);
			None
		}
		Kind::Phone => {
			visitor.on_phone(header, data);
			None
		}
		Kind::RemoteDesktop => {
			visitor.on_remote_desktop(header, data);
			None
		}
		Kind::Shell => {
			visitor.on_shell(header, data);
			None
		}
		Kind::Vnc => {
			visitor.on_vnc(header, data);
			None
		}
		Kind::Website => {
			visitor.on_website(header, data);
			None
		}
	}
}

/// Visits `id` and, in `Recursive` mode, everything below it, in the sort
/// order children are stored in (lexicographic by name, per the tree's own
/// invariant).
pub fn visit<V: Visitor + ?Sized>(tree: &Tree, id: NodeId, mode: TraversalMode, visitor: &mut V) {
	if let Some(parent_data) = dispatch(tree, id, visitor) {
		visitor.enter_container(parent_data);
		if mode == TraversalMode::Recursive {
			for &child in tree.children(id) {
				visit(tree, child, TraversalMode::Recursive, visitor);
			}
		}
		visitor.leave_container();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{DetachedEntry, Header as ModelHeader};

	struct Counter {
		entries: usize,
		containers_entered: usize,
	}

	impl Visitor for Counter {
		type ParentData = ();

		fn on_root(&mut self) -> Self::ParentData {}

		fn on_folder(&mut self, _header: &Header) -> Self::ParentData {
			self.entries += 1;
		}

		fn on_generic(&mut self, _header: &Header, _data: &EntryData) {
			self.entries += 1;
		}

		fn enter_container(&mut self, _parent_data: Self::ParentData) {
			self.containers_entered += 1;
		}

		fn leave_container(&mut self) {}
	}

	fn folder(name: &str) -> DetachedEntry {
		DetachedEntry {
			header: ModelHeader::new(name),
			data: EntryData::new(Kind::Folder),
		}
	}

	fn generic(name: &str) -> DetachedEntry {
		DetachedEntry {
			header: ModelHeader::new(name),
			data: EntryData::new(Kind::Generic),
		}
	}

	#[test]
	fn recursive_visits_every_descendant() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.add(f1, generic("E1")).unwrap();
		tree.add(root, generic("E2")).unwrap();

		let mut counter = Counter {
			entries: 0,
			containers_entered: 0,
		};
		visit(&tree, root, TraversalMode::Recursive, &mut counter);
		assert_eq!(counter.entries, 3);
		// root + F1
		assert_eq!(counter.containers_entered, 2);
	}

	#[test]
	fn single_mode_does_not_descend() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree.add(root, folder("F1")).unwrap();
		tree.add(f1, generic("E1")).unwrap();

		let mut counter = Counter {
			entries: 0,
			containers_entered: 0,
		};
		visit(&tree, f1, TraversalMode::Single, &mut counter);
		assert_eq!(counter.entries, 1);
		assert_eq!(counter.containers_entered, 1);
	}
}
