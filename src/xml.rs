//! Bidirectional translation between a `Tree` and the `<revelationdata>`
//! XML grammar.
//!
//! Reading goes through an intermediate, order-preserving element tree
//! (`RawElement`/`RawNode`) built from `quick_xml` events, then a semantic
//! pass that walks it against the kind schema and produces XPath-qualified
//! errors. Writing is hand-rolled string assembly rather than
//! `quick_xml::Writer`, since the exact placement of optional property
//! children and the self-closing empty-database case are easier to get
//! right directly than to coax out of a generic indenting writer.

use chrono::{DateTime, TimeZone, Utc};
use failure::Fail;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::model::{DetachedEntry, EntryData, Header, NodeId, Tree};
use crate::schema::{self, Kind};

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum XmlError {
	#[fail(display = "expected root element '{}' at '{}'", expected, xpath)]
	InvalidRoot { xpath: String, expected: String },
	#[fail(display = "unsupported dataversion '{}'", 0)]
	UnsupportedVersion(String),
	#[fail(display = "unknown attribute '{}' on '{}'", attr, xpath)]
	UnknownAttribute { xpath: String, attr: String },
	#[fail(display = "'{}' has no <name> child", 0)]
	MissingName(String),
	#[fail(display = "invalid value '{}' at '{}': {}", raw, xpath, reason)]
	InvalidValue { xpath: String, raw: String, reason: String },
	#[fail(display = "unknown field id '{}' at '{}' (allowed: {})", id, xpath, allowed_list)]
	UnknownFieldId {
		xpath: String,
		id: String,
		allowed_list: String,
	},
	#[fail(display = "unexpected child element inside folder entry at '{}'", 0)]
	UnknownFolderElement(String),
	#[fail(display = "unexpected child element inside account entry at '{}'", 0)]
	UnknownAccountElement(String),
	#[fail(display = "XML parse error: {}", 0)]
	Parse(String),
}

enum RawNode {
	Element(RawElement),
	Text(String),
}

struct RawElement {
	name: String,
	attrs: Vec<(String, String)>,
	children: Vec<RawNode>,
}

fn as_element(node: &RawNode) -> Option<&RawElement> {
	match node {
		RawNode::Element(e) => Some(e),
		RawNode::Text(_) => None,
	}
}

fn text_of(elem: &RawElement) -> String {
	elem.children
		.iter()
		.filter_map(|c| match c {
			RawNode::Text(s) => Some(s.as_str()),
			RawNode::Element(_) => None,
		})
		.collect::<Vec<_>>()
		.join("")
}

fn parse_raw(input: &str) -> Result<RawElement, XmlError> {
	let mut reader = Reader::from_str(input);
	reader.config_mut().trim_text(true);

	let mut stack: Vec<RawElement> = Vec::new();
	let mut root: Option<RawElement> = None;

	loop {
		let event = reader.read_event().map_err(|e| XmlError::Parse(e.to_string()))?;
		match event {
			Event::Start(e) => {
				let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
				let attrs = decode_attrs(&e)?;
				stack.push(RawElement {
					name,
					attrs,
					children: Vec::new(),
				});
			}
			Event::Empty(e) => {
				let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
				let attrs = decode_attrs(&e)?;
				let elem = RawElement {
					name,
					attrs,
					children: Vec::new(),
				};
				deliver(&mut stack, &mut root, RawNode::Element(elem));
			}
			Event::End(_) => {
				let finished = stack
					.pop()
					.ok_or_else(|| XmlError::Parse("unbalanced end tag".to_string()))?;
				deliver(&mut stack, &mut root, RawNode::Element(finished));
			}
			Event::Text(t) => {
				let text = t.unescape().map_err(|e| XmlError::Parse(e.to_string()))?.into_owned();
				if let Some(top) = stack.last_mut() {
					if !text.is_empty() {
						top.children.push(RawNode::Text(text));
					}
				}
			}
			Event::Eof => break,
			_ => {}
		}
	}

	root.ok_or_else(|| XmlError::Parse("document has no root element".to_string()))
}

fn deliver(stack: &mut Vec<RawElement>, root: &mut Option<RawElement>, node: RawNode) {
	match stack.last_mut() {
		Some(parent) => parent.children.push(node),
		None => {
			if let RawNode::Element(e) = node {
				*root = Some(e);
			}
		}
	}
}

fn decode_attrs(e: &quick_xml::events::BytesStart) -> Result<Vec<(String, String)>, XmlError> {
	let mut attrs = Vec::new();
	for attr in e.attributes() {
		let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
		let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
		let value = attr
			.unescape_value()
			.map_err(|e| XmlError::Parse(e.to_string()))?
			.into_owned();
		attrs.push((key, value));
	}
	Ok(attrs)
}

fn parse_updated(raw: &str, xpath: &str) -> Result<DateTime<Utc>, XmlError> {
	if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
		return Err(XmlError::InvalidValue {
			xpath: xpath.to_string(),
			raw: raw.to_string(),
			reason: "value is not a string of ASCII digits".to_string(),
		});
	}
	let secs: i64 = raw.parse().map_err(|_| XmlError::InvalidValue {
		xpath: xpath.to_string(),
		raw: raw.to_string(),
		reason: "timestamp is out of range".to_string(),
	})?;
	Utc.timestamp_opt(secs, 0).single().ok_or_else(|| XmlError::InvalidValue {
		xpath: xpath.to_string(),
		raw: raw.to_string(),
		reason: "timestamp is out of range".to_string(),
	})
}

/// Parses a complete `<revelationdata>` document into a fresh `Tree`.
pub fn parse(input: &str) -> Result<Tree, XmlError> {
	let raw_root = parse_raw(input)?;
	if raw_root.name != "revelationdata" {
		return Err(XmlError::InvalidRoot {
			xpath: format!("/{}", raw_root.name),
			expected: "revelationdata".to_string(),
		});
	}

	let mut saw_dataversion = false;
	for (attr, value) in &raw_root.attrs {
		match attr.as_str() {
			"dataversion" => {
				saw_dataversion = true;
				if value != "1" {
					return Err(XmlError::UnsupportedVersion(value.clone()));
				}
			}
			"version" => {}
			other => {
				return Err(XmlError::UnknownAttribute {
					xpath: "/revelationdata".to_string(),
					attr: other.to_string(),
				});
			}
		}
	}
	if !saw_dataversion {
		return Err(XmlError::UnsupportedVersion(String::new()));
	}

	let mut tree = Tree::new();
	let root_id = tree.root();
	let entries: Vec<&RawElement> = raw_root
		.children
		.iter()
		.filter_map(as_element)
		.filter(|e| e.name == "entry")
		.collect();

	for (index, elem) in entries.iter().enumerate() {
		let xpath = format!("/revelationdata/entry[{}]", index + 1);
		parse_entry(elem, &xpath, &mut tree, root_id)?;
	}
	Ok(tree)
}

fn parse_entry(elem: &RawElement, xpath: &str, tree: &mut Tree, parent: NodeId) -> Result<NodeId, XmlError> {
	for (attr, _) in &elem.attrs {
		if attr != "type" {
			return Err(XmlError::UnknownAttribute {
				xpath: xpath.to_string(),
				attr: attr.clone(),
			});
		}
	}
	let type_value = elem.attrs.iter().find(|(k, _)| k == "type").map(|(_, v)| v.clone());
	let kind = type_value.as_deref().and_then(schema::kind_by_xml_type).ok_or_else(|| {
		XmlError::InvalidValue {
			xpath: xpath.to_string(),
			raw: type_value.clone().unwrap_or_default(),
			reason: "unrecognised entry type".to_string(),
		}
	})?;

	let mut name: Option<String> = None;
	let mut description: Option<String> = None;
	let mut updated: Option<DateTime<Utc>> = None;
	let mut notes: Option<String> = None;
	let mut data = EntryData::new(kind);
	let mut sub_entries: Vec<&RawElement> = Vec::new();

	for child in &elem.children {
		let child_elem = match child {
			RawNode::Element(e) => e,
			RawNode::Text(_) => continue,
		};
		let child_xpath = format!("{}/{}", xpath, child_elem.name);
		match child_elem.name.as_str() {
			"name" | "description" | "updated" | "notes" => {
				if let Some((attr, _)) = child_elem.attrs.first() {
					return Err(XmlError::UnknownAttribute {
						xpath: child_xpath.clone(),
						attr: attr.clone(),
					});
				}
			}
			_ => {}
		}
		match child_elem.name.as_str() {
			"name" => {
				let text = text_of(child_elem);
				if text.is_empty() {
					return Err(XmlError::InvalidValue {
						xpath: child_xpath,
						raw: String::new(),
						reason: "string is empty".to_string(),
					});
				}
				name = Some(text);
			}
			"description" => description = Some(text_of(child_elem)),
			"updated" => updated = Some(parse_updated(&text_of(child_elem), &child_xpath)?),
			"notes" => notes = Some(text_of(child_elem)),
			"field" => {
				if kind.is_folder() {
					return Err(XmlError::UnknownFolderElement(child_xpath));
				}
				if let Some((attr, _)) = child_elem.attrs.iter().find(|(k, _)| k != "id") {
					return Err(XmlError::UnknownAttribute {
						xpath: child_xpath.clone(),
						attr: attr.clone(),
					});
				}
				let id = child_elem.attrs.iter().find(|(k, _)| k == "id").map(|(_, v)| v.clone()).unwrap_or_default();
				let def = kind.property_by_field_id(&id).ok_or_else(|| {
					let allowed: Vec<&str> = kind.properties().iter().map(|p| p.field_id).collect();
					XmlError::UnknownFieldId {
						xpath: child_xpath.clone(),
						id: id.clone(),
						allowed_list: allowed.join(", "),
					}
				})?;
				data.set(def.cli_name, Some(text_of(child_elem)));
			}
			"entry" => {
				if !kind.is_folder() {
					return Err(XmlError::UnknownAccountElement(child_xpath));
				}
				sub_entries.push(child_elem);
			}
			_ => {
				return if kind.is_folder() {
					Err(XmlError::UnknownFolderElement(child_xpath))
				} else {
					Err(XmlError::UnknownAccountElement(child_xpath))
				};
			}
		}
	}

	let name = name.ok_or_else(|| XmlError::MissingName(xpath.to_string()))?;
	let header = Header {
		name,
		description,
		updated,
		notes,
	};
	// Duplicate sibling names are accepted at parse time (the tree merely
	// keeps its sort order); only `Tree::add` rejects them.
	let node_id = tree.insert_unchecked(parent, DetachedEntry { header, data });

	for (index, sub) in sub_entries.iter().enumerate() {
		let sub_xpath = format!("{}/entry[{}]", xpath, index + 1);
		parse_entry(sub, &sub_xpath, tree, node_id)?;
	}

	Ok(node_id)
}

fn escape_text(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			_ => out.push(c),
		}
	}
	out
}

/// Serialises the whole tree to a pretty-printed `<revelationdata>` document.
pub fn emit(tree: &Tree) -> String {
	let mut out = String::new();
	out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");

	let root = tree.root();
	let children = tree.children(root);
	if children.is_empty() {
		out.push_str("<revelationdata dataversion=\"1\" />");
	} else {
		out.push_str("<revelationdata dataversion=\"1\">\n");
		for &child in children {
			write_entry(tree, child, 1, &mut out);
		}
		out.push_str("</revelationdata>");
	}
	out
}

fn write_entry(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
	let indent = "\t".repeat(depth);
	let inner = "\t".repeat(depth + 1);
	let header = tree.header(id).expect("non-root node always has a header");
	let data = tree.data(id).expect("non-root node always has data");
	let kind = data.kind();

	out.push_str(&indent);
	out.push_str("<entry type=\"");
	out.push_str(kind.xml_type());
	out.push_str("\">\n");

	out.push_str(&inner);
	out.push_str("<name>");
	out.push_str(&escape_text(&header.name));
	out.push_str("</name>\n");
	if let Some(desc) = &header.description {
		out.push_str(&inner);
		out.push_str("<description>");
		out.push_str(&escape_text(desc));
		out.push_str("</description>\n");
	}
	if let Some(updated) = &header.updated {
		out.push_str(&inner);
		out.push_str("<updated>");
		out.push_str(&updated.timestamp().to_string());
		out.push_str("</updated>\n");
	}
	if let Some(notes) = &header.notes {
		out.push_str(&inner);
		out.push_str("<notes>");
		out.push_str(&escape_text(notes));
		out.push_str("</notes>\n");
	}

	if kind.is_folder() {
		for &child in tree.children(id) {
			write_entry(tree, child, depth + 1, out);
		}
	} else {
		for (def, value) in data.iter_present() {
			out.push_str(&inner);
			out.push_str("<field id=\"");
			out.push_str(def.field_id);
			out.push_str("\">");
			out.push_str(&escape_text(value));
			out.push_str("</field>\n");
		}
	}

	out.push_str(&indent);
	out.push_str("</entry>\n");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::DetachedEntry;
	use crate::schema::Kind;

	#[test]
	fn empty_database_round_trips() {
		let tree = Tree::new();
		let xml = emit(&tree);
		assert_eq!(xml, "<?xml version='1.0' encoding='UTF-8'?>\n<revelationdata dataversion=\"1\" />");
		let parsed = parse(&xml).unwrap();
		assert!(parsed.children(parsed.root()).is_empty());
	}

	#[test]
	fn single_entry_round_trips() {
		let mut tree = Tree::new();
		let root = tree.root();
		let mut data = EntryData::new(Kind::Generic);
		data.set("hostname", Some("example.com".to_string()));
		let header = Header::new("E1");
		tree.add(root, DetachedEntry { header, data }).unwrap();

		let xml = emit(&tree);
		let parsed = parse(&xml).unwrap();
		let found = parsed.lookup(&["E1".to_string()]).unwrap();
		assert_eq!(parsed.data(found).unwrap().get("hostname"), Some("example.com"));
	}

	#[test]
	fn nested_folders_round_trip() {
		let mut tree = Tree::new();
		let root = tree.root();
		let f1 = tree
			.add(
				root,
				DetachedEntry {
					header: Header::new("E1 name"),
					data: EntryData::new(Kind::Folder),
				},
			)
			.unwrap();
		let f2 = tree
			.add(
				f1,
				DetachedEntry {
					header: Header::new("E2 name"),
					data: EntryData::new(Kind::Folder),
				},
			)
			.unwrap();
		tree.add(
			f2,
			DetachedEntry {
				header: Header::new("E3 name"),
				data: EntryData::new(Kind::Generic),
			},
		)
		.unwrap();

		let xml = emit(&tree);
		let parsed = parse(&xml).unwrap();
		let found = parsed
			.lookup(&["E1 name".to_string(), "E2 name".to_string(), "E3 name".to_string()])
			.unwrap();
		assert_eq!(parsed.name(found), Some("E3 name"));
	}

	#[test]
	fn missing_name_fails_with_xpath() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert_eq!(err, XmlError::MissingName("/revelationdata/entry[1]".to_string()));
	}

	#[test]
	fn empty_name_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name></name></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert_eq!(
			err,
			XmlError::InvalidValue {
				xpath: "/revelationdata/entry[1]/name".to_string(),
				raw: String::new(),
				reason: "string is empty".to_string(),
			}
		);
	}

	#[test]
	fn unknown_field_id_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name>E</name><field id=\"bogus\">x</field></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::UnknownFieldId { .. }));
	}

	#[test]
	fn non_digit_updated_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name>E</name><updated>-1</updated></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::InvalidValue { .. }));
	}

	#[test]
	fn zero_updated_is_epoch() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name>E</name><updated>0</updated></entry></revelationdata>";
		let tree = parse(xml).unwrap();
		let id = tree.lookup(&["E".to_string()]).unwrap();
		assert_eq!(tree.header(id).unwrap().updated, Some(Utc.timestamp_opt(0, 0).unwrap()));
	}

	#[test]
	fn duplicate_siblings_are_accepted_at_parse_time() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name>dup</name></entry><entry type=\"generic\"><name>dup</name></entry></revelationdata>";
		let tree = parse(xml).unwrap();
		assert_eq!(tree.children(tree.root()).len(), 2);
	}

	#[test]
	fn field_inside_folder_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"folder\"><name>F</name><field id=\"generic-hostname\">x</field></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::UnknownFolderElement(_)));
	}

	#[test]
	fn version_attribute_is_accepted_and_ignored() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\" version=\"1.0\" />";
		parse(xml).unwrap();
	}

	#[test]
	fn unknown_attribute_on_field_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name>E</name><field id=\"generic-hostname\" bogus=\"x\">h</field></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::UnknownAttribute { .. }));
	}

	#[test]
	fn unknown_attribute_on_name_is_rejected() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\"><name bogus=\"x\">E</name></entry></revelationdata>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::UnknownAttribute { .. }));
	}

	#[test]
	fn wrong_root_element_reports_its_own_xpath() {
		let xml = "<?xml version='1.0'?><foo dataversion=\"1\" />";
		let err = parse(xml).unwrap_err();
		assert_eq!(
			err,
			XmlError::InvalidRoot {
				xpath: "/foo".to_string(),
				expected: "revelationdata".to_string(),
			}
		);
	}

	#[test]
	fn malformed_xml_is_a_parse_error() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"><entry type=\"generic\">";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::Parse(_)));
	}

	#[test]
	fn mismatched_end_tag_is_a_parse_error() {
		let xml = "<?xml version='1.0'?><revelationdata dataversion=\"1\"></bogus>";
		let err = parse(xml).unwrap_err();
		assert!(matches!(err, XmlError::Parse(_)));
	}
}
