//! Command-line front end: `init`, `list`, `show`, `add`, `edit`, `delete`
//! and `dump`, built entirely on the `storepass` library's model and
//! storage façades. Argument parsing is `clap`'s derive API; a parse
//! failure exits with clap's own code 2.

use std::process::ExitCode;

use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use log::{debug, error, LevelFilter};

use storepass::common;
use storepass::common::config::CliConfig;
use storepass::model::{EntryData, Header, Model};
use storepass::schema::{self, Kind};
use storepass::storage::{PasswordProvider, Storage};
use storepass::visitor::Visitor;

#[derive(Parser)]
#[command(name = "storepass", about = "A local, single-file password manager")]
struct Cli {
	/// Password database file (the default is ~/.storepass.db).
	#[arg(short = 'f', long = "file", value_name = "PASSDB")]
	file: Option<String>,

	/// Increase verbosity level (may be repeated).
	#[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Create a new empty database
	Init,
	/// List password entries
	List,
	/// Show a password entry and its details
	Show {
		#[arg(value_name = "ENTRY")]
		entry: String,
	},
	/// Add a new password entry
	Add {
		/// Entry type (the default is generic)
		#[arg(short = 't', long = "type", default_value = "generic")]
		type_: String,
		#[command(flatten)]
		props: EntryProps,
		#[arg(value_name = "ENTRY")]
		entry: String,
	},
	/// Edit an existing password entry
	Edit {
		/// Replace the entry with a new type, carrying over shared properties
		#[arg(short = 't', long = "type")]
		type_: Option<String>,
		#[command(flatten)]
		props: EntryProps,
		#[arg(value_name = "ENTRY")]
		entry: String,
	},
	/// Delete a password entry
	Delete {
		#[arg(value_name = "ENTRY")]
		entry: String,
	},
	/// Dump raw database content
	Dump,
}

/// Every kind-specific property across all 13 entry kinds, flattened into
/// one argument group. Which ones apply to a given command is determined
/// at runtime against the chosen entry's schema, not at parse time,
/// since the set of valid options depends on `--type`.
#[derive(clap::Args, Default)]
struct EntryProps {
	#[arg(long, value_name = "DESC")]
	description: Option<String>,
	#[arg(long)]
	notes: Option<String>,

	#[arg(long = "card-type", value_name = "TYPE")]
	card_type: Option<String>,
	#[arg(long = "card-number", value_name = "NUMBER")]
	card_number: Option<String>,
	#[arg(long = "expiry-date", value_name = "DATE")]
	expiry_date: Option<String>,
	#[arg(long)]
	ccv: Option<String>,
	#[arg(long)]
	pin: Option<String>,
	#[arg(long, value_name = "HOST")]
	hostname: Option<String>,
	#[arg(long)]
	certificate: Option<String>,
	#[arg(long)]
	keyfile: Option<String>,
	/// Prompt for a password value when given with no argument.
	#[arg(long, num_args = 0..=1, require_equals = true)]
	password: Option<Option<String>>,
	#[arg(long, value_name = "USER")]
	username: Option<String>,
	#[arg(long)]
	database: Option<String>,
	#[arg(long)]
	location: Option<String>,
	#[arg(long)]
	code: Option<String>,
	#[arg(long)]
	email: Option<String>,
	#[arg(long)]
	port: Option<String>,
	#[arg(long = "phone-number", value_name = "NUMBER")]
	phone_number: Option<String>,
	#[arg(long)]
	domain: Option<String>,
	#[arg(long)]
	url: Option<String>,
}

impl EntryProps {
	/// Kind-specific property values given on the command line, in the
	/// order they're declared above. `None` for the password slot means
	/// "prompt for it"; every other pair carries a literal value.
	fn provided(&self) -> Vec<(&'static str, Option<String>)> {
		let mut out = Vec::new();
		macro_rules! push {
			($field:ident, $name:literal) => {
				if let Some(value) = &self.$field {
					out.push(($name, Some(value.clone())));
				}
			};
		}
		push!(card_type, "card-type");
		push!(card_number, "card-number");
		push!(expiry_date, "expiry-date");
		push!(ccv, "ccv");
		push!(pin, "pin");
		push!(hostname, "hostname");
		push!(certificate, "certificate");
		push!(keyfile, "keyfile");
		push!(username, "username");
		push!(database, "database");
		push!(location, "location");
		push!(code, "code");
		push!(email, "email");
		push!(port, "port");
		push!(phone_number, "phone-number");
		push!(domain, "domain");
		push!(url, "url");
		if let Some(maybe_value) = &self.password {
			out.push(("password", maybe_value.clone()));
		}
		out
	}
}

/// Prompts for the database passphrase via the terminal, caching nothing
/// itself — `Storage` is the one that memoizes this for its lifetime.
struct PromptPassword;

impl PasswordProvider for PromptPassword {
	fn provide(&self) -> common::Result<String> {
		rpassword::prompt_password("Database password: ").map_err(|e| failure::err_msg(e.to_string()))
	}
}

fn prompt_entry_password() -> common::Result<String> {
	rpassword::prompt_password("Entry password: ").map_err(|e| failure::err_msg(e.to_string()))
}

/// Validates that every property given on the command line belongs to
/// `kind`'s schema, then resolves each to a concrete value (prompting for
/// any password given with no argument).
fn validate_and_resolve(kind: Kind, props: &EntryProps) -> common::Result<Vec<(&'static str, String)>> {
	let provided = props.provided();
	for (name, _) in &provided {
		if kind.property_by_cli_name(name).is_none() {
			return Err(failure::err_msg(format!(
				"option --{} is not valid for entry type '{}'",
				name,
				kind.cli_name()
			)));
		}
	}
	let mut resolved = Vec::with_capacity(provided.len());
	for (name, value) in provided {
		let value = match value {
			Some(v) => v,
			None => prompt_entry_password()?,
		};
		resolved.push((name, value));
	}
	Ok(resolved)
}

fn now_truncated() -> DateTime<Utc> {
	let now = Utc::now();
	Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now)
}

/// One-line, indented outline of every entry: containers as `+ NAME[:
/// DESC]`, accounts as `- NAME[ [address]][: DESC]`.
struct ListVisitor {
	depth: usize,
}

fn account_line(depth: usize, header: &Header, data: &EntryData) {
	let indent = "  ".repeat(depth);
	let address = data.get("hostname").or_else(|| data.get("url"));
	let address = address.map(|a| format!(" [{}]", a)).unwrap_or_default();
	let description = header.description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default();
	println!("{}- {}{}{}", indent, header.name, address, description);
}

impl Visitor for ListVisitor {
	type ParentData = ();

	fn on_root(&mut self) {}

	fn on_folder(&mut self, header: &Header) {
		let indent = "  ".repeat(self.depth);
		let description = header.description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default();
		println!("{}+ {}{}", indent, header.name, description);
	}

	fn on_credit_card(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_crypto_key(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_database(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_door(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_email(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_ftp(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_generic(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_phone(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_remote_desktop(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_shell(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_vnc(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}
	fn on_website(&mut self, header: &Header, data: &EntryData) {
		account_line(self.depth, header, data);
	}

	fn enter_container(&mut self, _parent_data: ()) {
		self.depth += 1;
	}

	fn leave_container(&mut self) {
		self.depth -= 1;
	}
}

fn run_list(model: &Model) {
	let mut visitor = ListVisitor { depth: 0 };
	model.visit_all(&mut visitor);
}

/// Detailed single-entry render: header `+ FULL_PATH (LABEL)`, then
/// kind-specific properties in schema order, then Description, Notes,
/// Last modified.
fn run_show(model: &Model, entry: &str) -> common::Result<()> {
	let id = model.lookup(entry)?;
	let tree = model.tree();
	let header = tree.header(id).expect("show target is never root");
	let data = tree.data(id).expect("show target is never root");
	println!("+ {} ({})", tree.full_path(id), data.kind().label());
	for (def, value) in data.iter_present() {
		println!("  - {}: {}", def.label, value);
	}
	if let Some(description) = &header.description {
		println!("  - Description: {}", description);
	}
	if let Some(notes) = &header.notes {
		println!("  - Notes: {}", notes);
	}
	if let Some(updated) = &header.updated {
		let local: DateTime<Local> = updated.with_timezone(&Local);
		println!("  - Last modified: {}", local.format("%a %b %e %H:%M:%S %Y %Z"));
	}
	Ok(())
}

fn run_add(model: &mut Model, type_: &str, props: &EntryProps, entry: &str) -> common::Result<()> {
	let kind = schema::kind_by_cli_name(type_).ok_or_else(|| failure::err_msg(format!("unknown entry type '{}'", type_)))?;
	let resolved = validate_and_resolve(kind, props)?;

	let mut header = Header::new("");
	header.description = props.description.clone();
	header.notes = props.notes.clone();
	header.updated = Some(now_truncated());

	let mut data = EntryData::new(kind);
	for (name, value) in resolved {
		data.set(name, Some(value));
	}

	model.add_entry(entry, header, data)?;
	Ok(())
}

fn run_edit(model: &mut Model, type_: Option<&str>, props: &EntryProps, entry: &str) -> common::Result<()> {
	let id = model.lookup(entry)?;
	let current_kind = model.tree().data(id).expect("edit target is never root").kind();
	let new_kind = match type_ {
		Some(t) => schema::kind_by_cli_name(t).ok_or_else(|| failure::err_msg(format!("unknown entry type '{}'", t)))?,
		None => current_kind,
	};
	let resolved = validate_and_resolve(new_kind, props)?;

	if new_kind == current_kind {
		let tree = model.tree_mut();
		let header = tree.header_mut(id).expect("edit target is never root");
		if let Some(description) = &props.description {
			header.description = Some(description.clone());
		}
		if let Some(notes) = &props.notes {
			header.notes = Some(notes.clone());
		}
		header.updated = Some(now_truncated());
		let data = tree.data_mut(id).expect("edit target is never root");
		for (name, value) in resolved {
			data.set(name, Some(value));
		}
		return Ok(());
	}

	// Kind changed: carry over properties shared between the old and new
	// schema, then layer the command-line values on top.
	let old_header = model.tree().header(id).expect("edit target is never root").clone();
	let old_data = model.tree().data(id).expect("edit target is never root").clone();

	let mut new_data = EntryData::new(new_kind);
	for (def, value) in old_data.iter_present() {
		new_data.set(def.cli_name, Some(value.to_string()));
	}
	for (name, value) in resolved {
		new_data.set(name, Some(value));
	}

	let mut new_header = old_header;
	if let Some(description) = &props.description {
		new_header.description = Some(description.clone());
	}
	if let Some(notes) = &props.notes {
		new_header.notes = Some(notes.clone());
	}
	new_header.updated = Some(now_truncated());

	model.replace_entry(entry, new_header, new_data)?;
	Ok(())
}

fn run_delete(model: &mut Model, entry: &str) -> common::Result<()> {
	model.remove_entry(entry)?;
	Ok(())
}

fn run_dump(storage: &Storage) -> common::Result<()> {
	let plain = storage.read_plain()?;
	if plain.ends_with('\n') {
		print!("{}", plain);
	} else {
		println!("{}", plain);
	}
	Ok(())
}

fn init_logging(verbose: u8) {
	let level = match verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		_ => LevelFilter::Debug,
	};
	env_logger::Builder::new().filter_level(level).format_timestamp(None).init();
}

fn run() -> common::Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	let config = CliConfig::new(cli.file, cli.verbose)?;
	debug!("processing command on file '{}'", config.db_path.display());

	let storage = Storage::new(config.db_path.clone(), Box::new(PromptPassword));

	match &cli.command {
		Command::Dump => return run_dump(&storage),
		Command::Init => {
			let tree = storepass::model::Tree::new();
			storage.write_tree(&tree, true)?;
			return Ok(());
		}
		_ => {}
	}

	let mut model = Model::from_tree(storage.read_tree()?);

	match &cli.command {
		Command::List => run_list(&model),
		Command::Show { entry } => run_show(&model, entry)?,
		Command::Add { type_, props, entry } => run_add(&mut model, type_, props, entry)?,
		Command::Edit { type_, props, entry } => run_edit(&mut model, type_.as_deref(), props, entry)?,
		Command::Delete { entry } => run_delete(&mut model, entry)?,
		Command::Init | Command::Dump => unreachable!("handled above"),
	}

	match cli.command {
		Command::Add { .. } | Command::Edit { .. } | Command::Delete { .. } => {
			storage.write_tree(model.tree(), false)?;
		}
		_ => {}
	}

	Ok(())
}

fn main() -> ExitCode {
	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn props_with(password: Option<Option<&str>>) -> EntryProps {
		let mut p = EntryProps::default();
		p.password = password.map(|v| v.map(|s| s.to_string()));
		p
	}

	#[test]
	fn unsupported_property_is_rejected() {
		let mut props = EntryProps::default();
		props.hostname = Some("h".to_string());
		let err = validate_and_resolve(Kind::Folder, &props).unwrap_err();
		assert!(err.to_string().contains("is not valid for entry type"));
	}

	#[test]
	fn supported_property_resolves_literally() {
		let mut props = EntryProps::default();
		props.hostname = Some("example.com".to_string());
		let resolved = validate_and_resolve(Kind::Generic, &props).unwrap();
		assert_eq!(resolved, vec![("hostname", "example.com".to_string())]);
	}

	#[test]
	fn password_without_value_type_checks_before_prompting() {
		// Folder has no password property; this must fail validation
		// before ever reaching a prompt.
		let props = props_with(None);
		let err = validate_and_resolve(Kind::Folder, &props).unwrap_err();
		assert!(err.to_string().contains("password"));
	}
}
