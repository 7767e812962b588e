use super::Result;
use std::path::PathBuf;

const STOREPASS_DEFAULT_DB_FILENAME: &str = ".storepass.db";

/// Resolved command-line configuration: the small set of knobs `main()`
/// derives once from argv before dispatching to a command. Resolves to a
/// single database file at a caller-supplied path, default
/// `$HOME/.storepass.db`, with no sidecar or lock files.
#[derive(Clone, Debug)]
pub struct CliConfig {
	pub db_path: PathBuf,
	pub verbosity: u8,
}

impl CliConfig {
	pub fn new(file: Option<String>, verbosity: u8) -> Result<Self> {
		let db_path = match file {
			Some(path) => PathBuf::from(path),
			None => Self::default_db_path()?,
		};
		Ok(Self { db_path, verbosity })
	}

	pub fn default_db_path() -> Result<PathBuf> {
		let mut path = dirs::home_dir().ok_or_else(|| {
			failure::err_msg("could not determine the current user's home directory")
		})?;
		path.push(STOREPASS_DEFAULT_DB_FILENAME);
		Ok(path)
	}
}
