//! The file envelope (magic header, salt, IV, PBKDF2/AES-CBC/SHA-256/zlib
//! pipeline) and the storage façade built on top of it and the XML codec.
//!
//! Grounded in the exact byte layout and crypto order of the Revelation v2
//! file format: header fields are read and validated in the order they
//! appear on disk so a truncated or corrupted file fails with the most
//! specific diagnosis possible, and the SHA-256 integrity check doubles as
//! the password check (a wrong key decrypts to noise, which almost never
//! hashes to the stored digest).

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use failure::Fail;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use once_cell::unsync::OnceCell;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::model::Tree;
use crate::xml;

const MAGIC: &[u8; 4] = b"rvl\0";
const ENVELOPE_VERSION: u8 = 0x02;
const PBKDF2_ITERATIONS: u32 = 12000;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum StorageReadError {
	#[fail(display = "file header is incomplete: {} of {} bytes present", 0, 1)]
	HeaderIncomplete(usize, usize),
	#[fail(display = "salt is incomplete: {} of {} bytes present", 0, 1)]
	SaltIncomplete(usize, usize),
	#[fail(display = "initialisation vector is incomplete: {} of {} bytes present", 0, 1)]
	IVIncomplete(usize, usize),
	#[fail(display = "ciphertext length {} is not a positive multiple of 16", 0)]
	Misaligned(usize),
	#[fail(display = "invalid magic bytes: {:?}", 0)]
	InvalidMagic([u8; 4]),
	#[fail(display = "unsupported envelope data version: {:#04x}", 0)]
	UnsupportedEnvelopeVersion(u8),
	#[fail(display = "expected zero padding at {} but found {:?}", range, found)]
	NonZeroPadding { range: String, found: Vec<u8> },
	#[fail(display = "padding length byte {} exceeds the block size", 0)]
	BadPaddingLength(u8),
	#[fail(display = "padding byte mismatch: expected {}, found {}", expected, found)]
	BadPaddingBytes { expected: u8, found: u8 },
	#[fail(display = "compressed payload is empty after stripping padding")]
	EmptyCompressed,
	#[fail(display = "incorrect password")]
	WrongPassword,
	#[fail(display = "failed to decompress payload: {}", 0)]
	DecompressError(String),
	#[fail(display = "payload is not valid UTF-8: {}", 0)]
	Utf8Error(String),
	#[fail(display = "{}", 0)]
	Xml(#[cause] xml::XmlError),
	#[fail(display = "failed to read database file: {}", 0)]
	Io(String),
}

impl From<xml::XmlError> for StorageReadError {
	fn from(e: xml::XmlError) -> Self {
		StorageReadError::Xml(e)
	}
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum StorageWriteError {
	#[fail(display = "the database file already exists")]
	AlreadyExists,
	#[fail(display = "I/O error writing database file: {}", 0)]
	IoError(String),
	#[fail(display = "failed to compress payload: {}", 0)]
	CompressError(String),
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
	let mut key = [0u8; 32];
	pbkdf2::pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
	key
}

fn pad_compressed(mut data: Vec<u8>) -> Vec<u8> {
	let pad = (16 - (data.len() % 16)) as u8;
	let new_len = data.len() + pad as usize;
	data.resize(new_len, pad);
	data
}

/// Encrypts `plaintext` (UTF-8 XML) into a complete envelope file:
/// compress, pad, hash, encrypt, frame.
pub fn encode_envelope(plaintext: &str, passphrase: &str) -> Result<Vec<u8>, StorageWriteError> {
	let mut compressed = Vec::new();
	{
		let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
		encoder
			.write_all(plaintext.as_bytes())
			.map_err(|e| StorageWriteError::CompressError(e.to_string()))?;
		encoder.finish().map_err(|e| StorageWriteError::CompressError(e.to_string()))?;
	}
	let padded = pad_compressed(compressed);
	let hash = Sha256::digest(&padded);

	let mut decrypted_block = Vec::with_capacity(32 + padded.len());
	decrypted_block.extend_from_slice(&hash);
	decrypted_block.extend_from_slice(&padded);

	let mut salt = [0u8; 8];
	let mut iv = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut salt);
	rand::thread_rng().fill_bytes(&mut iv);

	let key = derive_key(passphrase, &salt);
	let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
		.expect("key and iv are fixed 32/16-byte arrays")
		.encrypt_padded_vec_mut::<NoPadding>(&decrypted_block);

	let mut out = Vec::with_capacity(36 + ciphertext.len());
	out.extend_from_slice(MAGIC);
	out.push(ENVELOPE_VERSION);
	out.push(0x00);
	out.extend_from_slice(&[0x00, 0x00, 0x00]);
	out.extend_from_slice(&[0x00, 0x00, 0x00]);
	out.extend_from_slice(&salt);
	out.extend_from_slice(&iv);
	out.extend_from_slice(&ciphertext);
	Ok(out)
}

/// Decrypts and validates a complete envelope file, returning the UTF-8 XML
/// payload. Every malformation is checked in the order the corresponding
/// bytes appear on disk, except for the hash/padding checks, which
/// necessarily happen after decryption. The SHA-256 integrity check runs
/// before the padding checks, since it doubles as the password check: a
/// wrong key decrypts to noise whose last byte is essentially random, so
/// checking padding first would misreport a wrong password as a padding
/// error almost all of the time.
pub fn decode_envelope(bytes: &[u8], passphrase: &str) -> Result<String, StorageReadError> {
	if bytes.len() < 12 {
		return Err(StorageReadError::HeaderIncomplete(bytes.len(), 12));
	}
	if bytes.len() < 20 {
		return Err(StorageReadError::SaltIncomplete(bytes.len() - 12, 8));
	}
	if bytes.len() < 36 {
		return Err(StorageReadError::IVIncomplete(bytes.len() - 20, 16));
	}
	let ciphertext_len = bytes.len() - 36;
	if ciphertext_len == 0 || ciphertext_len % 16 != 0 {
		return Err(StorageReadError::Misaligned(ciphertext_len));
	}
	if &bytes[0..4] != MAGIC {
		let mut found = [0u8; 4];
		found.copy_from_slice(&bytes[0..4]);
		return Err(StorageReadError::InvalidMagic(found));
	}
	if bytes[4] != ENVELOPE_VERSION {
		return Err(StorageReadError::UnsupportedEnvelopeVersion(bytes[4]));
	}
	if bytes[5] != 0x00 {
		return Err(StorageReadError::NonZeroPadding {
			range: "[5:6)".to_string(),
			found: vec![bytes[5]],
		});
	}
	if bytes[9..12].iter().any(|&b| b != 0x00) {
		return Err(StorageReadError::NonZeroPadding {
			range: "[9:12)".to_string(),
			found: bytes[9..12].to_vec(),
		});
	}

	let salt = &bytes[12..20];
	let iv = &bytes[20..36];
	let ciphertext = &bytes[36..];

	let key = derive_key(passphrase, salt);
	let decrypted = Aes256CbcDec::new_from_slices(&key, iv)
		.expect("key and iv are fixed 32/16-byte arrays")
		.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
		.expect("ciphertext length was validated to be a positive multiple of 16 above");

	if decrypted.len() < 32 {
		return Err(StorageReadError::EmptyCompressed);
	}
	let (digest_read, compressed_padded) = decrypted.split_at(32);

	let computed = Sha256::digest(compressed_padded);
	if computed.as_slice() != digest_read {
		return Err(StorageReadError::WrongPassword);
	}

	let pad = *compressed_padded.last().ok_or(StorageReadError::EmptyCompressed)?;
	if pad == 0 || pad as usize > 16 {
		return Err(StorageReadError::BadPaddingLength(pad));
	}
	let pad = pad as usize;
	if compressed_padded.len() < pad {
		return Err(StorageReadError::BadPaddingLength(pad as u8));
	}
	let (content, padding) = compressed_padded.split_at(compressed_padded.len() - pad);
	if let Some(&found) = padding.iter().find(|&&b| b as usize != pad) {
		return Err(StorageReadError::BadPaddingBytes {
			expected: pad as u8,
			found,
		});
	}
	if content.is_empty() {
		return Err(StorageReadError::EmptyCompressed);
	}

	let mut plain = Vec::new();
	ZlibDecoder::new(content)
		.read_to_end(&mut plain)
		.map_err(|e| StorageReadError::DecompressError(e.to_string()))?;

	String::from_utf8(plain).map_err(|e| StorageReadError::Utf8Error(e.to_string()))
}

fn write_bytes(path: &Path, bytes: &[u8], exclusive: bool) -> Result<(), StorageWriteError> {
	let mut options = OpenOptions::new();
	options.write(true);
	if exclusive {
		options.create_new(true);
	} else {
		options.create(true).truncate(true);
	}
	let mut file = options.open(path).map_err(|e| {
		if exclusive && e.kind() == io::ErrorKind::AlreadyExists {
			StorageWriteError::AlreadyExists
		} else {
			StorageWriteError::IoError(e.to_string())
		}
	})?;
	file.write_all(bytes).map_err(|e| StorageWriteError::IoError(e.to_string()))
}

/// Supplies the database passphrase on demand. Implemented by the CLI
/// collaborator as an interactive prompt; tests supply a fixed string.
pub trait PasswordProvider {
	fn provide(&self) -> crate::common::Result<String>;
}

impl<F> PasswordProvider for F
where
	F: Fn() -> crate::common::Result<String>,
{
	fn provide(&self) -> crate::common::Result<String> {
		self()
	}
}

/// Bundles the envelope and XML codecs behind `read_plain` / `read_tree` /
/// `write_plain` / `write_tree`. The password provider is invoked lazily
/// and cached for the façade's lifetime, so a load-modify-save flow
/// prompts at most once.
pub struct Storage {
	path: PathBuf,
	provider: Box<dyn PasswordProvider>,
	password: OnceCell<String>,
}

impl Storage {
	pub fn new(path: impl Into<PathBuf>, provider: Box<dyn PasswordProvider>) -> Self {
		Storage {
			path: path.into(),
			provider,
			password: OnceCell::new(),
		}
	}

	fn password(&self) -> crate::common::Result<&str> {
		self.password.get_or_try_init(|| self.provider.provide()).map(|s| s.as_str())
	}

	pub fn read_plain(&self) -> crate::common::Result<String> {
		let bytes = std::fs::read(&self.path).map_err(|e| StorageReadError::Io(e.to_string()))?;
		let password = self.password()?;
		Ok(decode_envelope(&bytes, password)?)
	}

	pub fn read_tree(&self) -> crate::common::Result<Tree> {
		let xml = self.read_plain()?;
		Ok(xml::parse(&xml).map_err(StorageReadError::from)?)
	}

	pub fn write_plain(&self, xml: &str, exclusive: bool) -> crate::common::Result<()> {
		let password = self.password()?;
		let bytes = encode_envelope(xml, password)?;
		write_bytes(&self.path, &bytes, exclusive)?;
		Ok(())
	}

	pub fn write_tree(&self, tree: &Tree, exclusive: bool) -> crate::common::Result<()> {
		let xml = xml::emit(tree);
		self.write_plain(&xml, exclusive)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_with_correct_password() {
		let xml = "<?xml version='1.0' encoding='UTF-8'?>\n<revelationdata dataversion=\"1\" />";
		let envelope = encode_envelope(xml, "qwerty").unwrap();
		let decoded = decode_envelope(&envelope, "qwerty").unwrap();
		assert_eq!(decoded, xml);
	}

	#[test]
	fn wrong_password_is_rejected() {
		let xml = "<?xml version='1.0' encoding='UTF-8'?>\n<revelationdata dataversion=\"1\" />";
		let envelope = encode_envelope(xml, "qwerty").unwrap();
		let err = decode_envelope(&envelope, "wrong").unwrap_err();
		assert_eq!(err, StorageReadError::WrongPassword);
	}

	#[test]
	fn two_writes_have_distinct_salt_and_iv() {
		let xml = "<?xml version='1.0' encoding='UTF-8'?>\n<revelationdata dataversion=\"1\" />";
		let a = encode_envelope(xml, "qwerty").unwrap();
		let b = encode_envelope(xml, "qwerty").unwrap();
		assert_ne!(&a[12..36], &b[12..36]);
	}

	#[test]
	fn header_incomplete_below_12_bytes() {
		let err = decode_envelope(&[0u8; 11], "x").unwrap_err();
		assert_eq!(err, StorageReadError::HeaderIncomplete(11, 12));
	}

	#[test]
	fn salt_incomplete_between_12_and_20_bytes() {
		let err = decode_envelope(&[0u8; 15], "x").unwrap_err();
		assert_eq!(err, StorageReadError::SaltIncomplete(3, 8));
	}

	#[test]
	fn iv_incomplete_between_20_and_36_bytes() {
		let err = decode_envelope(&[0u8; 30], "x").unwrap_err();
		assert_eq!(err, StorageReadError::IVIncomplete(10, 16));
	}

	#[test]
	fn misaligned_ciphertext_between_37_and_51_bytes() {
		let bytes = vec![0u8; 36 + 5];
		let err = decode_envelope(&bytes, "x").unwrap_err();
		assert_eq!(err, StorageReadError::Misaligned(5));
	}

	#[test]
	fn invalid_magic_is_rejected() {
		let xml = "<?xml version='1.0' encoding='UTF-8'?>\n<revelationdata dataversion=\"1\" />";
		let mut envelope = encode_envelope(xml, "qwerty").unwrap();
		envelope[0] = b'x';
		let err = decode_envelope(&envelope, "qwerty").unwrap_err();
		assert!(matches!(err, StorageReadError::InvalidMagic(_)));
	}

	#[test]
	fn write_tree_is_exclusive_when_requested() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("db.rvl");
		std::fs::write(&path, b"anything").unwrap();
		let err = write_bytes(&path, b"data", true).unwrap_err();
		assert_eq!(err, StorageWriteError::AlreadyExists);
	}
}
