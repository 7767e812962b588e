//! Static schema table: the discriminator distinguishing `Folder` from the
//! twelve account kinds, each kind's display label, and the ordered,
//! optional, string-valued properties that make up its on-disk record.
//!
//! This is deliberately a plain data table rather than a generic property
//! bag — it is what makes the XML codec's field order, the CLI's accepted
//! `--options`, and the schema lookups all derive from one place.

/// One of the twelve leaf account kinds. `Folder` is a thirteenth,
/// container-only kind; the internal `Root` has no `Kind` of its own since
/// callers never construct or select it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
	Folder,
	CreditCard,
	CryptoKey,
	Database,
	Door,
	Email,
	Ftp,
	Generic,
	Phone,
	RemoteDesktop,
	Shell,
	Vnc,
	Website,
}

pub const ALL_KINDS: &[Kind] = &[
	Kind::Folder,
	Kind::CreditCard,
	Kind::CryptoKey,
	Kind::Database,
	Kind::Door,
	Kind::Email,
	Kind::Ftp,
	Kind::Generic,
	Kind::Phone,
	Kind::RemoteDesktop,
	Kind::Shell,
	Kind::Vnc,
	Kind::Website,
];

/// A kind-specific optional property: its command-line-friendly name, its
/// display label, and the XML `field`/`id` value used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyDef {
	pub cli_name: &'static str,
	pub label: &'static str,
	pub field_id: &'static str,
}

macro_rules! prop {
	($cli:literal, $label:literal, $id:literal) => {
		PropertyDef {
			cli_name: $cli,
			label: $label,
			field_id: $id,
		}
	};
}

const CREDIT_CARD_PROPS: &[PropertyDef] = &[
	prop!("card-type", "Card type", "creditcard-cardtype"),
	prop!("card-number", "Card number", "creditcard-cardnumber"),
	prop!("expiry-date", "Expiry date", "creditcard-expirydate"),
	prop!("ccv", "CCV", "creditcard-ccv"),
	prop!("pin", "PIN", "generic-pin"),
];

const CRYPTO_KEY_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("certificate", "Certificate", "generic-certificate"),
	prop!("keyfile", "Keyfile", "generic-keyfile"),
	prop!("password", "Password", "generic-password"),
];

const DATABASE_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
	prop!("database", "Database", "generic-database"),
];

const DOOR_PROPS: &[PropertyDef] = &[
	prop!("location", "Location", "generic-location"),
	prop!("code", "Code", "generic-code"),
];

const EMAIL_PROPS: &[PropertyDef] = &[
	prop!("email", "Email", "generic-email"),
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const FTP_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("port", "Port", "generic-port"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const GENERIC_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const PHONE_PROPS: &[PropertyDef] = &[
	prop!("phone-number", "Phone number", "phone-phonenumber"),
	prop!("pin", "PIN", "generic-pin"),
];

const REMOTE_DESKTOP_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("port", "Port", "generic-port"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const SHELL_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("domain", "Domain", "generic-domain"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const VNC_PROPS: &[PropertyDef] = &[
	prop!("hostname", "Hostname", "generic-hostname"),
	prop!("port", "Port", "generic-port"),
	prop!("username", "Username", "generic-username"),
	prop!("password", "Password", "generic-password"),
];

const WEBSITE_PROPS: &[PropertyDef] = &[
	prop!("url", "URL", "generic-url"),
	prop!("username", "Username", "generic-username"),
	prop!("email", "Email", "generic-email"),
	prop!("password", "Password", "generic-password"),
];

impl Kind {
	/// Human-facing label, e.g. "Credit card", "Remote desktop".
	pub fn label(self) -> &'static str {
		match self {
			Kind::Folder => "Folder",
			Kind::CreditCard => "Credit card",
			Kind::CryptoKey => "Crypto key",
			Kind::Database => "Database",
			Kind::Door => "Door",
			Kind::Email => "Email",
			Kind::Ftp => "FTP",
			Kind::Generic => "Generic",
			Kind::Phone => "Phone",
			Kind::RemoteDesktop => "Remote desktop",
			Kind::Shell => "Shell",
			Kind::Vnc => "VNC",
			Kind::Website => "Website",
		}
	}

	/// Kebab-case command-line kind name, e.g. `credit-card`.
	pub fn cli_name(self) -> &'static str {
		match self {
			Kind::Folder => "folder",
			Kind::CreditCard => "credit-card",
			Kind::CryptoKey => "crypto-key",
			Kind::Database => "database",
			Kind::Door => "door",
			Kind::Email => "email",
			Kind::Ftp => "ftp",
			Kind::Generic => "generic",
			Kind::Phone => "phone",
			Kind::RemoteDesktop => "remote-desktop",
			Kind::Shell => "shell",
			Kind::Vnc => "vnc",
			Kind::Website => "website",
		}
	}

	/// Concatenated-lowercase XML `type` attribute value, e.g. `creditcard`.
	pub fn xml_type(self) -> &'static str {
		match self {
			Kind::Folder => "folder",
			Kind::CreditCard => "creditcard",
			Kind::CryptoKey => "cryptokey",
			Kind::Database => "database",
			Kind::Door => "door",
			Kind::Email => "email",
			Kind::Ftp => "ftp",
			Kind::Generic => "generic",
			Kind::Phone => "phone",
			Kind::RemoteDesktop => "remotedesktop",
			Kind::Shell => "shell",
			Kind::Vnc => "vnc",
			Kind::Website => "website",
		}
	}

	/// Ordered property schema for this kind. Empty for `Folder`, which
	/// holds only children.
	pub fn properties(self) -> &'static [PropertyDef] {
		match self {
			Kind::Folder => &[],
			Kind::CreditCard => CREDIT_CARD_PROPS,
			Kind::CryptoKey => CRYPTO_KEY_PROPS,
			Kind::Database => DATABASE_PROPS,
			Kind::Door => DOOR_PROPS,
			Kind::Email => EMAIL_PROPS,
			Kind::Ftp => FTP_PROPS,
			Kind::Generic => GENERIC_PROPS,
			Kind::Phone => PHONE_PROPS,
			Kind::RemoteDesktop => REMOTE_DESKTOP_PROPS,
			Kind::Shell => SHELL_PROPS,
			Kind::Vnc => VNC_PROPS,
			Kind::Website => WEBSITE_PROPS,
		}
	}

	pub fn is_folder(self) -> bool {
		matches!(self, Kind::Folder)
	}

	pub fn property_by_cli_name(self, cli_name: &str) -> Option<PropertyDef> {
		self.properties().iter().copied().find(|p| p.cli_name == cli_name)
	}

	pub fn property_by_field_id(self, field_id: &str) -> Option<PropertyDef> {
		self.properties().iter().copied().find(|p| p.field_id == field_id)
	}
}

pub fn kind_by_cli_name(name: &str) -> Option<Kind> {
	ALL_KINDS.iter().copied().find(|k| k.cli_name() == name)
}

pub fn kind_by_xml_type(xml_type: &str) -> Option<Kind> {
	ALL_KINDS.iter().copied().find(|k| k.xml_type() == xml_type)
}
