#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Identifier as it arrives off the wire: JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
	Int(i64),
	UInt(u64),
	Str(String),
}

impl RawId {
	/// Canonical string form, or `None` when the id is blank.
	pub fn canonical(&self) -> Option<String> {
		IdRepr::canonical(self)
	}
}

impl From<&str> for RawId {
	fn from(v: &str) -> Self {
		RawId::Str(v.to_string())
	}
}

impl From<String> for RawId {
	fn from(v: String) -> Self {
		RawId::Str(v)
	}
}

impl From<i64> for RawId {
	fn from(v: i64) -> Self {
		RawId::Int(v)
	}
}

impl From<u64> for RawId {
	fn from(v: u64) -> Self {
		RawId::UInt(v)
	}
}

/// Anything that can be reduced to a canonical identifier string.
pub trait IdRepr {
	fn canonical(&self) -> Option<String>;
}

fn canonical_str(s: &str) -> Option<String> {
	let s = s.trim();
	if s.is_empty() { None } else { Some(s.to_string()) }
}

impl IdRepr for RawId {
	fn canonical(&self) -> Option<String> {
		match self {
			RawId::Int(v) => Some(v.to_string()),
			RawId::UInt(v) => Some(v.to_string()),
			RawId::Str(s) => canonical_str(s),
		}
	}
}

impl IdRepr for str {
	fn canonical(&self) -> Option<String> {
		canonical_str(self)
	}
}

impl IdRepr for String {
	fn canonical(&self) -> Option<String> {
		canonical_str(self)
	}
}

impl IdRepr for i64 {
	fn canonical(&self) -> Option<String> {
		Some(self.to_string())
	}
}

impl IdRepr for u64 {
	fn canonical(&self) -> Option<String> {
		Some(self.to_string())
	}
}

impl<T: IdRepr + ?Sized> IdRepr for &T {
	fn canonical(&self) -> Option<String> {
		(**self).canonical()
	}
}

impl<T: IdRepr> IdRepr for Option<T> {
	fn canonical(&self) -> Option<String> {
		self.as_ref().and_then(IdRepr::canonical)
	}
}

/// Compare two identifiers regardless of their source representation.
///
/// Both sides are stringified and trimmed first. A missing or blank operand
/// never equals anything, including another missing operand.
pub fn ids_equal<A, B>(a: &A, b: &B) -> bool
where
	A: IdRepr + ?Sized,
	B: IdRepr + ?Sized,
{
	match (a.canonical(), b.canonical()) {
		(Some(a), Some(b)) => a == b,
		_ => false,
	}
}
