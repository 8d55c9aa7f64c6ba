//! RFC 3339 serialization for job timestamps.

use serde::Serializer;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&value.format(&Rfc3339).map_err(serde::ser::Error::custom)?)
}

pub mod option {
	use serde::Serializer;
	use time::OffsetDateTime;

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(value) => super::serialize(value, serializer),
			None => serializer.serialize_none(),
		}
	}
}
