//! Mapping result rows onto object attributes.
//!
//! A [`RowMapper`] is a fixed, ordered attribute list for one object kind.
//! Rows are matched to it by position; the row's own column names are not
//! consulted. The same mapper serves single-object and collection refresh.

use pgmob_core::error::{Error, MappingError, Result};
use pgmob_core::{FromValue, ObjectKind, Row};

/// Ordered attribute list of one object kind.
#[derive(Debug, Clone, Copy)]
pub struct RowMapper {
    kind: ObjectKind,
    attributes: &'static [&'static str],
}

impl RowMapper {
    pub const fn new(kind: ObjectKind, attributes: &'static [&'static str]) -> Self {
        Self { kind, attributes }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn attributes(&self) -> &'static [&'static str] {
        self.attributes
    }

    /// Check the row's arity and expose it by attribute name.
    pub fn map<'r>(&self, row: &'r Row) -> Result<MappedRow<'r>> {
        if row.len() != self.attributes.len() {
            return Err(MappingError::arity(self.kind, self.attributes.len(), row.len()).into());
        }
        Ok(MappedRow { mapper: *self, row })
    }
}

/// A row whose shape matched a [`RowMapper`].
#[derive(Debug, Clone, Copy)]
pub struct MappedRow<'r> {
    mapper: RowMapper,
    row: &'r Row,
}

impl MappedRow<'_> {
    fn index(&self, attribute: &str) -> Result<usize> {
        self.mapper
            .attributes
            .iter()
            .position(|a| *a == attribute)
            .ok_or_else(|| {
                Error::Mapping(MappingError::attribute(
                    self.mapper.kind,
                    attribute,
                    "not part of the mapper",
                ))
            })
    }

    /// Typed value of `attribute`.
    pub fn get<T: FromValue>(&self, attribute: &str) -> Result<T> {
        let index = self.index(attribute)?;
        self.row.get_as(index).map_err(|err| {
            Error::Mapping(MappingError::attribute(
                self.mapper.kind,
                attribute,
                err.to_string(),
            ))
        })
    }

    /// Decode a single-character catalog code into its enum.
    pub fn decode<C: CatalogCode>(&self, attribute: &str) -> Result<C> {
        let raw: Option<String> = self.get(attribute)?;
        let raw = raw.unwrap_or_default();
        C::from_code(&raw).ok_or_else(|| {
            Error::Mapping(MappingError::attribute(
                self.mapper.kind,
                attribute,
                format!("unknown {} code '{}'", C::NAME, raw),
            ))
        })
    }
}

/// An enum stored in the catalog as a one-letter code.
pub trait CatalogCode: Sized + Copy {
    /// Name used in error messages.
    const NAME: &'static str;

    fn from_code(code: &str) -> Option<Self>;

    fn code(self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgmob_core::Value;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Flavor {
        Sweet,
        Sour,
    }

    impl CatalogCode for Flavor {
        const NAME: &'static str = "flavor";

        fn from_code(code: &str) -> Option<Self> {
            match code {
                "w" => Some(Flavor::Sweet),
                "r" => Some(Flavor::Sour),
                _ => None,
            }
        }

        fn code(self) -> &'static str {
            match self {
                Flavor::Sweet => "w",
                Flavor::Sour => "r",
            }
        }
    }

    const MAPPER: RowMapper = RowMapper::new(ObjectKind::Schema, &["name", "flavor", "oid"]);

    #[test]
    fn test_maps_by_position() {
        let row = Row::new(
            vec!["nspname".into(), "x".into(), "y".into()],
            vec![Value::from("app"), Value::from("r"), Value::BigInt(2200)],
        );
        let mapped = MAPPER.map(&row).unwrap();
        assert_eq!(mapped.get::<String>("name").unwrap(), "app");
        assert_eq!(mapped.get::<u32>("oid").unwrap(), 2200);
        assert_eq!(mapped.decode::<Flavor>("flavor").unwrap(), Flavor::Sour);
        assert_eq!(Flavor::Sweet.code(), "w");
    }

    #[test]
    fn test_arity_mismatch() {
        let row = Row::positional(vec![Value::from("app")]);
        let err = MAPPER.map(&row).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
        assert_eq!(err.to_string(), "Mapping error: SCHEMA: expected 3 fields, row has 1");
    }

    #[test]
    fn test_bad_value_and_code() {
        let row = Row::positional(vec![Value::Int(1), Value::from("z"), Value::Null]);
        let mapped = MAPPER.map(&row).unwrap();
        let err = mapped.get::<String>("name").unwrap_err();
        match err {
            Error::Mapping(e) => assert_eq!(e.attribute.as_deref(), Some("name")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(mapped.decode::<Flavor>("flavor").is_err());
        assert!(mapped.get::<u32>("oid").is_err());
        assert!(mapped.get::<String>("missing").is_err());
    }
}
