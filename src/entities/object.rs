use super::validate::{not_blank, Result};
use super::{identity_ordering, DbObject, Entity, EntityKind, PgObjectType, RawRow};
use std::fmt;

/// Any named database object, for diagnostics that span object kinds.
#[derive(Debug, Clone)]
pub struct AnyObject {
    object_name: String,
    object_type: PgObjectType,
}

impl AnyObject {
    pub fn new(object_name: impl Into<String>, object_type: PgObjectType) -> Result<Self> {
        Ok(Self {
            object_name: not_blank(object_name, "objectName")?,
            object_type,
        })
    }
}

impl DbObject for AnyObject {
    fn name(&self) -> String {
        self.object_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        self.object_type
    }
}

impl Entity for AnyObject {
    const KIND: EntityKind = EntityKind::AnyObject;
    type Key = (String, PgObjectType);

    fn identity(&self) -> (String, PgObjectType) {
        (self.object_name.clone(), self.object_type)
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("object_name")?,
            PgObjectType::parse(row.get_str("object_type")?)?,
        )
    }
}

impl fmt::Display for AnyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type.as_str(), self.object_name)
    }
}

identity_ordering!(AnyObject);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_different_types_are_distinct() {
        let table = AnyObject::new("t", PgObjectType::Table).unwrap();
        let index = AnyObject::new("t", PgObjectType::Index).unwrap();
        assert_ne!(table, index);
        assert_eq!(index.to_string(), "index t");
    }

    #[test]
    fn maps_object_type_from_row() {
        let row = RawRow::new()
            .with("object_name", "idx_long_name")
            .with("object_type", "materialized view");
        let object = AnyObject::from_row(&row).unwrap();
        assert_eq!(object.object_type(), PgObjectType::MaterializedView);
    }
}
