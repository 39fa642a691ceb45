use super::validate::{not_blank, Result};
use super::{identity_ordering, DbObject, Entity, EntityKind, PgObjectType, RawRow};
use std::fmt;

/// A stored function or procedure. The signature may be empty for no-arg functions.
#[derive(Debug, Clone)]
pub struct StoredFunction {
    function_name: String,
    function_signature: String,
}

impl StoredFunction {
    pub fn new(
        function_name: impl Into<String>,
        function_signature: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            function_name: not_blank(function_name, "functionName")?,
            function_signature: function_signature.into().trim().to_string(),
        })
    }

    pub fn no_args(function_name: impl Into<String>) -> Result<Self> {
        Self::new(function_name, "")
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn function_signature(&self) -> &str {
        &self.function_signature
    }
}

impl DbObject for StoredFunction {
    fn name(&self) -> String {
        self.function_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Function
    }
}

impl Entity for StoredFunction {
    const KIND: EntityKind = EntityKind::StoredFunction;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        (self.function_name.clone(), self.function_signature.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("function_name")?,
            row.get_opt_str("function_signature")?.unwrap_or_default(),
        )
    }
}

impl fmt::Display for StoredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function_name, self.function_signature)
    }
}

identity_ordering!(StoredFunction);
