use super::validate::{not_blank, valid_percent, Result};
use super::{identity_ordering, DbObject, Entity, EntityKind, PgObjectType, RawRow};
use std::fmt;

/// A sequence that is close to running out of values.
#[derive(Debug, Clone)]
pub struct SequenceState {
    sequence_name: String,
    data_type: String,
    remaining_percentage: f64,
}

impl SequenceState {
    pub fn new(
        sequence_name: impl Into<String>,
        data_type: impl Into<String>,
        remaining_percentage: f64,
    ) -> Result<Self> {
        Ok(Self {
            sequence_name: not_blank(sequence_name, "sequenceName")?,
            data_type: not_blank(data_type, "dataType")?,
            remaining_percentage: valid_percent(remaining_percentage, "remainingPercentage")?,
        })
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn remaining_percentage(&self) -> f64 {
        self.remaining_percentage
    }
}

impl DbObject for SequenceState {
    fn name(&self) -> String {
        self.sequence_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Sequence
    }
}

impl Entity for SequenceState {
    const KIND: EntityKind = EntityKind::SequenceState;
    type Key = String;

    fn identity(&self) -> String {
        self.sequence_name.clone()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("sequence_name")?,
            row.get_str("data_type")?,
            row.get_f64("remaining_percentage")?,
        )
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {:.2}% remaining)",
            self.sequence_name, self.data_type, self.remaining_percentage
        )
    }
}

identity_ordering!(SequenceState);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_state_display() {
        let state = SequenceState::new("seq_1", "smallint", 8.08).unwrap();
        assert_eq!(state.to_string(), "seq_1 (smallint, 8.08% remaining)");
    }

    #[test]
    fn remaining_percentage_is_validated() {
        assert!(SequenceState::new("s", "bigint", -1.0).is_err());
        assert!(SequenceState::new("s", " ", 1.0).is_err());
    }
}
