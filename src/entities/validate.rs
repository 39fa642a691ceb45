use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ModelError {
    #[snafu(display("{} cannot be blank", field))]
    BlankValue { field: &'static str },

    #[snafu(display("{} cannot be less than zero, got {}", field, value))]
    NegativeValue { field: &'static str, value: i64 },

    #[snafu(display(
        "{} should be in the range from 0 to 100 inclusive, got {}",
        field,
        value
    ))]
    InvalidPercent { field: &'static str, value: f64 },

    #[snafu(display("{} should contain at least two items", field))]
    TooFewItems { field: &'static str },

    #[snafu(display("{} cannot be empty", field))]
    EmptyList { field: &'static str },

    #[snafu(display("Table name is not the same within given rows"))]
    MixedTables,

    #[snafu(display("Column '{}' is missing from the row", column))]
    MissingColumn { column: String },

    #[snafu(display("Column '{}' is null", column))]
    NullColumn { column: String },

    #[snafu(display("Column '{}' has unexpected type, expected {}", column, expected))]
    UnexpectedType {
        column: String,
        expected: &'static str,
    },

    #[snafu(display("Cannot parse '{}' as {}", value, what))]
    Unparseable { what: &'static str, value: String },
}

pub(crate) type Result<T, E = ModelError> = std::result::Result<T, E>;

pub(crate) fn not_blank(value: impl Into<String>, field: &'static str) -> Result<String> {
    let value = value.into();
    if value.trim().is_empty() {
        return BlankValueSnafu { field }.fail();
    }
    Ok(value)
}

pub(crate) fn not_negative(value: i64, field: &'static str) -> Result<i64> {
    if value < 0 {
        return NegativeValueSnafu { field, value }.fail();
    }
    Ok(value)
}

pub(crate) fn valid_percent(value: f64, field: &'static str) -> Result<f64> {
    // NaN fails both comparisons, so it is rejected here too
    if !(0.0..=100.0).contains(&value) {
        return InvalidPercentSnafu { field, value }.fail();
    }
    Ok(value)
}

pub(crate) fn same_table<'a>(
    table_names: impl IntoIterator<Item = &'a str>,
    field: &'static str,
) -> Result<String> {
    let names: Vec<&str> = table_names.into_iter().collect();
    match names.len() {
        0 => EmptyListSnafu { field }.fail(),
        1 => TooFewItemsSnafu { field }.fail(),
        _ => {
            let first = names[0];
            if names.iter().any(|name| *name != first) {
                return MixedTablesSnafu.fail();
            }
            Ok(first.to_string())
        }
    }
}
