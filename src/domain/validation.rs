use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Empty {
        field: &'static str,
    },
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        actual: u64,
    },
    InvalidUrl {
        field: &'static str,
        input: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{field} must not be empty"),
            Self::OutOfRange {
                field,
                min,
                max,
                actual,
            } => {
                write!(
                    f,
                    "{field} out of range: {actual} (expected {min}..={max})"
                )
            }
            Self::InvalidUrl { field, input } => write!(f, "invalid {field} URL: {input}"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::ValidationError;

    #[test]
    fn display_messages_are_human_readable() {
        let err = ValidationError::Empty { field: "token" };
        assert_eq!(err.to_string(), "token must not be empty");

        let err = ValidationError::OutOfRange {
            field: "limit",
            min: 1,
            max: 100,
            actual: 101,
        };
        assert_eq!(err.to_string(), "limit out of range: 101 (expected 1..=100)");

        let err = ValidationError::InvalidUrl {
            field: "api",
            input: "nope".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid api URL: nope");
    }
}
