use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    MissingEquals(String),

    #[error("Component '{component}' cannot be empty in '{input}'.")]
    EmptyComponent {
        component: &'static str,
        input: String,
    },

    #[error("Invalid {expected} value for {key}: '{value}'")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid atom pair '{0}'. Expected 'I-J:WEIGHT' (e.g., '12-45:0.7').")]
    InvalidPair(String),
}

/// Splits `KEY=VALUE` at the first `=`.
pub fn parse_key_value(input: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| ParseError::MissingEquals(input.to_string()))?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "KEY",
            input: input.to_string(),
        });
    }
    if value.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "VALUE",
            input: input.to_string(),
        });
    }
    Ok((key, value))
}

/// Parses the value half of a `--set` pair, naming the key on failure.
pub fn parse_value<T: FromStr>(key: &str, value: &str, expected: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    })
}

/// Parses a restraint pair written as `I-J:WEIGHT`, e.g. `12-45:0.7`.
pub fn parse_weighted_pair(input: &str) -> Result<([usize; 2], f64), ParseError> {
    let invalid = || ParseError::InvalidPair(input.to_string());
    let (atoms, weight) = input.trim().split_once(':').ok_or_else(invalid)?;
    let (i, j) = atoms.split_once('-').ok_or_else(invalid)?;
    let i = i.trim().parse().map_err(|_| invalid())?;
    let j = j.trim().parse().map_err(|_| invalid())?;
    let weight = weight.trim().parse().map_err(|_| invalid())?;
    Ok(([i, j], weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_splits_at_first_equals() {
        assert_eq!(
            parse_key_value("embedding.region= 0-5,9 ").unwrap(),
            ("embedding.region", "0-5,9")
        );
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a", "b=c"));
    }

    #[test]
    fn key_value_rejects_missing_parts() {
        assert_eq!(
            parse_key_value("dynamics.seed"),
            Err(ParseError::MissingEquals("dynamics.seed".to_string()))
        );
        assert!(matches!(
            parse_key_value("=5"),
            Err(ParseError::EmptyComponent { component: "KEY", .. })
        ));
        assert!(matches!(
            parse_key_value("dynamics.seed="),
            Err(ParseError::EmptyComponent { component: "VALUE", .. })
        ));
    }

    #[test]
    fn typed_values_report_the_key() {
        assert_eq!(parse_value::<f64>("k", "125.0", "float").unwrap(), 125.0);
        assert_eq!(
            parse_value::<u64>("sampling.frames", "many", "integer"),
            Err(ParseError::InvalidValue {
                key: "sampling.frames".to_string(),
                value: "many".to_string(),
                expected: "integer",
            })
        );
    }

    #[test]
    fn weighted_pairs_parse() {
        assert_eq!(parse_weighted_pair("12-45:0.7").unwrap(), ([12, 45], 0.7));
        assert_eq!(parse_weighted_pair(" 3 - 4 : -0.3 ").unwrap(), ([3, 4], -0.3));
        assert!(parse_weighted_pair("12-45").is_err());
        assert!(parse_weighted_pair("12:0.7").is_err());
        assert!(parse_weighted_pair("a-b:c").is_err());
    }
}
