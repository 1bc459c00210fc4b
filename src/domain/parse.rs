use crate::domain::transaction::Transaction;
use crate::error::ValidationError;
use serde_json::{Map, Value};

const FEATURE_PREFIX: &str = "feature_";
/// Width of the `transaction_id` and `customer_id` columns.
pub const MAX_ID_LEN: usize = 100;

/// Turns raw stream payloads into [`Transaction`]s for a model with a fixed
/// input dimensionality.
#[derive(Debug, Clone, Copy)]
pub struct TransactionParser {
    expected_features: usize,
}

impl TransactionParser {
    pub fn new(expected_features: usize) -> Self {
        Self { expected_features }
    }

    pub fn parse(&self, raw: &str) -> Result<Transaction, ValidationError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        self.parse_value(&value)
    }

    pub fn parse_value(&self, value: &Value) -> Result<Transaction, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let transaction_id = required_str(obj, "transaction_id")?;
        let customer_id = required_str(obj, "customer_id")?;
        let amount = required_f64(obj, "amount")?;
        if amount < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "amount".to_string(),
                detail: format!("{} is negative", amount),
            });
        }

        let mut features = Vec::with_capacity(self.expected_features);
        for i in 1..=self.expected_features {
            features.push(required_f64(obj, &format!("{}{}", FEATURE_PREFIX, i))?);
        }

        let found = obj.keys().filter(|k| is_feature_key(k)).count();
        if found != self.expected_features {
            return Err(ValidationError::FeatureCount {
                expected: self.expected_features,
                found,
            });
        }

        Ok(Transaction {
            transaction_id,
            customer_id,
            amount,
            features,
        })
    }
}

fn is_feature_key(key: &str) -> bool {
    key.strip_prefix(FEATURE_PREFIX)
        .is_some_and(|idx| !idx.is_empty() && idx.chars().all(|c| c.is_ascii_digit()))
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field.to_string())),
        Some(v) => Ok(v),
    }
}

fn required_str(obj: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    let s = required(obj, field)?.as_str().ok_or_else(|| ValidationError::WrongType {
        field: field.to_string(),
        expected: "a string",
    })?;
    if s.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    let len = s.chars().count();
    if len > MAX_ID_LEN {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            detail: format!("{} characters, at most {} allowed", len, MAX_ID_LEN),
        });
    }
    Ok(s.to_string())
}

fn required_f64(obj: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    required(obj, field)?.as_f64().ok_or_else(|| ValidationError::WrongType {
        field: field.to_string(),
        expected: "a number",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> TransactionParser {
        TransactionParser::new(3)
    }

    #[test]
    fn parses_valid_message() {
        let raw = r#"{"transaction_id":"t1","customer_id":"CUST_1","amount":120.5,
            "feature_1":0.1,"feature_2":0.2,"feature_3":0.3}"#;
        let tx = parser().parse(raw).unwrap();
        assert_eq!(tx.transaction_id, "t1");
        assert_eq!(tx.customer_id, "CUST_1");
        assert_eq!(tx.features, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn integer_values_are_numbers() {
        let value = json!({
            "transaction_id": "t1", "customer_id": "c", "amount": 10,
            "feature_1": 1, "feature_2": 0, "feature_3": 0
        });
        let tx = parser().parse_value(&value).unwrap();
        assert_eq!(tx.amount, 10.0);
        assert_eq!(tx.features, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_customer_is_rejected() {
        let value = json!({"transaction_id": "t1", "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3});
        assert_eq!(
            parser().parse_value(&value),
            Err(ValidationError::MissingField("customer_id".to_string()))
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let value = json!({"transaction_id": "t1", "customer_id": null, "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3});
        assert!(matches!(
            parser().parse_value(&value),
            Err(ValidationError::MissingField(f)) if f == "customer_id"
        ));
    }

    #[test]
    fn non_numeric_feature_is_rejected() {
        let value = json!({"transaction_id": "t1", "customer_id": "c", "amount": 1.0,
            "feature_1": "high", "feature_2": 0.2, "feature_3": 0.3});
        assert!(matches!(
            parser().parse_value(&value),
            Err(ValidationError::WrongType { field, .. }) if field == "feature_1"
        ));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let value = json!({"transaction_id": "t1", "customer_id": "c", "amount": -5,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3});
        assert!(matches!(parser().parse_value(&value), Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn extra_feature_is_a_count_mismatch() {
        let value = json!({"transaction_id": "t1", "customer_id": "c", "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3, "feature_4": 0.4});
        assert_eq!(
            parser().parse_value(&value),
            Err(ValidationError::FeatureCount { expected: 3, found: 4 })
        );
    }

    #[test]
    fn non_object_and_garbage_are_rejected() {
        assert_eq!(parser().parse("[1,2,3]"), Err(ValidationError::NotAnObject));
        assert!(matches!(parser().parse("not json"), Err(ValidationError::MalformedJson(_))));
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let value = json!({"transaction_id": "t1", "customer_id": "c", "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3, "feature_notes": "x"});
        assert!(parser().parse_value(&value).is_ok());
    }

    #[test]
    fn ids_wider_than_the_column_are_rejected() {
        let at_limit = "x".repeat(MAX_ID_LEN);
        let value = json!({"transaction_id": at_limit, "customer_id": "c", "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3});
        assert!(parser().parse_value(&value).is_ok());

        let too_long = "x".repeat(MAX_ID_LEN + 1);
        let value = json!({"transaction_id": "t1", "customer_id": too_long, "amount": 1.0,
            "feature_1": 0.1, "feature_2": 0.2, "feature_3": 0.3});
        assert!(matches!(
            parser().parse_value(&value),
            Err(ValidationError::OutOfRange { field, .. }) if field == "customer_id"
        ));
    }
}
