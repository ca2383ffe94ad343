//! Schema-on-write validation of candidate JSON payloads.
//!
//! The engine interprets a schema's field definitions against a candidate
//! payload and accumulates every field-level violation before returning, so a
//! caller can fix the whole payload in one round trip. Type rules dispatch
//! through a `DataType` → validator table rather than nested conditionals.

use chrono::{DateTime, NaiveDate};
use regex_lite::Regex;
use serde_json::{Map, Value as JsonValue};

use dynerp_core::{FieldViolation, MessageCatalog, ViolationCode};

use crate::field::{DataType, FieldDefinition};
use crate::schema::EntitySchema;

type JsonMap = Map<String, JsonValue>;

/// Per-`DataType` value check. Returns at most one violation; constraint
/// checks (options, pattern) run separately.
type TypeValidator = fn(&FieldDefinition, &JsonValue, &MessageCatalog) -> Option<FieldViolation>;

/// Validates candidate payloads against a schema's field catalog.
#[derive(Debug, Clone, Copy)]
pub struct ValidationEngine {
    catalog: &'static MessageCatalog,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(MessageCatalog::global())
    }
}

impl ValidationEngine {
    pub fn new(catalog: &'static MessageCatalog) -> Self {
        Self { catalog }
    }

    /// Validate `payload` against the schema's non-deleted field set.
    ///
    /// Violations come back in field `order_index` order (display-name
    /// tie-break), with undeclared-key violations appended last in
    /// lexicographic key order. Empty result means the payload is valid.
    pub fn validate(&self, schema: &EntitySchema, payload: &JsonMap) -> Vec<FieldViolation> {
        let fields = schema.active_fields();
        self.validate_fields(&fields, payload)
    }

    /// Validate against an explicit field list (already ordered).
    pub fn validate_fields(
        &self,
        fields: &[&FieldDefinition],
        payload: &JsonMap,
    ) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        for field in fields {
            self.validate_field(field, payload.get(&field.field_name), &mut violations);
        }

        // Strict schema conformance: every persisted key must be declared.
        let mut unknown: Vec<&String> = payload
            .keys()
            .filter(|key| !fields.iter().any(|f| &f.field_name == *key))
            .collect();
        unknown.sort();
        for key in unknown {
            violations.push(FieldViolation::new(
                key.clone(),
                ViolationCode::UnknownField,
                self.catalog.render(ViolationCode::UnknownField, key, ""),
            ));
        }

        violations
    }

    /// Fill missing keys with each field's declared default, coerced to the
    /// field's data type. Keys already present (even null) are left alone.
    pub fn apply_defaults(&self, schema: &EntitySchema, payload: &mut JsonMap) {
        for field in schema.active_fields() {
            if payload.contains_key(&field.field_name) {
                continue;
            }
            if let Some(default) = &field.default_value {
                payload.insert(
                    field.field_name.clone(),
                    coerce_default(field.data_type, default),
                );
            }
        }
    }

    fn validate_field(
        &self,
        field: &FieldDefinition,
        value: Option<&JsonValue>,
        out: &mut Vec<FieldViolation>,
    ) {
        let Some(value) = value.filter(|v| !is_empty(v)) else {
            if field.is_required {
                out.push(FieldViolation::new(
                    field.field_name.clone(),
                    ViolationCode::Required,
                    self.catalog
                        .render(ViolationCode::Required, &field.display_name, ""),
                ));
            }
            // Absent or empty optional value: nothing further to check.
            return;
        };

        // Type check first; range/length/options are meaningless on a value
        // of the wrong shape.
        if let Some(violation) = type_validator(field.data_type)(field, value, self.catalog) {
            out.push(violation);
            return;
        }

        if field.field_type.is_choice() {
            if let Some(violation) = self.check_options(field, value) {
                out.push(violation);
            }
        }

        if let Some(violation) = self.check_pattern_rule(field, value) {
            out.push(violation);
        }
    }

    fn check_options(&self, field: &FieldDefinition, value: &JsonValue) -> Option<FieldViolation> {
        let options = field.options.as_ref()?;
        let matches = options
            .iter()
            .any(|opt| opt == value || render_scalar(opt) == render_scalar(value));
        if matches {
            return None;
        }
        Some(FieldViolation::new(
            field.field_name.clone(),
            ViolationCode::NotAnOption,
            self.catalog
                .render(ViolationCode::NotAnOption, &field.display_name, ""),
        ))
    }

    /// Apply the opaque `validation_rules` payload. Only the `pattern` key is
    /// recognized (with `message` as its optional custom error); unknown keys
    /// are ignored so future rule kinds never break existing schemas.
    fn check_pattern_rule(
        &self,
        field: &FieldDefinition,
        value: &JsonValue,
    ) -> Option<FieldViolation> {
        let rules = field.validation_rules.as_ref()?.as_object()?;
        let pattern = rules.get("pattern")?.as_str()?;
        // An uncompilable pattern is treated like an unrecognized rule.
        let regex = Regex::new(pattern).ok()?;

        if regex.is_match(&render_scalar(value)) {
            return None;
        }

        let message = rules
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.catalog
                    .render(ViolationCode::Pattern, &field.display_name, "")
            });
        Some(FieldViolation::new(
            field.field_name.clone(),
            ViolationCode::Pattern,
            message,
        ))
    }
}

/// Emptiness per data shape: null, empty string, empty array/object.
fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        JsonValue::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Render a scalar the way the storage layer's path extraction would (bare
/// string content, no JSON quoting).
fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A numeric field accepts a JSON number or a numeric string.
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_validator(data_type: DataType) -> TypeValidator {
    match data_type {
        DataType::String => validate_string,
        DataType::Int | DataType::Decimal => validate_numeric,
        DataType::Bool => validate_bool,
        DataType::DateTime => validate_datetime,
    }
}

fn validate_string(
    field: &FieldDefinition,
    value: &JsonValue,
    catalog: &MessageCatalog,
) -> Option<FieldViolation> {
    // String-like fields accept any scalar; containers are a shape error.
    if value.is_array() || value.is_object() {
        return Some(type_mismatch(field, value, catalog));
    }
    let text = render_scalar(value);
    let len = text.chars().count() as u32;

    if let Some(min) = field.min_length {
        if len < min {
            return Some(FieldViolation::new(
                field.field_name.clone(),
                ViolationCode::MinLength,
                catalog.render(ViolationCode::MinLength, &field.display_name, &min.to_string()),
            ));
        }
    }
    if let Some(max) = field.max_length {
        if len > max {
            return Some(FieldViolation::new(
                field.field_name.clone(),
                ViolationCode::MaxLength,
                catalog.render(ViolationCode::MaxLength, &field.display_name, &max.to_string()),
            ));
        }
    }
    None
}

fn validate_numeric(
    field: &FieldDefinition,
    value: &JsonValue,
    catalog: &MessageCatalog,
) -> Option<FieldViolation> {
    let Some(number) = as_number(value) else {
        return Some(type_mismatch(field, value, catalog));
    };
    if field.data_type == DataType::Int && number.fract() != 0.0 {
        return Some(type_mismatch(field, value, catalog));
    }

    if let Some(min) = field.min_value {
        if number < min {
            return Some(out_of_range(field, &format!("{number} < {min}"), catalog));
        }
    }
    if let Some(max) = field.max_value {
        if number > max {
            return Some(out_of_range(field, &format!("{number} > {max}"), catalog));
        }
    }
    None
}

fn validate_bool(
    field: &FieldDefinition,
    value: &JsonValue,
    catalog: &MessageCatalog,
) -> Option<FieldViolation> {
    let ok = match value {
        JsonValue::Bool(_) => true,
        JsonValue::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "false"),
        _ => false,
    };
    if ok { None } else { Some(type_mismatch(field, value, catalog)) }
}

fn validate_datetime(
    field: &FieldDefinition,
    value: &JsonValue,
    catalog: &MessageCatalog,
) -> Option<FieldViolation> {
    let ok = value.as_str().is_some_and(|s| {
        DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
    });
    if ok { None } else { Some(type_mismatch(field, value, catalog)) }
}

fn type_mismatch(
    field: &FieldDefinition,
    value: &JsonValue,
    catalog: &MessageCatalog,
) -> FieldViolation {
    FieldViolation::new(
        field.field_name.clone(),
        ViolationCode::TypeMismatch,
        catalog.render(
            ViolationCode::TypeMismatch,
            &field.display_name,
            &render_scalar(value),
        ),
    )
}

fn out_of_range(field: &FieldDefinition, detail: &str, catalog: &MessageCatalog) -> FieldViolation {
    FieldViolation::new(
        field.field_name.clone(),
        ViolationCode::OutOfRange,
        catalog.render(ViolationCode::OutOfRange, &field.display_name, detail),
    )
}

/// Coerce a declared default (stored as text) to its field's data type.
fn coerce_default(data_type: DataType, raw: &str) -> JsonValue {
    match data_type {
        DataType::Int => raw
            .parse::<i64>()
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(raw.to_string())),
        DataType::Decimal => raw
            .parse::<f64>()
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(raw.to_string())),
        DataType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => JsonValue::String(raw.to_string()),
        },
        DataType::String | DataType::DateTime => JsonValue::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldSpec, FieldType};
    use dynerp_core::TenantId;
    use proptest::prelude::*;
    use serde_json::json;

    fn engine() -> ValidationEngine {
        ValidationEngine::default()
    }

    fn customer_schema() -> EntitySchema {
        EntitySchema::new(
            TenantId::new(),
            "Customer",
            "Customer",
            None,
            vec![
                FieldSpec {
                    is_required: true,
                    max_length: Some(100),
                    min_length: Some(2),
                    order_index: 0,
                    ..FieldSpec::new("Name", "Name", FieldType::Text, DataType::String)
                },
                FieldSpec {
                    min_value: Some(0.0),
                    max_value: Some(150.0),
                    order_index: 1,
                    ..FieldSpec::new("Age", "Age", FieldType::Number, DataType::Int)
                },
                FieldSpec {
                    options: Some(vec![json!("VIP"), json!("Regular"), json!("Premium")]),
                    order_index: 2,
                    ..FieldSpec::new("Segment", "Segment", FieldType::Dropdown, DataType::String)
                },
                FieldSpec {
                    validation_rules: Some(json!({
                        "pattern": "^[^@]+@[^@]+\\.[^@]+$",
                        "message": "Please enter a valid email address.",
                        "future_rule": {"ignored": true},
                    })),
                    order_index: 3,
                    ..FieldSpec::new("Email", "Email", FieldType::Text, DataType::String)
                },
            ],
            chrono::Utc::now(),
            None,
        )
        .unwrap()
    }

    fn payload(value: serde_json::Value) -> Map<String, JsonValue> {
        value.as_object().cloned().expect("test payload must be an object")
    }

    #[test]
    fn valid_payload_yields_no_violations() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({
                "Name": "Ada Lovelace",
                "Age": 36,
                "Segment": "VIP",
                "Email": "ada@example.com",
            })),
        );
        assert!(report.is_empty(), "unexpected violations: {report:?}");
    }

    #[test]
    fn optional_fields_may_be_omitted() {
        let report = engine().validate(&customer_schema(), &payload(json!({"Name": "Ada"})));
        assert!(report.is_empty(), "unexpected violations: {report:?}");
    }

    #[test]
    fn missing_required_field_is_reported() {
        let report = engine().validate(&customer_schema(), &payload(json!({"Age": 30})));
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].field, "Name");
        assert_eq!(report[0].code, ViolationCode::Required);
    }

    #[test]
    fn empty_values_count_as_missing_for_required() {
        let schema = customer_schema();
        for empty in [json!(null), json!(""), json!([]), json!({})] {
            let report = engine().validate(&schema, &payload(json!({"Name": empty})));
            assert_eq!(report.len(), 1, "value {empty} should be empty");
            assert_eq!(report[0].code, ViolationCode::Required);
        }
    }

    #[test]
    fn out_of_range_age_is_reported() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Age": 200})),
        );
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].field, "Age");
        assert_eq!(report[0].code, ViolationCode::OutOfRange);
        assert!(report[0].message.contains("Age"));
    }

    #[test]
    fn numeric_string_is_accepted_and_bounds_checked() {
        let schema = customer_schema();
        let ok = engine().validate(&schema, &payload(json!({"Name": "Ada", "Age": "42"})));
        assert!(ok.is_empty());

        let bad = engine().validate(&schema, &payload(json!({"Name": "Ada", "Age": "200"})));
        assert_eq!(bad[0].code, ViolationCode::OutOfRange);

        let not_a_number =
            engine().validate(&schema, &payload(json!({"Name": "Ada", "Age": "forty"})));
        assert_eq!(not_a_number[0].code, ViolationCode::TypeMismatch);
    }

    #[test]
    fn int_field_rejects_fractional_value() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Age": 36.5})),
        );
        assert_eq!(report[0].code, ViolationCode::TypeMismatch);
    }

    #[test]
    fn length_bounds_are_inclusive() {
        let schema = customer_schema();
        assert!(engine()
            .validate(&schema, &payload(json!({"Name": "Ab"})))
            .is_empty());

        let too_short = engine().validate(&schema, &payload(json!({"Name": "A"})));
        assert_eq!(too_short[0].code, ViolationCode::MinLength);

        let too_long =
            engine().validate(&schema, &payload(json!({"Name": "x".repeat(101)})));
        assert_eq!(too_long[0].code, ViolationCode::MaxLength);

        assert!(engine()
            .validate(&schema, &payload(json!({"Name": "x".repeat(100)})))
            .is_empty());
    }

    #[test]
    fn dropdown_value_must_be_a_declared_option() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Segment": "Gold"})),
        );
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].field, "Segment");
        assert_eq!(report[0].code, ViolationCode::NotAnOption);
    }

    #[test]
    fn option_matching_falls_back_to_string_rendering() {
        let schema = EntitySchema::new(
            TenantId::new(),
            "Thing",
            "Thing",
            None,
            vec![FieldSpec {
                options: Some(vec![json!(1), json!(2)]),
                ..FieldSpec::new("Tier", "Tier", FieldType::Dropdown, DataType::Int)
            }],
            chrono::Utc::now(),
            None,
        )
        .unwrap();
        assert!(engine()
            .validate(&schema, &payload(json!({"Tier": "2"})))
            .is_empty());
    }

    #[test]
    fn pattern_rule_uses_custom_message() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Email": "not-an-email"})),
        );
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].code, ViolationCode::Pattern);
        assert_eq!(report[0].message, "Please enter a valid email address.");
    }

    #[test]
    fn unknown_rule_keys_are_ignored() {
        // `future_rule` in the customer schema's Email rules must never fail
        // a payload on its own.
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Email": "ada@example.com"})),
        );
        assert!(report.is_empty());
    }

    #[test]
    fn undeclared_payload_key_is_rejected() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({"Name": "Ada", "Age": 30, "Nickname": "Pepper"})),
        );
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].field, "Nickname");
        assert_eq!(report[0].code, ViolationCode::UnknownField);
    }

    #[test]
    fn all_violations_accumulate_in_field_order() {
        let report = engine().validate(
            &customer_schema(),
            &payload(json!({
                "Age": -1,
                "Segment": "Gold",
                "Email": "nope",
                "Zz_extra": 1,
                "Aa_extra": 2,
            })),
        );
        let fields: Vec<&str> = report.iter().map(|v| v.field.as_str()).collect();
        // Declared fields in order_index order, then unknown keys sorted.
        assert_eq!(fields, vec!["Name", "Age", "Segment", "Email", "Aa_extra", "Zz_extra"]);
    }

    #[test]
    fn removed_field_key_becomes_unknown() {
        let mut schema = customer_schema();
        schema.remove_field("Age", chrono::Utc::now(), None).unwrap();
        let report = engine().validate(&schema, &payload(json!({"Name": "Ada", "Age": 30})));
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].field, "Age");
        assert_eq!(report[0].code, ViolationCode::UnknownField);
    }

    #[test]
    fn datetime_accepts_rfc3339_and_plain_dates() {
        let schema = EntitySchema::new(
            TenantId::new(),
            "Event",
            "Event",
            None,
            vec![FieldSpec::new("When", "When", FieldType::Date, DataType::DateTime)],
            chrono::Utc::now(),
            None,
        )
        .unwrap();

        assert!(engine()
            .validate(&schema, &payload(json!({"When": "2026-08-26T10:00:00Z"})))
            .is_empty());
        assert!(engine()
            .validate(&schema, &payload(json!({"When": "2026-08-26"})))
            .is_empty());

        let bad = engine().validate(&schema, &payload(json!({"When": "yesterday"})));
        assert_eq!(bad[0].code, ViolationCode::TypeMismatch);
    }

    #[test]
    fn apply_defaults_fills_only_missing_keys() {
        let schema = EntitySchema::new(
            TenantId::new(),
            "Thing",
            "Thing",
            None,
            vec![
                FieldSpec {
                    default_value: Some("Active".to_string()),
                    ..FieldSpec::new("State", "State", FieldType::Text, DataType::String)
                },
                FieldSpec {
                    default_value: Some("10".to_string()),
                    ..FieldSpec::new("Count", "Count", FieldType::Number, DataType::Int)
                },
                FieldSpec {
                    default_value: Some("true".to_string()),
                    ..FieldSpec::new("Enabled", "Enabled", FieldType::Boolean, DataType::Bool)
                },
            ],
            chrono::Utc::now(),
            None,
        )
        .unwrap();

        let mut data = payload(json!({"State": "Archived"}));
        engine().apply_defaults(&schema, &mut data);
        assert_eq!(data.get("State"), Some(&json!("Archived")));
        assert_eq!(data.get("Count"), Some(&json!(10)));
        assert_eq!(data.get("Enabled"), Some(&json!(true)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any payload built within the declared constraints
        /// validates cleanly.
        #[test]
        fn conforming_payloads_always_validate(
            name in "[a-zA-Z]{2,100}",
            age in 0i64..=150,
            segment_idx in 0usize..3,
        ) {
            let segments = ["VIP", "Regular", "Premium"];
            let report = engine().validate(
                &customer_schema(),
                &payload(json!({
                    "Name": name,
                    "Age": age,
                    "Segment": segments[segment_idx],
                })),
            );
            prop_assert!(report.is_empty(), "violations: {report:?}");
        }

        /// Property: an out-of-bounds age is always reported, and only for Age.
        #[test]
        fn out_of_bounds_age_always_reported(age in 151i64..100_000) {
            let report = engine().validate(
                &customer_schema(),
                &payload(json!({"Name": "Ada", "Age": age})),
            );
            prop_assert_eq!(report.len(), 1);
            prop_assert_eq!(report[0].field.as_str(), "Age");
        }
    }
}
