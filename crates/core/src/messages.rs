//! Violation message catalog.
//!
//! An immutable lookup from violation codes to message templates, constructed
//! once at process start and passed by reference everywhere it is needed.
//! Templates use `{field}` and `{detail}` placeholders.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::ViolationCode;

/// Immutable code → template lookup.
#[derive(Debug)]
pub struct MessageCatalog {
    templates: HashMap<ViolationCode, &'static str>,
}

impl MessageCatalog {
    /// The process-wide built-in catalog (English templates).
    pub fn global() -> &'static Self {
        static CATALOG: OnceLock<MessageCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::builtin)
    }

    fn builtin() -> Self {
        let templates = HashMap::from([
            (ViolationCode::Required, "{field} is required."),
            (ViolationCode::TypeMismatch, "{field} has an invalid value: {detail}."),
            (ViolationCode::MinLength, "{field} must be at least {detail} characters."),
            (ViolationCode::MaxLength, "{field} must be at most {detail} characters."),
            (ViolationCode::OutOfRange, "{field} is out of range: {detail}."),
            (ViolationCode::NotAnOption, "{field} must be one of the declared options."),
            (ViolationCode::Pattern, "{field} does not match the required format."),
            (ViolationCode::UnknownField, "{field} is not declared for this entity type."),
        ]);
        Self { templates }
    }

    /// Render the template for `code`, substituting `{field}` and `{detail}`.
    pub fn render(&self, code: ViolationCode, field: &str, detail: &str) -> String {
        let template = self
            .templates
            .get(&code)
            .copied()
            .unwrap_or("{field}: validation failed");
        template.replace("{field}", field).replace("{detail}", detail)
    }
}
