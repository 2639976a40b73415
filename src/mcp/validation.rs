//! Parameter validation.
//!
//! Validation never performs I/O and never fails: it always produces a
//! [`ValidationResult`]. Operations build theirs with [`ParamChecker`].

use serde::Serialize;
use serde_json::{Map, Value};

use super::registry::Operation;

/// A single field-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Parameter name.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// Outcome of validating a parameter object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// `true` when `errors` is empty.
    pub valid: bool,
    /// Field-level problems.
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    /// A passing verdict.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Builds a verdict from collected errors.
    #[must_use]
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Formats every error as `"<field>: <message>"`.
    #[must_use]
    pub fn formatted(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect()
    }
}

/// Validates `parameters` against `operation`'s own validator.
#[must_use]
pub fn validate(operation: &dyn Operation, parameters: &Map<String, Value>) -> ValidationResult {
    operation.validate(parameters)
}

/// Collects field errors for one parameter object.
pub struct ParamChecker<'a> {
    params: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> ParamChecker<'a> {
    /// Starts checking `params`.
    #[must_use]
    pub const fn new(params: &'a Map<String, Value>) -> Self {
        Self {
            params,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.params.get(field).filter(|v| !v.is_null())
    }

    /// Requires a non-empty string.
    #[must_use]
    pub fn required_string(mut self, field: &str) -> Self {
        match self.present(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(Value::String(_)) => self.fail(field, "must not be empty"),
            Some(_) => self.fail(field, "must be a string"),
            None => self.fail(field, "is required"),
        }
        self
    }

    /// Accepts a string or nothing.
    #[must_use]
    pub fn optional_string(mut self, field: &str) -> Self {
        if let Some(v) = self.present(field) {
            if !v.is_string() {
                self.fail(field, "must be a string");
            }
        }
        self
    }

    /// Accepts an integer within `min..=max`, or nothing.
    #[must_use]
    pub fn optional_integer(mut self, field: &str, min: i64, max: i64) -> Self {
        if let Some(v) = self.present(field) {
            match v.as_i64() {
                Some(n) if (min..=max).contains(&n) => {}
                Some(_) => self.fail(field, format!("must be between {min} and {max}")),
                None => self.fail(field, "must be an integer"),
            }
        }
        self
    }

    /// Requires an integer within `min..=max`.
    #[must_use]
    pub fn required_integer(mut self, field: &str, min: i64, max: i64) -> Self {
        if self.present(field).is_some() {
            self.optional_integer(field, min, max)
        } else {
            self.fail(field, "is required");
            self
        }
    }

    /// Accepts a number within `min..=max`, or nothing.
    #[must_use]
    pub fn optional_number(mut self, field: &str, min: f64, max: f64) -> Self {
        if let Some(v) = self.present(field) {
            match v.as_f64() {
                Some(n) if (min..=max).contains(&n) => {}
                Some(_) => self.fail(field, format!("must be between {min} and {max}")),
                None => self.fail(field, "must be a number"),
            }
        }
        self
    }

    /// Requires a number within `min..=max`.
    #[must_use]
    pub fn required_number(mut self, field: &str, min: f64, max: f64) -> Self {
        if self.present(field).is_some() {
            self.optional_number(field, min, max)
        } else {
            self.fail(field, "is required");
            self
        }
    }

    /// Requires an identifier that is safe to splice into a URL path:
    /// ASCII letters, digits, `-` and `_`.
    #[must_use]
    pub fn required_path_id(mut self, field: &str) -> Self {
        let is_safe =
            |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        match self.present(field) {
            Some(Value::Number(n)) if n.is_u64() => {}
            Some(Value::String(s)) if !s.trim().is_empty() && is_safe(s.trim()) => {}
            Some(Value::String(s)) if !s.trim().is_empty() => {
                self.fail(field, "must contain only letters, digits, '-' or '_'");
            }
            Some(_) => self.fail(field, "must be a positive integer or a non-empty string"),
            None => self.fail(field, "is required"),
        }
        self
    }

    /// Requires at least one of `fields` to be present.
    ///
    /// The failure is reported against the first field.
    #[must_use]
    pub fn any_of(mut self, fields: &[&str]) -> Self {
        if !fields.iter().any(|f| self.present(f).is_some()) {
            let first = fields.first().copied().unwrap_or_default();
            self.fail(first, format!("one of {} is required", fields.join(", ")));
        }
        self
    }

    /// Requires an integer or a non-empty string identifier.
    #[must_use]
    pub fn required_id(mut self, field: &str) -> Self {
        match self.present(field) {
            Some(Value::Number(n)) if n.is_u64() => {}
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(_) => self.fail(field, "must be a positive integer or a non-empty string"),
            None => self.fail(field, "is required"),
        }
        self
    }

    /// Accepts an integer or string identifier, or nothing.
    #[must_use]
    pub fn optional_id(self, field: &str) -> Self {
        if self.present(field).is_some() {
            self.required_id(field)
        } else {
            self
        }
    }

    /// Accepts one of `allowed`, or nothing.
    #[must_use]
    pub fn optional_enum(mut self, field: &str, allowed: &[&str]) -> Self {
        if let Some(v) = self.present(field) {
            match v.as_str() {
                Some(s) if allowed.contains(&s) => {}
                _ => self.fail(field, format!("must be one of: {}", allowed.join(", "))),
            }
        }
        self
    }

    /// Finishes and returns the verdict.
    #[must_use]
    pub fn finish(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_checker_passes() {
        let p = params(json!({}));
        let result = ParamChecker::new(&p).finish();
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn required_string_reports_each_failure_mode() {
        let p = params(json!({"a": "", "b": 3}));
        let result = ParamChecker::new(&p)
            .required_string("a")
            .required_string("b")
            .required_string("c")
            .finish();

        assert!(!result.valid);
        assert_eq!(
            result.formatted(),
            vec![
                "a: must not be empty",
                "b: must be a string",
                "c: is required",
            ]
        );
    }

    #[test]
    fn null_counts_as_absent() {
        let p = params(json!({"page": null, "category": null}));
        let result = ParamChecker::new(&p)
            .optional_integer("page", 1, 10)
            .optional_enum("category", &["books"])
            .finish();
        assert!(result.valid);
    }

    #[test]
    fn integer_bounds() {
        let p = params(json!({"low": 0, "ok": 5, "text": "5"}));
        let result = ParamChecker::new(&p)
            .optional_integer("low", 1, 10)
            .optional_integer("ok", 1, 10)
            .optional_integer("text", 1, 10)
            .finish();
        assert_eq!(
            result.formatted(),
            vec!["low: must be between 1 and 10", "text: must be an integer"]
        );
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let p = params(json!({"a": 12, "b": "abc", "c": -1, "d": true}));
        let result = ParamChecker::new(&p)
            .required_id("a")
            .required_id("b")
            .required_id("c")
            .optional_id("d")
            .optional_id("missing")
            .finish();
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].field, "c");
        assert_eq!(result.errors[1].field, "d");
    }

    #[test]
    fn enum_lists_allowed_values() {
        let p = params(json!({"location": "trash"}));
        let result = ParamChecker::new(&p)
            .optional_enum("location", &["new", "later"])
            .finish();
        assert_eq!(result.formatted(), vec!["location: must be one of: new, later"]);
    }

    #[test]
    fn required_numbers_and_integers() {
        let p = params(json!({"pos": 0.25, "far": 1.5, "word": "x", "n": 3}));
        let result = ParamChecker::new(&p)
            .required_number("pos", 0.0, 1.0)
            .required_number("far", 0.0, 1.0)
            .required_number("word", 0.0, 1.0)
            .required_number("gone", 0.0, 1.0)
            .required_integer("n", 1, 5)
            .required_integer("m", 1, 5)
            .finish();
        assert_eq!(
            result.formatted(),
            vec![
                "far: must be between 0 and 1",
                "word: must be a number",
                "gone: is required",
                "m: is required",
            ]
        );
    }

    #[test]
    fn path_ids_reject_separators() {
        let p = params(json!({"ok": "01gx_ab-9", "num": 7, "slash": "../x", "query": "a?b=c"}));
        let result = ParamChecker::new(&p)
            .required_path_id("ok")
            .required_path_id("num")
            .required_path_id("slash")
            .required_path_id("query")
            .finish();
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].field, "slash");
        assert_eq!(result.errors[1].field, "query");
    }

    #[test]
    fn any_of_reports_against_the_first_field() {
        let empty = params(json!({"note": null}));
        let result = ParamChecker::new(&empty).any_of(&["text", "note"]).finish();
        assert_eq!(result.formatted(), vec!["text: one of text, note is required"]);

        let some = params(json!({"note": "n"}));
        assert!(ParamChecker::new(&some).any_of(&["text", "note"]).finish().valid);
    }
}
