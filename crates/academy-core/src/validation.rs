use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::errors::{AppError, FieldErrors};

/// Runs the `validator` rules on `value` and converts any failures into
/// [`AppError::Validation`].
pub fn validate<T: Validate>(value: &T) -> Result<(), AppError> {
    value
        .validate()
        .map_err(|errors| AppError::Validation(collect_field_errors(&errors)))
}

/// Like [`validate`] but returns the field errors instead of failing, so callers
/// can merge them with their own checks.
pub fn field_errors<T: Validate>(value: &T) -> FieldErrors {
    match value.validate() {
        Ok(()) => FieldErrors::new(),
        Err(errors) => collect_field_errors(&errors),
    }
}

/// Flattens nested `validator` errors into `path: message` pairs, e.g.
/// `subjects[1].total`.
pub fn collect_field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    flatten("", errors, &mut out);
    out
}

fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut FieldErrors) {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|msg| msg.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    out.push(path.clone(), message);
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}
