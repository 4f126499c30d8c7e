//! Form pages and their submission mutations.
//!
//! Every form page model gets a mutation which looks up a live form page by URL, validates the
//! submitted values against the page's fields and, if they are valid, hands the cleaned values to
//! the data source. Validation failures are reported in the mutation result rather than as GraphQL
//! errors, one entry per invalid field, with the messages the host's own form handling produces.

use super::pages::{stored_url_path, url_prefix};
use super::resolve::getter;
use super::types::TypeDef;
use super::{request_context, Services};
use crate::backend::{DataSource, PageQuery};
use crate::catalog::ModelId;
use crate::content::{FormField, FormFieldType};
use crate::permissions::visible_pages;
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, Object, TypeRef};
use async_graphql::Value as GqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub(crate) const FORM_FIELD: &str = "FormField";
const FORM_ERROR: &str = "FormError";

const REQUIRED: &str = "This field is required.";

/// The validation errors for one form field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// The clean name of the field.
    pub name: String,
    pub errors: Vec<String>,
}

/// The outcome of a submission, the parent value of the mutation result type.
#[derive(Clone, Debug)]
struct Outcome {
    result: &'static str,
    errors: Option<Vec<FieldError>>,
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

/// The empty cleaned value of a field which was not filled in.
fn empty_value(ty: FormFieldType) -> Value {
    match ty {
        FormFieldType::Checkbox => Value::Bool(false),
        FormFieldType::Checkboxes | FormFieldType::MultiSelect => Value::Array(vec![]),
        _ => Value::Null,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_email(s: &str) -> bool {
    let Some((user, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !user.is_empty()
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
}

fn is_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "ftp" | "ftps") && url.has_host(),
        Err(_) => false,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ]
    .into_iter()
    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

fn invalid_choice(choice: &str) -> String {
    format!("Select a valid choice. {choice} is not one of the available choices.")
}

/// Validate and clean the submitted value of one non-empty field.
fn clean(field: &FormField, value: &Value) -> Result<Value, String> {
    let text = || as_text(value).ok_or_else(|| "Enter a valid value.".to_string());
    match field.field_type {
        FormFieldType::SingleLine | FormFieldType::MultiLine | FormFieldType::Hidden => {
            Ok(Value::String(text()?))
        }
        FormFieldType::Number => {
            let number = match value {
                Value::Number(n) => Some(n.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .map(Into::into)
                    .or_else(|| {
                        s.trim()
                            .parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                    }),
                _ => None,
            };
            number.map(Value::Number).ok_or_else(|| "Enter a number.".into())
        }
        FormFieldType::Email => {
            let s = text()?;
            if is_email(&s) {
                Ok(Value::String(s))
            } else {
                Err("Enter a valid email address.".into())
            }
        }
        FormFieldType::Url => {
            let s = text()?;
            if is_url(&s) {
                Ok(Value::String(s))
            } else {
                Err("Enter a valid URL.".into())
            }
        }
        FormFieldType::Checkbox => {
            let checked = match value {
                Value::Bool(b) => *b,
                Value::String(s) => !matches!(s.to_lowercase().as_str(), "false" | "0" | "off"),
                Value::Number(n) => n.as_f64() != Some(0.0),
                _ => true,
            };
            if field.required && !checked {
                Err(REQUIRED.into())
            } else {
                Ok(Value::Bool(checked))
            }
        }
        FormFieldType::Dropdown | FormFieldType::Radio => {
            let s = text()?;
            if field.choices.iter().any(|choice| choice.trim() == s) {
                Ok(Value::String(s))
            } else {
                Err(invalid_choice(&s))
            }
        }
        FormFieldType::Checkboxes | FormFieldType::MultiSelect => {
            let Value::Array(items) = value else {
                return Err("Enter a list of values.".into());
            };
            items
                .iter()
                .map(|item| {
                    let s = as_text(item).ok_or_else(|| invalid_choice(&item.to_string()))?;
                    if field.choices.iter().any(|choice| choice.trim() == s) {
                        Ok(Value::String(s))
                    } else {
                        Err(invalid_choice(&s))
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        FormFieldType::Date => {
            let s = text()?;
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(|date| Value::String(date.to_string()))
                .map_err(|_| "Enter a valid date.".into())
        }
        FormFieldType::DateTime => {
            let s = text()?;
            parse_datetime(&s)
                .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .ok_or_else(|| "Enter a valid date/time.".into())
        }
    }
}

/// Validate submitted `values` against the fields of a form.
///
/// Values are keyed by the fields' clean names; keys which do not name a field are ignored. On
/// success, returns the cleaned value of every field, with empty values for fields which were not
/// filled in. On failure, returns the errors for each invalid field, in form order.
pub fn validate_submission(
    fields: &[FormField],
    values: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<FieldError>> {
    let mut cleaned = Map::new();
    let mut errors = vec![];
    for field in fields {
        let name = field.clean_name();
        let value = values.get(&name).unwrap_or(&Value::Null);
        let result = if is_empty(value) {
            if field.required {
                Err(REQUIRED.to_string())
            } else {
                Ok(empty_value(field.field_type))
            }
        } else {
            clean(field, value)
        };
        match result {
            Ok(value) => {
                cleaned.insert(name, value);
            }
            Err(error) => errors.push(FieldError {
                name,
                errors: vec![error],
            }),
        }
    }
    if errors.is_empty() {
        Ok(cleaned)
    } else {
        Err(errors)
    }
}

fn form_field_type() -> Object {
    Object::new(FORM_FIELD)
        .description("A field of a form page.")
        .field(getter::<FormField>("name", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.clean_name().into()
        }))
        .field(getter::<FormField>("fieldType", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.field_type.to_string().into()
        }))
        .field(getter::<FormField>("helpText", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.help_text.clone().into()
        }))
        .field(getter::<FormField>("required", TypeRef::named_nn(TypeRef::BOOLEAN), |f| {
            f.required.into()
        }))
        .field(getter::<FormField>("choices", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.choices.join(",").into()
        }))
        .field(getter::<FormField>("defaultValue", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.default_value.clone().into()
        }))
        .field(getter::<FormField>("label", TypeRef::named_nn(TypeRef::STRING), |f| {
            f.label.clone().into()
        }))
}

fn form_error_type() -> Object {
    Object::new(FORM_ERROR)
        .field(getter::<FieldError>("name", TypeRef::named_nn(TypeRef::STRING), |e| {
            e.name.clone().into()
        }))
        .field(getter::<FieldError>("errors", TypeRef::named_nn_list_nn(TypeRef::STRING), |e| {
            GqlValue::List(e.errors.iter().cloned().map(GqlValue::from).collect())
        }))
}

pub(crate) fn types() -> Vec<Object> {
    vec![form_field_type(), form_error_type()]
}

/// The object type returned by the submission mutation of a form page.
pub(crate) fn result_type(ty: &TypeDef) -> Object {
    let mut object = Object::new(&ty.name)
        .field(Field::new("result", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let outcome = ctx.parent_value.try_downcast_ref::<Outcome>()?;
                Ok(Some(FieldValue::value(outcome.result)))
            })
        }))
        .field(Field::new("errors", TypeRef::named_list(FORM_ERROR), |ctx| {
            FieldFuture::new(async move {
                let outcome = ctx.parent_value.try_downcast_ref::<Outcome>()?;
                Ok(outcome.errors.as_ref().map(|errors| {
                    FieldValue::list(errors.iter().cloned().map(FieldValue::owned_any))
                }))
            })
        }));
    if let Some(description) = &ty.description {
        object = object.description(description);
    }
    object
}

/// The submission mutation of the form page model `model`.
pub(crate) fn mutation<D: DataSource>(
    services: &Arc<Services<D>>,
    name: &str,
    model: &ModelId,
    result: &str,
) -> Field {
    let svc = services.clone();
    let model = model.clone();
    Field::new(name, TypeRef::named_nn(result), move |ctx| {
        let services = svc.clone();
        let model = model.clone();
        FieldFuture::new(async move {
            let request = request_context(&ctx);
            let url = ctx.args.try_get("url")?.string()?.to_string();
            let values = match ctx.args.get("values") {
                Some(values) => match values.as_value().clone().into_json()? {
                    Value::Object(values) => values,
                    Value::Null => Map::new(),
                    other => return Err(format!("expected an object of values, got {other}").into()),
                },
                None => Map::new(),
            };

            let url_path = stored_url_path(&url, &url_prefix(&services, &request));
            let page = visible_pages(&*services.db, &request, PageQuery::all().url_path(url_path).live())
                .await?
                .into_iter()
                .find(|page| page.model() == &model)
                .ok_or_else(|| format!("Form page '{url}' not found."))?;

            let outcome = match validate_submission(&page.form_fields, &values) {
                Ok(cleaned) => {
                    services
                        .db
                        .process_form_submission(&page, &cleaned, request.user.as_ref())
                        .await?;
                    info!(page = page.id, "processed form submission");
                    Outcome {
                        result: "OK",
                        errors: None,
                    }
                }
                Err(errors) => {
                    debug!(page = page.id, ?errors, "rejected form submission");
                    Outcome {
                        result: "FAIL",
                        errors: Some(errors),
                    }
                }
            };
            Ok(Some(FieldValue::owned_any(outcome)))
        })
    })
    .argument(InputValue::new("url", TypeRef::named_nn(TypeRef::STRING)))
    .argument(InputValue::new("values", TypeRef::named("GenericScalar")))
    .description("Submit a form page.")
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn values(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object: {value}"),
        }
    }

    fn fields() -> Vec<FormField> {
        vec![
            FormField::new("Label 1", FormFieldType::SingleLine).required(),
            FormField::new("other label", FormFieldType::Number),
        ]
    }

    #[test]
    fn test_valid_submission() {
        let cleaned =
            validate_submission(&fields(), &values(json!({"label-1": "1", "other-label": 2})))
                .unwrap();
        assert_eq!(cleaned["label-1"], json!("1"));
        assert_eq!(cleaned["other-label"], json!(2));

        // Optional fields may be left out.
        let cleaned = validate_submission(&fields(), &values(json!({"label-1": "x"}))).unwrap();
        assert_eq!(cleaned["other-label"], Value::Null);
    }

    #[test]
    fn test_required_field() {
        let errors = validate_submission(
            &fields(),
            &values(json!({"label-fail": "1", "other-label": 2})),
        )
        .unwrap_err();
        assert_eq!(
            errors,
            [FieldError {
                name: "label-1".into(),
                errors: vec![REQUIRED.into()],
            }]
        );
    }

    #[test]
    fn test_field_types() {
        let check = |field: FormField, value: Value| {
            let mut submitted = Map::new();
            submitted.insert(field.clean_name(), value);
            validate_submission(&[field], &submitted)
                .map_err(|mut errors| errors.remove(0).errors.remove(0))
        };

        assert_eq!(
            check(FormField::new("n", FormFieldType::Number), json!("abc")).unwrap_err(),
            "Enter a number."
        );
        assert_eq!(
            check(FormField::new("n", FormFieldType::Number), json!(" 1.5 ")).unwrap()["n"],
            json!(1.5)
        );
        assert_eq!(
            check(FormField::new("e", FormFieldType::Email), json!("nobody")).unwrap_err(),
            "Enter a valid email address."
        );
        assert!(check(FormField::new("e", FormFieldType::Email), json!("a@b.org")).is_ok());
        assert_eq!(
            check(FormField::new("u", FormFieldType::Url), json!("not a url")).unwrap_err(),
            "Enter a valid URL."
        );
        assert!(check(FormField::new("u", FormFieldType::Url), json!("https://x.org/a")).is_ok());
        assert_eq!(
            check(
                FormField::new("c", FormFieldType::Dropdown).with_choices(["red", "blue"]),
                json!("green")
            )
            .unwrap_err(),
            "Select a valid choice. green is not one of the available choices."
        );
        assert_eq!(
            check(
                FormField::new("c", FormFieldType::Checkboxes).with_choices(["red", "blue"]),
                json!("red")
            )
            .unwrap_err(),
            "Enter a list of values."
        );
        assert!(check(
            FormField::new("c", FormFieldType::MultiSelect).with_choices(["red", "blue"]),
            json!(["blue", "red"])
        )
        .is_ok());
        assert_eq!(
            check(FormField::new("d", FormFieldType::Date), json!("2020-13-01")).unwrap_err(),
            "Enter a valid date."
        );
        assert_eq!(
            check(FormField::new("d", FormFieldType::DateTime), json!("yesterday")).unwrap_err(),
            "Enter a valid date/time."
        );
        assert_eq!(
            check(FormField::new("d", FormFieldType::DateTime), json!("2020-01-02 03:04"))
                .unwrap()["d"],
            json!("2020-01-02T03:04:00")
        );
        assert_eq!(
            check(FormField::new("b", FormFieldType::Checkbox).required(), json!(false))
                .unwrap_err(),
            REQUIRED
        );
    }
}
