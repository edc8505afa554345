pub mod choices;
pub mod number;
pub mod string;

pub use choices::Choices;
pub use number::NumberOptions;
pub use string::{FileCategory, FilePathOptions, StringOptions};

use crate::{
    entity::EntityType,
    model::descriptor::ModelType,
    schema::Schema,
    types::{Json, JsonObject},
};
use serde_json::json;
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

/// Caller-supplied validation hook.
///
/// `Ok(Some(bool))` is a definite verdict, `Ok(None)` abstains, `Err`
/// carries a custom failure message.
pub type Validator = Arc<dyn Fn(&Json) -> Result<Option<bool>, String> + Send + Sync>;

///
/// CleanOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct CleanOptions {
    /// Treat the record as a partial change set: absent fields stay absent.
    pub partial: bool,
}

///
/// ValidateOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateOptions {
    /// Absent fields are skipped rather than checked for requiredness.
    pub partial: bool,
}

///
/// FieldError
///
/// A single field's validation verdict. Composite kinds report nested
/// failures keyed by dotted path relative to the field.
///

#[derive(Clone, Debug, ThisError)]
pub enum FieldError {
    #[error("{0}")]
    Invalid(String),

    #[error("{} nested field(s) failed validation", .0.len())]
    Nested(BTreeMap<String, Vec<String>>),
}

///
/// Initial
///
/// The default for an absent value: a literal, or a function of the
/// in-progress sibling record (enabling cross-field defaults).
///

#[derive(Clone)]
pub enum Initial {
    None,
    Value(Json),
    Compute(Arc<dyn Fn(&JsonObject) -> Json + Send + Sync>),
}

impl Initial {
    fn resolve(&self, siblings: &JsonObject) -> Option<Json> {
        match self {
            Self::None => None,
            Self::Value(value) => Some(value.clone()),
            Self::Compute(compute) => Some(compute(siblings)),
        }
    }
}

impl fmt::Debug for Initial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Value(value) => write!(f, "Value({value})"),
            Self::Compute(_) => write!(f, "Compute(..)"),
        }
    }
}

///
/// FieldKind
///
/// The closed set of field variants. Dispatch is a compile-time-exhaustive
/// match, never runtime type inspection.
///

#[derive(Clone, Debug)]
pub enum FieldKind {
    Boolean,
    Number(NumberOptions),
    String(StringOptions),
    /// Free-form object; interior keys are not schema-governed.
    Object,
    Array(Box<Field>),
    /// Like `Array`, with JSON-equality deduplication.
    Set(Box<Field>),
    /// Nested composite: the recursive backbone for structured fields.
    Schema(Schema),
    /// A nested model with its own lifecycle.
    EmbeddedModel(&'static ModelType),
    /// An identifier-keyed collection of child entities backed by an array.
    EmbeddedCollection(&'static EntityType),
    /// An id pointing at another entity, resolved lazily at read time.
    ForeignReference(&'static str),
    Identifier,
    Color,
    FilePath(FilePathOptions),
    JsonString,
    HtmlString,
}

impl FieldKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object => "object",
            Self::Array(_) => "array",
            Self::Set(_) => "set",
            Self::Schema(_) => "schema",
            Self::EmbeddedModel(_) => "embedded-model",
            Self::EmbeddedCollection(_) => "embedded-collection",
            Self::ForeignReference(_) => "foreign-reference",
            Self::Identifier => "identifier",
            Self::Color => "color",
            Self::FilePath(_) => "file-path",
            Self::JsonString => "json-string",
            Self::HtmlString => "html-string",
        }
    }
}

///
/// Field
///
/// One typed, named schema slot owning cleaning, validation,
/// initialization, and serialization for its value. Fields are built once
/// per schema declaration and hold no instance data; moving a field into
/// its schema is what attaches it, so reuse across schemas is
/// unrepresentable.
///

#[derive(Clone)]
pub struct Field {
    kind: FieldKind,
    required: bool,
    nullable: bool,
    readonly: bool,
    initial: Initial,
    validator: Option<Validator>,
    validation_error: Option<String>,
}

impl Field {
    ///
    /// CONSTRUCTION
    ///

    fn new(kind: FieldKind, required: bool, nullable: bool, initial: Initial) -> Self {
        Self {
            kind,
            required,
            nullable,
            readonly: false,
            initial,
            validator: None,
            validation_error: None,
        }
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean, true, false, Initial::Value(Json::Bool(false)))
    }

    #[must_use]
    pub fn number(options: NumberOptions) -> Self {
        Self::new(FieldKind::Number(options), false, true, Initial::Value(Json::Null))
    }

    /// Number restricted to a choice set; non-nullable by default.
    #[must_use]
    pub fn number_choices(choices: Choices) -> Self {
        let options = NumberOptions {
            choices: Some(choices),
            ..NumberOptions::default()
        };

        Self::new(FieldKind::Number(options), true, false, Initial::None)
    }

    #[must_use]
    pub fn string(options: StringOptions) -> Self {
        let initial = if options.blank {
            Initial::Value(json!(""))
        } else {
            Initial::None
        };

        Self::new(FieldKind::String(options), false, false, initial)
    }

    /// String restricted to a choice set; non-nullable and non-blank by
    /// default.
    #[must_use]
    pub fn string_choices(choices: Choices) -> Self {
        let options = StringOptions {
            blank: false,
            choices: Some(choices),
            ..StringOptions::default()
        };

        Self::new(FieldKind::String(options), true, false, Initial::None)
    }

    #[must_use]
    pub fn object() -> Self {
        Self::new(
            FieldKind::Object,
            true,
            false,
            Initial::Value(Json::Object(JsonObject::new())),
        )
    }

    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::new(
            FieldKind::Array(Box::new(element)),
            true,
            false,
            Initial::Value(json!([])),
        )
    }

    #[must_use]
    pub fn set(element: Self) -> Self {
        Self::new(
            FieldKind::Set(Box::new(element)),
            true,
            false,
            Initial::Value(json!([])),
        )
    }

    #[must_use]
    pub fn schema(schema: Schema) -> Self {
        Self::new(
            FieldKind::Schema(schema),
            true,
            false,
            Initial::Value(Json::Object(JsonObject::new())),
        )
    }

    #[must_use]
    pub fn embedded(ty: &'static ModelType) -> Self {
        Self::new(
            FieldKind::EmbeddedModel(ty),
            true,
            false,
            Initial::Value(Json::Object(JsonObject::new())),
        )
    }

    #[must_use]
    pub fn collection(ty: &'static EntityType) -> Self {
        Self::new(
            FieldKind::EmbeddedCollection(ty),
            true,
            false,
            Initial::Value(json!([])),
        )
    }

    #[must_use]
    pub fn reference(target: &'static str) -> Self {
        Self::new(
            FieldKind::ForeignReference(target),
            false,
            true,
            Initial::Value(Json::Null),
        )
    }

    /// The canonical `_id` slot: nullable only pre-persistence, immutable
    /// afterwards.
    #[must_use]
    pub fn identifier() -> Self {
        let mut field = Self::new(FieldKind::Identifier, true, true, Initial::Value(Json::Null));
        field.readonly = true;

        field
    }

    #[must_use]
    pub fn color() -> Self {
        Self::new(FieldKind::Color, false, true, Initial::Value(Json::Null))
    }

    #[must_use]
    pub fn file_path(options: FilePathOptions) -> Self {
        Self::new(FieldKind::FilePath(options), false, true, Initial::Value(Json::Null))
    }

    #[must_use]
    pub fn json_string() -> Self {
        Self::new(FieldKind::JsonString, false, false, Initial::None)
    }

    #[must_use]
    pub fn html_string() -> Self {
        Self::new(FieldKind::HtmlString, false, false, Initial::Value(json!("")))
    }

    ///
    /// BUILDER
    ///

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    #[must_use]
    pub fn initial(mut self, value: Json) -> Self {
        self.initial = Initial::Value(value);
        self
    }

    /// Default computed from the in-progress sibling record.
    #[must_use]
    pub fn initial_with<F>(mut self, compute: F) -> Self
    where
        F: Fn(&JsonObject) -> Json + Send + Sync + 'static,
    {
        self.initial = Initial::Compute(Arc::new(compute));
        self
    }

    #[must_use]
    pub fn validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Json) -> Result<Option<bool>, String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validate));
        self
    }

    #[must_use]
    pub fn validation_error(mut self, template: impl Into<String>) -> Self {
        self.validation_error = Some(template.into());
        self
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        self.readonly
    }

    #[must_use]
    pub const fn has_initial(&self) -> bool {
        !matches!(self.initial, Initial::None)
    }

    /// Resolve and normalize the field's default against the in-progress
    /// sibling record.
    #[must_use]
    pub fn initial_value(&self, siblings: &JsonObject) -> Option<Json> {
        self.initial
            .resolve(siblings)
            .map(|value| self.clean_present(value, CleanOptions::default()))
    }

    ///
    /// CLEAN
    ///

    /// Coerce a candidate toward the field's shape.
    ///
    /// `None` (absent) resolves the default; `null` passes through for
    /// validation to judge; anything else is coerced then normalized.
    /// Returns `None` when the slot should stay absent.
    #[must_use]
    pub fn clean(
        &self,
        value: Option<Json>,
        siblings: &JsonObject,
        options: CleanOptions,
    ) -> Option<Json> {
        match value {
            None if options.partial => None,
            None => self.initial.resolve(siblings).map(|initial| {
                self.clean_present(initial, CleanOptions::default())
            }),
            Some(value) => Some(self.clean_present(value, options)),
        }
    }

    fn clean_present(&self, value: Json, options: CleanOptions) -> Json {
        if value.is_null() {
            return value;
        }

        match &self.kind {
            FieldKind::Boolean => match value {
                Json::Bool(_) => value,
                Json::Number(ref n) => Json::Bool(n.as_f64() != Some(0.0)),
                Json::String(ref s) => match s.to_ascii_lowercase().as_str() {
                    "true" => Json::Bool(true),
                    "false" => Json::Bool(false),
                    _ => value,
                },
                other => other,
            },
            FieldKind::Number(opts) => number::clean(value, opts),
            FieldKind::String(opts) => string::clean(value, opts),
            FieldKind::Object => value,
            FieldKind::Array(element) => match value {
                Json::Array(items) => Json::Array(
                    items
                        .into_iter()
                        .map(|item| element.clean_present(item, options))
                        .collect(),
                ),
                other => other,
            },
            FieldKind::Set(element) => match value {
                Json::Array(items) => {
                    let mut seen: Vec<Json> = Vec::with_capacity(items.len());
                    for item in items {
                        let cleaned = element.clean_present(item, options);
                        if !seen.contains(&cleaned) {
                            seen.push(cleaned);
                        }
                    }

                    Json::Array(seen)
                }
                other => other,
            },
            FieldKind::Schema(schema) => match value {
                Json::Object(map) => Json::Object(schema.clean(map, options)),
                other => other,
            },
            FieldKind::EmbeddedModel(ty) => match value {
                Json::Object(map) => Json::Object(ty.schema().clean(map, options)),
                other => other,
            },
            FieldKind::EmbeddedCollection(ty) => match value {
                Json::Array(items) => Json::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Json::Object(map) => {
                                Json::Object(ty.model.schema().clean(map, options))
                            }
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            },
            FieldKind::ForeignReference(_) | FieldKind::Identifier => match value {
                Json::String(s) => Json::String(s.trim().to_string()),
                other => other,
            },
            FieldKind::Color => string::clean_color(value),
            FieldKind::FilePath(_) | FieldKind::HtmlString => match value {
                Json::String(s) => Json::String(s.trim().to_string()),
                other => other,
            },
            FieldKind::JsonString => string::clean_json(value),
        }
    }

    ///
    /// VALIDATE
    ///

    /// Judge a candidate, in order: special null/absent pass, type-specific
    /// pass, caller-supplied validator. The first definite verdict wins.
    pub fn validate(&self, value: Option<&Json>, options: ValidateOptions) -> Result<(), FieldError> {
        // special pass: absent / null are decided outright
        let Some(value) = value else {
            if self.required && !self.has_initial() && !options.partial {
                return self.failure("may not be undefined");
            }

            return Ok(());
        };

        if value.is_null() {
            if self.nullable {
                return Ok(());
            }

            return self.failure("may not be null");
        }

        // type-specific pass
        if let Err(err) = self.validate_kind(value, options) {
            return match err {
                FieldError::Invalid(message) => self.failure(&message),
                nested @ FieldError::Nested(_) => Err(nested),
            };
        }

        // caller-supplied pass
        if let Some(validator) = &self.validator {
            match validator(value) {
                Ok(Some(true) | None) => {}
                Ok(Some(false)) => return self.failure("failed custom validation"),
                Err(message) => return self.failure(&message),
            }
        }

        Ok(())
    }

    fn validate_kind(&self, value: &Json, options: ValidateOptions) -> Result<(), FieldError> {
        match &self.kind {
            FieldKind::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(FieldError::Invalid(format!("{value} is not a boolean")))
                }
            }
            FieldKind::Number(opts) => number::validate(value, opts).map_err(FieldError::Invalid),
            FieldKind::String(opts) => string::validate(value, opts).map_err(FieldError::Invalid),
            FieldKind::Object => {
                if value.is_object() {
                    Ok(())
                } else {
                    Err(FieldError::Invalid(format!("{value} is not an object")))
                }
            }
            FieldKind::Array(element) | FieldKind::Set(element) => {
                let Json::Array(items) = value else {
                    return Err(FieldError::Invalid(format!("{value} is not an array")));
                };

                Self::validate_elements(element, items, options)
            }
            FieldKind::Schema(schema) => Self::validate_nested(schema, value, options),
            FieldKind::EmbeddedModel(ty) => Self::validate_nested(ty.schema(), value, options),
            FieldKind::EmbeddedCollection(_) => {
                let Json::Array(items) = value else {
                    return Err(FieldError::Invalid(format!("{value} is not an array")));
                };

                // children are validated on construction; corrupt entries
                // are isolated there rather than failing the parent
                for (index, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        return Err(FieldError::Invalid(format!(
                            "element {index} is not an object"
                        )));
                    }
                }

                Ok(())
            }
            FieldKind::ForeignReference(_) | FieldKind::Identifier => {
                string::validate_identifier(value).map_err(FieldError::Invalid)
            }
            FieldKind::Color => string::validate_color(value).map_err(FieldError::Invalid),
            FieldKind::FilePath(opts) => {
                string::validate_file_path(value, opts).map_err(FieldError::Invalid)
            }
            FieldKind::JsonString => string::validate_json(value).map_err(FieldError::Invalid),
            FieldKind::HtmlString => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(FieldError::Invalid(format!("{value} is not an HTML string")))
                }
            }
        }
    }

    fn validate_nested(
        schema: &Schema,
        value: &Json,
        options: ValidateOptions,
    ) -> Result<(), FieldError> {
        let Json::Object(map) = value else {
            return Err(FieldError::Invalid(format!("{value} is not an object")));
        };

        let errors = schema.validate_errors(map, options);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FieldError::Nested(errors))
        }
    }

    fn validate_elements(
        element: &Self,
        items: &[Json],
        options: ValidateOptions,
    ) -> Result<(), FieldError> {
        let mut errors = BTreeMap::new();

        for (index, item) in items.iter().enumerate() {
            if let Err(err) = element.validate(Some(item), options) {
                match err {
                    FieldError::Invalid(message) => {
                        errors.insert(index.to_string(), vec![message]);
                    }
                    FieldError::Nested(nested) => {
                        for (path, messages) in nested {
                            errors.insert(format!("{index}.{path}"), messages);
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FieldError::Nested(errors))
        }
    }

    fn failure(&self, default: &str) -> Result<(), FieldError> {
        let message = self
            .validation_error
            .clone()
            .unwrap_or_else(|| default.to_string());

        Err(FieldError::Invalid(message))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind.name())
            .field("required", &self.required)
            .field("nullable", &self.nullable)
            .field("readonly", &self.readonly)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> CleanOptions {
        CleanOptions::default()
    }

    #[test]
    fn missing_value_resolves_initial() {
        let field = Field::number(NumberOptions::default()).initial(json!(10));

        assert_eq!(field.clean(None, &JsonObject::new(), opts()), Some(json!(10)));
    }

    #[test]
    fn missing_value_in_partial_mode_stays_absent() {
        let field = Field::number(NumberOptions::default()).initial(json!(10));
        let options = CleanOptions { partial: true };

        assert_eq!(field.clean(None, &JsonObject::new(), options), None);
    }

    #[test]
    fn initial_function_sees_sibling_record() {
        let field = Field::number(NumberOptions::default())
            .initial_with(|siblings| siblings.get("max").cloned().unwrap_or(json!(0)));

        let mut siblings = JsonObject::new();
        siblings.insert("max".to_string(), json!(20));

        assert_eq!(field.clean(None, &siblings, opts()), Some(json!(20)));
    }

    #[test]
    fn null_passes_clean_and_nullable_gates_validate() {
        let nullable = Field::number(NumberOptions::default());
        let strict = Field::boolean();

        assert_eq!(
            nullable.clean(Some(Json::Null), &JsonObject::new(), opts()),
            Some(Json::Null)
        );
        assert!(nullable.validate(Some(&Json::Null), ValidateOptions::default()).is_ok());
        assert!(strict.validate(Some(&Json::Null), ValidateOptions::default()).is_err());
    }

    #[test]
    fn required_without_initial_rejects_absence() {
        let field = Field::json_string().required(true);

        assert!(field.validate(None, ValidateOptions::default()).is_err());
        assert!(
            field
                .validate(None, ValidateOptions { partial: true })
                .is_ok()
        );
    }

    #[test]
    fn set_cleaning_dedupes_preserving_order() {
        let field = Field::set(Field::string(StringOptions::default()));
        let cleaned = field.clean(
            Some(json!(["b", "a", "b", "c", "a"])),
            &JsonObject::new(),
            opts(),
        );

        assert_eq!(cleaned, Some(json!(["b", "a", "c"])));
    }

    #[test]
    fn clean_is_idempotent_across_kinds() {
        let fields = [
            Field::boolean(),
            Field::number(NumberOptions {
                min: Some(0.0),
                max: Some(10.0),
                step: Some(0.5),
                ..NumberOptions::default()
            }),
            Field::string(StringOptions::default()),
            Field::color(),
            Field::json_string(),
            Field::set(Field::string(StringOptions::default())),
        ];
        let samples = [
            json!("true"),
            json!("7.3"),
            json!("  padded  "),
            json!("#ABC"),
            json!({"a": 1}),
            json!(["x", "x", "y"]),
        ];

        for (field, sample) in fields.iter().zip(samples) {
            let once = field.clean_present(sample, opts());
            let twice = field.clean_present(once.clone(), opts());
            assert_eq!(once, twice, "clean must be idempotent for {}", field.kind.name());
        }
    }

    #[test]
    fn custom_validator_verdict_wins() {
        let veto = Field::number(NumberOptions::default())
            .validator(|_| Ok(Some(false)))
            .validation_error("computer says no");

        let err = veto
            .validate(Some(&json!(3)), ValidateOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "computer says no");

        let thrown = Field::number(NumberOptions::default())
            .validator(|_| Err("exploded".to_string()));
        assert!(
            thrown
                .validate(Some(&json!(3)), ValidateOptions::default())
                .is_err()
        );

        let abstains = Field::number(NumberOptions::default()).validator(|_| Ok(None));
        assert!(
            abstains
                .validate(Some(&json!(3)), ValidateOptions::default())
                .is_ok()
        );
    }

    #[test]
    fn array_errors_are_keyed_by_index() {
        let field = Field::array(Field::number(NumberOptions {
            positive: true,
            ..NumberOptions::default()
        }));

        let err = field
            .validate(Some(&json!([1, -2, 3])), ValidateOptions::default())
            .unwrap_err();
        let FieldError::Nested(errors) = err else {
            panic!("expected nested element errors");
        };
        assert!(errors.contains_key("1"));
        assert_eq!(errors.len(), 1);
    }
}
