use crate::types::Json;
use std::fmt;

///
/// Choices
///
/// A constraint restricting a field to a finite set of values.
///
/// The set may be a literal list, a mapping whose keys are the values, or a
/// zero-argument resolver for choices registered after schema definition.
///

#[derive(Clone)]
pub enum Choices {
    List(Vec<Json>),
    Resolver(fn() -> Vec<Json>),
}

impl Choices {
    /// Build a choice set from string keys (the mapping form: keys are the
    /// values, whatever they map to is presentation data).
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(keys.into_iter().map(|k| Json::String(k.into())).collect())
    }

    /// Materialize the current choice values.
    #[must_use]
    pub fn values(&self) -> Vec<Json> {
        match self {
            Self::List(values) => values.clone(),
            Self::Resolver(resolve) => resolve(),
        }
    }

    /// Returns true if `value` is an allowed choice.
    #[must_use]
    pub fn contains(&self, value: &Json) -> bool {
        match self {
            Self::List(values) => values.contains(value),
            Self::Resolver(resolve) => resolve().contains(value),
        }
    }
}

impl fmt::Debug for Choices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(values) => f.debug_tuple("List").field(values).finish(),
            Self::Resolver(_) => f.debug_tuple("Resolver").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn late_choices() -> Vec<Json> {
        vec![json!("sword"), json!("staff")]
    }

    #[test]
    fn literal_and_key_forms_agree() {
        let literal = Choices::List(vec![json!("a"), json!("b")]);
        let keyed = Choices::from_keys(["a", "b"]);

        assert!(literal.contains(&json!("a")));
        assert!(keyed.contains(&json!("b")));
        assert!(!keyed.contains(&json!("c")));
    }

    #[test]
    fn resolver_form_is_evaluated_per_lookup() {
        let choices = Choices::Resolver(late_choices);

        assert!(choices.contains(&json!("staff")));
        assert_eq!(choices.values().len(), 2);
    }
}
