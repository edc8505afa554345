use crate::{field::choices::Choices, types::Json};

///
/// NumberOptions
///
/// Range, stepping, and shape constraints for numeric fields.
///
/// `positive` is deliberately asymmetric: cleaning clamps via absolute
/// value, validation rejects non-positive values outright.
///

#[derive(Clone, Debug, Default)]
pub struct NumberOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub integer: bool,
    pub positive: bool,
    pub choices: Option<Choices>,
}

/// Coerce and normalize a numeric candidate.
///
/// Non-coercible values are returned untouched for validation to reject.
/// Rounding for `integer` happens before range clamping.
#[must_use]
pub fn clean(value: Json, options: &NumberOptions) -> Json {
    let Some(mut number) = coerce(&value) else {
        return value;
    };

    if options.positive {
        number = number.abs();
    }
    if let Some(step) = options.step {
        if step > 0.0 {
            number = (number / step).round() * step;
        }
    }
    if options.integer {
        number = number.round();
    }
    if let Some(min) = options.min {
        number = number.max(min);
    }
    if let Some(max) = options.max {
        number = number.min(max);
    }

    to_json(number, options.integer).unwrap_or(value)
}

/// Type-specific validation pass for numeric fields.
pub fn validate(value: &Json, options: &NumberOptions) -> Result<(), String> {
    let Some(number) = value.as_f64() else {
        return Err(format!("{value} is not a number"));
    };

    if let Some(choices) = &options.choices {
        if !choices.contains(value) {
            return Err(format!("{value} is not a valid choice"));
        }

        return Ok(());
    }

    if options.positive && number <= 0.0 {
        return Err(format!("{number} is not positive"));
    }
    if options.integer && number.fract() != 0.0 {
        return Err(format!("{number} is not an integer"));
    }
    if let Some(min) = options.min {
        if number < min {
            return Err(format!("{number} is below the minimum of {min}"));
        }
    }
    if let Some(max) = options.max {
        if number > max {
            return Err(format!("{number} exceeds the maximum of {max}"));
        }
    }

    Ok(())
}

fn coerce(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// Integer-shaped results are stored as JSON integers to keep round-trips
// stable; fractional results fall back to f64.
fn to_json(number: f64, integer: bool) -> Option<Json> {
    if integer || number.fract() == 0.0 {
        #[expect(clippy::cast_possible_truncation)]
        if number.is_finite() && number.abs() < 9_007_199_254_740_992.0 {
            return Some(Json::from(number as i64));
        }
    }

    serde_json::Number::from_f64(number).map(Json::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_parses_strings_and_clamps() {
        let options = NumberOptions {
            min: Some(0.0),
            max: Some(10.0),
            ..NumberOptions::default()
        };

        assert_eq!(clean(json!("7.5"), &options), json!(7.5));
        assert_eq!(clean(json!(-3), &options), json!(0));
        assert_eq!(clean(json!(42), &options), json!(10));
    }

    #[test]
    fn positive_clamps_in_clean_but_rejects_in_validate() {
        let options = NumberOptions {
            positive: true,
            ..NumberOptions::default()
        };

        assert_eq!(clean(json!(-4), &options), json!(4));
        assert!(validate(&json!(-4), &options).is_err());
        assert!(validate(&json!(0), &options).is_err());
        assert!(validate(&json!(4), &options).is_ok());
    }

    #[test]
    fn integer_rounds_before_clamping() {
        let options = NumberOptions {
            integer: true,
            max: Some(5.0),
            ..NumberOptions::default()
        };

        assert_eq!(clean(json!(5.4), &options), json!(5));
        assert_eq!(clean(json!(5.6), &options), json!(5));
        assert!(validate(&json!(2.5), &options).is_err());
    }

    #[test]
    fn step_snaps_to_nearest_multiple() {
        let options = NumberOptions {
            step: Some(0.5),
            ..NumberOptions::default()
        };

        assert_eq!(clean(json!(1.3), &options), json!(1.5));
        assert_eq!(clean(json!(1.2), &options), json!(1.0));
    }

    #[test]
    fn choices_gate_validation() {
        let options = NumberOptions {
            choices: Some(Choices::List(vec![json!(1), json!(2)])),
            ..NumberOptions::default()
        };

        assert!(validate(&json!(1), &options).is_ok());
        assert!(validate(&json!(3), &options).is_err());
    }

    #[test]
    fn non_numbers_pass_clean_untouched_and_fail_validate() {
        let options = NumberOptions::default();

        assert_eq!(clean(json!("abc"), &options), json!("abc"));
        assert!(validate(&json!("abc"), &options).is_err());
    }
}
