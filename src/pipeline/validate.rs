// src/pipeline/validate.rs

//! Page shape validation.
//!
//! A rule is a dotted key path. Objects are walked key by key; when a list is
//! reached before the path ends, every element must satisfy the rest of the
//! path.

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::ValidationRule;
use crate::pipeline::normalize::is_blank;

/// Check `page` against every rule, naming the first one that fails.
pub fn validate_page(page: &Value, rules: &[ValidationRule]) -> Result<()> {
    if !page.is_object() {
        return Err(AppError::validation("page is not a JSON object"));
    }
    if page.get("items").is_none() {
        return Err(AppError::validation("missing key 'items'"));
    }

    for rule in rules {
        let keys: Vec<&str> = rule.key.split('.').collect();
        if let Err(reason) = check_path(page, &keys) {
            return Err(AppError::validation(format!("rule '{}': {}", rule.key, reason)));
        }
    }
    Ok(())
}

fn check_path(value: &Value, keys: &[&str]) -> std::result::Result<(), String> {
    let Some((key, rest)) = keys.split_first() else {
        return if is_blank(value) {
            Err("value is empty".to_string())
        } else {
            Ok(())
        };
    };

    match value {
        Value::Object(map) => match map.get(*key) {
            Some(next) => check_path(next, rest),
            None => Err(format!("missing key '{}'", key)),
        },
        Value::Array(elements) => {
            for (idx, element) in elements.iter().enumerate() {
                check_path(element, keys)
                    .map_err(|reason| format!("element {}: {}", idx, reason))?;
            }
            Ok(())
        }
        _ => Err(format!("cannot look up '{}' in a scalar", key)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rules(keys: &[&str]) -> Vec<ValidationRule> {
        keys.iter()
            .map(|k| ValidationRule { key: k.to_string() })
            .collect()
    }

    #[test]
    fn test_valid_page_passes() {
        let page = json!({
            "items": [{"title": "a"}, {"title": "b"}],
            "pagination": {"nb_pages": 2}
        });
        assert!(validate_page(&page, &rules(&["items", "items.title", "pagination.nb_pages"])).is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate_page(&json!([1, 2]), &[]).is_err());
        assert!(validate_page(&json!(null), &[]).is_err());
    }

    #[test]
    fn test_items_key_required() {
        assert!(validate_page(&json!({"pagination": {}}), &[]).is_err());
    }

    #[test]
    fn test_list_elements_must_all_match() {
        let page = json!({"items": [{"title": "a"}, {"name": "b"}]});
        let err = validate_page(&page, &rules(&["items.title"])).unwrap_err();
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn test_blank_final_value_rejected() {
        for page in [
            json!({"items": [], "pagination": null}),
            json!({"items": [], "pagination": {}}),
            json!({"items": [], "pagination": ""}),
        ] {
            assert!(validate_page(&page, &rules(&["pagination"])).is_err());
        }
    }

    #[test]
    fn test_empty_list_passes() {
        let page = json!({"items": []});
        assert!(validate_page(&page, &rules(&["items", "items.title"])).is_ok());
    }

    #[test]
    fn test_scalar_mid_path_rejected() {
        let page = json!({"items": [], "pagination": 3});
        assert!(validate_page(&page, &rules(&["pagination.nb_pages"])).is_err());
    }
}
