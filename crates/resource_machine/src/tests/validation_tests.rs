use serde_json::json;

use super::*;

fn map(value: serde_json::Value) -> FieldMap {
    value.as_object().cloned().expect("object")
}

#[test]
fn pristine_ignores_key_order() {
    let a = map(json!({"name": "default", "type": "file"}));
    let mut b = FieldMap::new();
    b.insert("type".into(), json!("file"));
    b.insert("name".into(), json!("default"));
    assert!(is_pristine(&a, &b));
}

#[test]
fn null_and_missing_keys_differ() {
    let with_null = map(json!({"name": "default", "bucket": null}));
    let without = map(json!({"name": "default"}));
    assert!(!is_pristine(&with_null, &without));
}

#[test]
fn arrays_compare_in_order() {
    let a = map(json!({"roles": ["admin", "viewer"]}));
    let b = map(json!({"roles": ["viewer", "admin"]}));
    assert!(!is_pristine(&a, &b));
    assert!(is_pristine(&a, &a.clone()));
}

#[test]
fn integer_and_float_numbers_differ() {
    assert!(!is_pristine(&map(json!({"quota": 1})), &map(json!({"quota": 1.0}))));
}

#[test]
fn skip_flag_suppresses_exactly_one_pass() {
    let validate = required(&["username"], "required");
    let mut ctx = Context {
        skip_validation: true,
        ..Context::default()
    };

    assert!(!revalidate(&mut ctx, &validate));
    assert!(!ctx.skip_validation);
    assert!(!ctx.validation_errors.has_errors());

    assert!(revalidate(&mut ctx, &validate));
    assert_eq!(ctx.validation_errors.get("username"), Some("required"));
}

#[test]
fn required_treats_blank_values_as_missing() {
    let validate = required(&["name", "tags", "quota", "owner"], "required");
    let errors = validate(&map(json!({
        "name": "   ",
        "tags": [],
        "quota": 0,
        "owner": null,
    })));
    let flagged: Vec<&str> = errors.fields().map(|(field, _)| field).collect();
    assert_eq!(flagged, vec!["name", "owner", "tags"]);
}
