//! Structural merge of two OpenAPI documents.
//!
//! Field policy:
//! - `paths` and each `components.*` section: union by key; on a key
//!   conflict the right side wins iff `replace`, otherwise the left side.
//! - `servers`, `security`, `tags`: array union by deep equality, left order
//!   preserved.
//! - `info`, `openapi`: left side if present, right side otherwise.
//! - Anything else: objects union recursively; scalar conflicts keep the
//!   left side.

use serde_json::{Map, Value};

/// Merge `src` into `dst` in place. Both are expected to be JSON objects;
/// non-object inputs are left untouched.
pub fn merge(dst: &mut Value, src: &Value, replace: bool) {
    let Value::Object(src_map) = src else { return };
    let Value::Object(dst_map) = dst else { return };

    for (key, src_val) in src_map {
        match key.as_str() {
            "paths" => merge_keyed(dst_map, key, src_val, replace),
            "components" => merge_components(dst_map, src_val, replace),
            "servers" | "security" | "tags" => merge_array(dst_map, key, src_val),
            "info" | "openapi" => {
                dst_map
                    .entry(key.clone())
                    .or_insert_with(|| src_val.clone());
            }
            _ => merge_any(dst_map, key, src_val),
        }
    }
}

/// Union of two object-valued fields by key, with the conflict policy.
fn merge_keyed(dst: &mut Map<String, Value>, field: &str, src: &Value, replace: bool) {
    let Value::Object(src_entries) = src else {
        merge_any(dst, field, src);
        return;
    };
    let entry = dst
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(dst_entries) = entry else {
        if replace {
            *entry = src.clone();
        }
        return;
    };
    for (name, value) in src_entries {
        if replace || !dst_entries.contains_key(name) {
            dst_entries.insert(name.clone(), value.clone());
        }
    }
}

/// `components` holds named sections (schemas, parameters, responses, ...);
/// each section unions by name with the same conflict policy as paths.
fn merge_components(dst: &mut Map<String, Value>, src: &Value, replace: bool) {
    let Value::Object(src_sections) = src else { return };
    let entry = dst
        .entry("components".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(dst_sections) = entry else { return };
    for (section, names) in src_sections {
        merge_keyed(dst_sections, section, names, replace);
    }
}

/// Array union by deep equality, preserving left order.
fn merge_array(dst: &mut Map<String, Value>, field: &str, src: &Value) {
    let Value::Array(src_items) = src else {
        merge_any(dst, field, src);
        return;
    };
    let entry = dst
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(dst_items) = entry else { return };
    for item in src_items {
        if !dst_items.iter().any(|existing| existing == item) {
            dst_items.push(item.clone());
        }
    }
}

/// Unknown fields: objects union recursively, scalar conflicts keep the left
/// side, absent keys are copied from the right.
fn merge_any(dst: &mut Map<String, Value>, field: &str, src: &Value) {
    match dst.get_mut(field) {
        None => {
            dst.insert(field.to_string(), src.clone());
        }
        Some(Value::Object(dst_map)) => {
            if let Value::Object(src_map) = src {
                for (k, v) in src_map {
                    merge_any(dst_map, k, v);
                }
            }
        }
        Some(_) => {}
    }
}
