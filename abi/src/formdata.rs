//! Statically declared booking-form descriptors.
//!
//! The data-capture layer maps its form values through these descriptors
//! into the opaque payload stored on a reservation. The engine itself never
//! looks inside that payload again.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

/// One typed field of a form set, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: String,
    pub desc: String,
}

impl FieldDescriptor {
    pub fn new(key: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            desc: desc.into(),
        }
    }
}

/// A named group of fields shown together on the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSet {
    pub key: String,
    pub desc: String,
    pub fields: Vec<FieldDescriptor>,
}

impl FormSet {
    pub fn new(key: impl Into<String>, desc: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            key: key.into(),
            desc: desc.into(),
            fields,
        }
    }
}

/// Builds the reservation payload from captured values, keyed
/// "formset.field". Empty values and form sets without a single captured
/// value are left out; the field's position doubles as its sort key so the
/// display layer can reproduce the form order.
pub fn formdata_payload(formsets: &[FormSet], values: &HashMap<String, Value>) -> Value {
    let mut payload = Map::new();

    for formset in formsets {
        let mut records = Vec::new();

        for (sortkey, field) in formset.fields.iter().enumerate() {
            let captured = values.get(&format!("{}.{}", formset.key, field.key));
            let Some(value) = captured else { continue };
            if value.is_null() {
                continue;
            }

            records.push(json!({
                "key": field.key,
                "desc": field.desc,
                "value": value,
                "sortkey": sortkey,
            }));
        }

        if records.is_empty() {
            continue;
        }

        payload.insert(
            formset.key.clone(),
            json!({ "desc": formset.desc, "values": records }),
        );
    }

    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formsets() -> Vec<FormSet> {
        vec![FormSet::new(
            "visitor",
            "Visitor",
            vec![
                FieldDescriptor::new("name", "Name"),
                FieldDescriptor::new("phone", "Phone"),
            ],
        )]
    }

    #[test]
    fn payload_should_keep_form_order() {
        let mut values = HashMap::new();
        values.insert("visitor.phone".to_string(), json!("555-0101"));
        values.insert("visitor.name".to_string(), json!("Ms Example"));

        let payload = formdata_payload(&formsets(), &values);
        let records = payload["visitor"]["values"].as_array().unwrap();

        assert_eq!(records[0]["key"], "name");
        assert_eq!(records[0]["sortkey"], 0);
        assert_eq!(records[1]["key"], "phone");
        assert_eq!(records[1]["sortkey"], 1);
    }

    #[test]
    fn payload_should_drop_empty_form_sets() {
        let values = HashMap::new();
        let payload = formdata_payload(&formsets(), &values);
        assert_eq!(payload, json!({}));
    }

    #[test]
    fn payload_should_skip_null_values() {
        let mut values = HashMap::new();
        values.insert("visitor.name".to_string(), Value::Null);
        values.insert("visitor.phone".to_string(), json!("555-0101"));

        let payload = formdata_payload(&formsets(), &values);
        let records = payload["visitor"]["values"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["key"], "phone");
    }
}
