//! Request value binder
//!
//! Turns raw per-source value maps into typed bound arguments. The binder
//! never fails fast: every field is evaluated and every error is collected,
//! so one bad parameter does not hide the next one.

use crate::dependency::Args;
use crate::error::{BindingError, Location};
use crate::field::{ParameterField, RawValue};
use crate::params::BodyKind;
use crate::request::{BodyPayload, MultiMap};
use serde_json::Value;
use std::collections::HashMap;

/// Lookup over one source's received values.
///
/// Query and header maps are multi-valued; path and cookie maps are not.
#[derive(Debug, Clone, Copy)]
pub enum ParamLookup<'a> {
	Single(&'a HashMap<String, String>),
	Multi(&'a MultiMap),
}

impl ParamLookup<'_> {
	fn first(&self, alias: &str) -> Option<String> {
		match self {
			ParamLookup::Single(map) => map.get(alias).cloned(),
			ParamLookup::Multi(map) => map.get(alias).and_then(|v| v.first()).cloned(),
		}
	}

	fn list(&self, alias: &str) -> Option<Vec<String>> {
		match self {
			ParamLookup::Single(map) => map.get(alias).map(|v| vec![v.clone()]),
			ParamLookup::Multi(map) => map.get(alias).cloned(),
		}
	}
}

/// Bind one source's classified fields against its received values.
pub fn bind_params(fields: &[ParameterField], lookup: ParamLookup<'_>) -> (Args, Vec<BindingError>) {
	let mut values = Args::new();
	let mut errors = Vec::new();
	for field in fields {
		// body fields never reach this binder
		let source = match field.marker.source() {
			Some(source) => source,
			None => continue,
		};
		let loc = Location::param(source, &field.alias);

		let raw = if field.is_scalar_sequence() && matches!(lookup, ParamLookup::Multi(_)) {
			lookup
				.list(&field.alias)
				.filter(|items| !items.is_empty())
				.map(RawValue::StrList)
		} else {
			lookup.first(&field.alias).map(RawValue::Str)
		};

		match raw {
			None => bind_missing(field, loc, &mut values, &mut errors),
			Some(raw) => bind_present(field, raw, loc, &mut values, &mut errors),
		}
	}
	(values, errors)
}

/// Bind the node's body fields against the parsed body payload.
///
/// A single un-embedded field consumes the whole payload as its raw value;
/// embedded fields are looked up by alias inside the payload, with
/// list-shaped fields read multi-valued when the body came from form
/// encoding.
pub fn bind_body(fields: &[ParameterField], payload: Option<&BodyPayload>) -> (Args, Vec<BindingError>) {
	let mut values = Args::new();
	let mut errors = Vec::new();
	if fields.is_empty() {
		return (values, errors);
	}

	let alias_omitted = fields.len() == 1 && !fields[0].embedded();
	for field in fields {
		let loc = if alias_omitted {
			Location::body()
		} else {
			Location::body_field(&field.alias)
		};

		let raw = match lookup_body_value(field, payload, alias_omitted) {
			Ok(raw) => raw,
			Err(()) => {
				// structurally un-addressable payload (e.g. a JSON array
				// where embedded fields expect an object)
				errors.push(BindingError::missing(loc));
				continue;
			}
		};

		if is_missing(field, &raw) {
			bind_missing(field, loc, &mut values, &mut errors);
		} else if let Some(raw) = raw {
			bind_present(field, raw, loc, &mut values, &mut errors);
		}
	}
	(values, errors)
}

/// `Err(())` marks a payload the field cannot be addressed in at all.
fn lookup_body_value(
	field: &ParameterField,
	payload: Option<&BodyPayload>,
	alias_omitted: bool,
) -> Result<Option<RawValue>, ()> {
	let Some(payload) = payload else {
		return Ok(None);
	};
	match payload {
		BodyPayload::Json(value) => {
			if alias_omitted {
				Ok(Some(RawValue::Json(value.clone())))
			} else {
				match value {
					Value::Object(map) => {
						Ok(map.get(&field.alias).cloned().map(RawValue::Json))
					}
					_ => Err(()),
				}
			}
		}
		BodyPayload::Form(map) => {
			if field.is_sequence() {
				Ok(map.get(&field.alias).cloned().map(RawValue::StrList))
			} else {
				Ok(map
					.get(&field.alias)
					.and_then(|v| v.first())
					.cloned()
					.map(RawValue::Str))
			}
		}
		BodyPayload::Bytes(bytes) => {
			if alias_omitted {
				Ok(Some(RawValue::Bytes(bytes.clone())))
			} else {
				Err(())
			}
		}
	}
}

/// Empty form strings and empty form lists count as missing, like the
/// wire sends them for blank inputs.
fn is_missing(field: &ParameterField, raw: &Option<RawValue>) -> bool {
	let is_form = matches!(
		field.marker.as_body().map(|m| m.kind),
		Some(BodyKind::Form) | Some(BodyKind::File)
	);
	match raw {
		None => true,
		Some(RawValue::Str(s)) => is_form && s.is_empty(),
		Some(RawValue::StrList(items)) => is_form && field.is_sequence() && items.is_empty(),
		Some(RawValue::Json(Value::Null)) => true,
		_ => false,
	}
}

fn bind_missing(
	field: &ParameterField,
	loc: Location,
	values: &mut Args,
	errors: &mut Vec<BindingError>,
) {
	if field.required {
		errors.push(BindingError::missing(loc));
	} else {
		// deep copy, so handlers cannot mutate a shared default
		let default = field.default.clone().unwrap_or(Value::Null);
		values.insert_json(field.name.clone(), default);
	}
}

fn bind_present(
	field: &ParameterField,
	raw: RawValue,
	loc: Location,
	values: &mut Args,
	errors: &mut Vec<BindingError>,
) {
	match field.validator.validate(raw, values, &loc) {
		Ok(value) => values.insert_json(field.name.clone(), value),
		Err(errs) => errors.extend(errs),
	}
}
