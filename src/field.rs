//! Field classification and the validation capability
//!
//! [`FieldType`] is the static shape of one declared parameter. The
//! classifier decides whether a field is scalar (eligible for path, query,
//! header and cookie binding), a scalar sequence (eligible for multi-value
//! query/header binding) or composite (body only).
//!
//! Validation goes through the [`Validate`] trait so callers can plug in
//! their own coercion; [`TypeValidator`] is the built-in implementation,
//! coercing string-sourced raw values against the declared type and
//! checking optional range/length constraints.

use crate::dependency::Args;
use crate::error::{BindingError, BindingErrorKind, Location, LocSegment};
use crate::params::{BodyMarker, Source};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
	Str,
	Int,
	Float,
	Bool,
	/// Accepts any JSON value unchanged.
	Any,
	List(Box<FieldType>),
	/// A composite model; body-only.
	Object,
}

/// A scalar field holds a single simple value.
pub fn is_scalar(ty: &FieldType) -> bool {
	matches!(
		ty,
		FieldType::Str | FieldType::Int | FieldType::Float | FieldType::Bool | FieldType::Any
	)
}

/// A scalar sequence is a list of scalars; eligible for multi-value
/// query and header binding.
pub fn is_scalar_sequence(ty: &FieldType) -> bool {
	match ty {
		FieldType::List(inner) => is_scalar(inner),
		_ => false,
	}
}

/// Raw per-source value as the binder receives it, before coercion.
#[derive(Debug, Clone)]
pub enum RawValue {
	Str(String),
	StrList(Vec<String>),
	Json(Value),
	Bytes(Bytes),
}

/// The validation capability: raw value in, typed value or errors out.
///
/// Implementations must collect every error they find instead of stopping
/// at the first; the binder propagates the list verbatim.
pub trait Validate: Send + Sync {
	fn validate(
		&self,
		raw: RawValue,
		bound: &Args,
		loc: &Location,
	) -> Result<Value, Vec<BindingError>>;
}

/// Optional constraints checked after type coercion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
	/// Numeric lower bound (greater-or-equal).
	pub ge: Option<i64>,
	/// Numeric upper bound (less-or-equal).
	pub le: Option<i64>,
	pub min_length: Option<usize>,
	pub max_length: Option<usize>,
}

impl Constraints {
	pub fn is_empty(&self) -> bool {
		*self == Constraints::default()
	}
}

/// Built-in type-driven validator.
#[derive(Debug, Clone)]
pub struct TypeValidator {
	ty: FieldType,
	constraints: Constraints,
}

impl TypeValidator {
	pub fn new(ty: FieldType) -> Self {
		Self {
			ty,
			constraints: Constraints::default(),
		}
	}

	pub fn with_constraints(ty: FieldType, constraints: Constraints) -> Self {
		Self { ty, constraints }
	}

	pub fn ge(mut self, min: i64) -> Self {
		self.constraints.ge = Some(min);
		self
	}

	pub fn le(mut self, max: i64) -> Self {
		self.constraints.le = Some(max);
		self
	}

	pub fn min_length(mut self, min: usize) -> Self {
		self.constraints.min_length = Some(min);
		self
	}

	pub fn max_length(mut self, max: usize) -> Self {
		self.constraints.max_length = Some(max);
		self
	}

	pub fn into_arc(self) -> Arc<dyn Validate> {
		Arc::new(self)
	}

	fn coerce(&self, ty: &FieldType, raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
		match ty {
			FieldType::Str => coerce_str(raw, loc),
			FieldType::Int => coerce_int(raw, loc),
			FieldType::Float => coerce_float(raw, loc),
			FieldType::Bool => coerce_bool(raw, loc),
			FieldType::Any => coerce_any(raw, loc),
			FieldType::Object => coerce_object(raw, loc),
			FieldType::List(inner) => self.coerce_list(inner, raw, loc),
		}
	}

	fn coerce_list(
		&self,
		inner: &FieldType,
		raw: RawValue,
		loc: &Location,
	) -> Result<Value, Vec<BindingError>> {
		let items: Vec<RawValue> = match raw {
			RawValue::StrList(items) => items.into_iter().map(RawValue::Str).collect(),
			RawValue::Json(Value::Array(items)) => items.into_iter().map(RawValue::Json).collect(),
			// a single value still counts as a one-element sequence
			RawValue::Str(s) => vec![RawValue::Str(s)],
			_ => return Err(vec![BindingError::new(loc.clone(), BindingErrorKind::InvalidList)]),
		};
		let mut values = Vec::with_capacity(items.len());
		let mut errors = Vec::new();
		for (idx, item) in items.into_iter().enumerate() {
			let mut item_loc = loc.clone();
			item_loc.0.push(LocSegment::Index(idx));
			match self.coerce(inner, item, &item_loc) {
				Ok(value) => values.push(value),
				Err(errs) => errors.extend(errs),
			}
		}
		if errors.is_empty() {
			Ok(Value::Array(values))
		} else {
			Err(errors)
		}
	}

	fn check_constraints(&self, value: &Value, loc: &Location) -> Vec<BindingError> {
		let mut errors = Vec::new();
		if let Some(n) = value.as_i64() {
			if let Some(min) = self.constraints.ge
				&& n < min
			{
				errors.push(BindingError::new(loc.clone(), BindingErrorKind::TooSmall { min }));
			}
			if let Some(max) = self.constraints.le
				&& n > max
			{
				errors.push(BindingError::new(loc.clone(), BindingErrorKind::TooLarge { max }));
			}
		}
		if let Some(s) = value.as_str() {
			let chars = s.chars().count();
			if let Some(min) = self.constraints.min_length
				&& chars < min
			{
				errors.push(BindingError::new(loc.clone(), BindingErrorKind::TooShort { min }));
			}
			if let Some(max) = self.constraints.max_length
				&& chars > max
			{
				errors.push(BindingError::new(loc.clone(), BindingErrorKind::TooLong { max }));
			}
		}
		errors
	}
}

impl Validate for TypeValidator {
	fn validate(
		&self,
		raw: RawValue,
		_bound: &Args,
		loc: &Location,
	) -> Result<Value, Vec<BindingError>> {
		let value = self.coerce(&self.ty, raw, loc)?;
		let constraint_errors = self.check_constraints(&value, loc);
		if constraint_errors.is_empty() {
			Ok(value)
		} else {
			Err(constraint_errors)
		}
	}
}

fn invalid(loc: &Location, kind: BindingErrorKind) -> Vec<BindingError> {
	vec![BindingError::new(loc.clone(), kind)]
}

fn coerce_str(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Str(s) => Ok(Value::String(s)),
		RawValue::Json(Value::String(s)) => Ok(Value::String(s)),
		RawValue::Bytes(bytes) => match String::from_utf8(bytes.to_vec()) {
			Ok(s) => Ok(Value::String(s)),
			Err(_) => Err(invalid(loc, BindingErrorKind::InvalidEncoding)),
		},
		_ => Err(invalid(loc, BindingErrorKind::InvalidStr)),
	}
}

fn coerce_int(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Str(s) => s
			.trim()
			.parse::<i64>()
			.map(Value::from)
			.map_err(|_| invalid(loc, BindingErrorKind::InvalidInt)),
		RawValue::Json(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
		_ => Err(invalid(loc, BindingErrorKind::InvalidInt)),
	}
}

fn coerce_float(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Str(s) => s
			.trim()
			.parse::<f64>()
			.ok()
			.and_then(serde_json::Number::from_f64)
			.map(Value::Number)
			.ok_or_else(|| invalid(loc, BindingErrorKind::InvalidFloat)),
		RawValue::Json(Value::Number(n)) => Ok(Value::Number(n)),
		_ => Err(invalid(loc, BindingErrorKind::InvalidFloat)),
	}
}

fn coerce_bool(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
			"true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
			"false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
			_ => Err(invalid(loc, BindingErrorKind::InvalidBool)),
		},
		RawValue::Json(Value::Bool(b)) => Ok(Value::Bool(b)),
		_ => Err(invalid(loc, BindingErrorKind::InvalidBool)),
	}
}

fn coerce_any(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Str(s) => Ok(Value::String(s)),
		RawValue::StrList(items) => Ok(Value::Array(items.into_iter().map(Value::String).collect())),
		RawValue::Json(value) => Ok(value),
		RawValue::Bytes(bytes) => match String::from_utf8(bytes.to_vec()) {
			Ok(s) => Ok(Value::String(s)),
			Err(_) => Err(invalid(loc, BindingErrorKind::InvalidEncoding)),
		},
	}
}

fn coerce_object(raw: RawValue, loc: &Location) -> Result<Value, Vec<BindingError>> {
	match raw {
		RawValue::Json(value @ Value::Object(_)) => Ok(value),
		_ => Err(invalid(loc, BindingErrorKind::InvalidObject)),
	}
}

/// Where a classified field binds from.
#[derive(Debug, Clone)]
pub enum FieldMarker {
	Param { source: Source },
	Body(BodyMarker),
}

impl FieldMarker {
	pub fn source(&self) -> Option<Source> {
		match self {
			FieldMarker::Param { source } => Some(*source),
			FieldMarker::Body(_) => None,
		}
	}

	pub fn as_body(&self) -> Option<&BodyMarker> {
		match self {
			FieldMarker::Param { .. } => None,
			FieldMarker::Body(marker) => Some(marker),
		}
	}
}

/// One classified input to bind: the graph builder's output, the binder's
/// input.
#[derive(Clone)]
pub struct ParameterField {
	pub name: String,
	pub ty: FieldType,
	pub required: bool,
	pub default: Option<Value>,
	pub alias: String,
	pub marker: FieldMarker,
	pub validator: Arc<dyn Validate>,
	/// Populated only on a synthesized composite body field.
	pub sub_fields: Vec<ParameterField>,
}

impl ParameterField {
	pub fn is_scalar(&self) -> bool {
		is_scalar(&self.ty)
	}

	pub fn is_scalar_sequence(&self) -> bool {
		is_scalar_sequence(&self.ty)
	}

	pub fn is_sequence(&self) -> bool {
		matches!(self.ty, FieldType::List(_))
	}

	/// Embed flag of a body field; false for non-body fields.
	pub fn embedded(&self) -> bool {
		self.marker.as_body().map(|m| m.embed).unwrap_or(false)
	}

	pub(crate) fn set_embed(&mut self) {
		if let FieldMarker::Body(marker) = &mut self.marker {
			marker.embed = true;
		}
	}
}

impl std::fmt::Debug for ParameterField {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ParameterField")
			.field("name", &self.name)
			.field("ty", &self.ty)
			.field("required", &self.required)
			.field("alias", &self.alias)
			.field("marker", &self.marker)
			.field("sub_fields", &self.sub_fields.len())
			.finish()
	}
}
