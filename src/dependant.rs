//! Dependant graph: build, flatten, synthesize
//!
//! A [`Dependant`] is one node of the static dependency tree built from a
//! [`Dependency`]'s parameter declarations. The tree is built once at
//! handler registration and is read-only afterwards, with one exception:
//! body-field `embed` flags are forced true (once, during body-schema
//! synthesis) when the flattened tree carries more than one body field.

use crate::dependency::{CallableId, Dependency};
use crate::error::BuildError;
use crate::field::{FieldMarker, FieldType, ParameterField, TypeValidator};
use crate::params::{BodyKind, BodyMarker, Marker, Source};
use std::collections::HashSet;
use std::sync::Arc;

/// Memoization key of one dependency within a single resolution pass:
/// callable identity plus auxiliary qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub callable: CallableId,
	pub qualifier: Vec<String>,
}

/// One node in the static dependency tree.
pub struct Dependant {
	pub path_params: Vec<ParameterField>,
	pub query_params: Vec<ParameterField>,
	pub header_params: Vec<ParameterField>,
	pub cookie_params: Vec<ParameterField>,
	pub body_params: Vec<ParameterField>,
	/// Child nodes, resolved strictly before this node's own parameters
	/// are bound.
	pub dependencies: Vec<Dependant>,
	pub call: Arc<Dependency>,
	/// Key of this node's value in the parent's bound arguments; `None`
	/// for anonymous (parameter-less spliced) dependencies and the root.
	pub name: Option<String>,
	pub use_cache: bool,
	pub cache_key: CacheKey,
	/// Name of the parameter receiving the in-flight response, if any.
	pub response_param_name: Option<String>,
}

impl Dependant {
	fn empty(call: Arc<Dependency>, name: Option<String>, use_cache: bool) -> Self {
		let cache_key = CacheKey {
			callable: call.id(),
			qualifier: call.qualifier().to_vec(),
		};
		Self {
			path_params: Vec::new(),
			query_params: Vec::new(),
			header_params: Vec::new(),
			cookie_params: Vec::new(),
			body_params: Vec::new(),
			dependencies: Vec::new(),
			call,
			name,
			use_cache,
			cache_key,
			response_param_name: None,
		}
	}
}

impl std::fmt::Debug for Dependant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dependant")
			.field("call", &self.call.name())
			.field("name", &self.name)
			.field("use_cache", &self.use_cache)
			.field("dependencies", &self.dependencies.len())
			.finish_non_exhaustive()
	}
}

/// Build the dependency tree rooted at `call`.
///
/// Every parameter declaration is classified in declaration order; nested
/// `Depends` markers recurse. All malformed-signature conditions surface
/// here, at registration, never at request time.
pub fn build_dependant(call: &Arc<Dependency>) -> Result<Dependant, BuildError> {
	build_node(call, None, true)
}

/// Build an anonymous node for a dependency spliced in at registration
/// (route- or application-level). Its value is resolved, cached and
/// discarded; no parameter receives it.
pub(crate) fn build_anonymous(depends: &crate::params::Depends) -> Result<Dependant, BuildError> {
	build_node(&depends.dependency, None, depends.use_cache)
}

fn build_node(
	call: &Arc<Dependency>,
	name: Option<String>,
	use_cache: bool,
) -> Result<Dependant, BuildError> {
	let mut dependant = Dependant::empty(Arc::clone(call), name, use_cache);
	for decl in call.params() {
		match &decl.marker {
			Some(Marker::Depends(depends)) => {
				let child = build_node(
					&depends.dependency,
					Some(decl.name.clone()),
					depends.use_cache,
				)?;
				dependant.dependencies.push(child);
			}
			Some(Marker::ResponseSink) => {
				dependant.response_param_name = Some(decl.name.clone());
			}
			_ => classify_param(decl, &mut dependant)?,
		}
	}
	check_alias_uniqueness(&dependant)?;
	tracing::debug!(
		dependency = call.name(),
		children = dependant.dependencies.len(),
		"built dependant node"
	);
	Ok(dependant)
}

fn classify_param(
	decl: &crate::dependency::ParamDecl,
	dependant: &mut Dependant,
) -> Result<(), BuildError> {
	// An un-marked, un-defaulted parameter is an implicit Path field and
	// must be scalar; that failure is a registration-time error.
	let force_path = decl.marker.is_none() && decl.default.is_none();
	let field = param_field(decl, force_path)?;

	match &field.marker {
		FieldMarker::Param { source: Source::Path } => {
			if !field.is_scalar() {
				return Err(BuildError::NonScalarPathParam {
					name: field.name.clone(),
				});
			}
			dependant.path_params.push(field);
		}
		FieldMarker::Param { source } => {
			let source = *source;
			if field.is_scalar() {
				route_field(field, source, dependant);
			} else if matches!(source, Source::Query | Source::Header)
				&& field.is_scalar_sequence()
			{
				route_field(field, source, dependant);
			} else {
				return Err(BuildError::ExpectedBodyMarker {
					name: field.name.clone(),
				});
			}
		}
		FieldMarker::Body(_) => dependant.body_params.push(field),
	}
	Ok(())
}

fn route_field(field: ParameterField, source: Source, dependant: &mut Dependant) {
	match source {
		Source::Path => dependant.path_params.push(field),
		Source::Query => dependant.query_params.push(field),
		Source::Header => dependant.header_params.push(field),
		Source::Cookie => dependant.cookie_params.push(field),
	}
}

/// Classify one declaration into a [`ParameterField`].
fn param_field(
	decl: &crate::dependency::ParamDecl,
	force_path: bool,
) -> Result<ParameterField, BuildError> {
	let required = decl.default.is_none();

	let (marker, explicit_alias, had_marker) = match &decl.marker {
		Some(Marker::Param(param)) => {
			let mut source = param.source.unwrap_or(Source::Path);
			if force_path {
				source = Source::Path;
			}
			(FieldMarker::Param { source }, param.alias.clone(), true)
		}
		Some(Marker::Body(body)) => (FieldMarker::Body(body.clone()), body.alias.clone(), true),
		None => (
			FieldMarker::Param {
				source: Source::Path,
			},
			None,
			false,
		),
		// Depends / ResponseSink never reach classification
		Some(_) => unreachable!("non-field markers are handled by the builder"),
	};

	let alias = match &explicit_alias {
		Some(alias) => alias.clone(),
		None => match &marker {
			// header aliases follow the wire convention: first letter
			// capitalized, the rest untouched
			FieldMarker::Param {
				source: Source::Header,
			} => capitalize_first(&decl.name),
			_ => decl.name.clone(),
		},
	};

	let validator = decl
		.validator
		.clone()
		.unwrap_or_else(|| TypeValidator::new(decl.ty.clone()).into_arc());

	let mut field = ParameterField {
		name: decl.name.clone(),
		ty: decl.ty.clone(),
		required,
		default: decl.default.clone(),
		alias,
		marker,
		validator,
		sub_fields: Vec::new(),
	};

	// A non-scalar field that carries no explicit marker can only be a
	// body field; the forced-path case keeps its Path marker so the
	// scalar check rejects it at registration.
	if !force_path && !had_marker && !field.is_scalar() {
		field.marker = FieldMarker::Body(BodyMarker::json());
	}
	Ok(field)
}

fn capitalize_first(name: &str) -> String {
	let mut chars = name.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
		None => String::new(),
	}
}

fn check_alias_uniqueness(dependant: &Dependant) -> Result<(), BuildError> {
	let lists = [
		(Source::Path, &dependant.path_params),
		(Source::Query, &dependant.query_params),
		(Source::Header, &dependant.header_params),
		(Source::Cookie, &dependant.cookie_params),
	];
	for (source, fields) in lists {
		let mut seen = HashSet::new();
		for field in fields {
			if !seen.insert(field.alias.as_str()) {
				return Err(BuildError::DuplicateAlias {
					source,
					alias: field.alias.clone(),
				});
			}
		}
	}
	Ok(())
}

/// Aggregate parameter set of a flattened dependency tree.
#[derive(Debug, Default, Clone)]
pub struct FlatParams {
	pub path_params: Vec<ParameterField>,
	pub query_params: Vec<ParameterField>,
	pub header_params: Vec<ParameterField>,
	pub cookie_params: Vec<ParameterField>,
	pub body_params: Vec<ParameterField>,
}

/// Merge a tree into one aggregate set of parameters per source, in
/// pre-order (parent fields before children's).
///
/// With `skip_repeats`, a branch whose cache key was already visited in
/// this pass is skipped — the memoized occurrence contributes no second
/// copy of its parameters. Used only for body-schema synthesis (and schema
/// export); runtime execution order is the resolver's business.
pub fn flatten_dependant(dependant: &Dependant, skip_repeats: bool) -> FlatParams {
	let mut flat = FlatParams::default();
	let mut visited = Vec::new();
	flatten_into(dependant, skip_repeats, &mut visited, &mut flat);
	flat
}

fn flatten_into(
	node: &Dependant,
	skip_repeats: bool,
	visited: &mut Vec<CacheKey>,
	out: &mut FlatParams,
) {
	visited.push(node.cache_key.clone());
	out.path_params.extend(node.path_params.iter().cloned());
	out.query_params.extend(node.query_params.iter().cloned());
	out.header_params.extend(node.header_params.iter().cloned());
	out.cookie_params.extend(node.cookie_params.iter().cloned());
	out.body_params.extend(node.body_params.iter().cloned());
	for child in &node.dependencies {
		if skip_repeats && visited.contains(&child.cache_key) {
			continue;
		}
		flatten_into(child, skip_repeats, visited, out);
	}
}

/// Collapse the tree's body-bearing parameters into the route's body
/// schema.
///
/// Zero body fields need no schema. A single un-embedded field passes
/// through unchanged: its value is the whole body. Otherwise every body
/// field in the tree is forced embedded and a composite field named
/// `body` is synthesized over the flattened set.
pub fn body_field(dependant: &mut Dependant) -> Result<Option<ParameterField>, BuildError> {
	let flat = flatten_dependant(dependant, false);
	if flat.body_params.is_empty() {
		return Ok(None);
	}

	// Alias collisions across branches would make two declared inputs
	// fight over one body key; fail registration instead.
	let mut seen = HashSet::new();
	for field in &flat.body_params {
		if !seen.insert(field.alias.as_str()) {
			return Err(BuildError::DuplicateBodyAlias {
				alias: field.alias.clone(),
			});
		}
	}

	let first = &flat.body_params[0];
	if flat.body_params.len() == 1 && !first.embedded() {
		return Ok(Some(first.clone()));
	}

	force_embed(dependant);
	let mut sub_fields = flat.body_params;
	for field in &mut sub_fields {
		field.set_embed();
	}

	let required = sub_fields.iter().any(|f| f.required);
	let kind = sub_fields
		.iter()
		.filter_map(|f| f.marker.as_body().map(|m| m.kind))
		.max()
		.unwrap_or(BodyKind::Json);
	let media_type = match kind {
		BodyKind::Json => shared_media_type(&sub_fields),
		_ => None,
	};

	let marker = BodyMarker {
		kind,
		embed: false,
		media_type,
		alias: None,
	};
	Ok(Some(ParameterField {
		name: "body".to_string(),
		ty: FieldType::Object,
		required,
		default: None,
		alias: "body".to_string(),
		marker: FieldMarker::Body(marker),
		validator: TypeValidator::new(FieldType::Object).into_arc(),
		sub_fields,
	}))
}

/// Mixed JSON media types leave the composite without a single media type.
fn shared_media_type(fields: &[ParameterField]) -> Option<String> {
	let mut media_types = fields
		.iter()
		.filter_map(|f| f.marker.as_body())
		.filter(|m| m.kind == BodyKind::Json)
		.map(BodyMarker::effective_media_type);
	let first = media_types.next()?;
	if media_types.all(|mt| mt == first) {
		Some(first.to_string())
	} else {
		None
	}
}

fn force_embed(node: &mut Dependant) {
	for field in &mut node.body_params {
		field.set_embed();
	}
	for child in &mut node.dependencies {
		force_embed(child);
	}
}
