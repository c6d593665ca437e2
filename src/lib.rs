//! # Dependant
//!
//! FastAPI-style request binding and dependency resolution for HTTP
//! handlers.
//!
//! A handler declares its inputs as typed parameters with markers; at
//! registration the declarations become a static dependency tree, and at
//! request time the tree is walked once to bind every parameter, resolve
//! every sub-dependency and invoke the handler.
//!
//! ## Features
//!
//! - **Declarative**: Parameter sources (path, query, header, cookie, body)
//!   are explicit per-parameter markers
//! - **Composable**: Dependencies can depend on other dependencies
//! - **Cached**: Repeated sub-dependencies resolve once per request
//! - **Scoped**: Generator-style dependencies release their resources at
//!   request teardown, in reverse acquisition order
//! - **Collecting**: Binding failures across the whole tree surface
//!   together as one validation error
//!
//! ## Example
//!
//! ```rust
//! use dependant::{App, Dependency, FieldType, Param, ParamDecl, Request};
//! use serde_json::json;
//!
//! let handler = Dependency::new("read_item", |args| {
//!     Ok(json!({
//!         "id": args.json("id").cloned().unwrap_or(json!(null)),
//!         "q": args.json("q").cloned().unwrap_or(json!(null)),
//!     }))
//! })
//! .param(ParamDecl::new("id", FieldType::Int))
//! .param(
//!     ParamDecl::new("q", FieldType::Str)
//!         .marker(Param::query())
//!         .default_value(json!(null)),
//! )
//! .into_arc();
//!
//! let route = App::new().route(&handler)?;
//! let request = Request::builder()
//!     .path_param("id", "42")
//!     .query("q", "hello")
//!     .build();
//! let response = route.handle(&request)?;
//! assert_eq!(response.body_str(), Some(r#"{"id":42,"q":"hello"}"#));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod app;
pub mod binder;
pub mod dependant;
pub mod dependency;
pub mod error;
pub mod field;
pub mod params;
pub mod request;
pub mod resolver;
pub mod response;

pub use app::{App, ExceptionHandlers, RouteHandler, validation_detail};
pub use dependant::{CacheKey, Dependant, FlatParams, build_dependant, flatten_dependant};
pub use dependency::{ArgValue, Args, CallableId, Dependency, Handler, ParamDecl, ScopedValue};
pub use error::{
	BindingError, BindingErrorKind, BuildError, HandlerError, HttpError, LocSegment, Location,
	ValidationFailed,
};
pub use field::{
	Constraints, FieldMarker, FieldType, ParameterField, RawValue, TypeValidator, Validate,
};
pub use params::{BodyKind, BodyMarker, Depends, Marker, Param, Source};
pub use request::{BodyPayload, MultiMap, Request, RequestBuilder};
pub use resolver::{DependencyCache, ResolutionScope, solve};
pub use response::{ContentWriter, Response, ResponseHandle};
