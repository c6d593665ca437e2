//! Tests for dependency resolution through registered routes

use dependant::{
	App, Dependency, Depends, FieldType, HandlerError, HttpError, Marker, Param, ParamDecl,
	Request, ScopedValue,
};
use http::StatusCode;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn counted(name: &str, counter: &Arc<AtomicUsize>) -> Arc<Dependency> {
	let counter = Arc::clone(counter);
	Dependency::new(name, move |_| {
		let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(json!(n))
	})
	.into_arc()
}

#[test]
fn shared_dependency_resolves_once_per_request() {
	let invocations = Arc::new(AtomicUsize::new(0));
	let shared = counted("shared", &invocations);

	let handler = Dependency::new("handler", |args| {
		Ok(json!({ "a": args.json("a"), "b": args.json("b") }))
	})
	.param(ParamDecl::new("a", FieldType::Any).marker(Depends::new(Arc::clone(&shared))))
	.param(ParamDecl::new("b", FieldType::Any).marker(Depends::new(Arc::clone(&shared))))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let response = route.handle(&Request::default()).unwrap();
	assert_eq!(invocations.load(Ordering::SeqCst), 1);
	assert_eq!(response.body_str(), Some(r#"{"a":1,"b":1}"#));

	// the cache is per request, not per route
	route.handle(&Request::default()).unwrap();
	assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[test]
fn no_cache_dependency_is_reinvoked_per_usage_site() {
	let invocations = Arc::new(AtomicUsize::new(0));
	let shared = counted("shared", &invocations);

	let handler = Dependency::new("handler", |args| {
		Ok(json!({ "a": args.json("a"), "b": args.json("b") }))
	})
	.param(ParamDecl::new("a", FieldType::Any).marker(Depends::no_cache(Arc::clone(&shared))))
	.param(ParamDecl::new("b", FieldType::Any).marker(Depends::no_cache(Arc::clone(&shared))))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let response = route.handle(&Request::default()).unwrap();
	assert_eq!(invocations.load(Ordering::SeqCst), 2);
	assert_eq!(response.body_str(), Some(r#"{"a":1,"b":2}"#));
}

#[test]
fn nested_dependencies_bind_their_own_request_params() {
	let pager = Dependency::new("pager", |args| {
		Ok(json!({
			"skip": args.json("skip"),
			"limit": args.json("limit"),
		}))
	})
	.param(
		ParamDecl::new("skip", FieldType::Int)
			.marker(Param::query())
			.default_value(json!(0)),
	)
	.param(
		ParamDecl::new("limit", FieldType::Int)
			.marker(Param::query())
			.default_value(json!(100)),
	)
	.into_arc();

	let handler = Dependency::new("list_items", |args| {
		Ok(json!({ "paging": args.json("paging") }))
	})
	.param(ParamDecl::new("paging", FieldType::Any).marker(Depends::new(pager)))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let request = Request::builder().query("skip", "20").build();
	let response = route.handle(&request).unwrap();
	assert_eq!(
		response.body_str(),
		Some(r#"{"paging":{"limit":100,"skip":20}}"#)
	);
}

#[test]
fn scoped_dependency_releases_after_the_handler() {
	let events = Arc::new(Mutex::new(Vec::new()));

	let log = Arc::clone(&events);
	let session = Dependency::scoped("session", move |_| {
		let log = Arc::clone(&log);
		log.lock().unwrap().push("open".to_string());
		Ok(ScopedValue::new(json!("session-1"), move || {
			log.lock().unwrap().push("close".to_string());
		}))
	})
	.into_arc();

	let log = Arc::clone(&events);
	let handler = Dependency::new("handler", move |args| {
		log.lock().unwrap().push("handle".to_string());
		Ok(json!({ "session": args.json("session") }))
	})
	.param(ParamDecl::new("session", FieldType::Any).marker(Depends::new(session)))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	route.handle(&Request::default()).unwrap();
	assert_eq!(*events.lock().unwrap(), vec!["open", "handle", "close"]);
}

#[test]
fn scoped_dependency_releases_even_when_the_handler_fails() {
	let released = Arc::new(AtomicUsize::new(0));

	let counter = Arc::clone(&released);
	let session = Dependency::scoped("session", move |_| {
		let counter = Arc::clone(&counter);
		Ok(ScopedValue::new(json!(null), move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}))
	})
	.into_arc();

	let handler = Dependency::new("handler", |_| {
		Err(HttpError::new(StatusCode::CONFLICT, "already exists").into())
	})
	.param(ParamDecl::new("session", FieldType::Any).marker(Depends::new(session)))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let response = route.handle(&Request::default()).unwrap();
	assert_eq!(response.status, StatusCode::CONFLICT);
	assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn scoped_dependency_releases_when_a_sibling_fails_binding() {
	let released = Arc::new(AtomicUsize::new(0));

	let counter = Arc::clone(&released);
	let session = Dependency::scoped("session", move |_| {
		let counter = Arc::clone(&counter);
		Ok(ScopedValue::new(json!(null), move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}))
	})
	.into_arc();

	let handler = Dependency::new("handler", |_| Ok(json!(null)))
		.param(ParamDecl::new("session", FieldType::Any).marker(Depends::new(session)))
		.param(ParamDecl::new("id", FieldType::Int))
		.into_arc();
	let route = App::new().route(&handler).unwrap();

	let response = route.handle(&Request::default()).unwrap();
	assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn http_error_from_a_dependency_suppresses_the_handler() {
	let handled = Arc::new(AtomicUsize::new(0));

	let gate = Dependency::new("gate", |args| {
		match args.json("x_token").and_then(Value::as_str) {
			Some("secret") => Ok(json!(true)),
			_ => Err(HttpError::new(StatusCode::UNAUTHORIZED, "bad token").into()),
		}
	})
	.param(
		ParamDecl::new("x_token", FieldType::Str)
			.marker(Param::header())
			.default_value(json!(null)),
	)
	.into_arc();

	let counter = Arc::clone(&handled);
	let handler = Dependency::new("handler", move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
		Ok(json!({"ok": true}))
	})
	.param(ParamDecl::new("auth", FieldType::Any).marker(Depends::new(gate)))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let denied = route.handle(&Request::default()).unwrap();
	assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
	assert_eq!(handled.load(Ordering::SeqCst), 0);

	let request = Request::builder().header("X_token", "secret").build();
	let allowed = route.handle(&request).unwrap();
	assert_eq!(allowed.status, StatusCode::OK);
	assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[test]
fn app_and_route_level_dependencies_run_in_splice_order() {
	let order = Arc::new(Mutex::new(Vec::new()));

	let logger = |name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>| {
		let log = Arc::clone(log);
		Dependency::new(name, move |_| {
			log.lock().unwrap().push(name);
			Ok(json!(null))
		})
		.into_arc()
	};

	let app_dep = logger("app_dep", &order);
	let route_dep = logger("route_dep", &order);
	let own_dep = logger("own_dep", &order);

	let log = Arc::clone(&order);
	let handler = Dependency::new("handler", move |_| {
		log.lock().unwrap().push("handler");
		Ok(json!(null))
	})
	.param(ParamDecl::new("own", FieldType::Any).marker(Depends::new(own_dep)))
	.into_arc();

	let app = App::new().dependency(Depends::new(app_dep));
	let route = app.route_with(&handler, &[Depends::new(route_dep)]).unwrap();
	route.handle(&Request::default()).unwrap();
	assert_eq!(
		*order.lock().unwrap(),
		vec!["app_dep", "route_dep", "own_dep", "handler"]
	);
}

#[test]
fn unexpected_handler_errors_escape_to_the_caller() {
	let handler = Dependency::new("handler", |_| {
		Err(HandlerError::Other(anyhow::anyhow!("storage offline")))
	})
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let err = route.handle(&Request::default()).unwrap_err();
	assert!(matches!(err, HandlerError::Other(e) if e.to_string() == "storage offline"));
}

#[test]
fn response_sink_parameter_shapes_the_response() {
	let handler = Dependency::new("create_item", |args| {
		if let Some(response) = args.response("response") {
			response.set_status(StatusCode::CREATED);
		}
		Ok(json!({"created": true}))
	})
	.param(ParamDecl::new("response", FieldType::Any).marker(Marker::ResponseSink))
	.into_arc();
	let route = App::new().route(&handler).unwrap();

	let response = route.handle(&Request::default()).unwrap();
	assert_eq!(response.status, StatusCode::CREATED);
	assert_eq!(response.body_str(), Some(r#"{"created":true}"#));
}
