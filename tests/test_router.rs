use std::sync::{Arc, Mutex};

use wicket::http::request::{Method, Request, RequestBuilder};
use wicket::http::response::StatusCode;
use wicket::http::writer::ResponseWriter;
use wicket::router::{MethodMask, Params, Route, RouteError, Router};

type Calls = Arc<Mutex<Vec<String>>>;

fn recording(calls: &Calls, tag: &'static str) -> impl Fn(&Params, &Request, &mut ResponseWriter) + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |params, _, writer| {
        let capture = params.get(1).unwrap_or("-");
        calls.lock().unwrap().push(format!("{}:{}", tag, capture));
        writer.write_status(StatusCode::Ok);
    }
}

fn request(method: Method, url: &str) -> Request {
    RequestBuilder::new().method(method).url(url).build().unwrap()
}

fn items_router(calls: &Calls) -> Router {
    let mut router = Router::new();
    router
        .add_route(Route::new(r"^/items/(\d+)$", MethodMask::GET, recording(calls, "R1")))
        .unwrap();
    router
        .add_route(Route::any(r"^/items/.*$", recording(calls, "R2")))
        .unwrap();
    router
}

#[test]
fn test_routing_precedence() {
    let calls = Calls::default();
    let router = items_router(&calls);
    let mut writer = ResponseWriter::default();

    assert!(router.handle_request(&request(Method::GET, "/items/42"), &mut writer));
    assert!(router.handle_request(&request(Method::POST, "/items/42"), &mut writer));
    assert!(!router.handle_request(&request(Method::GET, "/nope"), &mut writer));

    assert_eq!(*calls.lock().unwrap(), vec!["R1:42", "R2:-"]);
}

#[test]
fn test_first_match_wins_over_more_specific_route() {
    let calls = Calls::default();
    let mut router = Router::new();
    router.add_route(Route::any("/items/.*", recording(&calls, "broad"))).unwrap();
    router
        .add_route(Route::new(r"/items/(\d+)", MethodMask::GET, recording(&calls, "exact")))
        .unwrap();

    let mut writer = ResponseWriter::default();
    router.handle_request(&request(Method::GET, "/items/1"), &mut writer);

    assert_eq!(*calls.lock().unwrap(), vec!["broad:-"]);
}

#[test]
fn test_query_is_not_part_of_match() {
    let calls = Calls::default();
    let router = items_router(&calls);
    let mut writer = ResponseWriter::default();

    assert!(router.handle_request(&request(Method::GET, "/items/7?verbose=true"), &mut writer));
    assert_eq!(*calls.lock().unwrap(), vec!["R1:7"]);
}

#[test]
fn test_combined_mask() {
    let calls = Calls::default();
    let mut router = Router::new();
    router
        .add_route(Route::new(
            "/api",
            MethodMask::PUT | MethodMask::DELETE,
            recording(&calls, "api"),
        ))
        .unwrap();

    let mut writer = ResponseWriter::default();
    assert!(!router.handle_request(&request(Method::GET, "/api"), &mut writer));
    assert!(router.handle_request(&request(Method::DELETE, "/api"), &mut writer));
    assert!(router.handle_request(&request(Method::PUT, "/api"), &mut writer));
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[test]
fn test_invalid_registrations() {
    let calls = Calls::default();
    let mut router = items_router(&calls);

    assert_eq!(
        router.add_route(Route::new("/x", MethodMask::EMPTY, recording(&calls, "x"))),
        Err(RouteError::EmptyMethodMask)
    );
    assert!(matches!(
        router.add_route(Route::any("/items/[", recording(&calls, "y"))),
        Err(RouteError::InvalidPattern { .. })
    ));
    assert_eq!(router.len(), 2);

    // Earlier routes still dispatch.
    let mut writer = ResponseWriter::default();
    assert!(router.handle_request(&request(Method::GET, "/items/3"), &mut writer));
}

#[test]
fn test_named_captures() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let mut router = Router::new();
    router
        .add_route(Route::new(
            r"/users/(?P<user>[a-z]+)/posts/(?P<post>\d+)",
            MethodMask::GET,
            move |params, _, writer| {
                *sink.lock().unwrap() = Some((
                    params.name("user").map(str::to_string),
                    params.name("post").map(str::to_string),
                ));
                writer.write_status(StatusCode::NoContent);
            },
        ))
        .unwrap();

    let mut writer = ResponseWriter::default();
    assert!(router.handle_request(&request(Method::GET, "/users/ada/posts/12"), &mut writer));
    assert_eq!(
        *seen.lock().unwrap(),
        Some((Some("ada".to_string()), Some("12".to_string())))
    );
}

#[test]
fn test_captures_see_decoded_path() {
    let calls = Calls::default();
    let mut router = Router::new();
    router
        .add_route(Route::new("/files/(.+)", MethodMask::GET, recording(&calls, "file")))
        .unwrap();

    let mut writer = ResponseWriter::default();
    assert!(router.handle_request(&request(Method::GET, "/files/a%20b.txt"), &mut writer));
    assert_eq!(*calls.lock().unwrap(), vec!["file:a b.txt"]);
}
