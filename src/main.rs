use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wicket::config::Config;
use wicket::http::mime;
use wicket::http::request::{Method, Request};
use wicket::http::response::StatusCode;
use wicket::http::writer::{ResponseWriter, StreamSource};
use wicket::router::{MethodMask, Route, Router};
use wicket::server;

/// In-memory table behind the `/api` demo routes.
#[derive(Default)]
struct Store {
    items: BTreeMap<u8, String>,
    log: Vec<String>,
}

type SharedStore = Arc<Mutex<Store>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let router = Arc::new(build_router(SharedStore::default(), PathBuf::from("public"))?);
    info!(routes = router.len(), "router ready");

    tokio::select! {
        res = server::listener::run(&cfg, router) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn build_router(store: SharedStore, root: PathBuf) -> anyhow::Result<Router> {
    let mut router = Router::new();

    let api = Arc::clone(&store);
    router.add_route(Route::new(
        "/api",
        MethodMask::GET | MethodMask::POST | MethodMask::PUT | MethodMask::DELETE,
        move |_, request, writer| handle_api(&api, request, writer),
    ))?;

    let page = Arc::clone(&store);
    router.add_route(Route::new("/test", MethodMask::GET, move |_, _, writer| {
        handle_test_page(&page, writer)
    }))?;

    router.add_route(Route::new("/files/(.+)", MethodMask::GET, move |params, _, writer| {
        handle_file(&root, params.get(1).unwrap_or_default(), writer)
    }))?;

    Ok(router)
}

fn handle_api(store: &SharedStore, request: &Request, writer: &mut ResponseWriter) {
    let Ok(mut store) = store.lock() else {
        writer.write_status(StatusCode::InternalServerError);
        return;
    };

    if request.method == Method::GET {
        let items: Vec<Value> = store
            .items
            .iter()
            .map(|(id, value)| json!({ "id": id, "value": value }))
            .collect();
        writer.write_json(&Value::Array(items), [("Cache-Control", "no-store")], StatusCode::Ok);
        return;
    }

    let document: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let id = document
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| u8::try_from(id).ok());
    let value = document.get("value").and_then(Value::as_str);

    match (request.method, id, value) {
        (Method::POST, Some(id), Some(value)) => {
            if store.items.contains_key(&id) {
                writer.write_typed(b"An element with such id already exists", mime::TEXT_PLAIN, StatusCode::Forbidden);
                return;
            }
            store.items.insert(id, value.to_string());
            store.log.push(format!("An element with id {} has been added", id));

            let location = id.to_string();
            writer.write(location.as_bytes(), [("Location", location.as_str())], StatusCode::Created);
        }
        (Method::PUT, Some(id), Some(value)) => {
            let message = match store.items.insert(id, value.to_string()) {
                Some(_) => format!("An element with id {} has been modified", id),
                None => format!("An element with id {} has been added", id),
            };
            store.log.push(message.clone());

            let location = id.to_string();
            writer.write(message.as_bytes(), [("Location", location.as_str())], StatusCode::Created);
        }
        (Method::DELETE, Some(id), _) => {
            if store.items.remove(&id).is_none() {
                writer.write_typed(b"No such element in table", mime::TEXT_PLAIN, StatusCode::NotFound);
                return;
            }
            let message = format!("An item with id({}) deleted", id);
            store.log.push(message.clone());
            writer.write_typed(message.as_bytes(), mime::TEXT_PLAIN, StatusCode::Ok);
        }
        _ => writer.write_typed(b"No value or id provided!", mime::TEXT_PLAIN, StatusCode::BadRequest),
    }
}

fn handle_test_page(store: &SharedStore, writer: &mut ResponseWriter) {
    let Ok(store) = store.lock() else {
        writer.write_status(StatusCode::InternalServerError);
        return;
    };

    let mut body = String::new();
    for (id, value) in &store.items {
        body.push_str(&format!("<tr>\n<td>{}</td> <td>{}</td></tr><br/>", id, escape(value)));
    }
    body.push_str("<br/>");
    for entry in &store.log {
        body.push_str(&format!("<tr>\n<td>{}</td></tr><br/>", escape(entry)));
    }

    let page = format!("<html>\n<body>\n{}</body>\n</html>", body);
    writer.write_typed(page.as_bytes(), mime::TEXT_HTML, StatusCode::Ok);
}

fn handle_file(root: &Path, relative: &str, writer: &mut ResponseWriter) {
    let relative = Path::new(relative);
    if !relative.components().all(|part| matches!(part, Component::Normal(_))) {
        writer.write_status(StatusCode::Forbidden);
        return;
    }

    let path = root.join(relative);
    if !path.is_file() {
        writer.write_status(StatusCode::NotFound);
        return;
    }

    let content_type = mime::from_path(&path);
    writer.write_stream_typed(StreamSource::path(path), content_type, StatusCode::Ok);
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
