//! Request dispatch
//!
//! Routes are plain data: a path pattern and a method mask. The router scans
//! them in registration order and hands the request to the first match.

pub mod route;

pub use route::{Handler, MethodMask, Params, Route, RouteError};

use regex::Regex;
use tracing::{debug, warn};

use crate::http::request::Request;
use crate::http::writer::ResponseWriter;

struct CompiledRoute {
    pattern: Regex,
    methods: MethodMask,
    handler: Handler,
}

/// Ordered, first-match-wins route table.
#[derive(Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route after the ones already present.
    ///
    /// A route with an empty method mask or a pattern that does not compile
    /// is discarded; earlier registrations are unaffected.
    pub fn add_route(&mut self, route: Route) -> Result<(), RouteError> {
        if route.methods.is_empty() {
            warn!(pattern = %route.pattern, "rejecting route with empty method mask");
            return Err(RouteError::EmptyMethodMask);
        }

        let anchored = format!("^(?:{})$", route.pattern);
        let pattern = Regex::new(&anchored).map_err(|error| {
            warn!(pattern = %route.pattern, %error, "rejecting route");
            RouteError::InvalidPattern {
                pattern: route.pattern.clone(),
                reason: error.to_string(),
            }
        })?;

        debug!(pattern = %route.pattern, methods = ?route.methods, "route registered");
        self.routes.push(CompiledRoute {
            pattern,
            methods: route.methods,
            handler: route.handler,
        });
        Ok(())
    }

    /// Dispatches `request` to the first matching route.
    ///
    /// Returns `false` when nothing matched; the caller answers with a 404.
    pub fn handle_request(&self, request: &Request, writer: &mut ResponseWriter) -> bool {
        let path = request.path();

        for route in &self.routes {
            if !route.methods.contains(request.method) {
                continue;
            }

            let Some(captures) = route.pattern.captures(&path) else {
                continue;
            };

            let params = Params::from_captures(&route.pattern, &captures);
            debug!(method = %request.method, %path, "dispatching");
            (route.handler)(&params, request, writer);
            return true;
        }

        debug!(method = %request.method, %path, "no route matched");
        false
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
