use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::http::request::{Method, Request};
use crate::http::writer::ResponseWriter;

/// Route callback: receives the path captures, the request and the writer.
pub type Handler = Arc<dyn Fn(&Params, &Request, &mut ResponseWriter) + Send + Sync>;

/// Set of methods a route accepts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodMask(u8);

impl MethodMask {
    pub const EMPTY: MethodMask = MethodMask(0);
    pub const GET: MethodMask = MethodMask(1 << 0);
    pub const PUT: MethodMask = MethodMask(1 << 1);
    pub const DELETE: MethodMask = MethodMask(1 << 2);
    pub const POST: MethodMask = MethodMask(1 << 3);
    /// Every method, including ones the parser does not recognise.
    pub const ALL: MethodMask = MethodMask(u8::MAX);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    pub fn contains(&self, method: Method) -> bool {
        if self.is_all() {
            return true;
        }
        match Self::bit(method) {
            Some(bit) => self.0 & bit.0 != 0,
            None => false,
        }
    }

    fn bit(method: Method) -> Option<MethodMask> {
        match method {
            Method::GET => Some(Self::GET),
            Method::PUT => Some(Self::PUT),
            Method::DELETE => Some(Self::DELETE),
            Method::POST => Some(Self::POST),
            Method::OTHER => None,
        }
    }
}

impl From<Method> for MethodMask {
    fn from(method: Method) -> Self {
        Self::bit(method).unwrap_or(Self::EMPTY)
    }
}

impl BitOr for MethodMask {
    type Output = MethodMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        MethodMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for MethodMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MethodMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("ALL");
        }

        let names: Vec<&str> = [Method::GET, Method::PUT, Method::DELETE, Method::POST]
            .into_iter()
            .filter(|method| self.contains(*method))
            .map(|method| method.as_str())
            .collect();

        if names.is_empty() {
            f.write_str("EMPTY")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// A path pattern, the methods it accepts and the handler to run.
///
/// The pattern is a regular expression matched against the full request
/// path (query excluded).
#[derive(Clone)]
pub struct Route {
    pub pattern: String,
    pub methods: MethodMask,
    pub handler: Handler,
}

impl Route {
    pub fn new<F>(pattern: impl Into<String>, methods: MethodMask, handler: F) -> Self
    where
        F: Fn(&Params, &Request, &mut ResponseWriter) + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            methods,
            handler: Arc::new(handler),
        }
    }

    /// A route accepting every method.
    pub fn any<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Params, &Request, &mut ResponseWriter) + Send + Sync + 'static,
    {
        Self::new(pattern, MethodMask::ALL, handler)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route accepts no methods")]
    EmptyMethodMask,
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Captures from a matched route pattern.
///
/// Index 0 is the whole path; groups follow in pattern order. Named groups
/// are also reachable by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    positional: Vec<Option<String>>,
    named: HashMap<String, String>,
}

impl Params {
    pub(crate) fn from_captures(pattern: &Regex, captures: &Captures<'_>) -> Self {
        let positional = captures
            .iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();

        let named = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Self { positional, named }
    }

    /// The capture at `index`, if that group participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index)?.as_deref()
    }

    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Number of capture slots, the whole match included.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}
