//! Handler parameter sources and their extraction

use crate::enhancers::EnhancerRef;
use crate::handler::{Argument, Instance, NextFn};
use crate::pipes::{ArgumentMetadata, PipeTransform};
use crate::request::Request;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a handler parameter gets its value from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteParamtypes {
    /// Raw request object
    Request,
    /// Raw response handle; the handler takes over delivery
    Response,
    /// `next` callback; the handler takes over delivery
    Next,
    Body,
    Query,
    Param,
    Headers,
    Session,
    Ip,
    /// Whole inbound message (RPC and gateway handlers)
    Payload,
    /// User-defined extractor, identified by its tag
    Custom(String),
}

impl RouteParamtypes {
    pub fn as_str(&self) -> &str {
        match self {
            RouteParamtypes::Request => "request",
            RouteParamtypes::Response => "response",
            RouteParamtypes::Next => "next",
            RouteParamtypes::Body => "body",
            RouteParamtypes::Query => "query",
            RouteParamtypes::Param => "param",
            RouteParamtypes::Headers => "headers",
            RouteParamtypes::Session => "session",
            RouteParamtypes::Ip => "ip",
            RouteParamtypes::Payload => "payload",
            RouteParamtypes::Custom(tag) => tag,
        }
    }

    /// Only these kinds run through pipes.
    pub fn is_pipeable(&self) -> bool {
        matches!(
            self,
            RouteParamtypes::Body
                | RouteParamtypes::Query
                | RouteParamtypes::Param
                | RouteParamtypes::Payload
                | RouteParamtypes::Custom(_)
        )
    }

    /// Kinds through which the handler writes the response itself.
    pub fn takes_over_response(&self) -> bool {
        matches!(self, RouteParamtypes::Response | RouteParamtypes::Next)
    }
}

impl fmt::Display for RouteParamtypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied extractor: `(data, request) -> value`
pub type CustomParamFactory = Arc<dyn Fn(Option<&str>, &Request) -> Value + Send + Sync>;

/// Declared metadata of one handler parameter
#[derive(Clone)]
pub struct RouteParamMetadata {
    pub kind: RouteParamtypes,
    pub data: Option<String>,
    pub pipes: Vec<EnhancerRef>,
    /// Extractor of a `Custom` parameter
    pub factory: Option<CustomParamFactory>,
}

impl RouteParamMetadata {
    pub fn new(kind: RouteParamtypes) -> Self {
        Self {
            kind,
            data: None,
            pipes: Vec::new(),
            factory: None,
        }
    }

    /// Parameter backed by a user-defined extractor.
    pub fn custom<F>(tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Option<&str>, &Request) -> Value + Send + Sync + 'static,
    {
        Self::new(RouteParamtypes::Custom(tag.into())).with_factory(Arc::new(factory))
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_pipe(mut self, pipe: impl Into<EnhancerRef>) -> Self {
        self.pipes.push(pipe.into());
        self
    }

    pub fn with_factory(mut self, factory: CustomParamFactory) -> Self {
        self.factory = Some(factory);
        self
    }
}

impl fmt::Debug for RouteParamMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteParamMetadata")
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("pipes", &self.pipes)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// Compares declarations, not closures: two factories are equal when both
/// are present or both absent.
impl PartialEq for RouteParamMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.data == other.data
            && self.pipes.len() == other.pipes.len()
            && self.factory.is_some() == other.factory.is_some()
    }
}

/// Extracts un-piped argument values from the raw transport inputs
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteParamsFactory;

impl RouteParamsFactory {
    pub fn new() -> Self {
        Self
    }

    /// Value of a built-in source kind. Custom kinds yield `null` here;
    /// they go through their own factory.
    pub fn exchange_key_for_value(
        &self,
        kind: &RouteParamtypes,
        data: Option<&str>,
        request: &Arc<Request>,
        response: &Instance,
        next: &NextFn,
    ) -> Argument {
        match kind {
            RouteParamtypes::Request => Argument::Request(request.clone()),
            RouteParamtypes::Response => Argument::Response(response.clone()),
            RouteParamtypes::Next => Argument::Next(next.clone()),
            RouteParamtypes::Body => request.body_value(data).into(),
            RouteParamtypes::Query => request.query_value(data).into(),
            RouteParamtypes::Param => request.param_value(data).into(),
            RouteParamtypes::Headers => request.header_value(data).into(),
            RouteParamtypes::Session => request.session.clone().unwrap_or(Value::Null).into(),
            RouteParamtypes::Ip => request
                .ip
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null)
                .into(),
            RouteParamtypes::Payload | RouteParamtypes::Custom(_) => Argument::default(),
        }
    }
}

/// How a parameter's raw value is obtained
#[derive(Clone)]
enum Extractor {
    Builtin(RouteParamsFactory),
    /// `None` when no callable factory was declared
    Custom(Option<CustomParamFactory>),
}

/// Materialized parameter of one execution unit
#[derive(Clone)]
pub struct ParamProperties {
    pub index: usize,
    pub kind: RouteParamtypes,
    pub data: Option<String>,
    pub metatype: Option<String>,
    /// Parameter-scoped pipes
    pub pipes: Vec<Arc<dyn PipeTransform>>,
    extractor: Extractor,
}

impl ParamProperties {
    pub fn new(
        index: usize,
        param: &RouteParamMetadata,
        metatype: Option<String>,
        pipes: Vec<Arc<dyn PipeTransform>>,
        factory: RouteParamsFactory,
    ) -> Self {
        let extractor = match param.kind {
            RouteParamtypes::Custom(_) => Extractor::Custom(param.factory.clone()),
            _ => Extractor::Builtin(factory),
        };
        Self {
            index,
            kind: param.kind.clone(),
            data: param.data.clone(),
            metatype,
            pipes,
            extractor,
        }
    }

    /// Raw value for this parameter. An uncallable custom extractor
    /// yields `null` instead of failing.
    pub fn extract_value(&self, request: &Arc<Request>, response: &Instance, next: &NextFn) -> Argument {
        match &self.extractor {
            Extractor::Builtin(factory) => {
                factory.exchange_key_for_value(&self.kind, self.data.as_deref(), request, response, next)
            }
            Extractor::Custom(Some(custom)) => custom(self.data.as_deref(), request).into(),
            Extractor::Custom(None) => Argument::default(),
        }
    }

    pub fn argument_metadata(&self) -> ArgumentMetadata {
        ArgumentMetadata::new(self.kind.clone())
            .with_metatype(self.metatype.clone())
            .with_data(self.data.clone())
    }
}

impl fmt::Debug for ParamProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamProperties")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("metatype", &self.metatype)
            .field("pipes", &self.pipes.len())
            .finish()
    }
}
