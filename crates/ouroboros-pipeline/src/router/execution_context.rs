//! HTTP execution units
//!
//! [`RouterExecutionContext::create`] composes guards, pipes, interceptors,
//! the handler and response delivery into an [`ExecutionUnit`] for one
//! route. Handler metadata is reflected once per controller method and
//! cached; enhancer chains are resolved per `create` call since they
//! depend on the DI context.

use crate::config::ApplicationConfig;
use crate::context::{ContextType, ExecutionContext};
use crate::enhancers::ResolutionScope;
use crate::error::{PipelineError, PipelineResult, RENDER_RESULT_NOT_STRING};
use crate::guards::{GuardsConsumer, GuardsContextCreator, GuardsFn};
use crate::handler::{Argument, Controller, HandlerRef, HandlerResult, Instance, NextFn};
use crate::injector::{ContextId, InstanceResolver};
use crate::interceptors::{Interception, Interceptor, InterceptorsConsumer, InterceptorsContextCreator};
use crate::metadata::{HandlerKey, MetadataReader, MetadataReaderExt};
use crate::params::{ParamProperties, RouteParamsFactory};
use crate::pipes::{PipeTransform, PipesConsumer, PipesContextCreator};
use crate::request::Request;
use crate::router::metadata_storage::{HandlerMetadata, HandlerMetadataStorage, ResponseStrategy};
use crate::router::response_controller::{ResponseChannel, RouterResponseController};
use futures::future::try_join_all;
use futures::FutureExt;
use ouroboros_common::RequestMethod;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Builder
// ============================================================================

/// Builds execution units for HTTP routes
pub struct RouterExecutionContext<C: ResponseChannel> {
    metadata: Arc<dyn MetadataReader>,
    params_factory: RouteParamsFactory,
    pipes_context_creator: PipesContextCreator,
    pipes_consumer: PipesConsumer,
    guards_context_creator: GuardsContextCreator,
    guards_consumer: GuardsConsumer,
    interceptors_context_creator: InterceptorsContextCreator,
    interceptors_consumer: InterceptorsConsumer,
    response_controller: Arc<RouterResponseController<C>>,
    handler_metadata_storage: HandlerMetadataStorage,
}

impl<C: ResponseChannel> RouterExecutionContext<C> {
    pub fn new(
        channel: Arc<C>,
        metadata: Arc<dyn MetadataReader>,
        container: Option<Arc<dyn InstanceResolver>>,
        config: &ApplicationConfig,
    ) -> Self {
        let response_controller = RouterResponseController::new(channel)
            .with_default_redirect_status(config.settings.default_redirect_status)
            .with_html_content_type(config.settings.html_content_type.clone());

        Self {
            params_factory: RouteParamsFactory::new(),
            pipes_context_creator: PipesContextCreator::new(metadata.clone(), container.clone())
                .with_global(config.global_pipes().to_vec()),
            pipes_consumer: PipesConsumer::new(),
            guards_context_creator: GuardsContextCreator::new(metadata.clone(), container.clone())
                .with_global(config.global_guards().to_vec()),
            guards_consumer: GuardsConsumer::new(),
            interceptors_context_creator: InterceptorsContextCreator::new(metadata.clone(), container)
                .with_global(config.global_interceptors().to_vec()),
            interceptors_consumer: InterceptorsConsumer::new(),
            response_controller: Arc::new(response_controller),
            handler_metadata_storage: HandlerMetadataStorage::new(),
            metadata,
        }
    }

    pub fn handler_metadata_storage(&self) -> &HandlerMetadataStorage {
        &self.handler_metadata_storage
    }

    /// Compose the execution unit of one route.
    ///
    /// Request-scoped enhancers are resolved for `context_id` and held by the
    /// container until that context is released; pass a
    /// [`ContextScope`](crate::injector::ContextScope) id to tie the release
    /// to the unit's request, or [`STATIC_CONTEXT`](crate::injector::STATIC_CONTEXT)
    /// for application-wide units.
    pub fn create(
        &self,
        controller: &Controller,
        handler: &HandlerRef,
        module: &str,
        method: RequestMethod,
        context_id: ContextId,
        inquirer_id: Option<&str>,
    ) -> ExecutionUnit<C> {
        let metadata = self.get_metadata(controller, handler, method);
        let scope = ResolutionScope::new(module, context_id, inquirer_id);

        let params = self.exchange_keys_for_values(&metadata, scope);
        let route_pipes = self.pipes_context_creator.create(controller, handler, scope);
        let guards = self.guards_context_creator.create(controller, handler, scope);
        let interceptors = self.interceptors_context_creator.create(controller, handler, scope);

        let unit = UnitInner {
            key: handler.key(controller),
            controller: controller.clone(),
            handler: handler.clone(),
            guards: GuardsFn::new(guards, self.guards_consumer),
            pipes: PipesFn::new(&route_pipes, params, self.pipes_consumer),
            interceptors,
            interceptors_consumer: self.interceptors_consumer,
            response_controller: self.response_controller.clone(),
            metadata_reader: self.metadata.clone(),
            metadata,
        };
        tracing::debug!(
            handler = %unit.key,
            module = module,
            guards = unit.guards.as_ref().map_or(0, GuardsFn::len),
            interceptors = unit.interceptors.len(),
            "Created execution unit"
        );
        ExecutionUnit { inner: Arc::new(unit) }
    }

    /// Cached handler descriptor; reflected on first use only.
    pub fn get_metadata(
        &self,
        controller: &Controller,
        handler: &HandlerRef,
        method: RequestMethod,
    ) -> Arc<HandlerMetadata> {
        let key = handler.key(controller);
        if let Some(cached) = self.handler_metadata_storage.get(&key) {
            return cached;
        }

        let route_args = self.metadata.route_arguments(&key);
        let args_length = route_args.keys().next_back().map_or(0, |max| max + 1);
        let response_handled = route_args.values().any(|p| p.kind.takes_over_response());
        let http_status_code = self
            .metadata
            .http_code(&key)
            .unwrap_or_else(|| self.response_controller.status_by_method(method));

        let strategy = if let Some(template) = self.metadata.render_template(&key) {
            ResponseStrategy::Render { template }
        } else if let Some(redirect) = self.metadata.redirect(&key).filter(|r| !r.url.is_empty()) {
            ResponseStrategy::Redirect(redirect)
        } else {
            ResponseStrategy::Reply { response_handled }
        };

        let metadata = Arc::new(HandlerMetadata {
            args_length,
            params: route_args.into_iter().collect(),
            param_types: self.metadata.param_types(&key),
            http_status_code,
            response_headers: self.metadata.headers(&key),
            strategy,
        });
        tracing::debug!(handler = %key, args = args_length, status = http_status_code, "Cached handler metadata");
        self.handler_metadata_storage.set(key, metadata.clone());
        metadata
    }

    /// Materialize declared parameters, resolving their pipes in `scope`.
    pub fn exchange_keys_for_values(
        &self,
        metadata: &HandlerMetadata,
        scope: ResolutionScope<'_>,
    ) -> Vec<ParamProperties> {
        metadata
            .params
            .iter()
            .map(|(index, param)| {
                let pipes = self.pipes_context_creator.create_concrete_context(&param.pipes, scope);
                ParamProperties::new(*index, param, metadata.metatype(*index), pipes, self.params_factory)
            })
            .collect()
    }
}

// ============================================================================
// Pipes
// ============================================================================

struct PipeParam {
    param: ParamProperties,
    /// Route pipes followed by parameter pipes
    pipes: Vec<Arc<dyn PipeTransform>>,
}

struct PipesFn {
    params: Vec<PipeParam>,
    consumer: PipesConsumer,
}

impl PipesFn {
    fn new(
        route_pipes: &[Arc<dyn PipeTransform>],
        params: Vec<ParamProperties>,
        consumer: PipesConsumer,
    ) -> Option<Self> {
        if params.is_empty() {
            return None;
        }
        let params = params
            .into_iter()
            .map(|param| {
                let mut pipes = route_pipes.to_vec();
                pipes.extend(param.pipes.iter().cloned());
                PipeParam { param, pipes }
            })
            .collect();
        Some(Self { params, consumer })
    }

    /// Extract every parameter and run the pipeable ones through their
    /// chains. Distinct parameters are processed concurrently.
    async fn apply(
        &self,
        args: &mut [Argument],
        request: &Arc<Request>,
        response: &Instance,
        next: &NextFn,
    ) -> PipelineResult<()> {
        let consumer = self.consumer;
        let resolved = try_join_all(self.params.iter().map(|PipeParam { param, pipes }| async move {
            let value = match param.extract_value(request, response, next) {
                Argument::Value(value) if param.kind.is_pipeable() && !pipes.is_empty() => {
                    Argument::Value(consumer.apply(value, &param.argument_metadata(), pipes).await?)
                }
                other => other,
            };
            Ok::<_, PipelineError>((param.index, value))
        }))
        .await?;

        for (index, value) in resolved {
            if let Some(slot) = args.get_mut(index) {
                *slot = value;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Execution unit
// ============================================================================

struct UnitInner<C: ResponseChannel> {
    key: HandlerKey,
    controller: Controller,
    handler: HandlerRef,
    metadata: Arc<HandlerMetadata>,
    guards: Option<GuardsFn>,
    pipes: Option<PipesFn>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    interceptors_consumer: InterceptorsConsumer,
    response_controller: Arc<RouterResponseController<C>>,
    metadata_reader: Arc<dyn MetadataReader>,
}

/// Request-ready invocation of one route
pub struct ExecutionUnit<C: ResponseChannel> {
    inner: Arc<UnitInner<C>>,
}

impl<C: ResponseChannel> Clone for ExecutionUnit<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: ResponseChannel> ExecutionUnit<C> {
    pub fn key(&self) -> &HandlerKey {
        &self.inner.key
    }

    pub fn metadata(&self) -> &Arc<HandlerMetadata> {
        &self.inner.metadata
    }

    /// Whether a guard check runs at all
    pub fn has_guards(&self) -> bool {
        self.inner.guards.is_some()
    }

    /// Whether parameter extraction runs at all
    pub fn has_pipes(&self) -> bool {
        self.inner.pipes.is_some()
    }

    pub fn interceptor_count(&self) -> usize {
        self.inner.interceptors.len()
    }

    /// Handle one request.
    ///
    /// Errors from guards, pipes, interceptors, the handler or delivery are
    /// returned unchanged; mapping them to a response is up to the caller.
    pub async fn invoke(
        &self,
        request: Arc<Request>,
        response: Arc<C::Response>,
        next: NextFn,
    ) -> PipelineResult<()> {
        let inner = &*self.inner;
        let raw_response: Instance = response.clone();
        let context = ExecutionContext::new(
            ContextType::Http,
            vec![
                Argument::Request(request.clone()),
                Argument::Response(raw_response.clone()),
                Argument::Next(next.clone()),
            ],
            inner.key.clone(),
            inner.metadata_reader.clone(),
        );
        tracing::trace!(handler = %inner.key, path = %request.path, "Invoking handler");

        let mut args = vec![Argument::default(); inner.metadata.args_length];
        if let Some(guards) = &inner.guards {
            guards.check(&context).await?;
        }

        inner
            .response_controller
            .set_status(&response, inner.metadata.http_status_code);
        if inner.metadata.has_custom_headers() {
            inner
                .response_controller
                .set_headers(&response, &inner.metadata.response_headers);
        }

        let handler = {
            let (request, raw_response, next) = (&request, &raw_response, &next);
            async move {
                if let Some(pipes) = &inner.pipes {
                    pipes.apply(&mut args, request, raw_response, next).await?;
                }
                inner.handler.invoke(&inner.controller, args).await
            }
            .boxed()
        };

        let Interception { result, skip_render } = inner
            .interceptors_consumer
            .intercept(&inner.interceptors, &context, handler)
            .await?;
        inner.handle_response(result, &response, skip_render).await
    }
}

impl<C: ResponseChannel> UnitInner<C> {
    async fn handle_response(
        &self,
        result: HandlerResult,
        response: &C::Response,
        skip_render: bool,
    ) -> PipelineResult<()> {
        let rc = &self.response_controller;
        let status = self.metadata.http_status_code;

        match &self.metadata.strategy {
            ResponseStrategy::Render { template } => {
                let result = rc.transform_to_result(result).await?;
                if skip_render {
                    rc.set_content_type_html(response);
                    if !result.is_string() {
                        return Err(PipelineError::Configuration(RENDER_RESULT_NOT_STRING.to_string()));
                    }
                }

                let consumer = self.interceptors_consumer;
                if consumer.can_render_intercept(&self.interceptors) && (skip_render || rc.can_render_to_string()) {
                    let view = match result {
                        Value::String(view) if skip_render => view,
                        other => rc.render_to_string(other, response, template).await?,
                    };
                    let view = consumer.render_intercept(&self.interceptors, view).await?;
                    rc.apply(Value::String(view), response, Some(status)).await
                } else if skip_render {
                    rc.apply(result, response, Some(status)).await
                } else {
                    rc.render(result, response, template).await
                }
            }
            ResponseStrategy::Redirect(redirect) => rc.redirect(result, response, redirect).await,
            ResponseStrategy::Reply { response_handled } => {
                let result = rc.transform_to_result(result).await?;
                if *response_handled {
                    Ok(())
                } else {
                    rc.apply(result, response, Some(status)).await
                }
            }
        }
    }
}

impl<C: ResponseChannel> fmt::Debug for ExecutionUnit<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("handler", &self.inner.key)
            .field("guards", &self.has_guards())
            .field("pipes", &self.has_pipes())
            .field("interceptors", &self.interceptor_count())
            .finish()
    }
}
