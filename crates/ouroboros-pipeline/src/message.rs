//! Composition shared by the message-based transports (RPC, gateways)
//!
//! Unlike HTTP there is no per-parameter extraction: the whole inbound
//! payload runs through the route pipes and becomes the last handler
//! argument.

use crate::config::ApplicationConfig;
use crate::context::{ContextType, ExecutionContext};
use crate::enhancers::ResolutionScope;
use crate::error::PipelineResult;
use crate::guards::{GuardsConsumer, GuardsContextCreator, GuardsFn};
use crate::handler::{Argument, Controller, HandlerRef, HandlerResult};
use crate::injector::{InstanceResolver, STATIC_CONTEXT};
use crate::interceptors::{Interceptor, InterceptorsConsumer, InterceptorsContextCreator};
use crate::metadata::{HandlerKey, MetadataReader, MetadataReaderExt};
use crate::params::RouteParamtypes;
use crate::pipes::{ArgumentMetadata, PipeTransform, PipesConsumer, PipesContextCreator};
use serde_json::Value;
use std::sync::Arc;

pub(crate) struct MessageContextCreator {
    metadata: Arc<dyn MetadataReader>,
    pipes_context_creator: PipesContextCreator,
    pipes_consumer: PipesConsumer,
    guards_context_creator: GuardsContextCreator,
    guards_consumer: GuardsConsumer,
    interceptors_context_creator: InterceptorsContextCreator,
    interceptors_consumer: InterceptorsConsumer,
}

impl MessageContextCreator {
    pub(crate) fn new(
        metadata: Arc<dyn MetadataReader>,
        container: Option<Arc<dyn InstanceResolver>>,
        config: &ApplicationConfig,
    ) -> Self {
        Self {
            pipes_context_creator: PipesContextCreator::new(metadata.clone(), container.clone())
                .with_global(config.global_pipes().to_vec()),
            pipes_consumer: PipesConsumer::new(),
            guards_context_creator: GuardsContextCreator::new(metadata.clone(), container.clone())
                .with_global(config.global_guards().to_vec()),
            guards_consumer: GuardsConsumer::new(),
            interceptors_context_creator: InterceptorsContextCreator::new(metadata.clone(), container)
                .with_global(config.global_interceptors().to_vec()),
            interceptors_consumer: InterceptorsConsumer::new(),
            metadata,
        }
    }

    pub(crate) fn create(
        &self,
        controller: &Controller,
        handler: &HandlerRef,
        module: &str,
        context_type: ContextType,
    ) -> MessageUnit {
        let key = handler.key(controller);
        let scope = ResolutionScope::new(module, STATIC_CONTEXT, None);
        let metatype = self.metadata.param_types(&key).into_iter().next().flatten();

        let unit = MessageUnit {
            context_type,
            controller: controller.clone(),
            handler: handler.clone(),
            guards: GuardsFn::new(
                self.guards_context_creator.create(controller, handler, scope),
                self.guards_consumer,
            ),
            pipes: self.pipes_context_creator.create(controller, handler, scope),
            pipes_consumer: self.pipes_consumer,
            payload_metadata: ArgumentMetadata::new(RouteParamtypes::Payload).with_metatype(metatype),
            interceptors: self.interceptors_context_creator.create(controller, handler, scope),
            interceptors_consumer: self.interceptors_consumer,
            metadata: self.metadata.clone(),
            key,
        };
        tracing::debug!(
            handler = %unit.key,
            transport = %context_type,
            module = module,
            pipes = unit.pipes.len(),
            interceptors = unit.interceptors.len(),
            "Created message handler"
        );
        unit
    }
}

pub(crate) struct MessageUnit {
    key: HandlerKey,
    context_type: ContextType,
    controller: Controller,
    handler: HandlerRef,
    guards: Option<GuardsFn>,
    pipes: Vec<Arc<dyn PipeTransform>>,
    pipes_consumer: PipesConsumer,
    payload_metadata: ArgumentMetadata,
    interceptors: Vec<Arc<dyn Interceptor>>,
    interceptors_consumer: InterceptorsConsumer,
    metadata: Arc<dyn MetadataReader>,
}

impl MessageUnit {
    pub(crate) fn key(&self) -> &HandlerKey {
        &self.key
    }

    /// Guards, payload pipes, then the intercepted handler call.
    ///
    /// `leading` holds the transport arguments placed before the payload
    /// (the client socket for gateways, nothing for RPC).
    pub(crate) async fn call(&self, leading: Vec<Argument>, data: Value) -> PipelineResult<HandlerResult> {
        let mut context_args = leading.clone();
        context_args.push(Argument::Value(data.clone()));
        let context = ExecutionContext::new(
            self.context_type,
            context_args,
            self.key.clone(),
            self.metadata.clone(),
        );
        tracing::trace!(handler = %self.key, transport = %self.context_type, "Handling message");

        if let Some(guards) = &self.guards {
            guards.check(&context).await?;
        }

        let data = self
            .pipes_consumer
            .apply(data, &self.payload_metadata, &self.pipes)
            .await?;
        let mut args = leading;
        args.push(Argument::Value(data));

        let handler = self.handler.invoke(&self.controller, args);
        let interception = self
            .interceptors_consumer
            .intercept(&self.interceptors, &context, handler)
            .await?;
        Ok(interception.result)
    }
}
