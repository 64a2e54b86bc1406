//! RPC error normalisation

use crate::error::{PipelineError, PipelineResult};
use crate::exceptions::error_payload;
use crate::handler::HandlerResult;
use futures::stream::{self, BoxStream};
use futures::{Future, StreamExt};
use serde_json::Value;

/// Turns any error into an RPC exception carrying a `{status, message}` payload
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcExceptionsHandler;

impl RpcExceptionsHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: PipelineError) -> PipelineError {
        PipelineError::Rpc(error_payload(&err))
    }
}

/// Runs a composed RPC call and normalises whatever fails, before or
/// while the result streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcProxy {
    exceptions_handler: RpcExceptionsHandler,
}

impl RpcProxy {
    pub fn new(exceptions_handler: RpcExceptionsHandler) -> Self {
        Self { exceptions_handler }
    }

    pub async fn call<F>(&self, call: F) -> BoxStream<'static, PipelineResult<Value>>
    where
        F: Future<Output = PipelineResult<HandlerResult>>,
    {
        let handler = self.exceptions_handler;
        match call.await {
            Ok(result) => result
                .into_stream()
                .map(move |item| item.map_err(|err| handler.handle(err)))
                .boxed(),
            Err(err) => stream::once(async move { Err::<Value, _>(handler.handle(err)) }).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_failure_before_result() {
        let proxy = RpcProxy::default();
        let stream = proxy
            .call(async { Err(PipelineError::Rpc(json!("Invalid credentials"))) })
            .await;
        let err = stream.try_collect::<Vec<_>>().await.unwrap_err();
        assert_eq!(err.to_json(), json!({"status": "error", "message": "Invalid credentials"}));
    }

    #[tokio::test]
    async fn test_failure_while_streaming() {
        let proxy = RpcProxy::default();
        let items = proxy
            .call(async {
                Ok(HandlerResult::stream(stream::iter(vec![
                    Ok(json!(1)),
                    Err(PipelineError::Handler("boom".into())),
                ])))
            })
            .await
            .collect::<Vec<_>>()
            .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(PipelineError::Rpc(p)) if p["message"] == "Internal server error"));
    }
}
