//! Response delivery over a transport's [`ResponseChannel`]

use crate::error::{PipelineError, PipelineResult};
use crate::handler::HandlerResult;
use async_trait::async_trait;
use ouroboros_common::RequestMethod;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Response header declared on a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

impl CustomHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Redirect declared on a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResponse {
    pub url: String,
    #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Delivery capability supplied by a transport adapter
#[async_trait]
pub trait ResponseChannel: Send + Sync + 'static {
    /// Native response handle
    type Response: Send + Sync + 'static;

    fn set_status(&self, response: &Self::Response, status: u16);

    fn set_header(&self, response: &Self::Response, name: &str, value: &str);

    async fn reply(&self, response: &Self::Response, body: Value, status: Option<u16>) -> PipelineResult<()>;

    async fn redirect(&self, response: &Self::Response, status: u16, url: &str) -> PipelineResult<()>;

    async fn render(&self, response: &Self::Response, template: &str, view: Value) -> PipelineResult<()>;

    /// Whether [`ResponseChannel::render_to_string`] is supported.
    fn can_render_to_string(&self) -> bool {
        false
    }

    async fn render_to_string(
        &self,
        _template: &str,
        _view: Value,
        _response: &Self::Response,
    ) -> PipelineResult<String> {
        Err(PipelineError::Configuration(
            "Transport does not support rendering to a string".to_string(),
        ))
    }

    /// Status a handler answers with when it declares none.
    fn status_for_method(&self, method: RequestMethod) -> u16 {
        method.default_status().code()
    }
}

/// Applies response decisions through a [`ResponseChannel`]
pub struct RouterResponseController<C: ResponseChannel> {
    channel: Arc<C>,
    default_redirect_status: u16,
    html_content_type: String,
}

impl<C: ResponseChannel> RouterResponseController<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            default_redirect_status: 302,
            html_content_type: "text/html; charset=utf-8".to_string(),
        }
    }

    pub fn with_default_redirect_status(mut self, status: u16) -> Self {
        self.default_redirect_status = status;
        self
    }

    pub fn with_html_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.html_content_type = content_type.into();
        self
    }

    /// Deliver `result` as the response body.
    pub async fn apply(&self, result: Value, response: &C::Response, status: Option<u16>) -> PipelineResult<()> {
        self.channel.reply(response, result, status).await
    }

    /// Redirect, letting a `{url, statusCode}` result override the declared target.
    pub async fn redirect(
        &self,
        result: HandlerResult,
        response: &C::Response,
        declared: &RedirectResponse,
    ) -> PipelineResult<()> {
        let result = self.transform_to_result(result).await?;
        let status = result
            .get("statusCode")
            .and_then(Value::as_u64)
            .filter(|code| *code > 0)
            .and_then(|code| u16::try_from(code).ok())
            .or(declared.status_code)
            .unwrap_or(self.default_redirect_status);
        let url = result
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .unwrap_or(&declared.url);
        self.channel.redirect(response, status, url).await
    }

    pub async fn render(&self, result: Value, response: &C::Response, template: &str) -> PipelineResult<()> {
        self.channel.render(response, template, result).await
    }

    pub fn can_render_to_string(&self) -> bool {
        self.channel.can_render_to_string()
    }

    /// Render `template` to HTML without delivering it.
    pub async fn render_to_string(
        &self,
        result: Value,
        response: &C::Response,
        template: &str,
    ) -> PipelineResult<String> {
        let view = self.channel.render_to_string(template, result, response).await?;
        self.set_content_type_html(response);
        Ok(view)
    }

    /// Drain a deferred or streamed result to its value.
    pub async fn transform_to_result(&self, result: HandlerResult) -> PipelineResult<Value> {
        result.resolve().await
    }

    pub fn status_by_method(&self, method: RequestMethod) -> u16 {
        self.channel.status_for_method(method)
    }

    pub fn set_status(&self, response: &C::Response, status: u16) {
        self.channel.set_status(response, status);
    }

    pub fn set_headers(&self, response: &C::Response, headers: &[CustomHeader]) {
        for header in headers {
            self.channel.set_header(response, &header.name, &header.value);
        }
    }

    pub fn set_content_type_html(&self, response: &C::Response) {
        self.channel.set_header(response, "Content-Type", &self.html_content_type);
    }
}
