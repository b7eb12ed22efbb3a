//! JSON Schema validation of request bodies.

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tandem_core::Response;
use tracing::debug;

use super::Middleware;
use crate::request::{Body, Request};
use crate::schema;

/// Validates the JSON body against a schema.
///
/// Answers 400 when the body is missing or is not JSON, and 422 with a
/// `details` list of `{path, message}` entries when it violates the schema.
/// A valid raw body is replaced by its parsed form, so handlers always see
/// [`Body::Json`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_server::ValidateJson;
///
/// let validate = ValidateJson::new(json!({
///     "type": "object",
///     "properties": {"name": {"type": "string", "minLength": 2}},
///     "required": ["name"],
/// }));
/// # let _ = validate;
/// ```
#[derive(Debug, Clone)]
pub struct ValidateJson {
    schema: Value,
}

impl ValidateJson {
    /// Validate against `schema`.
    #[must_use]
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }

    /// Schema bodies are checked against.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn check(&self, request: &mut Request) -> Option<Response> {
        let document = match request.take_body() {
            Body::Json(value) => value,
            Body::Bytes(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => value,
                Err(error) => {
                    debug!(path = request.path(), %error, "malformed JSON body");
                    request.set_body(Body::Bytes(bytes));
                    return Some(invalid_json(&format!("Invalid JSON body: {error}")));
                }
            },
            Body::Empty => return Some(invalid_json("Request body must be JSON")),
        };

        match schema::validate(&self.schema, &document) {
            Ok(()) => {
                request.set_body(Body::Json(document));
                None
            }
            Err(details) => {
                debug!(
                    path = request.path(),
                    violations = details.len(),
                    "schema validation failed"
                );
                request.set_body(Body::Json(document));
                Some(Response::from_status(422).with_json(json!({
                    "error": "Request body failed validation",
                    "code": "validation_error",
                    "details": details,
                })))
            }
        }
    }
}

fn invalid_json(message: &str) -> Response {
    Response::from_status(400).with_json(json!({
        "error": message,
        "code": "invalid_json",
    }))
}

impl Middleware for ValidateJson {
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        let outcome = self.check(request);
        Box::pin(async move { outcome })
    }
}
