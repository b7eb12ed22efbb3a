//! OpenAPI 3.0.3 export.

use serde_json::{Map, Value, json};

use crate::api::Api;
use crate::router::Route;

/// Version of the emitted document format.
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Build the OpenAPI document describing `api`.
///
/// Pure function of the registered routes: one path item per pattern, one
/// operation per method, path parameters from the pattern, the request body
/// from [`Route::request_schema`] and responses from
/// [`Route::response_schema`] (a bare `200` when none are declared).
#[must_use]
pub fn generate_openapi(api: &Api) -> Value {
    let mut info = Map::new();
    info.insert("title".to_owned(), json!(api.name()));
    info.insert("version".to_owned(), json!(api.version()));
    if let Some(description) = api.description_text() {
        info.insert("description".to_owned(), json!(description));
    }

    let mut paths = Map::new();
    for route in api.routes() {
        let Value::Object(item) = paths
            .entry(route.pattern().as_str())
            .or_insert_with(|| Value::Object(Map::new()))
        else {
            continue;
        };
        for method in route.methods() {
            let key = method.as_str().to_ascii_lowercase();
            // First registration wins, as in routing.
            item.entry(key).or_insert_with(|| operation(route));
        }
    }

    json!({
        "openapi": OPENAPI_VERSION,
        "info": info,
        "paths": paths,
    })
}

fn operation(route: &Route) -> Value {
    let mut operation = Map::new();
    if let Some(summary) = route.summary_text() {
        operation.insert("summary".to_owned(), json!(summary));
    }
    if let Some(description) = route.description_text() {
        operation.insert("description".to_owned(), json!(description));
    }
    if !route.tags().is_empty() {
        operation.insert("tags".to_owned(), json!(route.tags()));
    }

    let parameters: Vec<Value> = route
        .pattern()
        .params()
        .map(|name| {
            json!({
                "name": name,
                "in": "path",
                "required": true,
                "schema": {"type": "string"},
            })
        })
        .collect();
    if !parameters.is_empty() {
        operation.insert("parameters".to_owned(), Value::Array(parameters));
    }

    if let Some(schema) = route.request_body_schema() {
        operation.insert(
            "requestBody".to_owned(),
            json!({
                "required": true,
                "content": {"application/json": {"schema": schema}},
            }),
        );
    }

    let mut responses = Map::new();
    for (status, schema) in route.response_schemas() {
        responses.insert(
            status.to_string(),
            json!({
                "description": describe(*status),
                "content": {"application/json": {"schema": schema}},
            }),
        );
    }
    if responses.is_empty() {
        responses.insert("200".to_owned(), json!({"description": describe(200)}));
    }
    operation.insert("responses".to_owned(), Value::Object(responses));

    Value::Object(operation)
}

fn describe(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Response")
}

#[cfg(test)]
mod tests {
    use tandem_core::Method;

    use super::*;
    use crate::request::Request;

    async fn noop(_: Request) {}

    fn api() -> Api {
        let user = json!({"type": "object", "properties": {"name": {"type": "string"}}});
        let mut api = Api::new("Users", "2.1.0");
        api.description("User directory")
            .get("/users", noop)
            .route(
                Route::new("/users/{id}", [Method::Put], noop)
                    .expect("route")
                    .summary("Replace a user")
                    .tag("users")
                    .request_schema(user.clone())
                    .response_schema(200, user)
                    .response_schema(404, json!({"type": "object"})),
            )
            .delete("/users/{id}", noop);
        api
    }

    #[test]
    fn document_header() {
        let document = generate_openapi(&api());
        assert_eq!(document["openapi"], "3.0.3");
        assert_eq!(
            document["info"],
            json!({"title": "Users", "version": "2.1.0", "description": "User directory"})
        );
    }

    #[test]
    fn operations_share_a_path_item() {
        let document = generate_openapi(&api());
        let item = &document["paths"]["/users/{id}"];

        assert!(item.get("put").is_some());
        assert!(item.get("delete").is_some());
        assert_eq!(
            item["delete"]["parameters"],
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}])
        );
        assert_eq!(item["delete"]["responses"], json!({"200": {"description": "OK"}}));
    }

    #[test]
    fn documented_route() {
        let document = generate_openapi(&api());
        let put = &document["paths"]["/users/{id}"]["put"];

        assert_eq!(put["summary"], "Replace a user");
        assert_eq!(put["tags"], json!(["users"]));
        assert_eq!(
            put["requestBody"]["content"]["application/json"]["schema"]["type"],
            "object"
        );
        assert_eq!(put["responses"]["404"]["description"], "Not Found");
        assert!(put["responses"]["200"]["content"].is_object());
    }

    #[test]
    fn routes_without_params_have_no_parameters() {
        let document = generate_openapi(&api());
        assert!(document["paths"]["/users"]["get"].get("parameters").is_none());
    }
}
