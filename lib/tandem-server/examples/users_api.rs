//! In-memory users API.
//!
//! ```text
//! cargo run -p tandem-server --example users_api
//! curl localhost:8000/users
//! curl -X DELETE -H 'X-API-Key: secret-api-key' localhost:8000/users/1
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tandem_server::{
    Api, ApiKeyAuthenticator, Error, LogRequest, Method, Request, RequireAuth, Response, Result,
    Route, ValidateJson, serve,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: String,
    name: String,
    email: String,
}

#[derive(Debug, Default)]
struct Store {
    users: BTreeMap<String, User>,
    next_id: u64,
}

type Db = Arc<Mutex<Store>>;

fn lock(db: &Db) -> std::sync::MutexGuard<'_, Store> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn user_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "minLength": 2},
            "email": {"type": "string", "format": "email"},
        },
        "required": ["name", "email"],
        "additionalProperties": false,
    })
}

fn not_found(id: &str) -> Error {
    Error::not_found(format!("User with ID {id} not found"))
}

fn seed() -> Db {
    let mut store = Store {
        next_id: 3,
        ..Store::default()
    };
    for (id, name, email) in [
        ("1", "John Doe", "john.doe@example.com"),
        ("2", "Jane Smith", "jane.smith@example.com"),
    ] {
        store.users.insert(
            id.to_owned(),
            User {
                id: id.to_owned(),
                name: name.to_owned(),
                email: email.to_owned(),
            },
        );
    }
    Arc::new(Mutex::new(store))
}

fn build_api(db: &Db) -> Result<Api> {
    let mut api = Api::new("Example API", "1.0.0");
    api.description("Users kept in memory")
        .add_middleware(LogRequest::new())
        .add_middleware(
            ApiKeyAuthenticator::new()
                .key("secret-api-key", json!({"id": "admin", "role": "admin"})),
        )
        .with_openapi_route("/openapi.json");

    let users = Arc::clone(db);
    api.route(
        Route::new("/users", [Method::Get], move |request: Request| {
            let filter = request.query().get("name").map(str::to_lowercase);
            let found: Vec<User> = lock(&users)
                .users
                .values()
                .filter(|user| {
                    filter
                        .as_deref()
                        .is_none_or(|name| user.name.to_lowercase().contains(name))
                })
                .cloned()
                .collect();
            async move { Response::from_status(200).try_with_json(&found) }
        })?
        .summary("List users")
        .description("Optionally filtered by a case-insensitive `name` substring.")
        .tag("users"),
    );

    let users = Arc::clone(db);
    api.route(
        Route::new("/users/{user_id}", [Method::Get], move |request: Request| {
            let id = request.path_param("user_id").unwrap_or_default().to_owned();
            let found = lock(&users).users.get(&id).cloned();
            async move {
                let user = found.ok_or_else(|| not_found(&id))?;
                Response::from_status(200).try_with_json(&user)
            }
        })?
        .summary("Get a user")
        .tag("users")
        .response_schema(200, user_schema()),
    );

    let users = Arc::clone(db);
    api.route(
        Route::new("/users", [Method::Post], move |request: Request| {
            let created = request.json::<User>().map(|mut user| {
                let mut store = lock(&users);
                user.id = store.next_id.to_string();
                store.next_id += 1;
                store.users.insert(user.id.clone(), user.clone());
                user
            });
            async move { Response::from_status(201).try_with_json(&created?) }
        })?
        .middleware(ValidateJson::new(user_schema()))
        .summary("Create a user")
        .tag("users")
        .request_schema(user_schema())
        .response_schema(201, user_schema()),
    );

    let users = Arc::clone(db);
    api.route(
        Route::new("/users/{user_id}", [Method::Put], move |request: Request| {
            let id = request.path_param("user_id").unwrap_or_default().to_owned();
            let updated = request.json::<User>().and_then(|mut user| {
                let mut store = lock(&users);
                let slot = store.users.get_mut(&id).ok_or_else(|| not_found(&id))?;
                user.id.clone_from(&id);
                *slot = user.clone();
                Ok(user)
            });
            async move { Response::from_status(200).try_with_json(&updated?) }
        })?
        .middleware(ValidateJson::new(user_schema()))
        .summary("Replace a user")
        .tag("users")
        .request_schema(user_schema()),
    );

    let users = Arc::clone(db);
    api.route(
        Route::new("/users/{user_id}", [Method::Delete], move |request: Request| {
            let id = request.path_param("user_id").unwrap_or_default().to_owned();
            let removed = lock(&users).users.remove(&id);
            async move {
                let user = removed.ok_or_else(|| not_found(&id))?;
                Ok::<_, Error>(json!({"message": format!("User {} deleted", user.name)}))
            }
        })?
        .middleware(RequireAuth::new().role("admin"))
        .summary("Delete a user")
        .tag("users"),
    );

    Ok(api)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api = build_api(&seed())?;
    serve(api, SocketAddr::from(([127, 0, 0, 1], 8000))).await
}
