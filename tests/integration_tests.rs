use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use flashcard_api::{
    auth::PasswordService,
    config::{Config, StorageBackend},
    create_app,
    database::Stores,
    handlers::AppState,
    models::{NewUser, Role},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        database_max_connections: 1,
        storage_backend: StorageBackend::Memory,
        jwt_secret: "integration-secret".to_string(),
        jwt_expiry_hours: 1,
        bcrypt_cost: 4,
        cors_allowed_origins: vec![],
    }
}

fn test_state() -> AppState {
    AppState::new(test_config(), Stores::in_memory()).expect("Failed to build state")
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn create_user(state: &AppState, name: &str, role: Role, daily_limit: u32) -> Uuid {
    let password_hash = PasswordService::new(4).hash_password("password123").unwrap();
    state
        .users
        .create_user(NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash,
            role,
            daily_limit,
        })
        .await
        .unwrap()
        .id
}

async fn login(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "email": format!("{}@example.com", name), "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_set(app: &Router, user_id: Uuid, title: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/flashcards",
        None,
        Some(json!({
            "title": title,
            "createdBy": user_id,
            "cards": [
                { "question": "2+2", "answer": "4" },
                { "question": "3+3", "answer": "6" }
            ]
        })),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = create_app(test_state());

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, "GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_and_login() {
    let app = create_app(test_state());
    let user = json!({
        "username": "ada",
        "email": "ada@example.com",
        "password": "password123"
    });

    let (status, body) = send(&app, "POST", "/api/users/register", None, Some(user.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");

    let (status, body) = send(&app, "POST", "/api/users/register", None, Some(user)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email already registered");

    let token = login(&app, "ada").await;
    assert!(!token.is_empty());

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_register_requires_all_fields() {
    let app = create_app(test_state());

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({ "username": "ada", "email": "  ", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "All fields are required");
}

#[tokio::test]
async fn test_token_checks() {
    let state = test_state();
    let app = create_app(state.clone());
    create_user(&state, "plain", Role::User, 20).await;

    let (status, body) = send(&app, "GET", "/api/flashcards", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access denied. No token provided.");

    let (status, body) = send(&app, "GET", "/api/flashcards", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid token");

    let token = login(&app, "plain").await;
    let (status, body) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Admins only.");
}

#[tokio::test]
async fn test_admin_sets_daily_limits() {
    let state = test_state();
    let app = create_app(state.clone());
    create_user(&state, "root", Role::Admin, 20).await;
    let user_id = create_user(&state, "learner", Role::User, 20).await;
    let token = login(&app, "root").await;

    let (status, body) = send(&app, "GET", "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert!(body["users"][0].get("password").is_none());

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/users/{}/daily-limit", user_id),
        Some(&token),
        Some(json!({ "dailyLimit": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["dailyLimit"], 5);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/daily-limit",
        Some(&token),
        Some(json!({ "dailyLimit": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/users/daily-limit",
        Some(&token),
        Some(json!({ "dailyLimit": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedUsers"], 2);
    assert_eq!(body["message"], "Daily limit for all users set to 7");
}

#[tokio::test]
async fn test_self_or_admin_on_accounts() {
    let state = test_state();
    let app = create_app(state.clone());
    let alice = create_user(&state, "alice", Role::User, 20).await;
    let bob = create_user(&state, "bob", Role::User, 20).await;
    let token = login(&app, "alice").await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/users/{}", bob),
        Some(&token),
        Some(json!({ "username": "mallory" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/users/{}", alice),
        Some(&token),
        Some(json!({ "username": "alice2", "preferences": { "theme": "dark" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice2");
    assert_eq!(body["preferences"]["theme"], "dark");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/users/{}", bob),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "bob");

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/users/{}", alice),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted");
}

#[tokio::test]
async fn test_daily_quota_enforced() {
    let state = test_state();
    let app = create_app(state.clone());
    let user_id = create_user(&state, "quota", Role::User, 2).await;

    for title in ["first", "second"] {
        let (status, body) = create_set(&app, user_id, title).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "quota");
        assert_eq!(body["role"], "user");
    }

    let (status, body) = create_set(&app, user_id, "third").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Creation limit reached (2).");
    assert_eq!(body["limit"], 2);

    let token = login(&app, "quota").await;
    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/users/{}/quota", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 2);
    assert_eq!(body["remaining"], 0);
}

#[tokio::test]
async fn test_create_set_validation() {
    let state = test_state();
    let app = create_app(state.clone());

    let (status, body) = send(&app, "POST", "/api/flashcards", None, Some(json!({ "title": "t" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User ID (createdBy) is required");

    let (status, body) = send(
        &app,
        "POST",
        "/api/flashcards",
        None,
        Some(json!({ "title": "t", "createdBy": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid User ID format");

    let (status, body) = create_set(&app, Uuid::new_v4(), "orphan").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn test_rating_flow() {
    let state = test_state();
    let app = create_app(state.clone());
    let owner = create_user(&state, "owner", Role::User, 20).await;
    let (_, set) = create_set(&app, owner, "Arithmetic").await;
    let uri = format!("/api/flashcards/{}/rate", set["id"].as_str().unwrap());

    let mut raters = Vec::new();
    for name in ["r1", "r2", "r3"] {
        raters.push(create_user(&state, name, Role::User, 20).await);
    }

    for (rater, rating) in raters.iter().zip([3, 5, 1]) {
        let (status, _) = send(
            &app,
            "POST",
            &uri,
            None,
            Some(json!({ "userId": rater, "rating": rating })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Re-rating replaces the earlier value instead of appending.
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        None,
        Some(json!({ "userId": raters[2], "rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ratings"].as_array().unwrap().len(), 3);
    assert_eq!(body["averageRating"], 4.0);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        None,
        Some(json!({ "userId": raters[0], "rating": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid rating. Must be between 1 and 5.");
}

#[tokio::test]
async fn test_rating_with_malformed_rater_is_unknown_user() {
    let state = test_state();
    let app = create_app(state.clone());
    let owner = create_user(&state, "rated", Role::User, 20).await;
    let (_, set) = create_set(&app, owner, "Capitals").await;
    let uri = format!("/api/flashcards/{}/rate", set["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        None,
        Some(json!({ "userId": "bogus", "rating": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = send(
        &app,
        "POST",
        &uri,
        None,
        Some(json!({ "userId": "bogus", "rating": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_hide_toggle() {
    let state = test_state();
    let app = create_app(state.clone());
    let owner = create_user(&state, "hider", Role::User, 20).await;
    let (_, set) = create_set(&app, owner, "Toggle").await;
    let id = set["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "PUT", &format!("/api/flashcards/{}/hide/1", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cards"][0]["hidden"], false);
    assert_eq!(body["cards"][1]["hidden"], true);

    let (_, body) = send(&app, "PUT", &format!("/api/flashcards/{}/hide/1", id), None, None).await;
    assert_eq!(body["cards"][1]["hidden"], false);

    let (status, body) = send(&app, "PUT", &format!("/api/flashcards/{}/hide/5", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Card not found");

    let (status, _) = send(&app, "PUT", &format!("/api/flashcards/{}/hide/-1", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_visible_sets_and_delete() {
    let state = test_state();
    let app = create_app(state.clone());
    let admin = create_user(&state, "boss", Role::Admin, 20).await;
    let alice = create_user(&state, "alicia", Role::User, 20).await;
    let bob = create_user(&state, "bobby", Role::User, 20).await;

    create_set(&app, admin, "Official").await;
    create_set(&app, alice, "Mine").await;
    let (_, bobs) = create_set(&app, bob, "Not mine").await;

    let token = login(&app, "alicia").await;
    let (status, body) = send(&app, "GET", "/api/flashcards", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let mut titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|set| set["title"].as_str().unwrap())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Mine", "Official"]);

    let (_, body) = send(&app, "GET", "/api/flashcards/all", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 3);

    let uri = format!("/api/flashcards/{}", bobs["id"].as_str().unwrap());
    let (status, body) = send(&app, "DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Flashcard set deleted");
    assert_eq!(body["deletedFlashcard"]["title"], "Not mine");

    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Flashcard set not found");
}

#[tokio::test]
async fn test_update_set_keeps_ratings() {
    let state = test_state();
    let app = create_app(state.clone());
    let owner = create_user(&state, "editor", Role::User, 20).await;
    let (_, set) = create_set(&app, owner, "Draft").await;
    let uri = format!("/api/flashcards/{}", set["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        None,
        Some(json!({ "title": "Final", "averageRating": 5, "cards": [{ "question": "q", "answer": "a" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Final");
    assert_eq!(body["averageRating"], 0.0);
    assert_eq!(body["cards"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_set_clears_description_on_null() {
    let state = test_state();
    let app = create_app(state.clone());
    let owner = create_user(&state, "describer", Role::User, 20).await;
    let (_, set) = send(
        &app,
        "POST",
        "/api/flashcards",
        None,
        Some(json!({ "title": "Rivers", "description": "Longest rivers", "createdBy": owner })),
    )
    .await;
    let uri = format!("/api/flashcards/{}", set["id"].as_str().unwrap());

    let (_, body) = send(&app, "PUT", &uri, None, Some(json!({ "title": "Rivers II" }))).await;
    assert_eq!(body["description"], "Longest rivers");

    let (status, body) = send(&app, "PUT", &uri, None, Some(json!({ "description": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["description"].is_null());

    let (_, body) = send(&app, "GET", &uri, None, None).await;
    assert!(body["description"].is_null());
    assert_eq!(body["title"], "Rivers II");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_app(test_state());
    send(&app, "GET", "/health", None, None).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}
