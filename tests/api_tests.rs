// tests/api_tests.rs

use std::path::PathBuf;
use std::sync::Arc;

use quiz_backend::{
    catalog::QuizCatalog,
    config::Config,
    mailer::NullMailer,
    routes,
    state::AppState,
    utils::{jwt::sign_jwt, password::hash_password},
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

const TEST_SECRET: &str = "test_secret_for_integration_tests";

const SAMPLE_QUIZ: &str = r#"{
    "title": "Networking Basics",
    "true_false": [
        {"question": "TCP is connection-oriented.", "answer": true},
        {"question": "UDP guarantees delivery.", "answer": false},
        {"question": "HTTP runs over TCP by default.", "answer": true},
        {"question": "DNS only ever uses TCP.", "answer": false},
        {"question": "An IPv4 address is 32 bits wide.", "answer": true},
        {"question": "ICMP is used by ping.", "answer": true},
        {"question": "ARP resolves hostnames to IPs.", "answer": false}
    ],
    "mcqs": [
        {
            "question": "Which port does HTTPS use by default?",
            "options": ["80", "443", "8080"],
            "answer": "443"
        },
        {
            "question": "Which layer does IP belong to?",
            "options": ["Link", "Network", "Transport", "Application"],
            "answer": "Network"
        }
    ]
}"#;

struct TestApp {
    address: String,
    pool: SqlitePool,
    quiz_dir: PathBuf,
}

/// Spawns the app on a random port over a fresh in-memory database.
async fn spawn_app() -> TestApp {
    // One connection keeps the in-memory database alive and shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    // Notifications are exercised by unit tests; keep them out of the way here.
    sqlx::query("UPDATE settings SET smtp_enabled = 0 WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let quiz_dir = std::env::temp_dir().join(format!("quiz-api-{}", uuid::Uuid::new_v4()));

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        quiz_dir: quiz_dir.clone(),
        admin_username: None,
        admin_password: None,
        email_host: None,
        email_port: 587,
        email_username: None,
        email_password: None,
        email_from: None,
        base_url: "http://localhost:8080".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        catalog: QuizCatalog::new(&quiz_dir),
        config,
        mailer: Arc::new(NullMailer),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        quiz_dir,
    }
}

/// Inserts an admin row and signs a token for it.
async fn admin_token(app: &TestApp) -> String {
    let username = format!("admin_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password, role) VALUES (?, 'x', 'admin') RETURNING id",
    )
    .bind(&username)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    sign_jwt(id, "admin", TEST_SECRET, 600).unwrap()
}

/// Inserts a student row and signs a token for it.
async fn student_token(app: &TestApp) -> (i64, String) {
    let username = format!("stud_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, password, email, role) VALUES (?, 'x', 'student@example.com', 'student') RETURNING id",
    )
    .bind(&username)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    (id, sign_jwt(id, "student", TEST_SECRET, 600).unwrap())
}

/// Creates a quiz through the admin surface and returns its id.
async fn create_quiz(app: &TestApp, client: &reqwest::Client, token: &str) -> i64 {
    let response = client
        .post(format!("{}/api/admin/quizzes", app.address))
        .bearer_auth(token)
        .header("content-type", "application/json")
        .body(SAMPLE_QUIZ)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

fn six_of_nine_answers() -> serde_json::Value {
    serde_json::json!({
        "answers": {
            "0": true,
            "1": false,
            "2": true,
            "3": true,
            "4": true,
            "5": true,
            "7": "443",
            "8": "Transport"
        }
    })
}

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let unique_name = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": unique_name,
            "password": "password123",
            "email": "new_student@example.com"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);

    // Duplicate username conflicts.
    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": unique_name,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn login_issues_usable_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let hashed = hash_password("password123").unwrap();
    sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, 'student')")
        .bind(&username)
        .bind(&hashed)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/quizzes", app.address))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    // Wrong password is rejected without a token.
    let response = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn protected_routes_require_auth_and_role() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/quizzes", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let (_, token) = student_token(&app).await;
    let response = client
        .get(format!("{}/api/admin/users", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn quiz_lifecycle_create_preview_delete() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;

    let quiz_id = create_quiz(&app, &client, &token).await;

    // Admin preview includes the answers.
    let response = client
        .get(format!("{}/api/admin/quizzes/{}", app.address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["document"]["mcqs"][0]["answer"], "443");

    // Students see the quiz in their listing with zero attempts used.
    let (_, stoken) = student_token(&app).await;
    let response = client
        .get(format!("{}/api/quizzes", app.address))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    let listing: serde_json::Value = response.json().await.unwrap();
    assert_eq!(listing[0]["title"], "Networking Basics");
    assert_eq!(listing[0]["attempts_used"], 0);

    // Delete, then the quiz is gone for everyone.
    let response = client
        .delete(format!("{}/api/admin/quizzes/{}", app.address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .get(format!("{}/api/quizzes/{}", app.address, quiz_id))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_quiz_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;

    let response = client
        .post(format!("{}/api/admin/quizzes", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "title": "Broken",
            "mcqs": [{"question": "Pick one", "options": [], "answer": "A"}]
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn submission_flow_scores_and_round_trips() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;
    let quiz_id = create_quiz(&app, &client, &token).await;
    let (_, stoken) = student_token(&app).await;

    // The quiz served for taking never contains answers.
    let response = client
        .get(format!("{}/api/quizzes/{}", app.address, quiz_id))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["attempt_number"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 9);
    assert!(!response_text_contains_answer(&body));

    // 6 of 9 items answered correctly.
    let response = client
        .post(format!("{}/api/quizzes/{}/submit", app.address, quiz_id))
        .bearer_auth(&stoken)
        .json(&six_of_nine_answers())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["score"], 6);
    assert_eq!(body["total_items"], 9);
    let result_id = body["result_id"].as_i64().unwrap();

    // The stored result reloads with the exact submitted mapping.
    let response = client
        .get(format!("{}/api/results/{}", app.address, result_id))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["score"], 6);
    assert_eq!(body["answers"], six_of_nine_answers()["answers"]);
    assert_eq!(body["attempt_number"], 1);

    // History lists the attempt.
    let response = client
        .get(format!("{}/api/results", app.address))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    let history: serde_json::Value = response.json().await.unwrap();
    assert_eq!(history[0]["quiz_title"], "Networking Basics");
    assert_eq!(history[0]["attempt_number"], 1);

    // Another student cannot see this result.
    let (_, other_token) = student_token(&app).await;
    let response = client
        .get(format!("{}/api/results/{}", app.address, result_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);

    // The admin sees it in the submissions list.
    let response = client
        .get(format!("{}/api/admin/results", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    let submissions: serde_json::Value = response.json().await.unwrap();
    assert_eq!(submissions[0]["score"], 6);
    assert_eq!(submissions[0]["quiz_title"], "Networking Basics");
}

fn response_text_contains_answer(body: &serde_json::Value) -> bool {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item.get("answer").is_some())
}

#[tokio::test]
async fn attempt_limit_is_enforced_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;
    let quiz_id = create_quiz(&app, &client, &token).await;
    let (_, stoken) = student_token(&app).await;

    // Tighten the limit to a single attempt.
    let response = client
        .put(format!("{}/api/admin/settings", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({"max_attempts": 1, "smtp_enabled": false}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/quizzes/{}/submit", app.address, quiz_id))
        .bearer_auth(&stoken)
        .json(&six_of_nine_answers())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    // The second submission and even the quiz fetch are refused.
    let response = client
        .post(format!("{}/api/quizzes/{}/submit", app.address, quiz_id))
        .bearer_auth(&stoken)
        .json(&six_of_nine_answers())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(format!("{}/api/quizzes/{}", app.address, quiz_id))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn failed_quiz_insert_leaves_no_document_behind() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;

    // Force the row insert to fail after the document is written.
    sqlx::query("DROP TABLE quizzes")
        .execute(&app.pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/admin/quizzes", app.address))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body(SAMPLE_QUIZ)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 500);

    let leftover = std::fs::read_dir(&app.quiz_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0, "orphaned quiz document left on disk");
}

#[tokio::test]
async fn corrupt_stored_answers_surface_as_server_error() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;
    let quiz_id = create_quiz(&app, &client, &token).await;
    let (_, stoken) = student_token(&app).await;

    let response = client
        .post(format!("{}/api/quizzes/{}/submit", app.address, quiz_id))
        .bearer_auth(&stoken)
        .json(&six_of_nine_answers())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let result_id = body["result_id"].as_i64().unwrap();

    sqlx::query("UPDATE results SET answers = 'not json' WHERE id = ?")
        .bind(result_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = client
        .get(format!("{}/api/results/{}", app.address, result_id))
        .bearer_auth(&stoken)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 500);

    let response = client
        .get(format!("{}/api/admin/results/{}", app.address, result_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 500);
}

#[tokio::test]
async fn settings_update_validates_max_attempts() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;

    let response = client
        .put(format!("{}/api/admin/settings", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({"max_attempts": 0, "smtp_enabled": true}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .put(format!("{}/api/admin/settings", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({"max_attempts": 5, "smtp_enabled": true}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .get(format!("{}/api/admin/settings", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["max_attempts"], 5);
    assert_eq!(body["smtp_enabled"], true);
    assert_eq!(body["smtp_configured"], false);
}

#[tokio::test]
async fn admin_manages_students() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&app).await;

    let response = client
        .post(format!("{}/api/admin/users", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "user_id": "S-1001",
            "password": "initialpw",
            "email": "s1001@example.com"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let user_db_id = body["id"].as_i64().unwrap();

    // Same student id again conflicts.
    let response = client
        .post(format!("{}/api/admin/users", app.address))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "user_id": "S-1001",
            "password": "initialpw"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);

    // The provisioned student can log in with the assigned password.
    let response = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": "Student_S-1001",
            "password": "initialpw"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .put(format!("{}/api/admin/users/{}", app.address, user_db_id))
        .bearer_auth(&token)
        .json(&serde_json::json!({"email": "changed@example.com"}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .get(format!("{}/api/admin/users", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    let users: serde_json::Value = response.json().await.unwrap();
    assert_eq!(users[0]["email"], "changed@example.com");

    let response = client
        .delete(format!("{}/api/admin/users/{}", app.address, user_db_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
}
