// tests/admin_tests.rs

use serial_test::serial;
use quizhub::{config::Config, routes, state::AppState, utils::mailer::Mailer};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::net::SocketAddr;

/// Helper function to spawn the app on a random port for testing.
async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_refresh_secret: "test_refresh_secret".to_string(),
        jwt_expiration: 600,
        refresh_expiration: 3600,
        rust_log: "error".to_string(),
        admin_email: None,
        admin_password: None,
        smtp_host: None,
        smtp_username: None,
        smtp_password: None,
        smtp_from: None,
    };

    let state = AppState {
        pool,
        config,
        mailer: Mailer::disabled(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    address
}

async fn test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test DB")
}

fn unique_email() -> String {
    format!("u_{}@example.com", &uuid::Uuid::new_v4().to_string()[..8])
}

/// Registers a user, optionally forces the role directly in the database
/// (admins cannot be self-registered), and logs them in.
/// Returns (user id, access token).
async fn seed_user(
    client: &reqwest::Client,
    address: &str,
    pool: &PgPool,
    forced_role: Option<&str>,
) -> (i64, String) {
    let email = unique_email();
    let password = "password123";

    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "name": "Test User",
            "email": email,
            "password": password
        }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(resp.status().as_u16(), 201);

    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(pool)
        .await
        .unwrap();

    if let Some(role) = forced_role {
        sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role)
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    // Login after the role change so the token carries the right claim.
    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();

    (id, login["token"].as_str().unwrap().to_string())
}

async fn role_of(pool: &PgPool, id: i64) -> String {
    sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn admin_routes_reject_non_admins() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, student_token) = seed_user(&client, &address, &pool, None).await;

    let resp = client
        .get(format!("{}/api/admin/users", address))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // No token at all
    let resp = client
        .get(format!("{}/api/admin/users", address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn promote_then_demote_round_trips_the_role() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (target_id, _) = seed_user(&client, &address, &pool, None).await;

    let before: serde_json::Value = client
        .get(format!("{}/api/admin/users/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["role"], "student");

    // student -> teacher
    let resp = client
        .put(format!("{}/api/admin/promote/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(role_of(&pool, target_id).await, "teacher");

    // teacher -> student
    let resp = client
        .put(format!("{}/api/admin/demote/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Role round-tripped with no side effects on unrelated fields.
    let after: serde_json::Value = client
        .get(format!("{}/api/admin/users/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["role"], "student");
    assert_eq!(after["name"], before["name"]);
    assert_eq!(after["email"], before["email"]);
    assert_eq!(after["last_score"], before["last_score"]);
}

#[tokio::test]
#[serial]
async fn demoting_a_student_is_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (target_id, _) = seed_user(&client, &address, &pool, None).await;

    let resp = client
        .put(format!("{}/api/admin/demote/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn last_admin_cannot_be_demoted_or_deleted() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    // Isolate the admin count check from other tests' admins by clearing
    // leftovers first.
    sqlx::query("UPDATE users SET role = 'teacher' WHERE role = 'admin'")
        .execute(&pool)
        .await
        .unwrap();

    let (admin_id, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;

    // Demoting the only admin must fail.
    let resp = client
        .put(format!("{}/api/admin/demote/{}", address, admin_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(role_of(&pool, admin_id).await, "admin");

    // A second admin deleting the only other admin is fine, but not here:
    // the only admin deleting themselves trips the self-delete guard first.
    let resp = client
        .delete(format!("{}/api/admin/users/{}", address, admin_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // With a second admin present, the first can be demoted again.
    let (_, second_admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let resp = client
        .put(format!("{}/api/admin/demote/{}", address, admin_id))
        .header("Authorization", format!("Bearer {}", second_admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(role_of(&pool, admin_id).await, "teacher");
}

#[tokio::test]
#[serial]
async fn deleting_an_admin_requires_another_admin_to_remain() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    sqlx::query("UPDATE users SET role = 'teacher' WHERE role = 'admin'")
        .execute(&pool)
        .await
        .unwrap();

    let (first_id, _) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (_, second_token) = seed_user(&client, &address, &pool, Some("admin")).await;

    // Two admins: deleting one is allowed.
    let resp = client
        .delete(format!("{}/api/admin/users/{}", address, first_id))
        .header("Authorization", format!("Bearer {}", second_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
}

#[tokio::test]
#[serial]
async fn stale_admin_token_loses_access_after_demotion() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (admin_id, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    // Second admin keeps the invariant satisfied.
    let (_, _) = seed_user(&client, &address, &pool, Some("admin")).await;

    // Works while the role is current.
    let resp = client
        .get(format!("{}/api/admin/users", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Demote directly in the database; the old token still claims 'admin'.
    sqlx::query("UPDATE users SET role = 'student' WHERE id = $1")
        .bind(admin_id)
        .execute(&pool)
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/api/admin/users", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn update_user_changes_fields_and_listing_hides_passwords() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (target_id, _) = seed_user(&client, &address, &pool, None).await;

    let new_email = unique_email();
    let resp = client
        .put(format!("{}/api/admin/users/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "name": "Renamed",
            "email": new_email
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let users: Vec<serde_json::Value> = client
        .get(format!("{}/api/admin/users", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let target = users
        .iter()
        .find(|u| u["id"].as_i64() == Some(target_id))
        .expect("Updated user missing from listing");
    assert_eq!(target["name"], "Renamed");
    assert_eq!(target["email"], new_email.as_str());
    assert!(target.get("password").is_none());
}

#[tokio::test]
#[serial]
async fn deleting_a_missing_user_is_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;

    let resp = client
        .delete(format!("{}/api/admin/users/{}", address, i64::MAX))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn promoting_an_admin_is_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (target_id, _) = seed_user(&client, &address, &pool, Some("admin")).await;

    let resp = client
        .put(format!("{}/api/admin/promote/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(role_of(&pool, target_id).await, "admin");
}

#[tokio::test]
#[serial]
async fn admin_update_with_duplicate_email_is_409() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (first_id, _) = seed_user(&client, &address, &pool, None).await;
    let (second_id, _) = seed_user(&client, &address, &pool, None).await;

    let first_email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(first_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    let resp = client
        .put(format!("{}/api/admin/users/{}", address, second_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({ "email": first_email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn admin_update_rejects_malformed_fields() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let (_, admin_token) = seed_user(&client, &address, &pool, Some("admin")).await;
    let (target_id, _) = seed_user(&client, &address, &pool, None).await;

    let email_before = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(target_id)
        .fetch_one(&pool)
        .await
        .unwrap();

    // Whitespace is not an email address.
    let resp = client
        .put(format!("{}/api/admin/users/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({ "email": " " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .put(format!("{}/api/admin/users/{}", address, target_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({ "password": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let email_after = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(target_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(email_after, email_before);
}
