//! Router Assembly

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::ServerConfig;
use crate::handlers::{create_payment_intent, health_check, list_plans, quote, webhook};
use crate::state::AppState;
use crate::users;

/// CORS restricted to the configured origins
pub fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let admin = Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}", get(admin::get_order))
        .route("/users/{id}", get(users::get_user))
        .route(
            "/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    let accounts = Router::new()
        .route("/", post(users::sign_up))
        .route("/{id}", get(users::get_user))
        .route("/{id}/addresses", post(users::add_address))
        .route(
            "/{id}/addresses/{address_id}",
            put(users::update_address).delete(users::remove_address),
        )
        .route("/{id}/addresses/{address_id}/default", put(users::set_default_address))
        .route("/{id}/payment-methods", post(users::add_payment_method))
        .route(
            "/{id}/payment-methods/{method_id}",
            put(users::update_payment_method).delete(users::remove_payment_method),
        )
        .route(
            "/{id}/payment-methods/{method_id}/default",
            put(users::set_default_payment_method),
        );

    Router::new()
        // Health & catalog
        .route("/health", get(health_check))
        .route("/api/plans", get(list_plans))
        .route("/api/quote", post(quote))

        // Payments
        .route("/api/create-payment-intent", post(create_payment_intent))
        .route("/webhook", post(webhook))

        // Accounts
        .nest("/api/users", accounts)

        // Admin
        .nest("/api/admin", admin)

        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use admitdb_core::{MemoryStore, OrderId};
    use admitdb_payments::{MockGateway, MISSING_FIELDS};
    use admitdb_pricing::Catalog;

    const ADMIN_TOKEN: &str = "admin-test-token";

    struct TestApp {
        router: Router,
        state: AppState,
        gateway: Option<Arc<MockGateway>>,
    }

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        ServerConfig::from_lookup(|key| map.get(key).map(|v| (*v).to_string())).unwrap()
    }

    async fn app_with(gateway: Option<Arc<MockGateway>>, vars: &[(&str, &str)]) -> TestApp {
        let config = config(vars);
        let store = Arc::new(MemoryStore::new());
        let dyn_gateway = gateway
            .clone()
            .map(|g| g as Arc<dyn admitdb_payments::PaymentGateway>);
        let state = AppState::build(&config, Catalog::sample(), store, dyn_gateway).unwrap();

        TestApp {
            router: build_router(state.clone(), &config),
            state,
            gateway,
        }
    }

    async fn app() -> TestApp {
        app_with(
            Some(Arc::new(MockGateway::new())),
            &[("ADMIN_API_TOKEN", ADMIN_TOKEN), ("STRIPE_WEBHOOK_SECRET", "whsec_mock")],
        )
        .await
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, body: Option<&Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn admin_request(method: Method, uri: &str, body: Option<&Value>) -> Request<Body> {
        let mut request = json_request(method, uri, body);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {ADMIN_TOKEN}")).unwrap(),
        );
        request
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Sign up `uid_42` the way the client does after authentication
    async fn sign_up(router: &Router) {
        let response = send(
            router,
            post_json(
                "/api/users",
                &json!({
                    "id": "uid_42",
                    "email": "Applicant@Example.com",
                    "firstName": "Avery",
                    "lastName": "Kim"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    fn student_checkout() -> Value {
        json!({
            "amount": 11.99,
            "currency": "usd",
            "plan": "cheatsheet",
            "userId": "uid_42",
            "discount": 20,
            "couponCode": "STUDENT2025"
        })
    }

    #[tokio::test]
    async fn test_health_reports_configuration() {
        let t = app_with(None, &[("STRIPE_SECRET_KEY", "sk_test_1")]).await;

        let response = send(&t.router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["paymentGatewayInitialized"], false);
        assert_eq!(body["storeInitialized"], true);
        assert_eq!(body["gateway"], Value::Null);
        assert_eq!(body["environment"]["stripeSecretKey"], true);
        assert_eq!(body["environment"]["stripeWebhookSecret"], false);
    }

    #[tokio::test]
    async fn test_payment_routes_unavailable_without_gateway() {
        let t = app_with(None, &[]).await;

        let response = send(&t.router, post_json("/api/create-payment-intent", &student_checkout())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["error"].is_string());

        let response = send(
            &t.router,
            Request::post("/webhook").body(Body::from("{}")).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_plans_and_quote() {
        let t = app().await;

        let response = send(&t.router, Request::get("/api/plans").body(Body::empty()).unwrap()).await;
        let body = json_body(response).await;
        assert_eq!(body["currency"], "usd");
        assert_eq!(body["plans"].as_array().unwrap().len(), 4);

        let response = send(
            &t.router,
            post_json("/api/quote", &json!({"plan": "cheatsheet", "couponCode": "student2025"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["amount"], json!(11.99));
        assert_eq!(body["discount"], 20);
        assert_eq!(body["couponCode"], "STUDENT2025");

        let response = send(
            &t.router,
            post_json("/api/quote", &json!({"plan": "cheatsheet", "couponCode": "FAKE123"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_rejects_bad_requests() {
        let t = app().await;

        let response = send(&t.router, post_json("/api/create-payment-intent", &json!({"plan": "cheatsheet"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], MISSING_FIELDS);

        let response = send(
            &t.router,
            Request::post("/api/create-payment-intent")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let mut fake = student_checkout();
        fake["couponCode"] = json!("FAKE123");
        let response = send(&t.router, post_json("/api/create-payment-intent", &fake)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid coupon code: FAKE123");

        assert!(t.gateway.as_ref().unwrap().requests().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_500_with_gateway_message() {
        let t = app().await;
        t.gateway.as_ref().unwrap().reject_with("Your card was declined.");

        let response = send(&t.router, post_json("/api/create-payment-intent", &student_checkout())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Your card was declined.");
    }

    #[tokio::test]
    async fn test_checkout_then_webhook_grants_access() {
        let t = app().await;
        let gateway = t.gateway.clone().unwrap();
        sign_up(&t.router).await;

        let response = send(&t.router, post_json("/api/create-payment-intent", &student_checkout())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["amount"], json!(11.99));
        assert!(receipt["clientSecret"].as_str().unwrap().starts_with("pi_mock_"));
        let order_id = receipt["orderId"].as_str().unwrap().to_string();

        let order = t
            .state
            .orders
            .get(&OrderId::from_string(order_id.clone()))
            .await
            .unwrap()
            .unwrap();
        let sent = gateway.requests().remove(0);
        let payload = MockGateway::succeeded_payload(
            "evt_router_1",
            order.payment_intent_id.as_deref().unwrap(),
            sent.amount_minor,
            &sent.metadata,
        );
        let signature = gateway.sign(&payload).unwrap();

        let webhook = || {
            Request::post("/webhook")
                .header(crate::handlers::SIGNATURE_HEADER, signature.clone())
                .body(Body::from(payload.clone()))
                .unwrap()
        };
        let response = send(&t.router, webhook()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"received": true}));

        // redelivery is acknowledged without a second grant
        let response = send(&t.router, webhook()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &t.router,
            admin_request(Method::GET, &format!("/api/admin/orders/{order_id}"), None),
        )
        .await;
        assert_eq!(json_body(response).await["status"], "completed");

        let response = send(&t.router, admin_request(Method::GET, "/api/admin/users/uid_42", None)).await;
        let user = json_body(response).await;
        assert_eq!(user["subscriptions"].as_array().unwrap().len(), 1);
        assert_eq!(user["capabilities"], json!(["basic"]));

        let response = send(&t.router, admin_request(Method::GET, "/api/admin/orders", None)).await;
        let orders = json_body(response).await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
        assert_eq!(orders[0]["id"], order_id.as_str());
    }

    #[tokio::test]
    async fn test_partner_checkout_for_signed_up_user() {
        let t = app().await;
        let partner = json!({
            "amount": 0,
            "plan": "complete",
            "userId": "uid_42",
            "couponCode": "PARTNER"
        });

        // the settlement needs the user document
        let response = send(&t.router, post_json("/api/create-payment-intent", &partner)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        sign_up(&t.router).await;
        let mut retry = partner.clone();
        retry["idempotencyKey"] = json!("partner-1");
        let response = send(&t.router, post_json("/api/create-payment-intent", &retry)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["clientSecret"], Value::Null);
        assert_eq!(receipt["amount"], json!(0.0));
        assert!(t.gateway.as_ref().unwrap().requests().is_empty());

        let response = send(&t.router, post_json("/api/create-payment-intent", &retry)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["orderId"], receipt["orderId"]);

        let response = send(&t.router, json_request(Method::GET, "/api/users/uid_42", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = json_body(response).await;
        assert_eq!(user["subscriptions"].as_array().unwrap().len(), 1);
        assert!(user["capabilities"].as_array().unwrap().contains(&json!("application")));
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let t = app().await;
        sign_up(&t.router).await;

        let response = send(
            &t.router,
            post_json("/api/users", &json!({"id": "uid_42", "email": "other@example.com"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&t.router, post_json("/api/users", &json!({"id": "uid_7", "email": " "}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&t.router, json_request(Method::GET, "/api/users/uid_7", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&t.router, json_request(Method::GET, "/api/users/uid_42", None)).await;
        let user = json_body(response).await;
        assert_eq!(user["email"], "applicant@example.com");
        assert_eq!(user["capabilities"], json!([]));
    }

    #[tokio::test]
    async fn test_saved_addresses() {
        let t = app().await;
        sign_up(&t.router).await;

        let home = json!({
            "id": "home",
            "name": "Avery Kim",
            "line1": "1 Main St",
            "city": "Boston",
            "state": "MA",
            "postalCode": "02115",
            "country": "us",
            "isDefault": true
        });
        let mut work = home.clone();
        work["id"] = json!("work");
        work["line1"] = json!("200 Longwood Ave");

        for body in [&home, &work] {
            let response = send(
                &t.router,
                json_request(Method::POST, "/api/users/uid_42/addresses", Some(body)),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let mut moved = home.clone();
        moved["city"] = json!("Cambridge");
        moved["isDefault"] = json!(false);
        let response = send(
            &t.router,
            json_request(Method::PUT, "/api/users/uid_42/addresses/home", Some(&moved)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["city"], "Cambridge");
        assert_eq!(updated["country"], "US");

        let response = send(
            &t.router,
            json_request(Method::PUT, "/api/users/uid_42/addresses/home/default", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&t.router, json_request(Method::GET, "/api/users/uid_42", None)).await;
        let user = json_body(response).await;
        let defaults: Vec<&str> = user["addresses"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|a| a["isDefault"] == json!(true))
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        assert_eq!(defaults, vec!["home"]);

        let response = send(
            &t.router,
            json_request(Method::DELETE, "/api/users/uid_42/addresses/work", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(
            &t.router,
            json_request(Method::DELETE, "/api/users/uid_42/addresses/work", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &t.router,
            json_request(Method::POST, "/api/users/uid_7/addresses", Some(&home)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut blank = home.clone();
        blank["line1"] = json!("");
        let response = send(
            &t.router,
            json_request(Method::POST, "/api/users/uid_42/addresses", Some(&blank)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_saved_payment_methods() {
        let t = app().await;
        sign_up(&t.router).await;

        let visa = json!({
            "id": "card_1",
            "cardNumber": "4242 4242 4242 4242",
            "cardholderName": "Avery Kim",
            "expiryDate": "12/30",
            "isDefault": true
        });
        let response = send(
            &t.router,
            json_request(Method::POST, "/api/users/uid_42/payment-methods", Some(&visa)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let saved = json_body(response).await;
        assert_eq!(saved["cardType"], "Visa");
        assert_eq!(saved["lastFourDigits"], "4242");
        assert!(saved.get("cardNumber").is_none());

        let mut mistyped = visa.clone();
        mistyped["id"] = json!("card_x");
        mistyped["cardNumber"] = json!("4242 4242 4242 4241");
        let response = send(
            &t.router,
            json_request(Method::POST, "/api/users/uid_42/payment-methods", Some(&mistyped)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mastercard = json!({
            "id": "card_2",
            "cardNumber": "5555555555554444",
            "cardholderName": "Avery Kim",
            "expiryDate": "01/29"
        });
        let response = send(
            &t.router,
            json_request(Method::POST, "/api/users/uid_42/payment-methods", Some(&mastercard)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(
            &t.router,
            json_request(Method::PUT, "/api/users/uid_42/payment-methods/card_2/default", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let mut reissued = mastercard.clone();
        reissued["expiryDate"] = json!("03/2031");
        reissued["isDefault"] = json!(true);
        let response = send(
            &t.router,
            json_request(Method::PUT, "/api/users/uid_42/payment-methods/card_2", Some(&reissued)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["expiryDate"], "03/31");

        let response = send(
            &t.router,
            json_request(Method::DELETE, "/api/users/uid_42/payment-methods/card_1", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&t.router, json_request(Method::GET, "/api/users/uid_42", None)).await;
        let methods = json_body(response).await["paymentMethods"].clone();
        assert_eq!(methods.as_array().unwrap().len(), 1);
        assert_eq!(methods[0]["id"], "card_2");
        assert_eq!(methods[0]["cardType"], "Mastercard");
        assert_eq!(methods[0]["isDefault"], true);

        let response = send(
            &t.router,
            json_request(Method::PUT, "/api/users/uid_42/payment-methods/card_1/default", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let t = app().await;
        let payload = MockGateway::succeeded_payload("evt_x", "pi_x", 1499, &Default::default());

        let response = send(
            &t.router,
            Request::post("/webhook")
                .header(crate::handlers::SIGNATURE_HEADER, "t=1,v1=deadbeef")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(text_body(response).await.starts_with("Webhook Error: "));

        let response = send(&t.router, Request::post("/webhook").body(Body::from(payload)).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let t = app().await;

        let response = send(
            &t.router,
            Request::get("/api/admin/products").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &t.router,
            Request::get("/api/admin/products")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let unconfigured = app_with(Some(Arc::new(MockGateway::new())), &[]).await;
        let response = send(
            &unconfigured.router,
            admin_request(Method::GET, "/api/admin/products", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_product_lifecycle() {
        let t = app().await;

        let input = json!({
            "name": "Essay Templates",
            "description": "Ten annotated essays",
            "price": 19.99,
            "type": "digital",
            "category": "essays",
            "features": ["PDF", "Lifetime updates"],
            "file": {
                "url": "https://files.example/essays.pdf",
                "path": "products/essays.pdf",
                "size": 48213,
                "contentType": "application/pdf"
            }
        });
        let response = send(
            &t.router,
            admin_request(Method::POST, "/api/admin/products", Some(&input)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["createdBy"], "admin");

        let mut edit = input.clone();
        edit["isActive"] = json!(false);
        let response = send(
            &t.router,
            admin_request(Method::PUT, &format!("/api/admin/products/{id}"), Some(&edit)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&t.router, admin_request(Method::GET, "/api/admin/products", None)).await;
        assert!(json_body(response).await.as_array().unwrap().is_empty());
        let response = send(
            &t.router,
            admin_request(Method::GET, "/api/admin/products?includeInactive=true", None),
        )
        .await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let response = send(
            &t.router,
            admin_request(Method::DELETE, &format!("/api/admin/products/{id}"), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["file"]["path"], "products/essays.pdf");

        let response = send(
            &t.router,
            admin_request(Method::DELETE, &format!("/api/admin/products/{id}"), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_product_is_400() {
        let t = app().await;
        let response = send(
            &t.router,
            admin_request(
                Method::POST,
                "/api/admin/products",
                Some(&json!({"name": " ", "price": 5})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
