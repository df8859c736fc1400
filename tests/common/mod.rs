//! Shared harness for HTTP-level tests
#![allow(dead_code)]

use appoint::{
    clock::{Clock, FixedClock},
    config::ServerConfig,
    db,
    error::AppResult,
    otp::{CodeDelivery, OtpPurpose},
    server, AppContext,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const ADMIN_PHONE: &str = "09990000000";

/// Records every delivered code so tests can read it back
#[derive(Default)]
pub struct CapturingDelivery {
    codes: Mutex<Vec<(String, String)>>,
}

impl CapturingDelivery {
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == phone)
            .map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl CodeDelivery for CapturingDelivery {
    async fn deliver(&self, phone: &str, code: &str, _purpose: OtpPurpose) -> AppResult<()> {
        self.codes
            .lock()
            .unwrap()
            .push((phone.to_string(), code.to_string()));
        Ok(())
    }
}

/// Monday 2026-05-04 10:00 local time
pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::for_tests();
    config.authentication.admin_phones = vec![ADMIN_PHONE.to_string()];
    config.rate_limit.enabled = false;
    config
}

pub struct TestApp {
    pub ctx: AppContext,
    pub router: Router,
    pub clock: Arc<FixedClock>,
    pub delivery: Arc<CapturingDelivery>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let pool = db::create_memory_pool().await.unwrap();
        let clock = Arc::new(FixedClock::new(start()));
        let delivery = Arc::new(CapturingDelivery::default());
        let ctx = AppContext::with_pool(
            config,
            pool,
            clock.clone() as Arc<dyn Clock>,
            delivery.clone() as Arc<dyn CodeDelivery>,
        );
        let router = server::build_router(ctx.clone());

        Self {
            ctx,
            router,
            clock,
            delivery,
        }
    }

    /// Send a request and decode the JSON body (Null when empty)
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    /// Verify the last code sent to `phone` and return the access token
    pub async fn verify(&self, phone: &str) -> (String, String) {
        let code = self.delivery.last_code_for(phone).expect("no code delivered");
        let (status, body) = self
            .post(
                "/api/account/verify/",
                None,
                serde_json::json!({ "phone": phone, "code": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
        (
            body["access"].as_str().unwrap().to_string(),
            body["refresh"].as_str().unwrap().to_string(),
        )
    }

    /// Register and verify a booker, returning its access token
    pub async fn booker(&self, phone: &str, name: &str) -> String {
        let (status, _) = self
            .post(
                "/api/account/register-phone/booker/",
                None,
                serde_json::json!({ "phone": phone, "name": name, "family": "Rahimi" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        self.verify(phone).await.0
    }

    /// Register and verify a scheduler, returning its access token
    pub async fn scheduler(&self, phone: &str, name: &str) -> String {
        let (status, _) = self
            .post(
                "/api/account/register-phone/scheduler/",
                None,
                serde_json::json!({
                    "phone": phone,
                    "name": name,
                    "family": "Moradi",
                    "bio": "Dentist"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        self.verify(phone).await.0
    }
}
