use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use nutriflow_core::error::AnalysisError;
use nutriflow_core::rate_limit::{RateLimiter, VISION_SERVICE};
use nutriflow_core::service::FoodRecognizer;
use nutriflow_core::vision::{
    PollPolicy, RECOGNITION_INSTRUCTION, Recognition, ResultResponse, SubmitResponse, TaskStatus,
    TokenCache, TokenResponse, VisionFoodItem, recognition_from_answers,
};

use crate::config::VisionConfig;
use crate::http::{build_client, endpoint};

const TOKEN_PATH: &str = "/oauth/2.0/token";
const SUBMIT_PATH: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/image/visionbus";
const RESULT_PATH: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/image/visionbus_result";

/// Photo recognition against the asynchronous image-understanding service:
/// fetch a token, submit the photo, then poll until the task settles.
pub struct VisionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    tokens: TokenCache,
    limiter: Arc<RateLimiter>,
    poll: PollPolicy,
}

impl VisionClient {
    pub fn new(config: &VisionConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let (api_key, secret_key) = config.credentials()?;
        Ok(Self {
            client: build_client(Duration::from_secs(10))?,
            base_url: config.base_url.clone(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            tokens: TokenCache::default(),
            limiter,
            poll: PollPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    async fn access_token(&self) -> Result<String, AnalysisError> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }

        let resp = self
            .client
            .post(endpoint(&self.base_url, TOKEN_PATH))
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.secret_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AnalysisError::Authentication(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnalysisError::Authentication(format!("token endpoint returned {status}")));
        }

        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| AnalysisError::Authentication(e.to_string()))?
            .into_token()?;
        self.tokens.store(&token);
        debug!("fetched new vision access token");
        Ok(token)
    }

    async fn submit(&self, token: &str, image_base64: &str) -> Result<String, AnalysisError> {
        let body = json!({
            "access_token": token,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{image_base64}") }
                    },
                    { "type": "text", "text": RECOGNITION_INSTRUCTION }
                ]
            }],
            "stream": false
        });

        let resp = self
            .client
            .post(endpoint(&self.base_url, SUBMIT_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Submission(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.clear();
        }
        if !status.is_success() {
            return Err(AnalysisError::Submission(format!("submit returned {status}")));
        }

        let submitted = resp
            .json::<SubmitResponse>()
            .await
            .map_err(|e| AnalysisError::Submission(e.to_string()))?;
        if submitted.token_rejected() {
            warn!("vision access token rejected, dropping cached token");
            self.tokens.clear();
        }
        let task_id = submitted.into_task_id()?;
        debug!(task_id = %task_id, "recognition task submitted");
        Ok(task_id)
    }

    async fn poll_once(&self, token: &str, task_id: &str) -> Result<ResultResponse, AnalysisError> {
        let resp = self
            .client
            .post(endpoint(&self.base_url, RESULT_PATH))
            .query(&[("access_token", token), ("task_id", task_id)])
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnalysisError::Request(format!("result endpoint returned {status}")));
        }

        resp.json::<ResultResponse>()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))
    }

    async fn wait_for_result(
        &self,
        token: &str,
        task_id: &str,
    ) -> Result<Vec<VisionFoodItem>, AnalysisError> {
        let attempts = self.poll.max_attempts;
        let mut last_error = String::from("task still processing");

        for attempt in 1..=attempts {
            match self.poll_once(token, task_id).await {
                Ok(resp) => match resp.status() {
                    TaskStatus::Success => return Ok(resp.into_answers()),
                    TaskStatus::Processing => {
                        debug!(attempt, "recognition still processing");
                        last_error = String::from("task still processing");
                    }
                    TaskStatus::Failed => return Err(AnalysisError::TaskFailed),
                    TaskStatus::Unknown(status) => {
                        return Err(AnalysisError::UnknownStatus(status));
                    }
                },
                Err(e) if e.is_transient() => {
                    debug!(attempt, error = %e, "poll failed, retrying");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        Err(AnalysisError::Timeout {
            attempts,
            last_error,
        })
    }
}

#[async_trait]
impl FoodRecognizer for VisionClient {
    async fn recognize(&self, image_base64: &str) -> Result<Recognition, AnalysisError> {
        if !self.limiter.can_call(VISION_SERVICE) {
            warn!("vision rate limit reached");
            return Err(AnalysisError::RateLimited {
                service: VISION_SERVICE.to_string(),
            });
        }
        let token = self.access_token().await?;
        let task_id = self.submit(&token, image_base64).await?;
        let answers = self.wait_for_result(&token, &task_id).await?;
        recognition_from_answers(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_poll(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    fn client_for(server: &MockServer, limiter: RateLimiter, attempts: u32) -> VisionClient {
        let config = VisionConfig {
            api_key: Some("key".into()),
            secret_key: Some("secret".into()),
            base_url: server.uri(),
        };
        VisionClient::new(&config, Arc::new(limiter))
            .unwrap()
            .with_poll_policy(fast_poll(attempts))
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(query_param("grant_type", "client_credentials"))
            .and(query_param("client_id", "key"))
            .and(query_param("client_secret", "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "tok", "expires_in": 2_592_000 })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .and(body_partial_json(json!({ "access_token": "tok", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "task-1" })))
            .mount(server)
            .await;
    }

    fn success_body() -> serde_json::Value {
        json!({
            "task_status": "SUCCESS",
            "data": { "answer": [
                { "name": "米饭", "unit": "碗", "quantity": "一碗" },
                { "name": "鸡蛋", "unit": "", "quantity": "两个" }
            ]}
        })
    }

    #[tokio::test]
    async fn test_recognize_polls_until_success() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .and(query_param("task_id", "task-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "task_status": "PROCESSING" })),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 5);
        let r = client.recognize("aGVsbG8=").await.unwrap();
        assert_eq!(r.dish_name, "米饭+鸡蛋等2种食物");
        assert_eq!(r.items[0].unit, "碗");
        assert_eq!(r.items[1].unit, "份");
        assert_eq!(r.items[1].quantity, 2.0);
    }

    #[tokio::test]
    async fn test_token_is_cached_between_calls() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        client.recognize("aGVsbG8=").await.unwrap();
        client.recognize("aGVsbG8=").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_token_is_fetched_again() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "error_code": 111, "error_msg": "Access token expired" }),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Submission(ref m) if m.contains("111")));
        client.recognize("aGVsbG8=").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_task_stops_immediately() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_status": "FAILED" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 5);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::TaskFailed));
    }

    #[tokio::test]
    async fn test_unknown_status_stops_immediately() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_status": "QUEUED" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 5);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownStatus(ref s) if s == "QUEUED"));
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_into_timeout() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        match err {
            AnalysisError::Timeout {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("502"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_answer_is_no_data() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        mount_submit(&server).await;
        Mock::given(method("POST"))
            .and(path(RESULT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "task_status": "SUCCESS", "data": { "answer": [] } })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoData));
    }

    #[tokio::test]
    async fn test_token_error_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "unknown client id"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_missing_task_id_is_submission_failure() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error_msg": "bad image" })))
            .mount(&server)
            .await;

        let client = client_for(&server, RateLimiter::default(), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Submission(_)));
    }

    #[tokio::test]
    async fn test_rate_limited_before_any_request() {
        let server = MockServer::start().await;
        mount_token(&server, 0).await;

        let client = client_for(&server, RateLimiter::new(0, Duration::from_secs(60)), 3);
        let err = client.recognize("aGVsbG8=").await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited { .. }));
    }
}
