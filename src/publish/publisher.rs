use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::multipart::{encode_multipart, BoundaryCollision, FilePart, MultipartBody};
use crate::http::{read_limited_bytes, FetchError};
use crate::storage::{Database, PublishState, TrackedItem};

/// Cap on the endpoint's response body, which is only inspected for errors.
const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// Length of response body kept in error messages.
const ERROR_BODY_PREVIEW: usize = 200;

/// Why a single publish attempt failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// The body could not be encoded; nothing was sent
    #[error(transparent)]
    Encoding(#[from] BoundaryCollision),
    /// 2xx response whose JSON body carries an `error_code`
    #[error("Rejected by endpoint: error_code {code}: {message}")]
    Rejected { code: i64, message: String },
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PublishError::Timeout
        } else {
            PublishError::Network(e)
        }
    }
}

/// Per-run publish counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
    /// Items that reached the retry ceiling during this run
    pub abandoned: usize,
}

/// Where and as whom to publish.
pub struct PublishTarget<'a> {
    pub endpoint: &'a Url,
    pub access_token: &'a SecretString,
    pub timeout: Duration,
}

/// Build the outbound body for `item`: `access_token`, `status`, then `pic`
/// when the item has a lead image.
pub fn build_request_body(
    item: &TrackedItem,
    access_token: &str,
) -> Result<MultipartBody, PublishError> {
    let fields = [("access_token", access_token), ("status", item.title.as_str())];
    let body = if item.image.is_empty() {
        encode_multipart(&fields, &[])?
    } else {
        encode_multipart(
            &fields,
            &[FilePart {
                name: "pic",
                filename: &item.image_name,
                data: &item.image,
            }],
        )?
    };
    Ok(body)
}

/// Post every publishable item and advance its process flag.
///
/// Success moves the flag to done; any failure adds one, up to the ceiling.
/// Failures are logged and never stop the batch. Flag updates are committed
/// together after the last request, so a crash mid-batch can repost items on
/// the next run.
pub async fn publish_pending(
    db: &Database,
    client: &reqwest::Client,
    target: &PublishTarget<'_>,
) -> Result<PublishReport> {
    let items = db.publishable().await?;
    if items.is_empty() {
        tracing::debug!("Nothing to publish");
        return Ok(PublishReport::default());
    }

    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let result = match build_request_body(&item, target.access_token.expose_secret()) {
            Ok(body) => post(client, target.endpoint, body, target.timeout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(
                endpoint = %target.endpoint,
                item_id = item.id,
                url = %item.url,
                attempt = item.process_flag.value() + 1,
                error = %e,
                "Publish failed"
            );
        } else {
            tracing::debug!(item_id = item.id, "Published");
        }
        outcomes.push((item, result));
    }

    let mut report = PublishReport::default();
    let mut session = db.begin().await?;
    for (item, result) in &outcomes {
        match result {
            Ok(()) => {
                if session.record_success(item).await?.is_some() {
                    report.published += 1;
                }
            }
            Err(e) => {
                if let Some(flag) = session.record_failure(item, &e.to_string()).await? {
                    report.failed += 1;
                    if flag.state() == PublishState::Abandoned {
                        report.abandoned += 1;
                        tracing::error!(
                            item_id = item.id,
                            url = %item.url,
                            "Item abandoned after repeated failures"
                        );
                    }
                }
            }
        }
    }
    session.commit().await?;

    tracing::info!(
        published = report.published,
        failed = report.failed,
        abandoned = report.abandoned,
        "Publishing complete"
    );
    Ok(report)
}

async fn post(
    client: &reqwest::Client,
    endpoint: &Url,
    body: MultipartBody,
    timeout: Duration,
) -> Result<(), PublishError> {
    tokio::time::timeout(timeout, async {
        let response = client
            .post(endpoint.as_str())
            .header(reqwest::header::CONTENT_TYPE, body.content_type)
            .body(body.body)
            .send()
            .await?;

        let status = response.status();
        let bytes = match read_limited_bytes(response, MAX_RESPONSE_SIZE).await {
            Ok(bytes) => bytes,
            Err(FetchError::Network(e)) => return Err(PublishError::Network(e)),
            Err(FetchError::Timeout) => return Err(PublishError::Timeout),
            // The post went through; an unreadable reply only matters on error
            Err(_) => Vec::new(),
        };
        let text = String::from_utf8_lossy(&bytes);

        if !status.is_success() {
            return Err(PublishError::HttpStatus {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_PREVIEW).collect(),
            });
        }

        match rejection(&text) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
    .await
    .map_err(|_| PublishError::Timeout)?
}

/// Detect an API-level error reported inside a 2xx JSON body.
fn rejection(body: &str) -> Option<PublishError> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let code = value.get("error_code")?;
    let code = code
        .as_i64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or_default();
    let message = value
        .get("error")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    Some(PublishError::Rejected { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use crate::storage::{Enrichment, NewItem, ProcessFlag};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn item(title: &str, image: &[u8], image_name: &str) -> TrackedItem {
        TrackedItem {
            id: 1,
            title: title.into(),
            url: "https://example.com/1".into(),
            content: String::new(),
            image: image.to_vec(),
            image_name: image_name.into(),
            process_flag: ProcessFlag::PENDING,
            last_error: None,
            created_at: 0,
            updated_at: 0,
            published_at: None,
        }
    }

    async fn seed(db: &Database, titles: &[&str]) -> Vec<i64> {
        let mut session = db.begin().await.unwrap();
        let mut ids = Vec::new();
        for title in titles {
            ids.push(
                session
                    .insert(&NewItem {
                        title: title.to_string(),
                        url: format!("https://example.com/{title}"),
                    })
                    .await
                    .unwrap(),
            );
        }
        session.commit().await.unwrap();
        ids
    }

    #[test]
    fn test_body_with_image() {
        let body = build_request_body(&item("hello", b"\xFF\xD8", "x.jpg"), "T").unwrap();
        let text = String::from_utf8_lossy(&body.body);
        assert!(text.contains("name=\"access_token\"\r\n\r\nT\r\n"));
        assert!(text.contains("name=\"status\"\r\n\r\nhello\r\n"));
        assert!(text.contains("name=\"pic\"; filename=\"x.jpg\""));
        let access = text.find("access_token").unwrap();
        let status = text.find("\"status\"").unwrap();
        let pic = text.find("\"pic\"").unwrap();
        assert!(access < status && status < pic);
    }

    #[test]
    fn test_body_without_image_is_text_only() {
        let body = build_request_body(&item("hello", b"", ""), "T").unwrap();
        let text = String::from_utf8_lossy(&body.body);
        assert!(!text.contains("name=\"pic\""));
    }

    #[test]
    fn test_rejection_detection() {
        let err = rejection(r#"{"error":"expired_token","error_code":21327}"#).unwrap();
        match err {
            PublishError::Rejected { code, message } => {
                assert_eq!(code, 21327);
                assert_eq!(message, "expired_token");
            }
            e => panic!("Expected Rejected, got {:?}", e),
        }
        assert!(rejection(r#"{"id":123,"text":"ok"}"#).is_none());
        assert!(rejection("not json").is_none());
    }

    #[tokio::test]
    async fn test_publish_success_marks_done() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/share"))
            .and(header(
                "content-type",
                "multipart/form-data; boundary=----------ThIs_Is_tHe_bouNdaRY_$",
            ))
            .and(body_string_contains("name=\"access_token\"\r\n\r\nsecret\r\n"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1}"#))
            .expect(2)
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["first", "second"]).await;
        let endpoint = Url::parse(&format!("{}/share", mock_server.uri())).unwrap();
        let token = SecretString::from("secret".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(
            report,
            PublishReport {
                published: 2,
                failed: 0,
                abandoned: 0,
            }
        );

        for id in ids {
            let item = db.get_item(id).await.unwrap().unwrap();
            assert_eq!(item.process_flag, ProcessFlag::DONE);
            assert!(item.published_at.is_some());
        }
        assert!(db.publishable().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_sends_image_part() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("name=\"pic\"; filename=\"lead.jpg\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["pic"]).await;
        let stored = db.get_item(ids[0]).await.unwrap().unwrap();
        let mut session = db.begin().await.unwrap();
        session
            .apply_enrichment(
                &stored,
                &Enrichment {
                    content: "<div>x</div>".into(),
                    image: b"GIF89a".to_vec(),
                    image_name: "lead.jpg".into(),
                },
            )
            .await
            .unwrap();
        session.commit().await.unwrap();

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn test_failures_increment_and_batch_continues() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\r\n\r\nbad\r\n"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\r\n\r\nrejected\r\n"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"error":"repeated content","error_code":20019}"#),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\r\n\r\ngood\r\n"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["bad", "rejected", "good"]).await;
        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 2);

        let bad = db.get_item(ids[0]).await.unwrap().unwrap();
        assert_eq!(bad.process_flag.value(), 1);
        assert!(bad.last_error.unwrap().contains("500"));

        let rejected = db.get_item(ids[1]).await.unwrap().unwrap();
        assert_eq!(rejected.process_flag.value(), 1);
        assert!(rejected.last_error.unwrap().contains("20019"));

        let good = db.get_item(ids[2]).await.unwrap().unwrap();
        assert_eq!(good.process_flag, ProcessFlag::DONE);
    }

    #[tokio::test]
    async fn test_ninth_failure_abandons() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["doomed"]).await;
        sqlx::query("UPDATE tracked_items SET process_flag = 9 WHERE id = ?")
            .bind(ids[0])
            .execute(&db.pool)
            .await
            .unwrap();

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.abandoned, 1);
        let item = db.get_item(ids[0]).await.unwrap().unwrap();
        assert_eq!(item.process_flag, ProcessFlag::ABANDONED);

        // Abandoned items are never selected again
        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["slow"]).await;
        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: Duration::from_millis(50),
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.failed, 1);
        let item = db.get_item(ids[0]).await.unwrap().unwrap();
        assert_eq!(item.process_flag.value(), 1);
        assert_eq!(item.last_error.as_deref(), Some("Request timed out"));
    }

    #[tokio::test]
    async fn test_client_deadline_recorded_as_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let ids = seed(&db, &["slow"]).await;
        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        // The client's own deadline fires first
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.failed, 1);
        let item = db.get_item(ids[0]).await.unwrap().unwrap();
        assert_eq!(item.last_error.as_deref(), Some("Request timed out"));
    }

    #[tokio::test]
    async fn test_title_with_boundary_fails_without_posting() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let title = format!("bad{}", crate::publish::BOUNDARY);
        let ids = seed(&db, &[title.as_str()]).await;
        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let token = SecretString::from("t".to_string());
        let target = PublishTarget {
            endpoint: &endpoint,
            access_token: &token,
            timeout: TIMEOUT,
        };
        let client = build_client(TIMEOUT).unwrap();

        let report = publish_pending(&db, &client, &target).await.unwrap();
        assert_eq!(report.failed, 1);
        let item = db.get_item(ids[0]).await.unwrap().unwrap();
        assert_eq!(item.process_flag.value(), 1);
        assert!(item
            .last_error
            .as_deref()
            .unwrap()
            .contains("contains the body boundary"));
    }
}
