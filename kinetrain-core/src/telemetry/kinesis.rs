//! Kinesis Data Streams and Kinesis Data Firehose transports.
//!
//! Both services speak AWS JSON 1.1 over a signed POST to `/`; they differ only
//! in target header, request body and acknowledgment fields.

use super::sigv4::{self, AwsCredentials, SigningRequest};
use super::{DeliveryAck, RecordTransport};
use crate::error::SinkError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Which Kinesis API a transport talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinesisApi {
    Streams,
    Firehose,
}

impl KinesisApi {
    /// Service name used in the host and the signing scope.
    pub fn service(&self) -> &'static str {
        match self {
            Self::Streams => "kinesis",
            Self::Firehose => "firehose",
        }
    }

    fn target(&self) -> &'static str {
        match self {
            Self::Streams => "Kinesis_20131202.PutRecord",
            Self::Firehose => "Firehose_20150804.PutRecord",
        }
    }

    fn body(&self, stream: &str, data: &str, partition_key: &str) -> serde_json::Value {
        match self {
            Self::Streams => serde_json::json!({
                "StreamName": stream,
                "Data": data,
                "PartitionKey": partition_key,
            }),
            // Firehose has no partition key; the delivery stream is a single log.
            Self::Firehose => serde_json::json!({
                "DeliveryStreamName": stream,
                "Record": { "Data": data },
            }),
        }
    }
}

/// A fully built, signed request ready to send.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// `PutRecord` response fields for either API.
#[derive(Debug, Default, Deserialize)]
struct PutRecordResponse {
    #[serde(rename = "ShardId")]
    shard_id: Option<String>,
    #[serde(rename = "SequenceNumber")]
    sequence_number: Option<String>,
    #[serde(rename = "RecordId")]
    record_id: Option<String>,
}

/// AWS JSON error envelope.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Transport delivering records through Kinesis `PutRecord`.
pub struct KinesisTransport {
    api: KinesisApi,
    stream_name: String,
    region: String,
    endpoint: String,
    credentials: AwsCredentials,
    client: reqwest::Client,
}

impl KinesisTransport {
    pub fn new(
        api: KinesisApi,
        stream_name: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        credentials: AwsCredentials,
    ) -> Self {
        let region = region.into();
        let endpoint = endpoint
            .unwrap_or_else(|| format!("https://{}.{}.amazonaws.com", api.service(), region));
        Self {
            api,
            stream_name: stream_name.into(),
            region,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build and sign the `PutRecord` request for a payload.
    pub fn build_request(
        &self,
        payload: &[u8],
        partition_key: &str,
        at: &DateTime<Utc>,
    ) -> Result<SignedRequest, SinkError> {
        let data = base64::engine::general_purpose::STANDARD.encode(payload);
        let body = serde_json::to_vec(&self.api.body(&self.stream_name, &data, partition_key))?;

        let host = host_of(&self.endpoint);
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), CONTENT_TYPE.to_string());
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-date".to_string(), sigv4::amz_date(at));
        headers.insert("x-amz-target".to_string(), self.api.target().to_string());
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let auth = sigv4::authorization(
            &self.credentials,
            &SigningRequest {
                method: "POST",
                path: "/",
                query: "",
                headers: &headers,
                payload: &body,
            },
            &self.region,
            self.api.service(),
            at,
        );
        headers.insert("authorization".to_string(), auth);

        Ok(SignedRequest {
            url: format!("{}/", self.endpoint),
            headers,
            body,
        })
    }

    fn ack_from(&self, body: &str) -> DeliveryAck {
        let parsed: PutRecordResponse = serde_json::from_str(body).unwrap_or_default();
        DeliveryAck {
            sink: self.api.service().to_string(),
            stream: self.stream_name.clone(),
            shard_id: parsed.shard_id,
            sequence_number: parsed.sequence_number,
            record_id: parsed.record_id,
            attempts: 1,
        }
    }
}

/// Host component of an endpoint URL, port included.
fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// Map a non-success response onto the sink error taxonomy.
pub fn classify_error(sink: &str, status: u16, body: &str) -> SinkError {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    // `__type` may be prefixed with a namespace, e.g. "com.amazon.coral#Foo".
    let kind = parsed
        .error_type
        .rsplit('#')
        .next()
        .unwrap_or_default()
        .to_string();
    let message = if parsed.message.is_empty() {
        format!("{kind} {body}").trim().to_string()
    } else {
        format!("{kind}: {}", parsed.message)
    };
    let sink = sink.to_string();

    const THROTTLING: &[&str] = &[
        "ProvisionedThroughputExceededException",
        "ThrottlingException",
        "LimitExceededException",
        "ServiceUnavailableException",
    ];
    const AUTH: &[&str] = &[
        "UnrecognizedClientException",
        "AccessDeniedException",
        "InvalidSignatureException",
        "IncompleteSignature",
        "MissingAuthenticationToken",
        "ExpiredTokenException",
        "KMSAccessDeniedException",
    ];

    if status == 429 || THROTTLING.contains(&kind.as_str()) {
        SinkError::Throttled { sink, message }
    } else if status == 401 || status == 403 || AUTH.contains(&kind.as_str()) {
        SinkError::Auth { sink, message }
    } else if status >= 500 {
        SinkError::Transport { sink, message }
    } else {
        SinkError::Rejected {
            sink,
            status,
            message,
        }
    }
}

#[async_trait]
impl RecordTransport for KinesisTransport {
    fn name(&self) -> &str {
        self.api.service()
    }

    async fn put_record(&self, payload: &[u8], partition_key: &str) -> Result<DeliveryAck, SinkError> {
        let request = self.build_request(payload, partition_key, &Utc::now())?;

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            // reqwest derives Host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let resp = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| SinkError::Transport {
                sink: self.name().to_string(),
                message: format!("HTTP error: {e}"),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| SinkError::Transport {
            sink: self.name().to_string(),
            message: format!("Read error: {e}"),
        })?;

        if !status.is_success() {
            return Err(classify_error(self.name(), status.as_u16(), &body));
        }

        Ok(self.ack_from(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn transport(api: KinesisApi) -> KinesisTransport {
        KinesisTransport::new(
            api,
            "training-progress",
            "eu-west-3",
            None,
            AwsCredentials::new("AKIDEXAMPLE", "secret"),
        )
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_endpoint_is_regional() {
        assert_eq!(
            transport(KinesisApi::Streams).endpoint(),
            "https://kinesis.eu-west-3.amazonaws.com"
        );
        assert_eq!(
            transport(KinesisApi::Firehose).endpoint(),
            "https://firehose.eu-west-3.amazonaws.com"
        );
    }

    #[test]
    fn test_streams_request_carries_partition_key() {
        let req = transport(KinesisApi::Streams)
            .build_request(br#"{"epoch":1}"#, "partition", &at())
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["StreamName"], "training-progress");
        assert_eq!(body["PartitionKey"], "partition");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(body["Data"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, br#"{"epoch":1}"#);
        assert_eq!(req.headers["x-amz-target"], "Kinesis_20131202.PutRecord");
        assert_eq!(req.headers["host"], "kinesis.eu-west-3.amazonaws.com");
        assert_eq!(req.url, "https://kinesis.eu-west-3.amazonaws.com/");
    }

    #[test]
    fn test_firehose_request_shape() {
        let req = transport(KinesisApi::Firehose)
            .build_request(b"{}", "partition", &at())
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["DeliveryStreamName"], "training-progress");
        assert!(body["Record"]["Data"].is_string());
        assert!(body.get("PartitionKey").is_none());
        assert_eq!(req.headers["x-amz-target"], "Firehose_20150804.PutRecord");
    }

    #[test]
    fn test_request_is_signed() {
        let req = transport(KinesisApi::Streams)
            .build_request(b"{}", "partition", &at())
            .unwrap();
        let auth = &req.headers["authorization"];
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240831/eu-west-3/kinesis/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target"));
        assert_eq!(req.headers["x-amz-date"], "20240831T120000Z");
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut creds = AwsCredentials::new("AKID", "secret");
        creds.session_token = Some("token".into());
        let t = KinesisTransport::new(KinesisApi::Streams, "s", "eu-west-3", None, creds);
        let req = t.build_request(b"{}", "partition", &at()).unwrap();
        assert_eq!(req.headers["x-amz-security-token"], "token");
        assert!(req.headers["authorization"].contains("x-amz-security-token"));
    }

    #[test]
    fn test_endpoint_override_sets_host() {
        let t = KinesisTransport::new(
            KinesisApi::Streams,
            "s",
            "us-east-1",
            Some("http://localhost:4566/".into()),
            AwsCredentials::new("test", "test"),
        );
        let req = t.build_request(b"{}", "partition", &at()).unwrap();
        assert_eq!(req.url, "http://localhost:4566/");
        assert_eq!(req.headers["host"], "localhost:4566");
    }

    #[test]
    fn test_ack_parsing() {
        let t = transport(KinesisApi::Streams);
        let ack = t.ack_from(
            r#"{"ShardId":"shardId-000000000000","SequenceNumber":"4959","EncryptionType":"NONE"}"#,
        );
        assert_eq!(ack.shard_id.as_deref(), Some("shardId-000000000000"));
        assert_eq!(ack.sequence_number.as_deref(), Some("4959"));
        assert_eq!(ack.sink, "kinesis");

        let fh = transport(KinesisApi::Firehose);
        let ack = fh.ack_from(r#"{"RecordId":"abc","Encrypted":false}"#);
        assert_eq!(ack.record_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_classify_errors() {
        let throttled = classify_error(
            "kinesis",
            400,
            r#"{"__type":"ProvisionedThroughputExceededException","message":"Rate exceeded"}"#,
        );
        assert!(matches!(throttled, SinkError::Throttled { .. }));

        let auth = classify_error(
            "kinesis",
            400,
            r#"{"__type":"UnrecognizedClientException","message":"bad token"}"#,
        );
        assert!(matches!(auth, SinkError::Auth { .. }));

        let missing = classify_error(
            "kinesis",
            400,
            r#"{"__type":"com.amazonaws#ResourceNotFoundException","message":"no stream"}"#,
        );
        assert!(matches!(missing, SinkError::Rejected { status: 400, .. }));

        let server = classify_error("kinesis", 503, "");
        assert!(server.is_retryable());
    }
}
