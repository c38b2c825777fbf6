//! AWS SQS queue implementation using the HTTP REST API.
//!
//! Talks to SQS with direct HTTP calls signed with AWS Signature V4 instead
//! of the AWS SDK, so unit tests can run against a mocked HTTP endpoint.
//! Actions ride as query parameters, responses are XML.
//!
//! Locking maps onto SQS visibility timeouts: receive-family calls acquire a
//! lease equal to the configured default visibility timeout, renewal and
//! abandon rewrite it with `ChangeMessageVisibility`, completion deletes by
//! receipt token. Peek-family calls use a zero lease so nothing is locked.

use crate::capabilities::MessagingCapabilities;
use crate::config::{ConnectionDescriptor, ConnectionParams, CredentialParams};
use crate::error::MessagingError;
use crate::message::{MessageEnvelope, MessageReference, Payload};
use crate::monitoring::{CounterSink, NoOpCounterSink};
use crate::queue::{MessageQueue, MessageReceiver};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tracing::{debug, trace, warn};

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const SQS_API_VERSION: &str = "2012-11-05";

/// SQS returns at most this many messages per ReceiveMessage call.
const MAX_RECEIVE_PAGE: usize = 10;

/// Batch size requested per drain round when a purge is already in progress.
const DRAIN_BATCH: usize = 100;

/// A drain round returning fewer messages than this is treated as "probably
/// drained". Eventual consistency means a strictly empty queue cannot be
/// observed synchronously.
const DRAIN_STOP_THRESHOLD: usize = 90;

// ============================================================================
// Request signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// AWS Signature V4 signer bound to one region and the SQS service.
#[derive(Clone)]
struct RequestSigner {
    access_id: String,
    access_key: String,
    region: String,
}

impl RequestSigner {
    fn new(access_id: String, access_key: String, region: String) -> Self {
        Self {
            access_id,
            access_key,
            region,
        }
    }

    /// Headers required to authenticate one request: `Authorization`,
    /// `x-amz-date`, and `host`. `canonical_query` must be the exact sorted,
    /// percent-encoded query string sent on the wire.
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        canonical_query: &str,
        body: &str,
        now: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
        let signed_headers = "host;x-amz-date";
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let canonical_request = format!(
            "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let scope = format!("{date_stamp}/{}/sqs/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        // Four-level HMAC chain derives the signing key.
        let k_date = hmac_sha256(
            format!("AWS4{}", self.access_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"sqs");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_id
        );

        vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-date".to_string(), amz_date),
            ("host".to_string(), host.to_string()),
        ]
    }
}

// ============================================================================
// XML parsing
// ============================================================================

/// Text content of the first `tag` element in `xml`.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut inside = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == tag.as_bytes() => inside = true,
            Ok(Event::Text(e)) if inside => return e.unescape().ok().map(|s| s.into_owned()),
            Ok(Event::End(ref e)) if e.name().as_ref() == tag.as_bytes() => inside = false,
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// One `<Message>` element of a ReceiveMessage response.
#[derive(Default)]
struct RawSqsMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: Option<String>,
    attributes: HashMap<String, String>,
}

fn parse_receive_response(xml: &str) -> Result<Vec<RawSqsMessage>, MessagingError> {
    let malformed =
        |err: &dyn std::fmt::Display| MessagingError::serialization(format!("malformed receive response: {err}"));

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut messages = Vec::new();
    let mut current: Option<RawSqsMessage> = None;
    let mut attribute_name: Option<String> = None;
    let mut field: Option<&'static str> = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => current = Some(RawSqsMessage::default()),
                b"MessageId" if current.is_some() => field = Some("id"),
                b"ReceiptHandle" if current.is_some() => field = Some("receipt"),
                b"Body" if current.is_some() => field = Some("body"),
                b"Name" if current.is_some() => field = Some("attribute-name"),
                b"StringValue" if current.is_some() => field = Some("attribute-value"),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let (Some(message), Some(kind)) = (current.as_mut(), field.take()) {
                    let text = e
                        .unescape()
                        .map(|s| s.into_owned())
                        .map_err(|err| malformed(&err))?;
                    match kind {
                        "id" => message.message_id = Some(text),
                        "receipt" => message.receipt_handle = Some(text),
                        "body" => message.body = Some(text),
                        "attribute-name" => attribute_name = Some(text),
                        "attribute-value" => {
                            if let Some(name) = attribute_name.take() {
                                message.attributes.insert(name, text);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Message" => {
                if let Some(message) = current.take() {
                    messages.push(message);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(&err)),
            _ => {}
        }
        buf.clear();
    }
    Ok(messages)
}

/// Map an SQS error response to a `Backend` error keyed by its code.
fn parse_error_response(xml: &str, status: u16) -> MessagingError {
    let code = xml_text(xml, "Code").unwrap_or_else(|| format!("Http{status}"));
    let message =
        xml_text(xml, "Message").unwrap_or_else(|| "unknown backend error".to_string());
    MessagingError::backend(code, message)
}

// ============================================================================
// SqsMessageQueue
// ============================================================================

/// Backend handles resolved by `open` and cached for the lifetime of the
/// open connection. Not mutated after open succeeds.
#[derive(Clone)]
struct OpenState {
    http: HttpClient,
    signer: RequestSigner,
    endpoint: String,
    queue_url: String,
    dead_queue_url: Option<String>,
    poll_interval: std::time::Duration,
    visibility_timeout: Duration,
}

/// [`MessageQueue`] implementation backed by AWS SQS.
pub struct SqsMessageQueue {
    name: String,
    capabilities: MessagingCapabilities,
    counters: Arc<dyn CounterSink>,
    state: RwLock<Option<OpenState>>,
    listen_stop: Mutex<Option<watch::Sender<bool>>>,
}

impl SqsMessageQueue {
    /// Create a closed queue with the given logical name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: MessagingCapabilities::all(),
            counters: Arc::new(NoOpCounterSink),
            state: RwLock::new(None),
            listen_stop: Mutex::new(None),
        }
    }

    /// Replace the counter sink.
    pub fn with_counters(mut self, counters: Arc<dyn CounterSink>) -> Self {
        self.counters = counters;
        self
    }

    async fn open_state(&self, operation: &str) -> Result<OpenState, MessagingError> {
        self.state.read().await.clone().ok_or_else(|| {
            MessagingError::invalid_state(
                &self.name,
                format!("queue is not open; call open before {operation}"),
            )
        })
    }

    /// Issue one signed SQS action. Parameters travel in the query string;
    /// the response body is returned as raw XML.
    async fn request(
        &self,
        state: &OpenState,
        action: &str,
        queue_url: Option<&str>,
        extra: &[(String, String)],
    ) -> Result<String, MessagingError> {
        let mut params: Vec<(String, String)> = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), SQS_API_VERSION.to_string()),
        ];
        if let Some(url) = queue_url {
            params.push(("QueueUrl".to_string(), url.to_string()));
        }
        params.extend_from_slice(extra);

        // Canonical query: percent-encoded pairs, sorted, also used verbatim
        // as the request query string so the signature matches.
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| {
                (
                    urlencoding::encode(k).into_owned(),
                    urlencoding::encode(v).into_owned(),
                )
            })
            .collect();
        encoded.sort();
        let query = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let host = state
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let now = Utc::now();
        let headers = state.signer.sign("POST", host, "/", &query, "", &now);

        let url = format!("{}/?{}", state.endpoint, query);
        let mut request = state.http.post(&url);
        for (key, value) in headers {
            request = request.header(&key, value);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                MessagingError::connection(&self.name, format!("request timed out: {err}"))
            } else {
                MessagingError::connection(&self.name, format!("request failed: {err}"))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            MessagingError::connection(&self.name, format!("failed to read response: {err}"))
        })?;
        if !status.is_success() {
            return Err(parse_error_response(&body, status.as_u16()));
        }
        Ok(body)
    }

    /// Provision a queue, treating "already exists" as success.
    async fn create_queue(&self, state: &OpenState, queue_name: &str) -> Result<(), MessagingError> {
        let extra = [("QueueName".to_string(), queue_name.to_string())];
        match self.request(state, "CreateQueue", None, &extra).await {
            Ok(_) => Ok(()),
            Err(err) if err.backend_code().is_some_and(|code| code.contains("QueueAlreadyExists")) => {
                trace!(queue = queue_name, "queue already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_queue_url(
        &self,
        state: &OpenState,
        queue_name: &str,
    ) -> Result<String, MessagingError> {
        let extra = [("QueueName".to_string(), queue_name.to_string())];
        let xml = self.request(state, "GetQueueUrl", None, &extra).await?;
        xml_text(&xml, "QueueUrl").ok_or_else(|| {
            MessagingError::serialization("QueueUrl missing from GetQueueUrl response")
        })
    }

    /// One ReceiveMessage page. Peeks pass zero for both durations.
    async fn receive_page(
        &self,
        state: &OpenState,
        max: usize,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Vec<MessageEnvelope>, MessagingError> {
        let extra = vec![
            (
                "MaxNumberOfMessages".to_string(),
                max.clamp(1, MAX_RECEIVE_PAGE).to_string(),
            ),
            (
                "WaitTimeSeconds".to_string(),
                wait.num_seconds().clamp(0, 20).to_string(),
            ),
            (
                "VisibilityTimeout".to_string(),
                visibility.num_seconds().max(0).to_string(),
            ),
            ("MessageAttributeName.1".to_string(), "All".to_string()),
        ];
        let xml = self
            .request(state, "ReceiveMessage", Some(&state.queue_url), &extra)
            .await?;
        let raw_messages = parse_receive_response(&xml)?;
        Ok(raw_messages
            .into_iter()
            .filter_map(|raw| self.envelope_from_raw(raw))
            .collect())
    }

    /// Convert a raw backend message into an envelope. Bodies we sent are
    /// base64; anything that does not decode is taken as literal text. A
    /// body that does not parse as JSON is kept verbatim with a warning,
    /// never dropped.
    fn envelope_from_raw(&self, raw: RawSqsMessage) -> Option<MessageEnvelope> {
        let body = raw.body?;
        let receipt = raw.receipt_handle?;
        let decoded = STANDARD
            .decode(body.as_bytes())
            .unwrap_or_else(|_| body.into_bytes());
        let payload = Payload::from_body(&decoded);
        if matches!(payload, Payload::Raw(_)) {
            warn!(queue = %self.name, "message body is not structured JSON; keeping raw payload");
        }
        Some(MessageEnvelope::received(
            raw.message_id,
            payload,
            MessageReference::new(receipt),
            raw.attributes.get("MessageType").cloned(),
            raw.attributes.get("CorrelationId").cloned(),
        ))
    }

    /// SendMessage parameters for an envelope: base64 body plus message
    /// attributes carrying the type and correlation id.
    fn send_params(envelope: &MessageEnvelope) -> Vec<(String, String)> {
        let mut extra = vec![(
            "MessageBody".to_string(),
            STANDARD.encode(envelope.payload.to_body()),
        )];
        let mut index = 1;
        for (name, value) in [
            ("MessageType", &envelope.message_type),
            ("CorrelationId", &envelope.correlation_id),
        ] {
            if let Some(value) = value {
                extra.push((format!("MessageAttribute.{index}.Name"), name.to_string()));
                extra.push((
                    format!("MessageAttribute.{index}.Value.DataType"),
                    "String".to_string(),
                ));
                extra.push((
                    format!("MessageAttribute.{index}.Value.StringValue"),
                    value.clone(),
                ));
                index += 1;
            }
        }
        extra
    }

    async fn change_visibility(
        &self,
        state: &OpenState,
        token: &str,
        timeout_secs: i64,
    ) -> Result<(), MessagingError> {
        let extra = [
            ("ReceiptHandle".to_string(), token.to_string()),
            ("VisibilityTimeout".to_string(), timeout_secs.to_string()),
        ];
        self.request(state, "ChangeMessageVisibility", Some(&state.queue_url), &extra)
            .await
            .map(|_| ())
    }

    async fn delete_message(&self, state: &OpenState, token: &str) -> Result<(), MessagingError> {
        let extra = [("ReceiptHandle".to_string(), token.to_string())];
        self.request(state, "DeleteMessage", Some(&state.queue_url), &extra)
            .await
            .map(|_| ())
    }

    /// Manual drain used when a bulk purge is rejected as in progress:
    /// repeated batch peeks, completing each envelope, until a round comes
    /// back under the stop threshold.
    async fn drain(&self) -> Result<(), MessagingError> {
        loop {
            let batch = self.peek_batch(DRAIN_BATCH).await?;
            let drained = batch.len();
            for mut envelope in batch {
                self.complete(&mut envelope).await?;
            }
            trace!(queue = %self.name, drained, "drain round completed");
            if drained < DRAIN_STOP_THRESHOLD {
                break;
            }
        }
        Ok(())
    }
}

/// Wrap an unexpected open-time failure as a `Connection` error carrying the
/// attempted queue identity.
fn connection_failure(queue: &str, err: MessagingError) -> MessagingError {
    match err {
        MessagingError::Connection { .. } | MessagingError::Configuration { .. } => err,
        other => MessagingError::connection(queue, other.to_string()),
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &MessagingCapabilities {
        &self.capabilities
    }

    async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn open(
        &self,
        connection: &ConnectionParams,
        credentials: &CredentialParams,
        correlation_id: Option<&str>,
    ) -> Result<(), MessagingError> {
        if self.state.read().await.is_some() {
            trace!(queue = %self.name, "queue is already open");
            return Ok(());
        }

        let descriptor =
            ConnectionDescriptor::resolve(&self.name, connection, credentials, correlation_id)?;

        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|err| {
                MessagingError::connection(&self.name, format!("failed to create HTTP client: {err}"))
            })?;
        let signer = RequestSigner::new(
            descriptor.access_id.clone(),
            descriptor.access_key.clone(),
            descriptor.region.clone(),
        );
        let mut state = OpenState {
            http,
            signer,
            endpoint: descriptor.endpoint.clone(),
            queue_url: String::new(),
            dead_queue_url: None,
            poll_interval: descriptor.poll_interval,
            visibility_timeout: descriptor.visibility_timeout,
        };

        self.create_queue(&state, &descriptor.queue_name)
            .await
            .map_err(|err| connection_failure(&descriptor.queue_name, err))?;
        if let Some(dead_queue_name) = &descriptor.dead_queue_name {
            self.create_queue(&state, dead_queue_name)
                .await
                .map_err(|err| connection_failure(dead_queue_name, err))?;
        }

        state.queue_url = self
            .resolve_queue_url(&state, &descriptor.queue_name)
            .await
            .map_err(|err| connection_failure(&descriptor.queue_name, err))?;
        state.dead_queue_url = match &descriptor.dead_queue_name {
            Some(dead_queue_name) => Some(
                self.resolve_queue_url(&state, dead_queue_name)
                    .await
                    .map_err(|err| connection_failure(dead_queue_name, err))?,
            ),
            None => None,
        };

        *self.state.write().await = Some(state);
        debug!(queue = %self.name, resource = %descriptor.queue_name, "queue opened");
        Ok(())
    }

    async fn close(&self, _correlation_id: Option<&str>) -> Result<(), MessagingError> {
        self.end_listen();
        *self.state.write().await = None;
        debug!(queue = %self.name, "queue closed");
        Ok(())
    }

    async fn message_count(&self) -> Result<u64, MessagingError> {
        let state = self.open_state("message_count").await?;
        let extra = [(
            "AttributeName.1".to_string(),
            "ApproximateNumberOfMessages".to_string(),
        )];
        let xml = self
            .request(&state, "GetQueueAttributes", Some(&state.queue_url), &extra)
            .await?;
        let value = xml_text(&xml, "Value").unwrap_or_else(|| "0".to_string());
        value.parse::<u64>().map_err(|err| {
            MessagingError::serialization(format!(
                "invalid ApproximateNumberOfMessages '{value}': {err}"
            ))
        })
    }

    async fn send(&self, envelope: MessageEnvelope) -> Result<(), MessagingError> {
        let state = self.open_state("send").await?;
        let extra = Self::send_params(&envelope);
        self.request(&state, "SendMessage", Some(&state.queue_url), &extra)
            .await?;
        self.counters
            .increment(&format!("{}.sent_messages", self.name));
        trace!(queue = %self.name, message_type = ?envelope.message_type, "message sent");
        Ok(())
    }

    async fn peek(&self) -> Result<Option<MessageEnvelope>, MessagingError> {
        let state = self.open_state("peek").await?;
        let page = self
            .receive_page(&state, 1, Duration::zero(), Duration::zero())
            .await?;
        Ok(page.into_iter().next())
    }

    async fn peek_batch(&self, max_count: usize) -> Result<Vec<MessageEnvelope>, MessagingError> {
        let state = self.open_state("peek_batch").await?;
        let mut envelopes = Vec::new();
        while envelopes.len() < max_count {
            let page_size = max_count - envelopes.len();
            let page = self
                .receive_page(&state, page_size, Duration::zero(), Duration::zero())
                .await?;
            if page.is_empty() {
                break;
            }
            envelopes.extend(page);
        }
        Ok(envelopes)
    }

    async fn receive(
        &self,
        wait_timeout: Duration,
    ) -> Result<Option<MessageEnvelope>, MessagingError> {
        let state = self.open_state("receive").await?;
        let page = self
            .receive_page(&state, 1, wait_timeout, state.visibility_timeout)
            .await?;
        let envelope = page.into_iter().next();
        if envelope.is_some() {
            self.counters
                .increment(&format!("{}.received_messages", self.name));
        }
        Ok(envelope)
    }

    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lease: Duration,
    ) -> Result<(), MessagingError> {
        let state = self.open_state("renew_lock").await?;
        let Some(reference) = envelope.reference() else {
            trace!(queue = %self.name, "no reference to renew");
            return Ok(());
        };
        self.change_visibility(&state, reference.token(), lease.num_seconds().max(0))
            .await
    }

    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError> {
        let state = self.open_state("abandon").await?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        self.change_visibility(&state, reference.token(), 0).await?;
        envelope.take_reference();
        trace!(queue = %self.name, message_id = ?envelope.message_id, "message abandoned");
        Ok(())
    }

    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError> {
        let state = self.open_state("complete").await?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        self.delete_message(&state, reference.token()).await?;
        envelope.take_reference();
        trace!(queue = %self.name, message_id = ?envelope.message_id, "message completed");
        Ok(())
    }

    async fn move_to_dead_letter(
        &self,
        envelope: &mut MessageEnvelope,
    ) -> Result<(), MessagingError> {
        let state = self.open_state("move_to_dead_letter").await?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        match &state.dead_queue_url {
            Some(dead_queue_url) => {
                // Submission and source deletion are two independent calls;
                // a failure between them can leave a duplicate in the source.
                let extra = Self::send_params(envelope);
                self.request(&state, "SendMessage", Some(dead_queue_url), &extra)
                    .await?;
            }
            None => warn!(
                queue = %self.name,
                message_id = ?envelope.message_id,
                "no dead letter queue configured; discarding message"
            ),
        }
        self.delete_message(&state, reference.token()).await?;
        envelope.take_reference();
        self.counters
            .increment(&format!("{}.dead_messages", self.name));
        Ok(())
    }

    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), MessagingError> {
        let state = self.open_state("listen").await?;
        let stop_rx = {
            let mut slot = self.listen_stop.lock().expect("listen state lock poisoned");
            if slot.is_some() {
                return Err(MessagingError::invalid_state(
                    &self.name,
                    "a listen loop is already running",
                ));
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            *slot = Some(stop_tx);
            stop_rx
        };
        debug!(queue = %self.name, "listen loop started");
        while !*stop_rx.borrow() {
            match self.receive(Duration::zero()).await {
                Ok(Some(envelope)) => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    if let Err(err) = receiver.receive_message(envelope, self).await {
                        warn!(queue = %self.name, error = %err, "message receiver failed; continuing");
                    }
                }
                Ok(None) => tokio::time::sleep(state.poll_interval).await,
                Err(err) => {
                    warn!(queue = %self.name, error = %err, "receive failed while listening");
                    tokio::time::sleep(state.poll_interval).await;
                }
            }
        }
        self.listen_stop
            .lock()
            .expect("listen state lock poisoned")
            .take();
        debug!(queue = %self.name, "listen loop stopped");
        Ok(())
    }

    fn end_listen(&self) {
        // Signal without vacating the slot: only the loop clears it on exit,
        // so a second listen is rejected while the first is winding down.
        if let Ok(slot) = self.listen_stop.lock() {
            if let Some(stop) = slot.as_ref() {
                let _ = stop.send(true);
            }
        }
    }

    async fn clear(&self) -> Result<(), MessagingError> {
        let state = self.open_state("clear").await?;
        match self
            .request(&state, "PurgeQueue", Some(&state.queue_url), &[])
            .await
        {
            Ok(_) => {
                debug!(queue = %self.name, "queue purged");
                Ok(())
            }
            Err(err)
                if err
                    .backend_code()
                    .is_some_and(|code| code.contains("PurgeQueueInProgress")) =>
            {
                debug!(queue = %self.name, "purge already in progress; draining manually");
                self.drain().await
            }
            Err(err) => Err(err),
        }
    }
}
