use courier_core::{DeliveryError, Event, Sender};

/// Header carrying the event id, so receivers can drop duplicates.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Sender that only writes the event to the log output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

impl Sender for LogSender {
    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        tracing::info!(
            event_id = %event.id,
            kind = %event.payload.kind,
            subject = %event.payload.subject,
            attempts = event.attempts,
            "sending event"
        );
        Ok(())
    }
}

/// Sender that POSTs each event as JSON to a webhook endpoint.
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Sender for HttpSender {
    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(IDEMPOTENCY_KEY_HEADER, event.id.get().to_string())
            .json(event)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Sender picked at startup from configuration.
pub enum AnySender {
    Log(LogSender),
    Http(HttpSender),
}

impl AnySender {
    /// HTTP delivery when an endpoint is configured, log output otherwise.
    pub fn from_endpoint(endpoint: Option<&str>) -> Self {
        match endpoint {
            Some(endpoint) => AnySender::Http(HttpSender::new(endpoint)),
            None => AnySender::Log(LogSender),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AnySender::Log(_) => "log".to_string(),
            AnySender::Http(sender) => format!("http ({})", sender.endpoint()),
        }
    }
}

impl Sender for AnySender {
    async fn send(&self, event: &Event) -> Result<(), DeliveryError> {
        match self {
            AnySender::Log(sender) => sender.send(event).await,
            AnySender::Http(sender) => sender.send(event).await,
        }
    }
}
