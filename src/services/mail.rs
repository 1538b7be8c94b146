use super::{RequestHandler, Service};
use crate::settings;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub enum MailRequest {
    Send {
        to: String,
        subject: String,
        body: String,
    },
    /// Unexpected failure report for the on-call developer.
    NotifyDeveloper { subject: String, details: String },
}

#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, email: &Email) -> Result<(), anyhow::Error>;
}

/// Posts mail as JSON to a transactional mail relay.
pub struct RelayTransport {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl RelayTransport {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(RelayTransport {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    async fn deliver(&self, email: &Email) -> Result<(), anyhow::Error> {
        let mut request = self.client.post(&self.url).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, email: &Email) -> Result<(), anyhow::Error> {
        log::info!(
            "Mail to {} <{}>:\n{}",
            email.to,
            email.subject,
            email.text
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct MailRequestHandler {
    transport: Arc<dyn MailTransport>,
    sender: String,
    developer_email: String,
}

impl MailRequestHandler {
    pub fn new(transport: Arc<dyn MailTransport>, sender: &str, developer_email: &str) -> Self {
        MailRequestHandler {
            transport,
            sender: sender.to_string(),
            developer_email: developer_email.to_string(),
        }
    }

    pub fn from_settings(settings: &settings::Mail) -> Result<Self, anyhow::Error> {
        let transport: Arc<dyn MailTransport> = match &settings.relay_url {
            Some(url) => Arc::new(RelayTransport::new(url, settings.api_key.clone())?),
            None => {
                log::warn!("No mail relay configured, outgoing mail will only be logged.");
                Arc::new(LogTransport)
            }
        };

        Ok(Self::new(
            transport,
            &settings.sender,
            &settings.developer_email,
        ))
    }

    async fn deliver(&self, to: String, subject: String, text: String) {
        let email = Email {
            from: self.sender.clone(),
            to,
            subject,
            text,
        };

        match self.transport.deliver(&email).await {
            Ok(()) => log::debug!("Sent \"{}\" to {}", email.subject, email.to),
            Err(e) => log::error!("Could not send \"{}\" to {}: {}", email.subject, email.to, e),
        }
    }
}

#[async_trait]
impl RequestHandler<MailRequest> for MailRequestHandler {
    async fn handle_request(&self, request: MailRequest) {
        match request {
            MailRequest::Send { to, subject, body } => self.deliver(to, subject, body).await,
            MailRequest::NotifyDeveloper { subject, details } => {
                let to = self.developer_email.clone();
                self.deliver(to, format!("[coinvest] {}", subject), details)
                    .await
            }
        }
    }
}

pub struct MailService;

impl MailService {
    pub fn new() -> Self {
        MailService {}
    }
}

impl Service<MailRequest, MailRequestHandler> for MailService {}

/// Cloneable handle for queueing mail. Delivery is fire-and-forget.
#[derive(Clone)]
pub struct Mailer {
    channel: mpsc::Sender<MailRequest>,
}

impl Mailer {
    pub fn new(channel: mpsc::Sender<MailRequest>) -> Self {
        Mailer { channel }
    }

    fn enqueue(&self, request: MailRequest) {
        if let Err(e) = self.channel.try_send(request) {
            log::error!("Dropping outgoing mail: {}", e);
        }
    }

    pub fn send(&self, to: &str, subject: &str, body: String) {
        self.enqueue(MailRequest::Send {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        });
    }

    pub fn notify_developer(&self, subject: &str, details: String) {
        self.enqueue(MailRequest::NotifyDeveloper {
            subject: subject.to_string(),
            details,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn deliver(&self, email: &Email) -> Result<(), anyhow::Error> {
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn developer_reports_go_to_the_developer() {
        let outbox = Arc::new(Outbox::default());
        let handler = MailRequestHandler::new(outbox.clone(), "noreply@x.test", "dev@x.test");

        handler
            .handle_request(MailRequest::NotifyDeveloper {
                subject: "panic".to_string(),
                details: "stack".to_string(),
            })
            .await;
        handler
            .handle_request(MailRequest::Send {
                to: "jane@x.test".to_string(),
                subject: "Welcome".to_string(),
                body: "hi".to_string(),
            })
            .await;

        let sent = outbox.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "dev@x.test");
        assert_eq!(sent[0].subject, "[coinvest] panic");
        assert_eq!(sent[1].from, "noreply@x.test");
        assert_eq!(sent[1].to, "jane@x.test");
    }

    #[tokio::test]
    async fn mailer_queues_requests() {
        let (tx, mut rx) = mpsc::channel(4);
        let mailer = Mailer::new(tx);

        mailer.send("jane@x.test", "Deposit approved", "done".to_string());

        match rx.recv().await {
            Some(MailRequest::Send { to, subject, .. }) => {
                assert_eq!(to, "jane@x.test");
                assert_eq!(subject, "Deposit approved");
            }
            _ => panic!("expected a queued mail"),
        }
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let mailer = Mailer::new(tx);

        mailer.notify_developer("one", String::new());
        mailer.notify_developer("two", String::new());
    }
}
