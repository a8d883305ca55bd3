//! Collaborator traits and the success signal shared by every effector.
//!
//! The orchestrator never talks to a network directly. Prospect sourcing, web
//! research, text generation, mail and inbox access are all reached through
//! the traits below, each chosen at construction.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use outreach_pacer::core::{EffectorReport, MailSender, OutboundEmail};
//!
//! struct SmtpSender;
//!
//! #[async_trait]
//! impl MailSender for SmtpSender {
//!     async fn send(&self, email: &OutboundEmail) -> EffectorReport {
//!         EffectorReport::ok(serde_json::json!({ "to": email.to }))
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::runtime::LeadCriteria;
use crate::core::error::AppResult;
use crate::core::model::ProspectRecord;

/// Anything an effector returns: it must say whether the action happened.
pub trait Outcome {
    /// True only when the external action definitely took place.
    fn succeeded(&self) -> bool;
    /// Human-readable failure cause; empty on success.
    fn failure_reason(&self) -> String;
}

impl<T, E: fmt::Display> Outcome for Result<T, E> {
    fn succeeded(&self) -> bool {
        self.is_ok()
    }

    fn failure_reason(&self) -> String {
        match self {
            Ok(_) => String::new(),
            Err(e) => e.to_string(),
        }
    }
}

/// Uniform result of an effector call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectorReport {
    /// The action took place.
    pub success: bool,
    /// Provider-specific detail.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Failure cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EffectorReport {
    /// Successful report.
    pub const fn ok(details: serde_json::Value) -> Self {
        Self {
            success: true,
            details,
            error: None,
        }
    }

    /// Failed report.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            details: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

impl Outcome for EffectorReport {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_reason(&self) -> String {
        if self.success {
            return String::new();
        }
        self.error
            .clone()
            .unwrap_or_else(|| "effector reported failure".to_string())
    }
}

/// One web search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// Result URL.
    pub link: Option<String>,
}

/// Sampling knobs for text generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Randomness.
    pub temperature: f32,
    /// Output length cap.
    pub max_tokens: u32,
}

impl SamplingParams {
    /// Factual summaries.
    pub const RESEARCH: Self = Self {
        temperature: 0.7,
        max_tokens: 200,
    };

    /// Personalized drafts.
    pub const COMPOSE: Self = Self {
        temperature: 0.8,
        max_tokens: 400,
    };
}

/// Email ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Reply found by a response check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    /// Sender address.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Set when the provider could not read this message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Finds prospects matching criteria.
#[async_trait]
pub trait Sourcer: Send + Sync {
    /// Search for prospects.
    async fn find(&self, criteria: &LeadCriteria) -> AppResult<Vec<ProspectRecord>>;
}

/// Web search.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Return up to `num_results` hits for `query`.
    async fn search(&self, query: &str, num_results: usize) -> AppResult<Vec<SearchHit>>;
}

/// Text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`.
    async fn generate(&self, prompt: &str, params: SamplingParams) -> AppResult<String>;
}

/// Outbound mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Send one email; the report's `success` flag is authoritative.
    async fn send(&self, email: &OutboundEmail) -> EffectorReport;
}

/// Inbox polling.
#[async_trait]
pub trait ResponseChecker: Send + Sync {
    /// Fetch up to `max_items` replies.
    async fn check(&self, max_items: usize, unread_only: bool) -> AppResult<Vec<InboundReply>>;
}

/// The set of collaborators a run may use. Only the text generator is
/// mandatory; missing collaborators make the matching step a no-op.
#[derive(Clone)]
pub struct Collaborators {
    /// Prospect search.
    pub sourcer: Option<Arc<dyn Sourcer>>,
    /// Company research.
    pub researcher: Option<Arc<dyn Researcher>>,
    /// Summaries and drafts.
    pub writer: Arc<dyn TextGenerator>,
    /// Outbound email.
    pub mail: Option<Arc<dyn MailSender>>,
    /// Reply polling.
    pub inbox: Option<Arc<dyn ResponseChecker>>,
}

impl Collaborators {
    /// Collaborators with only a text generator.
    pub fn new(writer: Arc<dyn TextGenerator>) -> Self {
        Self {
            sourcer: None,
            researcher: None,
            writer,
            mail: None,
            inbox: None,
        }
    }

    /// Attach a prospect sourcer.
    #[must_use]
    pub fn with_sourcer(mut self, sourcer: Arc<dyn Sourcer>) -> Self {
        self.sourcer = Some(sourcer);
        self
    }

    /// Attach a web researcher.
    #[must_use]
    pub fn with_researcher(mut self, researcher: Arc<dyn Researcher>) -> Self {
        self.researcher = Some(researcher);
        self
    }

    /// Attach a mail sender.
    #[must_use]
    pub fn with_mail(mut self, mail: Arc<dyn MailSender>) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Attach a response checker.
    #[must_use]
    pub fn with_inbox(mut self, inbox: Arc<dyn ResponseChecker>) -> Self {
        self.inbox = Some(inbox);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("sourcer", &self.sourcer.is_some())
            .field("researcher", &self.researcher.is_some())
            .field("mail", &self.mail.is_some())
            .field("inbox", &self.inbox.is_some())
            .finish_non_exhaustive()
    }
}
