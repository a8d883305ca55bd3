//! Social-automation capability and its paced facade.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::executor::EffectorReport;
use crate::core::pacer::{PaceOutcome, Pacer};
use crate::util::types::ActionType;

/// Longest connection note providers accept.
pub const MAX_CONNECTION_NOTE: usize = 300;

/// People search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeopleQuery {
    /// Free-text keywords.
    pub keywords: String,
    /// Job title filter.
    pub title: Option<String>,
    /// Company filter.
    pub company: Option<String>,
    /// Result cap.
    pub limit: usize,
}

/// Kind of post engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    /// Like or react.
    React,
    /// Comment.
    Comment,
}

/// One social-automation provider. Pick the implementation at construction.
#[async_trait]
pub trait SocialProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Send a connection request.
    async fn connect(&self, profile_url: &str, note: Option<&str>) -> EffectorReport;

    /// Send a direct message.
    async fn message(&self, profile_url: &str, body: &str) -> EffectorReport;

    /// View a profile.
    async fn visit(&self, profile_url: &str) -> EffectorReport;

    /// Search for people.
    async fn search(&self, query: &PeopleQuery) -> EffectorReport;

    /// React to or comment on a post.
    async fn engage(&self, post_url: &str, kind: Engagement, text: Option<&str>) -> EffectorReport;

    /// Poll for replies.
    async fn check_responses(&self, max_items: usize) -> EffectorReport;
}

/// Cut a connection note to [`MAX_CONNECTION_NOTE`] characters, ending in
/// `...` when shortened.
pub fn truncate_note(note: &str) -> String {
    if note.chars().count() <= MAX_CONNECTION_NOTE {
        return note.to_string();
    }
    let mut out: String = note.chars().take(MAX_CONNECTION_NOTE - 3).collect();
    out.push_str("...");
    out
}

/// Routes every provider call through the pacer under its action type.
pub struct PacedSocial {
    provider: Arc<dyn SocialProvider>,
    pacer: Arc<Pacer>,
}

impl PacedSocial {
    /// Wrap `provider`.
    pub fn new(provider: Arc<dyn SocialProvider>, pacer: Arc<Pacer>) -> Self {
        Self { provider, pacer }
    }

    /// Provider name.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Paced connection request; the note is truncated first.
    pub async fn connect(
        &self,
        profile_url: &str,
        note: Option<&str>,
    ) -> PaceOutcome<EffectorReport> {
        let note = note.map(truncate_note);
        let provider = &self.provider;
        self.pacer
            .perform(ActionType::ConnectionRequest, || {
                provider.connect(profile_url, note.as_deref())
            })
            .await
    }

    /// Paced direct message.
    pub async fn message(&self, profile_url: &str, body: &str) -> PaceOutcome<EffectorReport> {
        let provider = &self.provider;
        self.pacer
            .perform(ActionType::Message, || provider.message(profile_url, body))
            .await
    }

    /// Paced profile visit.
    pub async fn visit(&self, profile_url: &str) -> PaceOutcome<EffectorReport> {
        let provider = &self.provider;
        self.pacer
            .perform(ActionType::ProfileVisit, || provider.visit(profile_url))
            .await
    }

    /// Paced people search.
    pub async fn search(&self, query: &PeopleQuery) -> PaceOutcome<EffectorReport> {
        let provider = &self.provider;
        self.pacer
            .perform(ActionType::Search, || provider.search(query))
            .await
    }

    /// Paced engagement.
    pub async fn engage(
        &self,
        post_url: &str,
        kind: Engagement,
        text: Option<&str>,
    ) -> PaceOutcome<EffectorReport> {
        let provider = &self.provider;
        self.pacer
            .perform(ActionType::Engagement, || provider.engage(post_url, kind, text))
            .await
    }

    /// Unpaced reply poll; reading the inbox has no pacing policy.
    pub async fn check_responses(&self, max_items: usize) -> EffectorReport {
        self.provider.check_responses(max_items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_note_untouched() {
        assert_eq!(truncate_note("Hi Ann"), "Hi Ann");
    }

    #[test]
    fn test_long_note_truncated_with_ellipsis() {
        let note = "x".repeat(400);
        let out = truncate_note(&note);
        assert_eq!(out.chars().count(), MAX_CONNECTION_NOTE);
        assert!(out.ends_with("..."));
    }
}
