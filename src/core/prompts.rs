//! Prompt templates and draft parsing.

use std::fmt::Write as _;

use crate::core::executor::SearchHit;
use crate::core::model::WorkItem;

/// Research placeholder used when no researcher is configured or research
/// was deferred.
pub const NO_RESEARCH: &str = "No research data available";

/// Web search query for a company.
pub fn research_query(company: &str) -> String {
    format!("{company} company news achievements")
}

/// Prompt asking for a short sales-oriented summary of search results.
pub fn research_summary(company: &str, hits: &[SearchHit]) -> String {
    let mut results = String::new();
    for hit in hits {
        let _ = writeln!(results, "- {}: {}", hit.title, hit.snippet);
    }
    format!(
        "Summarize key insights about {company} for sales outreach:\n\n\
         Search Results:\n{results}\n\
         Provide 2-3 sentences highlighting:\n\
         1. What the company does\n\
         2. Recent news or achievements\n\
         3. Potential pain points or opportunities\n\n\
         Summary:"
    )
}

/// Prompt asking for a personalized cold email in `SUBJECT:` format.
pub fn outreach_email(item: &WorkItem, research: &str) -> String {
    let prospect = &item.prospect;
    let name = if prospect.first_name.is_empty() {
        "there"
    } else {
        prospect.first_name.as_str()
    };
    format!(
        "Generate a personalized cold outreach email for:\n\n\
         Name: {name}\n\
         Title: {title}\n\
         Company: {company}\n\n\
         Research Summary:\n{research}\n\n\
         Requirements:\n\
         1. Engaging subject line (5-8 words)\n\
         2. Personalized opening referencing company/research\n\
         3. Clear value proposition\n\
         4. Call-to-action to book a 15-min call\n\
         5. Professional tone, under 150 words\n\n\
         Format:\n\
         SUBJECT: [subject]\n\n\
         [email body]",
        title = prospect.title.as_deref().unwrap_or_default(),
        company = prospect.company.as_deref().unwrap_or_default(),
    )
}

/// Subject and body split out of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: String,
}

impl EmailDraft {
    /// The first line (minus any `SUBJECT:` marker) is the subject; the rest
    /// is the body. Single-line output is used as both.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.split_once('\n') {
            Some((first, rest)) => Self {
                subject: strip_subject(first),
                body: rest.trim().to_string(),
            },
            None => Self {
                subject: strip_subject(text),
                body: text.to_string(),
            },
        }
    }

    /// First 100 characters of the body.
    pub fn preview(&self) -> String {
        self.body.chars().take(100).collect()
    }
}

fn strip_subject(line: &str) -> String {
    let line = line.trim();
    line.strip_prefix("SUBJECT:").unwrap_or(line).trim().to_string()
}
