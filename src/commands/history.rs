use anyhow::Result;
use log::debug;
use std::fmt;

use crate::backend::{HistoryEntry, RagBackend};

/// Default number of entries shown.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

const TITLE_CHARS: usize = 50;

/// Print the latest `limit` conversation entries, newest first.
#[tracing::instrument(skip(backend))]
pub async fn show_history<B: RagBackend>(backend: &B, limit: usize) -> Result<()> {
    let history = backend.conversation_history().await?;
    debug!("Backend returned {} history entries", history.len());

    if history.is_empty() {
        println!("No conversation history available.");
        return Ok(());
    }

    print!("{}", render_history(&history, limit));
    Ok(())
}

fn latest(history: &[HistoryEntry], limit: usize) -> impl Iterator<Item = &HistoryEntry> {
    let start = history.len().saturating_sub(limit);
    history[start..].iter().rev()
}

pub fn render_history(history: &[HistoryEntry], limit: usize) -> String {
    HistoryView { history, limit }.to_string()
}

struct HistoryView<'a> {
    history: &'a [HistoryEntry],
    limit: usize,
}

impl fmt::Display for HistoryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Latest Conversation History:")?;

        for (idx, entry) in latest(self.history, self.limit).enumerate() {
            let query = entry.query.as_deref().unwrap_or("No query available");
            let title: String = query.chars().take(TITLE_CHARS).collect();
            let ellipsis = if query.chars().count() > TITLE_CHARS {
                "..."
            } else {
                ""
            };

            writeln!(f, "\nHistory #{}: {}{}", idx + 1, title, ellipsis)?;
            writeln!(f, "  Query: {}", query)?;
            writeln!(
                f,
                "  Answer: {}",
                entry.answer.as_deref().unwrap_or("No answer available")
            )?;
            match &entry.timestamp {
                Some(ts) => writeln!(f, "  Time: {}", ts)?,
                None => writeln!(f, "  Time: No timestamp available")?,
            }
            if let Some(keywords) = entry.keywords.as_ref().filter(|k| !k.is_empty()) {
                writeln!(f, "  Keywords: {}", keywords)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Keywords, MockRagBackend, Timestamp};

    fn entry(query: &str) -> HistoryEntry {
        HistoryEntry {
            query: Some(query.to_string()),
            answer: Some(format!("answer to {}", query)),
            timestamp: Some(Timestamp::Text("2024-05-01 09:00:00".to_string())),
            keywords: None,
        }
    }

    #[test]
    fn test_latest_is_newest_first_and_limited() {
        let history: Vec<_> = (1..=12).map(|i| entry(&format!("q{}", i))).collect();
        let queries: Vec<_> = latest(&history, 10)
            .map(|e| e.query.clone().unwrap())
            .collect();

        assert_eq!(queries.len(), 10);
        assert_eq!(queries.first().unwrap(), "q12");
        assert_eq!(queries.last().unwrap(), "q3");
    }

    #[test]
    fn test_latest_with_fewer_entries_than_limit() {
        let history = vec![entry("only")];
        assert_eq!(latest(&history, 10).count(), 1);
        assert_eq!(latest(&history, 0).count(), 0);
    }

    #[test]
    fn test_render_history_truncates_title() {
        let long = "x".repeat(80);
        let out = render_history(&[entry(&long)], 10);

        assert!(out.contains(&format!("History #1: {}...", "x".repeat(50))));
        assert!(out.contains(&format!("  Query: {}", long)));
        assert!(out.contains("Time: 2024-05-01 09:00:00"));
    }

    #[test]
    fn test_render_history_placeholders() {
        let out = render_history(
            &[HistoryEntry {
                keywords: Some(Keywords::Text("billing".to_string())),
                ..HistoryEntry::default()
            }],
            10,
        );

        assert!(out.contains("History #1: No query available"));
        assert!(out.contains("Answer: No answer available"));
        assert!(out.contains("Time: No timestamp available"));
        assert!(out.contains("Keywords: billing"));
    }

    #[tokio::test]
    async fn test_show_history_fetches_once() {
        let mut backend = MockRagBackend::new();
        backend
            .expect_conversation_history()
            .times(1)
            .returning(|| Ok(vec![entry("hello")]));

        show_history(&backend, DEFAULT_HISTORY_LIMIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_show_history_propagates_errors() {
        let mut backend = MockRagBackend::new();
        backend
            .expect_conversation_history()
            .returning(|| Err(anyhow::anyhow!("Connection error")));

        assert!(show_history(&backend, 5).await.is_err());
    }
}
