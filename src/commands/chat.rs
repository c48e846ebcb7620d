use anyhow::Result;
use log::{debug, info};
use std::fmt;

use crate::backend::{Chunk, QueryAnswer, QueryOutcome, QueryRequest, RagBackend, SourceDocument};
use crate::runtime::Runtime;
use crate::session::{ChatMessage, Role, SessionContext};

const PROMPT: &str = "> ";
const TRANSCRIPT_COMMAND: &str = "/history";

/// Build the query for the current session.
///
/// With a chatbot selected the question is scoped to it, which only makes
/// sense once a knowledge base exists. Without one the backend's default
/// pipeline answers.
fn build_request(
    session: &SessionContext,
    query: &str,
    keywords: Option<&str>,
) -> Result<QueryRequest> {
    let request = QueryRequest::new(query).with_keywords(keywords.map(str::to_string));
    if session.chatbot_id.is_none() {
        return Ok(request);
    }

    let chatbot_id = session.require_chatbot()?;
    session.require_knowledge_base()?;
    Ok(request.for_chatbot(chatbot_id))
}

/// Ask a single question and print the answer with its sources.
#[tracing::instrument(skip(backend, session))]
pub async fn ask<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    query: &str,
    keywords: Option<&str>,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("Please enter a query.");
    }

    let request = build_request(session, query, keywords)?;
    let outcome = turn(backend, session, &request).await?;
    print!("{}", outcome);
    Ok(())
}

/// Interactive chat over stdin. Errors are reported and the loop continues;
/// `exit`, `quit` or end of input ends the session. `/history` reprints the
/// conversation so far.
#[tracing::instrument(skip(runtime, backend, session))]
pub async fn chat<R: Runtime, B: RagBackend>(
    runtime: &R,
    backend: &B,
    session: &mut SessionContext,
    keywords: Option<&str>,
) -> Result<()> {
    // Fail fast on incomplete setup rather than on the first question.
    build_request(session, "", keywords)?;

    println!(
        "Chatting with {}. Type '{}' to review the conversation, 'exit' to quit.",
        session.chatbot_id.as_deref().unwrap_or(session.server_url()),
        TRANSCRIPT_COMMAND
    );

    while let Some(line) = runtime.read_line(PROMPT)? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }
        if query == TRANSCRIPT_COMMAND {
            print!("{}", render_transcript(&session.chat_history));
            continue;
        }

        let request = build_request(session, query, keywords)?;
        match turn(backend, session, &request).await {
            Ok(rendered) => print!("{}", rendered),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    debug!("Chat ended after {} messages", session.chat_history.len());
    Ok(())
}

/// Send one question, record it in the session and render the outcome.
async fn turn<B: RagBackend>(
    backend: &B,
    session: &mut SessionContext,
    request: &QueryRequest,
) -> Result<String> {
    info!("Querying: {}", request.query);
    session.record_user(&request.query);

    match backend.query(request).await? {
        QueryOutcome::Answered(answer) => {
            let rendered = render_answer(&answer);
            session.record_assistant(
                answer.answer.clone().unwrap_or_default(),
                answer.documents.clone(),
            );
            Ok(rendered)
        }
        QueryOutcome::Accepted { task_id } => Ok(match task_id {
            Some(id) => format!("Query accepted for processing (task {}).\n", id),
            None => "Query accepted for processing.\n".to_string(),
        }),
    }
}

pub fn render_answer(answer: &QueryAnswer) -> String {
    AnswerView(answer).to_string()
}

/// The conversation so far, with the sources each answer cited.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    TranscriptView(messages).to_string()
}

struct AnswerView<'a>(&'a QueryAnswer);

impl fmt::Display for AnswerView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let answer = self.0;
        writeln!(
            f,
            "{}",
            answer.answer.as_deref().unwrap_or("No valid answer received.")
        )?;

        if !answer.documents.is_empty() {
            writeln!(f, "\nSources:")?;
            write_documents(f, &answer.documents)?;
        }

        if !answer.chunks.is_empty() {
            writeln!(f, "\nRetrieved Chunks:")?;
            for (rank, chunk) in answer.chunks.iter().enumerate() {
                write_chunk(f, rank + 1, chunk)?;
            }
        }
        Ok(())
    }
}

fn write_documents(f: &mut fmt::Formatter<'_>, documents: &[SourceDocument]) -> fmt::Result {
    for doc in documents {
        writeln!(f, "  Document: {}", doc.name)?;
        writeln!(f, "  Preview: {}", doc.preview)?;
        if let Some(keywords) = doc.keywords.as_ref().filter(|k| !k.is_empty()) {
            writeln!(f, "  Keywords: {}", keywords)?;
        }
    }
    Ok(())
}

fn write_chunk(f: &mut fmt::Formatter<'_>, rank: usize, chunk: &Chunk) -> fmt::Result {
    match chunk.chunk_index {
        Some(index) => writeln!(f, "  Rank #{} (Chunk Index: {})", rank, index)?,
        None => writeln!(f, "  Rank #{} (Chunk Index: Unknown)", rank)?,
    }
    writeln!(f, "    Source: {}", chunk.source)?;
    writeln!(f, "    Score: {}", chunk.score)?;
    writeln!(
        f,
        "    Reference: {}",
        chunk.reference.as_deref().unwrap_or("N/A")
    )?;
    if let Some(keywords) = chunk.keywords.as_ref().filter(|k| !k.is_empty()) {
        writeln!(f, "    Keywords: {}", keywords)?;
    }
    for line in chunk.content.lines() {
        writeln!(f, "    | {}", line)?;
    }
    Ok(())
}

struct TranscriptView<'a>(&'a [ChatMessage]);

impl fmt::Display for TranscriptView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No messages yet.");
        }
        for message in self.0 {
            let speaker = match message.role {
                Role::User => "You",
                Role::Assistant => "Assistant",
            };
            writeln!(f, "{}: {}", speaker, message.content)?;
            if !message.documents.is_empty() {
                write_documents(f, &message.documents)?;
            }
        }
        Ok(())
    }
}
