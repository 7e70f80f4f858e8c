//! Operator feedback on chain responses
//!
//! Collection is synchronous: the calling thread waits until the operator
//! has answered every requested prompt.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

pub const RATING_PROMPT: &str = "Rate the response?";
pub const COMMENTS_PROMPT: &str = "Please provide any comments on why you gave it that rating: ";

/// Rating and comments given for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.comments.is_none()
    }
}

/// Collects feedback for a response.
pub trait FeedbackCollector: Send + Sync {
    /// Returns an empty [`Feedback`] when nothing is requested.
    fn collect(&self, response: &str) -> Feedback;
}

/// Never asks anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl FeedbackCollector for NoFeedback {
    fn collect(&self, _response: &str) -> Feedback {
        Feedback::default()
    }
}

/// Prints the response and reads answers line by line.
pub struct PromptFeedback<R, W> {
    request_rating: bool,
    request_comments: bool,
    io: Mutex<(R, W)>,
}

/// Feedback read from the process terminal.
pub type TerminalFeedback = PromptFeedback<BufReader<Stdin>, Stdout>;

impl TerminalFeedback {
    pub fn stdio(request_rating: bool, request_comments: bool) -> Self {
        PromptFeedback::new(
            request_rating,
            request_comments,
            BufReader::new(std::io::stdin()),
            std::io::stdout(),
        )
    }
}

impl<R, W> PromptFeedback<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(request_rating: bool, request_comments: bool, reader: R, writer: W) -> Self {
        Self {
            request_rating,
            request_comments,
            io: Mutex::new((reader, writer)),
        }
    }

    /// Hands back the reader and writer, mainly to inspect what was printed.
    pub fn into_inner(self) -> (R, W) {
        match self.io.into_inner() {
            Ok(io) => io,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ask(reader: &mut R, writer: &mut W, prompt: &str) -> Result<String> {
        write!(writer, "{}", prompt)?;
        writer.flush()?;
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Err(Error::feedback("input closed before an answer was given"));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn try_collect(&self, response: &str) -> Result<Feedback> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| Error::internal("feedback terminal lock poisoned"))?;
        let (reader, writer) = &mut *guard;

        writeln!(writer, "Response from llm:")?;
        writeln!(writer, "{}", response)?;
        writer.flush()?;

        let mut feedback = Feedback::default();
        if self.request_rating {
            feedback.rating = Some(Self::ask(reader, writer, RATING_PROMPT)?);
        }
        if self.request_comments {
            feedback.comments = Some(Self::ask(reader, writer, COMMENTS_PROMPT)?);
        }
        Ok(feedback)
    }
}

impl<R, W> FeedbackCollector for PromptFeedback<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn collect(&self, response: &str) -> Feedback {
        if !self.request_rating && !self.request_comments {
            return Feedback::default();
        }
        match self.try_collect(response) {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(error = %e, "Could not collect operator feedback");
                Feedback::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_nothing_requested_reads_nothing() {
        let collector = PromptFeedback::new(false, false, Cursor::new("5\n"), Vec::new());
        assert!(collector.collect("4").is_empty());
        let (reader, writer) = collector.into_inner();
        assert_eq!(reader.position(), 0);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_rating_and_comments() {
        let collector = PromptFeedback::new(
            true,
            true,
            Cursor::new("5\r\ncorrect and short\n"),
            Vec::new(),
        );
        let feedback = collector.collect("4");
        assert_eq!(feedback.rating.as_deref(), Some("5"));
        assert_eq!(feedback.comments.as_deref(), Some("correct and short"));

        let (_, writer) = collector.into_inner();
        let printed = String::from_utf8(writer).unwrap();
        assert!(printed.starts_with("Response from llm:\n4\n"));
        assert!(printed.contains(RATING_PROMPT));
        assert!(printed.contains(COMMENTS_PROMPT));
    }

    #[test]
    fn test_rating_only() {
        let collector = PromptFeedback::new(true, false, Cursor::new("3\n"), Vec::new());
        let feedback = collector.collect("answer");
        assert_eq!(feedback.rating.as_deref(), Some("3"));
        assert!(feedback.comments.is_none());
    }

    #[test]
    fn test_closed_input_degrades_to_empty() {
        let collector = PromptFeedback::new(true, true, Cursor::new(""), Vec::new());
        assert!(collector.collect("answer").is_empty());
    }
}
