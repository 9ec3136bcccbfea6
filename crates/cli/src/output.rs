//! Terminal rendering of a turn's event stream.
//!
//! Answer text goes to stdout; thoughts and loop notices go to stderr so the
//! answer can be piped on its own.

use futures::StreamExt;
use ragloop_agent::{Node, TurnCompletion, TurnEvent, TurnStream};
use ragloop_core::{AppError, AppResult};
use std::io::Write;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Echo thought chunks to stderr
    pub show_thoughts: bool,

    /// Print nothing while streaming (JSON output)
    pub quiet: bool,
}

/// Writes a turn as it streams.
pub struct TurnPrinter<O: Write, E: Write> {
    out: O,
    err: E,
    options: RenderOptions,
    answer_open: bool,
    thought_open: bool,
    trace: Vec<Node>,
}

impl TurnPrinter<std::io::Stdout, std::io::Stderr> {
    pub fn terminal(options: RenderOptions) -> Self {
        Self::new(std::io::stdout(), std::io::stderr(), options)
    }
}

impl<O: Write, E: Write> TurnPrinter<O, E> {
    pub fn new(out: O, err: E, options: RenderOptions) -> Self {
        Self {
            out,
            err,
            options,
            answer_open: false,
            thought_open: false,
            trace: vec![Node::Start],
        }
    }

    /// Visited nodes so far, starting at `START`.
    pub fn trace(&self) -> &[Node] {
        &self.trace
    }

    /// Drain `stream`, rendering every event, and return the completion.
    pub async fn drive(&mut self, mut stream: TurnStream) -> AppResult<TurnCompletion> {
        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    self.close_answer()?;
                    return Err(e);
                }
            };

            match event {
                TurnEvent::StateTransition { from, to } => self.transition(from, to)?,
                TurnEvent::ThoughtChunk { content } => self.thought(&content)?,
                TurnEvent::AnswerChunk { content } => self.answer(&content)?,
                TurnEvent::Completed(completion) => {
                    self.close_answer()?;
                    return Ok(completion);
                }
            }
        }

        Err(AppError::Other(
            "Turn ended without an answer".to_string(),
        ))
    }

    fn transition(&mut self, from: Node, to: Node) -> AppResult<()> {
        tracing::debug!("{} -> {}", from, to);
        self.trace.push(to);

        if self.options.quiet {
            return Ok(());
        }
        match (from, to) {
            (Node::GradeGen, Node::Generate) => {
                self.close_answer()?;
                writeln!(self.err, "[answer was not grounded in the evidence, regenerating]")?;
            }
            (Node::GradeGen, Node::Rewrite) => {
                self.close_answer()?;
                writeln!(self.err, "[answer did not resolve the question, rewriting it]")?;
            }
            (Node::GradeDocs, Node::Rewrite) => {
                writeln!(self.err, "[no relevant documents, rewriting the question]")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn thought(&mut self, content: &str) -> AppResult<()> {
        if self.options.quiet || !self.options.show_thoughts {
            return Ok(());
        }
        if !self.thought_open {
            write!(self.err, "[thinking] ")?;
            self.thought_open = true;
        }
        write!(self.err, "{}", content)?;
        self.err.flush()?;
        Ok(())
    }

    fn answer(&mut self, content: &str) -> AppResult<()> {
        if self.options.quiet {
            return Ok(());
        }
        if self.thought_open {
            writeln!(self.err)?;
            self.thought_open = false;
        }
        write!(self.out, "{}", content)?;
        self.out.flush()?;
        self.answer_open = true;
        Ok(())
    }

    fn close_answer(&mut self) -> AppResult<()> {
        if self.thought_open {
            writeln!(self.err)?;
            self.thought_open = false;
        }
        if self.answer_open {
            writeln!(self.out)?;
            self.answer_open = false;
        }
        Ok(())
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// JSON summary of a completed turn.
pub fn completion_json(
    completion: &TurnCompletion,
    trace: &[Node],
    thread_id: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "answer": completion.response.content,
        "thought": completion.thought.as_ref().map(|m| m.content.as_str()),
        "threadId": thread_id,
        "trace": trace,
        "rewrites": completion.rewrites,
        "regenerations": completion.regenerations,
    })
}
