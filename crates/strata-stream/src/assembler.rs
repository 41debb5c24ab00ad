//! Out-of-order hole assembly over an in-order shell.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use strata_core::{hole_error_marker, hole_placeholder, HoleSlot};

use crate::chunk::Chunk;

/// Stream protocol violations.
#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    #[error("shell chunk already sent")]
    ShellAlreadySent,

    #[error("hole chunk before shell chunk")]
    ShellNotSent,

    #[error("unknown hole id: {0}")]
    UnknownHole(String),

    #[error("hole already resolved: {0}")]
    AlreadyResolved(String),

    #[error("{0} holes still pending at finish")]
    HolesPending(usize),
}

#[derive(Debug)]
enum Resolution {
    Resolved(String),
    Failed(String),
}

/// The fully assembled document, equivalent to what a streaming client
/// ends up with after applying every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    pub html: String,
    /// Ids of holes whose resolvers failed; their positions carry the
    /// fallback content.
    pub failed: Vec<String>,
}

/// Orders one response stream: shell first, then each declared hole
/// exactly once in whatever order resolution completes.
///
/// Chunk sends ignore a dropped receiver so assembly (and any cache
/// write that depends on it) survives a client disconnect.
pub struct StreamAssembler {
    tx: UnboundedSender<Chunk>,
    slots: Vec<HoleSlot>,
    resolutions: HashMap<String, Resolution>,
    shell: Option<String>,
}

impl StreamAssembler {
    /// Create an assembler for a shell with the given hole slots,
    /// returning the chunk stream alongside it.
    pub fn new(slots: Vec<HoleSlot>) -> (Self, UnboundedReceiver<Chunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                slots,
                resolutions: HashMap::new(),
                shell: None,
            },
            rx,
        )
    }

    /// Emit the shell. Must happen exactly once, before any hole.
    pub fn begin_shell(&mut self, shell: impl Into<String>) -> Result<(), AssemblerError> {
        if self.shell.is_some() {
            return Err(AssemblerError::ShellAlreadySent);
        }
        let shell = shell.into();
        self.send(Chunk::Shell(shell.clone()));
        self.shell = Some(shell);
        Ok(())
    }

    /// Emit a resolved hole.
    pub fn resolve_hole(&mut self, id: &str, html: String) -> Result<(), AssemblerError> {
        self.claim(id)?;
        self.send(Chunk::HoleResolved {
            id: id.to_string(),
            html: html.clone(),
        });
        self.resolutions
            .insert(id.to_string(), Resolution::Resolved(html));
        Ok(())
    }

    /// Emit a failed hole. The client keeps the slot's fallback.
    pub fn fail_hole(&mut self, id: &str, message: String) -> Result<(), AssemblerError> {
        self.claim(id)?;
        self.send(Chunk::HoleFailed {
            id: id.to_string(),
            message: message.clone(),
        });
        self.resolutions
            .insert(id.to_string(), Resolution::Failed(message));
        Ok(())
    }

    /// Holes not yet resolved or failed.
    pub fn pending(&self) -> usize {
        self.slots.len() - self.resolutions.len()
    }

    /// Close the stream and fold the chunks into the final document.
    /// Substitution runs in slot order, so the result is byte-identical
    /// regardless of resolution order.
    pub fn finish(mut self) -> Result<AssembledDocument, AssemblerError> {
        let Some(mut html) = self.shell.take() else {
            return Err(AssemblerError::ShellNotSent);
        };
        let pending = self.slots.len() - self.resolutions.len();
        if pending > 0 {
            return Err(AssemblerError::HolesPending(pending));
        }

        let mut failed = Vec::new();
        for slot in &self.slots {
            let replacement = match &self.resolutions[&slot.id] {
                Resolution::Resolved(content) => content.clone(),
                Resolution::Failed(_) => {
                    failed.push(slot.id.clone());
                    format!("{}{}", hole_error_marker(&slot.id), slot.fallback)
                }
            };
            html = html.replace(&hole_placeholder(&slot.id), &replacement);
        }

        self.send(Chunk::Done);
        Ok(AssembledDocument { html, failed })
    }

    fn claim(&self, id: &str) -> Result<(), AssemblerError> {
        if self.shell.is_none() {
            return Err(AssemblerError::ShellNotSent);
        }
        if !self.slots.iter().any(|s| s.id == id) {
            return Err(AssemblerError::UnknownHole(id.to_string()));
        }
        if self.resolutions.contains_key(id) {
            return Err(AssemblerError::AlreadyResolved(id.to_string()));
        }
        Ok(())
    }

    fn send(&self, chunk: Chunk) {
        if self.tx.send(chunk).is_err() {
            debug!("chunk receiver dropped, continuing assembly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> Vec<HoleSlot> {
        vec![
            HoleSlot::new("0:greeting", "loading greeting"),
            HoleSlot::new("1:cart", "loading cart"),
        ]
    }

    fn shell() -> String {
        format!(
            "<main/>{}{}",
            hole_placeholder("0:greeting"),
            hole_placeholder("1:cart"),
        )
    }

    #[test]
    fn test_shell_streams_before_holes() {
        let (mut assembler, mut rx) = StreamAssembler::new(slots());
        assert!(matches!(
            assembler.resolve_hole("0:greeting", "<p/>".into()),
            Err(AssemblerError::ShellNotSent)
        ));

        assembler.begin_shell(shell()).unwrap();
        assembler.resolve_hole("1:cart", "<cart/>".into()).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), Chunk::Shell(_)));
        assert_eq!(
            rx.try_recv().unwrap(),
            Chunk::HoleResolved {
                id: "1:cart".into(),
                html: "<cart/>".into()
            }
        );
    }

    #[test]
    fn test_each_hole_resolves_exactly_once() {
        let (mut assembler, _rx) = StreamAssembler::new(slots());
        assembler.begin_shell(shell()).unwrap();
        assembler.resolve_hole("0:greeting", "<p/>".into()).unwrap();

        assert!(matches!(
            assembler.resolve_hole("0:greeting", "<p2/>".into()),
            Err(AssemblerError::AlreadyResolved(_))
        ));
        assert!(matches!(
            assembler.fail_hole("0:greeting", "late".into()),
            Err(AssemblerError::AlreadyResolved(_))
        ));
        assert!(matches!(
            assembler.resolve_hole("9:ghost", "<x/>".into()),
            Err(AssemblerError::UnknownHole(_))
        ));
    }

    #[test]
    fn test_finish_is_order_independent() {
        let assemble = |order: &[usize]| {
            let (mut assembler, _rx) = StreamAssembler::new(slots());
            assembler.begin_shell(shell()).unwrap();
            for &i in order {
                match i {
                    0 => assembler
                        .resolve_hole("0:greeting", "<p>hi</p>".into())
                        .unwrap(),
                    _ => assembler.resolve_hole("1:cart", "<cart/>".into()).unwrap(),
                }
            }
            assembler.finish().unwrap()
        };

        let forward = assemble(&[0, 1]);
        let reverse = assemble(&[1, 0]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.html, "<main/><p>hi</p><cart/>");
        assert!(forward.failed.is_empty());
    }

    #[test]
    fn test_failed_hole_keeps_fallback_with_marker() {
        let (mut assembler, _rx) = StreamAssembler::new(slots());
        assembler.begin_shell(shell()).unwrap();
        assembler
            .resolve_hole("0:greeting", "<p>hi</p>".into())
            .unwrap();
        assembler.fail_hole("1:cart", "upstream down".into()).unwrap();

        let doc = assembler.finish().unwrap();
        assert_eq!(doc.failed, vec!["1:cart".to_string()]);
        assert!(doc.html.contains("<p>hi</p>"));
        assert!(doc.html.contains(&hole_error_marker("1:cart")));
        assert!(doc.html.contains("loading cart"));
    }

    #[test]
    fn test_finish_rejects_pending_holes() {
        let (mut assembler, _rx) = StreamAssembler::new(slots());
        assembler.begin_shell(shell()).unwrap();
        assembler
            .resolve_hole("0:greeting", "<p/>".into())
            .unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(AssemblerError::HolesPending(1))
        ));
    }

    #[test]
    fn test_assembly_survives_dropped_receiver() {
        let (mut assembler, rx) = StreamAssembler::new(slots());
        drop(rx);
        assembler.begin_shell(shell()).unwrap();
        assembler.resolve_hole("0:greeting", "<p/>".into()).unwrap();
        assembler.resolve_hole("1:cart", "<cart/>".into()).unwrap();
        let doc = assembler.finish().unwrap();
        assert_eq!(doc.html, "<main/><p/><cart/>");
    }

    #[test]
    fn test_done_terminates_stream() {
        let (mut assembler, mut rx) = StreamAssembler::new(Vec::new());
        assembler.begin_shell("<html/>").unwrap();
        let doc = assembler.finish().unwrap();
        assert_eq!(doc.html, "<html/>");

        assert!(matches!(rx.try_recv().unwrap(), Chunk::Shell(_)));
        assert_eq!(rx.try_recv().unwrap(), Chunk::Done);
        assert!(rx.try_recv().is_err());
    }
}
