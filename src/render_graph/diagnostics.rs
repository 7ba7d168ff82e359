//! Structured results of link resolution

use std::fmt;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Advisory, the wiring still works
    Warning,
    /// An input was left unlinked
    Error,
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// The referenced producer does not exist
    UnknownNode,
    /// The referenced output pin does not exist on the producer
    UnknownPin,
    /// The producer was referenced without a pin and declares no outputs
    NoOutputPins,
    /// The input is wired but the consuming pass never reads it
    UnusedInput,
    /// Resolved links form a cycle
    CyclicLink,
}

/// One finding of a resolution pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    /// Consuming node
    pub node: String,
    /// Input pin of the consuming node
    pub input: Option<String>,
    /// Producer as it was referenced
    pub producer: Option<String>,
    /// Output pin of the producer
    pub pin: Option<String>,
}

impl Diagnostic {
    pub(crate) fn unknown_node(node: &str, input: &str, producer: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: DiagnosticCode::UnknownNode,
            node: node.to_string(),
            input: Some(input.to_string()),
            producer: Some(producer.to_string()),
            pin: None,
        }
    }

    pub(crate) fn unknown_pin(node: &str, input: &str, producer: &str, pin: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: DiagnosticCode::UnknownPin,
            node: node.to_string(),
            input: Some(input.to_string()),
            producer: Some(producer.to_string()),
            pin: Some(pin.to_string()),
        }
    }

    pub(crate) fn no_output_pins(node: &str, input: &str, producer: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: DiagnosticCode::NoOutputPins,
            node: node.to_string(),
            input: Some(input.to_string()),
            producer: Some(producer.to_string()),
            pin: None,
        }
    }

    pub(crate) fn unused_input(node: &str, input: &str) -> Self {
        Self {
            severity: Severity::Warning,
            code: DiagnosticCode::UnusedInput,
            node: node.to_string(),
            input: Some(input.to_string()),
            producer: None,
            pin: None,
        }
    }

    pub(crate) fn cyclic_link(node: &str, producer: &str) -> Self {
        Self {
            severity: Severity::Warning,
            code: DiagnosticCode::CyclicLink,
            node: node.to_string(),
            input: None,
            producer: Some(producer.to_string()),
            pin: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = self.input.as_deref().unwrap_or("?");
        let producer = self.producer.as_deref().unwrap_or("?");
        match self.code {
            DiagnosticCode::UnknownNode => write!(
                f,
                "Node {producer} referenced by {}.{input} does not exist",
                self.node
            ),
            DiagnosticCode::UnknownPin => write!(
                f,
                "Pin {producer}.{} referenced by {}.{input} does not exist",
                self.pin.as_deref().unwrap_or("?"),
                self.node
            ),
            DiagnosticCode::NoOutputPins => write!(
                f,
                "Node {producer} referenced by {}.{input} has no output pins",
                self.node
            ),
            DiagnosticCode::UnusedInput => {
                write!(f, "Pin {}.{input} is not used by its pass", self.node)
            }
            DiagnosticCode::CyclicLink => write!(
                f,
                "Node {} is part of a link cycle through {producer}",
                self.node
            ),
        }
    }
}

/// Outcome of [`crate::render_graph::Graph::update`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub(crate) link_count: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl ResolveReport {
    /// Number of links created
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// No diagnostics at all
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Every input resolved, warnings aside
    pub fn is_complete(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.severity < Severity::Error)
    }

    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.diagnostics.iter().filter(|d| d.code == code).count()
    }

    pub fn has(&self, code: DiagnosticCode) -> bool {
        self.count(code) > 0
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
