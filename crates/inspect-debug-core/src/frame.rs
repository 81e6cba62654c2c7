//! Call stack, scope and variable views of a paused target.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BreakpointId, SourceLocation};

/// Why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// Stopped at the first statement after launch
    Entry,
    /// Hit one or more breakpoints
    Breakpoint {
        /// Breakpoints that were hit
        breakpoints: Vec<BreakpointId>,
    },
    /// A breakpoint condition threw while being evaluated
    ConditionError {
        /// Breakpoint whose condition failed
        breakpoint: BreakpointId,
        /// Evaluation error message
        message: String,
    },
    /// A step operation completed
    Step,
    /// An explicit pause request was honoured
    Pause,
    /// An exception was thrown
    Exception {
        /// Exception description, if the target provided one
        description: Option<String>,
    },
    /// A `debugger` statement or other reason reported by the target
    Other {
        /// Raw reason string
        reason: String,
    },
}

/// Kind of a variable scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Function locals
    Local,
    /// Closure captures
    Closure,
    /// Block scope
    Block,
    /// Catch clause
    Catch,
    /// Module scope
    Module,
    /// Script scope
    Script,
    /// `with` scope
    With,
    /// Global object
    Global,
    /// Any scope kind not listed above
    Other,
}

impl ScopeKind {
    /// Parse the protocol's scope type name.
    pub fn from_protocol(kind: &str) -> Self {
        match kind {
            "local" => ScopeKind::Local,
            "closure" => ScopeKind::Closure,
            "block" => ScopeKind::Block,
            "catch" => ScopeKind::Catch,
            "module" => ScopeKind::Module,
            "script" => ScopeKind::Script,
            "with" => ScopeKind::With,
            "global" => ScopeKind::Global,
            _ => ScopeKind::Other,
        }
    }
}

/// One scope in a frame's scope chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Scope {
    /// Scope kind
    pub kind: ScopeKind,
    /// Scope name, if the target reported one
    pub name: Option<String>,
    /// Remote object holding the scope's variables
    pub object_id: Option<String>,
}

/// One frame of a paused call stack, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CallFrame {
    /// Position in the stack (0 = innermost)
    pub index: usize,
    /// Protocol call frame id, used for evaluation
    pub frame_id: String,
    /// Function name (empty for anonymous functions)
    pub function_name: String,
    /// Current location in the frame (original source when mapped)
    pub location: SourceLocation,
    /// Scope chain, innermost first
    pub scopes: Vec<Scope>,
}

impl CallFrame {
    /// Function name, or `<anonymous>` when empty.
    pub fn display_name(&self) -> &str {
        if self.function_name.is_empty() {
            "<anonymous>"
        } else {
            &self.function_name
        }
    }
}

/// A named value inside a scope or object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Variable {
    /// Property name
    pub name: String,
    /// Rendered value
    pub value: String,
    /// Value type (`number`, `object`, ...)
    pub value_type: String,
    /// Remote object id for drilling into objects
    pub object_id: Option<String>,
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationResult {
    /// Rendered value
    pub value: String,
    /// Value type
    pub value_type: String,
    /// Remote object id for drilling into objects
    pub object_id: Option<String>,
    /// Exception text when the expression threw
    pub exception: Option<String>,
}

impl EvaluationResult {
    /// Whether the evaluation threw.
    pub fn is_error(&self) -> bool {
        self.exception.is_some()
    }
}
