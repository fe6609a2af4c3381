//! The linker script's abstract syntax tree.
//!
//! The original grammar is a flex/yacc front end feeding a type-erasure
//! `Node`/`Value<>`/`List` object hierarchy (`script.h`). Here the same node
//! kinds become plain tagged enums, produced directly by
//! [`crate::script::parser`] with no intermediate generic container.

/// A top-level or nested script statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Sequence(Vec<Stmt>),
    /// `at EXPR;` — pins the next section's (or segment's) address.
    SetCurrentAddress(Expr),
    /// `align EXPR;` — raises the current address to a multiple of EXPR.
    AlignAddress(Expr),
    /// `base EXPR;` — sets the bias origin for sections appended after this point.
    SetNextBase(Expr),
    /// `NAME = EXPR;` — binds a linker parameter usable as `?NAME?`.
    Assign(String, Expr),
    /// `"name" { body } [post { post }]` — a segment with a fixed name.
    Segment {
        name: String,
        body: Vec<Stmt>,
        post: Vec<Stmt>,
    },
    /// `for PREDICATE { body } [post { post }]` — one segment per matching
    /// section, named after the first section each instance collects.
    SegmentTemplate {
        predicate: Predicate,
        body: Vec<Stmt>,
        post: Vec<Stmt>,
    },
    /// `all PREDICATE [{ actions }];` — inside a segment body, gathers
    /// every not-yet-placed section matching `predicate`, running
    /// `actions` between each collected section.
    Collect {
        predicate: Predicate,
        actions: Vec<Stmt>,
    },
}

/// A linker-script expression, evaluated against
/// [`crate::script::eval::ScriptEvaluator`] state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Integer(i64),
    /// `?name?` — a `-P name=value` linker parameter; missing keys
    /// default to 0.
    Parameter(String),
    Identifier(String),
    /// `start of NAME` — the address of segment or section `NAME`.
    StartOf(String),
    /// `size of NAME` — the size of segment or section `NAME`.
    SizeOf(String),
    /// `base of NAME` — the bias base of segment `NAME`.
    BaseOf(String),
    /// `here` — the current address in evaluator state.
    Here,
    AlignTo(Box<Expr>, Box<Expr>),
    Minimum(Vec<Expr>),
    Maximum(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Shl(Box<Expr>, Box<Expr>),
    Shr(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A predicate tested against a candidate [`crate::section::Section`]
/// during [`Stmt::Collect`]/[`Stmt::SegmentTemplate`] evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Any,
    MatchName(String),
    MatchSuffix(String),
    IsReadable,
    IsWritable,
    IsExecutable,
    IsMergeable,
    IsZeroFilled,
    IsFixedAddress,
    IsResource,
    IsOptional,
    IsStack,
    IsHeap,
    CustomFlag(Expr),
    NotPredicate(Box<Predicate>),
    AndPredicate(Box<Predicate>, Box<Predicate>),
    OrPredicate(Box<Predicate>, Box<Predicate>),
    /// Caps how many sections a [`Stmt::SegmentTemplate`] instantiates,
    /// while still requiring the wrapped predicate to match.
    MaximumSections(u64, Box<Predicate>),
}
