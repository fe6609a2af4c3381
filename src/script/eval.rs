//! Interprets a parsed linker script against a [`Module`], producing
//! [`Segment`]s.
//!
//! Grounded on `original_source/src/linker/linker.cc`'s `ProcessScript`/
//! `ProcessAction`/`PostProcessAction`/`CheckPredicate`/`EvaluateExpression`.
//! The fine per-instance bookkeeping the original used to distinguish a
//! template's head match from its later matches (`current_is_template_head`
//! vs `current_is_template`) is collapsed here into one rule: a
//! [`Segment`] with no sections yet is still free to have its base address
//! moved by a plain (non-`post`) `at` statement; once it holds a section,
//! only a `post`-context `at` may move it (see `Segment::rebase_if_empty`
//! below and `DESIGN.md`).

use std::collections::{HashMap, HashSet};

use super::ast::{Expr, Predicate, Stmt};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::location::{SectionId, SegmentId};
use crate::module::Module;
use crate::options::LinkerParameter;
use crate::segment::Segment;

pub struct ScriptEvaluator<'m> {
    module: &'m mut Module,
    diagnostics: &'m dyn Diagnostics,
    parameters: HashMap<String, LinkerParameter>,
    segments: Vec<Segment>,
    segment_names: HashMap<String, SegmentId>,
    placed: HashSet<SectionId>,
    current_address: u64,
    current_base: u64,
}

impl<'m> ScriptEvaluator<'m> {
    pub fn new(
        module: &'m mut Module,
        parameters: HashMap<String, LinkerParameter>,
        diagnostics: &'m dyn Diagnostics,
    ) -> Self {
        ScriptEvaluator {
            module,
            diagnostics,
            parameters,
            segments: Vec::new(),
            segment_names: HashMap::new(),
            placed: HashSet::new(),
            current_address: 0,
            current_base: 0,
        }
    }

    /// Parses and runs `source` against the module, returning the produced
    /// segments in creation order.
    pub fn run_source(mut self, source: &str) -> Result<Vec<Segment>> {
        let stmts = super::parser::parse(source)?;
        self.exec_stmts(&stmts, None, false)?;
        Ok(self.segments)
    }

    pub fn segment_by_name(&self, name: &str) -> Option<&Segment> {
        self.segment_names.get(name).map(|id| &self.segments[id.0])
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], active: Option<SegmentId>, post: bool) -> Result<()> {
        for stmt in stmts {
            self.exec_stmt(stmt, active, post)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, active: Option<SegmentId>, post: bool) -> Result<()> {
        match stmt {
            Stmt::Sequence(inner) => self.exec_stmts(inner, active, post)?,
            Stmt::SetCurrentAddress(expr) => {
                let value = self.eval_expr(expr, active)? as u64;
                match active {
                    Some(id) if post => self.rebase_segment_sections(id, value),
                    _ => self.current_address = value,
                }
            }
            Stmt::AlignAddress(expr) => {
                let value = self.eval_expr(expr, active)? as u64;
                self.current_address = align_up(self.current_address, value.max(1));
            }
            Stmt::SetNextBase(expr) => {
                self.current_base = self.eval_expr(expr, active)? as u64;
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval_expr(expr, active)?;
                self.parameters
                    .insert(name.clone(), LinkerParameter::Integer(value));
            }
            Stmt::Collect { predicate, actions } => {
                let Some(segment_id) = active else {
                    return Err(Error::ScriptEval(
                        "'all' statement used outside a segment body".into(),
                    ));
                };
                self.collect(predicate, segment_id, actions)?;
            }
            Stmt::Segment { name, body, post } => {
                self.run_segment(name.clone(), body, post)?;
            }
            Stmt::SegmentTemplate {
                predicate,
                body,
                post,
            } => {
                self.run_segment_template(predicate, body, post)?;
            }
        }
        Ok(())
    }

    fn run_segment(&mut self, name: String, body: &[Stmt], post: &[Stmt]) -> Result<()> {
        let segment = Segment::new(name.clone(), self.current_address);
        let id = SegmentId(self.segments.len());
        self.segments.push(segment);
        self.segment_names.insert(name, id);

        self.exec_stmts(body, Some(id), false)?;
        self.exec_stmts(post, Some(id), true)?;

        let segment = &self.segments[id.0];
        self.current_address = segment.base_address() + segment.image_size();
        Ok(())
    }

    fn run_segment_template(
        &mut self,
        predicate: &Predicate,
        body: &[Stmt],
        post: &[Stmt],
    ) -> Result<()> {
        let cap = maximum_of(predicate);
        let mut instantiated = 0u64;
        let candidates: Vec<SectionId> = self.module.section_ids().collect();
        for id in candidates {
            if let Some(cap) = cap {
                if instantiated >= cap {
                    break;
                }
            }
            if self.placed.contains(&id) {
                continue;
            }
            if !self.matches(predicate, id)? {
                continue;
            }
            let name = instance_name(predicate, self.module.section(id).name());
            self.run_segment(name, body, post)?;
            instantiated += 1;
        }
        Ok(())
    }

    fn collect(&mut self, predicate: &Predicate, segment_id: SegmentId, actions: &[Stmt]) -> Result<()> {
        let cap = maximum_of(predicate);
        let mut matched = 0u64;
        let candidates: Vec<SectionId> = self.module.section_ids().collect();
        for id in candidates {
            if let Some(cap) = cap {
                if matched >= cap {
                    break;
                }
            }
            if self.placed.contains(&id) {
                continue;
            }
            if !self.matches(predicate, id)? {
                continue;
            }
            self.append_section(segment_id, id)?;
            matched += 1;
            self.exec_stmts(actions, Some(segment_id), false)?;
        }
        Ok(())
    }

    fn append_section(&mut self, segment_id: SegmentId, id: SectionId) -> Result<()> {
        let current_address = self.current_address;
        let current_base = self.current_base;
        let diagnostics = self.diagnostics;

        let segment = &mut self.segments[segment_id.0];
        segment.rebase_if_empty(current_address);

        // Module owns the Section arena; reach into it directly so
        // Segment::append can address and flag the section in place.
        let address = self
            .module
            .with_sections_mut(|sections| segment.append(sections, id, segment_id, diagnostics))?;
        self.module
            .section_mut(id)
            .set_bias(address as i64 - current_base as i64);

        self.placed.insert(id);
        self.current_address = segment.base_address() + segment.image_size();
        Ok(())
    }

    fn rebase_segment_sections(&mut self, segment_id: SegmentId, new_base: u64) {
        let diagnostics = self.diagnostics;
        let delta_base = {
            let segment = &self.segments[segment_id.0];
            new_base as i64 - segment.base_address() as i64
        };
        let segment = &mut self.segments[segment_id.0];
        self.module.with_sections_mut(|sections| {
            segment.shift_address(sections, delta_base, diagnostics);
        });
    }

    fn matches(&self, predicate: &Predicate, id: SectionId) -> Result<bool> {
        let section = self.module.section(id);
        use crate::section::SectionFlags as F;
        Ok(match predicate {
            Predicate::Any => true,
            Predicate::MatchName(name) => section.name() == name,
            Predicate::MatchSuffix(suffix) => section.name().ends_with(suffix.as_str()),
            Predicate::IsReadable => section.flags().contains(F::READABLE),
            Predicate::IsWritable => section.flags().contains(F::WRITABLE),
            Predicate::IsExecutable => section.flags().contains(F::EXECUTABLE),
            Predicate::IsMergeable => section.flags().contains(F::MERGEABLE),
            Predicate::IsZeroFilled => section.is_zero_filled(),
            Predicate::IsFixedAddress => section.is_fixed(),
            Predicate::IsResource => section.flags().contains(F::RESOURCE),
            Predicate::IsOptional => section.flags().contains(F::OPTIONAL),
            Predicate::IsStack => section.flags().contains(F::STACK),
            Predicate::IsHeap => section.flags().contains(F::HEAP),
            Predicate::CustomFlag(expr) => {
                let index = self.eval_expr(expr, None)?;
                let bit = 1u32
                    .checked_shl(16 + index as u32)
                    .ok_or_else(|| Error::ScriptEval(format!("custom_flag index {index} out of range")))?;
                section.flags().bits() & bit != 0
            }
            Predicate::NotPredicate(inner) => !self.matches(inner, id)?,
            Predicate::AndPredicate(a, b) => self.matches(a, id)? && self.matches(b, id)?,
            Predicate::OrPredicate(a, b) => self.matches(a, id)? || self.matches(b, id)?,
            Predicate::MaximumSections(_, inner) => self.matches(inner, id)?,
        })
    }

    fn eval_expr(&self, expr: &Expr, active: Option<SegmentId>) -> Result<i64> {
        let _ = active;
        Ok(match expr {
            Expr::Integer(n) => *n,
            Expr::Parameter(name) => self
                .parameters
                .get(name)
                .map(LinkerParameter::as_integer)
                .unwrap_or(0),
            Expr::Identifier(name) => {
                self.diagnostics
                    .debug(&format!("identifier '{name}' has no defined value; using 0"));
                0
            }
            Expr::StartOf(name) => self.start_of(name)?,
            Expr::SizeOf(name) => self.size_of(name)?,
            Expr::BaseOf(name) => {
                self.diagnostics
                    .debug(&format!("'base of {name}' is not computed by this core; using 0"));
                0
            }
            Expr::Here => self.current_address as i64,
            Expr::AlignTo(a, b) => {
                let a = self.eval_expr(a, active)? as u64;
                let b = self.eval_expr(b, active)? as u64;
                align_up(a, b.max(1)) as i64
            }
            Expr::Minimum(items) => self.eval_many(items, active)?.into_iter().min().unwrap_or(0),
            Expr::Maximum(items) => self.eval_many(items, active)?.into_iter().max().unwrap_or(0),
            Expr::Neg(e) => -self.eval_expr(e, active)?,
            Expr::Not(e) => !self.eval_expr(e, active)?,
            Expr::Shl(a, b) => self.eval_expr(a, active)? << self.eval_expr(b, active)?,
            Expr::Shr(a, b) => {
                ((self.eval_expr(a, active)? as u64) >> self.eval_expr(b, active)?) as i64
            }
            Expr::Add(a, b) => self.eval_expr(a, active)?.wrapping_add(self.eval_expr(b, active)?),
            Expr::Sub(a, b) => self.eval_expr(a, active)?.wrapping_sub(self.eval_expr(b, active)?),
            Expr::And(a, b) => self.eval_expr(a, active)? & self.eval_expr(b, active)?,
            Expr::Xor(a, b) => self.eval_expr(a, active)? ^ self.eval_expr(b, active)?,
            Expr::Or(a, b) => self.eval_expr(a, active)? | self.eval_expr(b, active)?,
        })
    }

    fn eval_many(&self, exprs: &[Expr], active: Option<SegmentId>) -> Result<Vec<i64>> {
        exprs.iter().map(|e| self.eval_expr(e, active)).collect()
    }

    fn start_of(&self, name: &str) -> Result<i64> {
        if let Some(segment) = self.segment_by_name(name) {
            return Ok(segment.base_address() as i64);
        }
        if let Some(id) = self.module.section_id_by_name(name) {
            if let Some(address) = self.module.section(id).address() {
                return Ok(address as i64);
            }
        }
        Err(Error::ScriptEval(format!("'start of {name}': unknown or unplaced")))
    }

    fn size_of(&self, name: &str) -> Result<i64> {
        if let Some(segment) = self.segment_by_name(name) {
            return Ok(segment.image_size() as i64);
        }
        if let Some(id) = self.module.section_id_by_name(name) {
            return Ok(self.module.section(id).size() as i64);
        }
        Err(Error::ScriptEval(format!("'size of {name}': unknown name")))
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    let remainder = value % align;
    if remainder == 0 {
        value
    } else {
        value + (align - remainder)
    }
}

fn maximum_of(predicate: &Predicate) -> Option<u64> {
    match predicate {
        Predicate::MaximumSections(n, _) => Some(*n),
        Predicate::AndPredicate(a, b) | Predicate::OrPredicate(a, b) => {
            maximum_of(a).or_else(|| maximum_of(b))
        }
        Predicate::NotPredicate(inner) => maximum_of(inner),
        _ => None,
    }
}

fn instance_name(predicate: &Predicate, section_name: &str) -> String {
    match predicate {
        Predicate::MatchSuffix(suffix) => section_name
            .strip_suffix(suffix.as_str())
            .unwrap_or(section_name)
            .to_string(),
        Predicate::AndPredicate(a, b) | Predicate::OrPredicate(a, b) => {
            let left = instance_name(a, section_name);
            if left != section_name {
                left
            } else {
                instance_name(b, section_name)
            }
        }
        Predicate::NotPredicate(inner) => instance_name(inner, section_name),
        Predicate::MaximumSections(_, inner) => instance_name(inner, section_name),
        _ => section_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::diagnostics::NullDiagnostics;
    use crate::section::{Section, SectionFlags};

    fn resource_section(name: &str) -> Section {
        let mut section = Section::new(name);
        section.add_flags(SectionFlags::RESOURCE);
        section
    }

    #[test]
    fn segment_template_creates_one_segment_per_resource() {
        let mut module = Module::new(Cpu::None);
        module.add_section(resource_section("r1"));
        module.add_section(resource_section("r2"));
        module.add_section(resource_section("r3"));

        let evaluator = ScriptEvaluator::new(&mut module, HashMap::new(), &NullDiagnostics);
        let segments = evaluator
            .run_source("for resource { at 0; all any; };")
            .unwrap();

        assert_eq!(segments.len(), 3);
        for (segment, expected_name) in segments.iter().zip(["r1", "r2", "r3"]) {
            assert_eq!(segment.name(), expected_name);
            assert_eq!(segment.base_address(), 0);
            assert_eq!(segment.sections().len(), 1);
        }
    }

    #[test]
    fn named_segment_collects_executable_sections() {
        let mut module = Module::new(Cpu::None);
        let mut code = Section::new(".code");
        code.add_flags(SectionFlags::EXECUTABLE);
        code.expand(16);
        module.add_section(code);

        let mut evaluator_parameters = HashMap::new();
        evaluator_parameters.insert("code_base".to_string(), LinkerParameter::Integer(0x100));
        let evaluator = ScriptEvaluator::new(&mut module, evaluator_parameters, &NullDiagnostics);
        let segments = evaluator
            .run_source(r#"".code" { at ?code_base?; all exec; };"#)
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].base_address(), 0x100);
        assert_eq!(segments[0].data_size(), 16);
    }
}
