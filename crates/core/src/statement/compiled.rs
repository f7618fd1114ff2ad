//! Compiled statements.
//!
//! Compiling a structure runs every configuration-time check once: formula
//! parsing, reference and cycle detection, binding targets, the percentage
//! base and the summary role mapping. The result is what the plan cache holds.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use demonstra_shared::types::StatementId;

use super::error::StructureError;
use super::plan::{DependencyResolver, EvaluationPlan};
use super::types::{
    AccountBinding, LineBindings, LineKind, RoleMapping, StatementLineDefinition,
    StatementStructure,
};

/// A validated statement structure together with its evaluation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    /// Statement type.
    pub statement_id: StatementId,
    /// Statement name.
    pub name: String,
    /// Version of the structure this was compiled from.
    pub structure_hash: u64,
    /// Evaluation order.
    pub plan: EvaluationPlan,
    /// Line definitions in display order.
    pub lines: Vec<StatementLineDefinition>,
    /// Accounts per leaf line, deduplicated and sorted.
    pub bindings: LineBindings,
    /// Summary role mapping, every code verified to exist.
    pub roles: RoleMapping,
    /// Percentage base line.
    pub base_line: String,
}

impl CompiledStatement {
    /// Validates a structure and builds its plan.
    ///
    /// # Errors
    ///
    /// Returns the first `StructureError` found.
    pub fn compile(structure: &StatementStructure) -> Result<Self, StructureError> {
        if let Some(line) = structure
            .lines
            .iter()
            .find(|line| line.statement_id != structure.statement_id)
        {
            return Err(StructureError::ForeignLine {
                line: line.code.clone(),
                owner: line.statement_id,
                statement: structure.statement_id,
            });
        }

        let plan = DependencyResolver::build_plan(structure.statement_id, &structure.lines)?;

        let kinds: HashMap<&str, LineKind> = structure
            .lines
            .iter()
            .map(|line| (line.code.as_str(), line.kind))
            .collect();

        let bindings = resolve_bindings(&structure.bindings, &kinds)?;

        if !kinds.contains_key(structure.base_line.as_str()) {
            return Err(StructureError::UnknownBaseLine(structure.base_line.clone()));
        }

        for (role, code) in &structure.roles {
            if !kinds.contains_key(code.as_str()) {
                return Err(StructureError::UnknownRoleLine {
                    role: *role,
                    code: code.clone(),
                });
            }
        }

        let mut lines = structure.lines.clone();
        lines.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.code.cmp(&b.code)));

        Ok(Self {
            statement_id: structure.statement_id,
            name: structure.name.clone(),
            structure_hash: structure_hash(structure),
            plan,
            lines,
            bindings,
            roles: structure.roles.clone(),
            base_line: structure.base_line.clone(),
        })
    }

    /// Looks up a line definition by code.
    #[must_use]
    pub fn line(&self, code: &str) -> Option<&StatementLineDefinition> {
        self.lines.iter().find(|l| l.code == code)
    }
}

fn resolve_bindings(
    bindings: &[AccountBinding],
    kinds: &HashMap<&str, LineKind>,
) -> Result<LineBindings, StructureError> {
    let mut grouped: HashMap<String, BTreeSet<_>> = HashMap::new();

    for binding in bindings {
        match kinds.get(binding.line_code.as_str()) {
            Some(LineKind::Leaf) => {
                grouped
                    .entry(binding.line_code.clone())
                    .or_default()
                    .insert(binding.account_id);
            }
            Some(LineKind::Computed) | None => {
                return Err(StructureError::InvalidBinding {
                    line: binding.line_code.clone(),
                    account: binding.account_id,
                });
            }
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(code, accounts)| (code, accounts.into_iter().collect()))
        .collect())
}

/// Deterministic version hash of a structure.
///
/// Independent of the order lines and bindings arrive in; any edit to a
/// line, a binding, the role mapping, the base line or the name changes it.
#[must_use]
pub fn structure_hash(structure: &StatementStructure) -> u64 {
    let mut lines: Vec<&StatementLineDefinition> = structure.lines.iter().collect();
    lines.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.order.cmp(&b.order)));

    let mut bindings: Vec<&AccountBinding> = structure.bindings.iter().collect();
    bindings.sort();
    bindings.dedup();

    let mut hasher = DefaultHasher::new();
    structure.statement_id.hash(&mut hasher);
    structure.name.hash(&mut hasher);
    lines.hash(&mut hasher);
    bindings.hash(&mut hasher);
    structure.roles.hash(&mut hasher);
    structure.base_line.hash(&mut hasher);
    hasher.finish()
}
