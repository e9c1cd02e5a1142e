//! Schema rule checks.
//!
//! Rules are swept three times. The chain pass is the generic dynamic-record
//! check. The rule pass decodes every rule, checks its tokens and registers
//! what each rule needs from another one. The obligation pass runs once the
//! whole store has been seen and matches those needs against the rules that
//! were found, whatever their order in the file.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::CheckContext;
use crate::access::read_dynamic_chain;
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::{DynamicRecord, Result, SchemaRule, SchemaRuleKind};
use crate::types::{DynamicStore, TokenKind};

/// What a rule requires another rule to provide.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Obligation {
    required: SchemaRuleKind,
    label: u32,
    property_key: u32,
}

impl Obligation {
    fn of(rule: &SchemaRule) -> Option<Self> {
        let required = match rule.kind {
            SchemaRuleKind::Index => return None,
            SchemaRuleKind::ConstraintIndex => SchemaRuleKind::UniquenessConstraint,
            SchemaRuleKind::UniquenessConstraint => SchemaRuleKind::ConstraintIndex,
        };
        Some(Self {
            required,
            label: rule.label,
            property_key: rule.property_key,
        })
    }

    /// Key a rule of `kind` on the same schema would resolve.
    fn resolved_by(rule: &SchemaRule) -> Option<Self> {
        (rule.kind != SchemaRuleKind::Index).then_some(Self {
            required: rule.kind,
            label: rule.label,
            property_key: rule.property_key,
        })
    }

    fn describe(&self) -> String {
        let what = match self.required {
            SchemaRuleKind::UniquenessConstraint => "uniqueness constraint",
            _ => "constraint index",
        };
        format!("{what} on label {} key {}", self.label, self.property_key)
    }
}

/// Rules that describe the same schema twice.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
enum ContentClass {
    Index,
    Constraint,
}

#[derive(Debug, Default)]
struct Registry {
    rules: BTreeMap<u64, SchemaRule>,
    obligations: BTreeMap<Obligation, Vec<u64>>,
    resolved: bool,
}

/// Obligations registered by the rule pass and resolved by the obligation
/// pass of one run.
#[derive(Debug, Default)]
pub struct ObligationRegistry {
    state: Mutex<Registry>,
}

impl ObligationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decoded rule and the obligation it creates.
    pub fn register(&self, rule: SchemaRule) {
        let mut state = self.state.lock();
        if let Some(obligation) = Obligation::of(&rule) {
            state.obligations.entry(obligation).or_default().push(rule.id);
        }
        state.rules.insert(rule.id, rule);
    }

    /// Number of registered obligations.
    pub fn obligation_count(&self) -> usize {
        self.state.lock().obligations.len()
    }

    /// Number of rules seen by the rule pass.
    pub fn rule_count(&self) -> usize {
        self.state.lock().rules.len()
    }

    /// Replays the registry: reports duplicate rules, unmatched obligations
    /// and matched pairs whose ids do not point at each other.
    ///
    /// Runs at most once per registry; later calls report nothing.
    pub fn resolve(&self, reporter: &ConsistencyReporter<'_>) {
        let mut state = self.state.lock();
        if state.resolved {
            return;
        }
        state.resolved = true;

        let mut first_with_content: FxHashMap<(ContentClass, u32, u32), u64> = FxHashMap::default();
        let mut resolvers: FxHashMap<Obligation, Vec<u64>> = FxHashMap::default();
        for rule in state.rules.values() {
            let class = if rule.kind.is_index() {
                ContentClass::Index
            } else {
                ContentClass::Constraint
            };
            let content = (class, rule.label, rule.property_key);
            match first_with_content.get(&content) {
                Some(first) => reporter.report(Inconsistency::new(
                    RecordType::Schema,
                    rule.id,
                    InconsistencyKind::DuplicateRuleContent,
                    "content",
                    "unique rule content",
                    format!("duplicate of rule {first}"),
                )),
                None => {
                    first_with_content.insert(content, rule.id);
                }
            }
            if let Some(key) = Obligation::resolved_by(rule) {
                resolvers.entry(key).or_default().push(rule.id);
            }
        }

        for (obligation, registrants) in &state.obligations {
            let Some(first) = registrants.iter().min() else {
                continue;
            };
            if !resolvers.contains_key(obligation) {
                reporter.report(Inconsistency::new(
                    RecordType::Schema,
                    *first,
                    InconsistencyKind::MissingObligation,
                    "obligation",
                    obligation.describe(),
                    "none",
                ));
                continue;
            }
            for id in registrants {
                if let Some(rule) = state.rules.get(id) {
                    check_back_reference(&state.rules, rule, reporter);
                }
            }
        }
        debug!(
            rules = state.rules.len(),
            obligations = state.obligations.len(),
            "schema.obligations_resolved"
        );
    }
}

fn check_back_reference(
    rules: &BTreeMap<u64, SchemaRule>,
    rule: &SchemaRule,
    reporter: &ConsistencyReporter<'_>,
) {
    let target = rules.get(&rule.reference);
    let (kind, field, expected) = match rule.kind {
        SchemaRuleKind::ConstraintIndex => {
            if target.and_then(SchemaRule::owned_index) == Some(rule.id) {
                return;
            }
            (
                InconsistencyKind::ConstraintIndexNotReferencingBack,
                "owning_constraint",
                format!("uniqueness constraint owning index {}", rule.id),
            )
        }
        SchemaRuleKind::UniquenessConstraint => {
            if target.and_then(SchemaRule::owning_constraint) == Some(rule.id) {
                return;
            }
            (
                InconsistencyKind::UniquenessConstraintNotReferencingBack,
                "owned_index",
                format!("constraint index owned by {}", rule.id),
            )
        }
        SchemaRuleKind::Index => return,
    };
    let actual = match target {
        Some(target) => format!("{:?} rule {}", target.kind, target.id),
        None => format!("rule {}", Inconsistency::id_text(rule.reference)),
    };
    reporter.report(Inconsistency::new(
        RecordType::Schema,
        rule.id,
        kind,
        field,
        expected,
        actual,
    ));
}

/// Rule pass over one schema-store record.
///
/// Only start records in use carry a rule. A chain that cannot be read was
/// already reported by the chain pass.
pub fn check_rule_record(
    ctx: &CheckContext<'_>,
    registry: &ObligationRegistry,
    record: &DynamicRecord,
) -> Result<()> {
    if !record.in_use || !record.start {
        return Ok(());
    }
    let Some(payload) = read_dynamic_chain(ctx.access, DynamicStore::Schema, record.id)? else {
        return Ok(());
    };
    let rule = match SchemaRule::decode(record.id, &payload) {
        Ok(rule) => rule,
        Err(err) if err.is_decode_failure() => {
            ctx.report(Inconsistency::new(
                RecordType::Schema,
                record.id,
                InconsistencyKind::MalformedSchemaRule,
                "payload",
                "schema rule",
                err,
            ));
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    ctx.check_token_reference(
        RecordType::Schema,
        rule.id,
        "label",
        TokenKind::Label,
        u64::from(rule.label),
    )?;
    ctx.check_token_reference(
        RecordType::Schema,
        rule.id,
        "property_key",
        TokenKind::PropertyKey,
        u64::from(rule.property_key),
    )?;
    registry.register(rule);
    Ok(())
}
