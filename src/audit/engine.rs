//! The per-domain engine façade: owns the rule file path, builds the rule
//! book, and resolves ancestry before handing evaluation to the book.

use std::path::{Path, PathBuf};

use crate::audit::book::{AuditRule, RuleBook};
use crate::audit::errors::AuditError;
use crate::audit::loader;
use crate::audit::rules::{RuleDocument, Violation};
use crate::resource::{ancestry_chain, AncestryProvider, Resource};

pub struct RulesEngine<R: AuditRule> {
    rules_path: PathBuf,
    rule_book: Option<RuleBook<R>>,
}

impl<R: AuditRule> RulesEngine<R>
where
    R::Body: serde::de::DeserializeOwned + Default,
{
    pub fn new(rules_path: impl Into<PathBuf>) -> Self {
        Self {
            rules_path: rules_path.into(),
            rule_book: None,
        }
    }

    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }

    /// Load the rule document and build the rule book. Any schema error
    /// aborts the build; a failed engine holds no rule book at all.
    pub fn build_rule_book(&mut self) -> Result<(), AuditError> {
        let document: RuleDocument<R::Body> = loader::read_and_parse_file(&self.rules_path)?;
        let book = RuleBook::from_defs(&document.rules)?;
        tracing::info!(
            path = %self.rules_path.display(),
            rules = document.rules.len(),
            entries = book.entry_count(),
            "Built rule book"
        );
        self.rule_book = Some(book);
        Ok(())
    }

    /// Merge another rule document into the already-built book. Rule
    /// indexes restart per document; rules stay distinct by
    /// `(rule_name, rule_index)`.
    pub fn add_rules_from(&mut self, path: &Path) -> Result<(), AuditError> {
        let document: RuleDocument<R::Body> = loader::read_and_parse_file(path)?;
        let book = self
            .rule_book
            .as_ref()
            .ok_or_else(|| AuditError::RuleParse("rule book has not been built".to_string()))?;
        book.add_rules(&document.rules)
    }

    /// Evaluate `policies` for `resource` against every applicable rule.
    ///
    /// Ancestry comes from the resource's own parent links when they are
    /// materialized, otherwise from `ancestry`.
    pub fn find_violations(
        &self,
        resource: &Resource,
        policies: &[R::Policy],
        ancestry: &dyn AncestryProvider,
    ) -> Result<Vec<Violation>, AuditError> {
        let book = self
            .rule_book
            .as_ref()
            .ok_or_else(|| AuditError::RuleParse("rule book has not been built".to_string()))?;
        let chain = ancestry_chain(resource, ancestry)?;
        Ok(book.find_violations(resource, &chain, policies))
    }
}
