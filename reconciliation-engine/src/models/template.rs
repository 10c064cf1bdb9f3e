//! Reconcile-model templates used to quick-create propositions.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{NameGet, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountType {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TemplateAmount {
    Fixed(Decimal),
    /// Share of the line's balance, in percent.
    Percentage(Decimal),
}

impl TemplateAmount {
    fn new(amount_type: AmountType, amount: Decimal) -> Self {
        match amount_type {
            AmountType::Fixed => Self::Fixed(amount),
            AmountType::Percentage => Self::Percentage(amount),
        }
    }

    pub fn percent(&self) -> Option<Decimal> {
        match self {
            Self::Percentage(p) => Some(*p),
            Self::Fixed(_) => None,
        }
    }
}

/// Template record as served by the backend. Analytic tags arrive as bare
/// ids and the second line only overrides what it declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileModel {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_id: Option<NameGet>,
    pub amount_type: AmountType,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub tax_ids: Vec<NameGet>,
    #[serde(default)]
    pub force_tax_included: bool,
    #[serde(default)]
    pub analytic_account_id: Option<NameGet>,
    #[serde(default)]
    pub analytic_tag_ids: Vec<RecordId>,
    #[serde(default)]
    pub journal_id: Option<NameGet>,
    #[serde(default)]
    pub to_check: bool,
    #[serde(default)]
    pub has_second_line: bool,
    #[serde(default)]
    pub second_account_id: Option<NameGet>,
    #[serde(default)]
    pub second_amount_type: Option<AmountType>,
    #[serde(default)]
    pub second_amount: Option<Decimal>,
    #[serde(default)]
    pub second_label: Option<String>,
    #[serde(default)]
    pub second_tax_ids: Option<Vec<NameGet>>,
    #[serde(default)]
    pub second_force_tax_included: Option<bool>,
    #[serde(default)]
    pub second_analytic_account_id: Option<NameGet>,
    #[serde(default)]
    pub second_analytic_tag_ids: Option<Vec<RecordId>>,
    #[serde(default)]
    pub second_journal_id: Option<NameGet>,
}

impl ReconcileModel {
    /// Every analytic tag id referenced by either line.
    pub fn analytic_tag_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.analytic_tag_ids
            .iter()
            .chain(self.second_analytic_tag_ids.iter().flatten())
            .copied()
    }

    /// Resolve tag names and expand the second line's fallbacks.
    pub fn into_template(self, tags: &HashMap<RecordId, NameGet>) -> ReconcileTemplate {
        let resolve = |ids: &[RecordId]| -> Vec<NameGet> {
            ids.iter()
                .map(|id| tags.get(id).cloned().unwrap_or_else(|| NameGet::new(*id, "")))
                .collect()
        };

        let primary = TemplateLine {
            account_id: self.account_id.clone(),
            amount: TemplateAmount::new(self.amount_type, self.amount),
            label: self.label.clone(),
            tax_ids: self.tax_ids.clone(),
            force_tax_included: self.force_tax_included,
            analytic_account_id: self.analytic_account_id.clone(),
            analytic_tag_ids: resolve(&self.analytic_tag_ids),
            journal_id: self.journal_id.clone(),
            to_check: self.to_check,
        };

        let second = self.has_second_line.then(|| TemplateLine {
            account_id: self.second_account_id.or_else(|| primary.account_id.clone()),
            amount: TemplateAmount::new(
                self.second_amount_type.unwrap_or(self.amount_type),
                self.second_amount.unwrap_or(self.amount),
            ),
            label: self.second_label.unwrap_or_else(|| primary.label.clone()),
            tax_ids: self.second_tax_ids.unwrap_or_else(|| primary.tax_ids.clone()),
            force_tax_included: self
                .second_force_tax_included
                .unwrap_or(primary.force_tax_included),
            analytic_account_id: self
                .second_analytic_account_id
                .or_else(|| primary.analytic_account_id.clone()),
            analytic_tag_ids: match &self.second_analytic_tag_ids {
                Some(ids) => resolve(ids),
                None => primary.analytic_tag_ids.clone(),
            },
            journal_id: self.second_journal_id.or_else(|| primary.journal_id.clone()),
            to_check: primary.to_check,
        });

        ReconcileTemplate {
            id: self.id,
            name: self.name,
            primary,
            second,
        }
    }
}

/// Field set used to instantiate one proposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLine {
    pub account_id: Option<NameGet>,
    pub amount: TemplateAmount,
    pub label: String,
    pub tax_ids: Vec<NameGet>,
    pub force_tax_included: bool,
    pub analytic_account_id: Option<NameGet>,
    pub analytic_tag_ids: Vec<NameGet>,
    pub journal_id: Option<NameGet>,
    pub to_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileTemplate {
    pub id: RecordId,
    pub name: String,
    pub primary: TemplateLine,
    pub second: Option<TemplateLine>,
}
