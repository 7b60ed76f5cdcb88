//! The advice ledger: a human-readable markdown document with one section per
//! `(date, provider)`, most recent first.
//!
//! The document is parsed into a list of sections, edited as a list, and rendered back.
//! Text before the first section is kept verbatim. Sections whose heading does not parse are
//! kept as-is and never pruned.

use crate::domain::advice::{Advice, RecommendedAction};
use chrono::NaiveDate;
use serde::Serialize;

const HEADING_PREFIX: &str = "## ";
const HEADING_DATE_FORMAT: &str = "%Y-%m-%d";
// Dates written by older versions of the ledger.
const LEGACY_DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryKey {
    pub date: NaiveDate,
    pub provider: String,
}

impl EntryKey {
    pub fn new(date: NaiveDate, provider: impl Into<String>) -> Self {
        Self {
            date,
            provider: single_line(&provider.into()),
        }
    }

    pub fn heading(&self) -> String {
        format!(
            "{HEADING_PREFIX}{} - {}",
            self.date.format(HEADING_DATE_FORMAT),
            self.provider
        )
    }

    pub fn parse_heading(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(HEADING_PREFIX)?;
        let (date_part, provider) = rest.split_once(" - ")?;
        let date_token = date_part.split_whitespace().next()?;
        let date = NaiveDate::parse_from_str(date_token, HEADING_DATE_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(date_token, LEGACY_DATE_FORMAT))
            .ok()?;
        let provider = provider.trim();
        if provider.is_empty() {
            return None;
        }
        Some(Self {
            date,
            provider: provider.to_string(),
        })
    }
}

/// A ledger record derived from actionable advice.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    key: EntryKey,
    body: String,
}

impl LedgerEntry {
    /// `None` when the advice has no BUY/SELL and no new suggestion.
    pub fn from_advice(advice: &Advice) -> Option<Self> {
        if !advice.is_actionable() {
            return None;
        }
        Some(Self {
            key: EntryKey::new(advice.generated_at, &advice.provider_name),
            body: render_body(advice),
        })
    }

    pub fn key(&self) -> &EntryKey {
        &self.key
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSection {
    pub heading: String,
    pub key: Option<EntryKey>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    preamble: String,
    sections: Vec<LedgerSection>,
}

impl Ledger {
    pub fn parse(text: &str) -> Self {
        let mut ledger = Ledger::default();
        let mut current: Option<LedgerSection> = None;

        for line in text.split_inclusive('\n') {
            let bare = line.trim_end_matches(['\n', '\r']);
            if bare.starts_with(HEADING_PREFIX) {
                if let Some(section) = current.take() {
                    ledger.sections.push(section);
                }
                current = Some(LedgerSection {
                    heading: bare.to_string(),
                    key: EntryKey::parse_heading(bare),
                    body: String::new(),
                });
                continue;
            }
            match current.as_mut() {
                Some(section) => section.body.push_str(line),
                None => ledger.preamble.push_str(line),
            }
        }
        if let Some(section) = current {
            ledger.sections.push(section);
        }

        ledger
    }

    pub fn render(&self) -> String {
        let mut out = self.preamble.clone();
        for section in &self.sections {
            // Hand-edited text may lack a final newline; a heading must start its own line.
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&section.heading);
            out.push('\n');
            out.push_str(&section.body);
        }
        out
    }

    pub fn sections(&self) -> &[LedgerSection] {
        &self.sections
    }

    pub fn get(&self, key: &EntryKey) -> Option<&LedgerSection> {
        self.sections.iter().find(|s| s.key.as_ref() == Some(key))
    }

    /// Replaces the section with the same key in place, otherwise inserts at the front.
    /// Extra sections with the same key (from hand edits) are dropped.
    pub fn upsert(&mut self, entry: LedgerEntry) -> UpsertOutcome {
        let section = LedgerSection {
            heading: entry.key.heading(),
            key: Some(entry.key.clone()),
            body: entry.body,
        };

        let mut positions = self
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.key.as_ref() == Some(&entry.key))
            .map(|(idx, _)| idx);

        match positions.next() {
            Some(first) => {
                let extras: Vec<usize> = positions.collect();
                self.sections[first] = section;
                for idx in extras.into_iter().rev() {
                    self.sections.remove(idx);
                }
                UpsertOutcome::Replaced
            }
            None => {
                self.sections.insert(0, section);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Drops dated sections strictly before `cutoff`. Returns how many were removed.
    pub fn prune_before(&mut self, cutoff: NaiveDate) -> usize {
        let before = self.sections.len();
        self.sections
            .retain(|s| s.key.as_ref().map_or(true, |k| k.date >= cutoff));
        before - self.sections.len()
    }
}

fn render_body(advice: &Advice) -> String {
    let budget = &advice.budget;
    let mut out = String::from("\n### Market Outlook\n");
    for line in advice.market_outlook.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str(">\n");
        } else {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }

    out.push_str("\n### Budget Summary\n");
    out.push_str(&format!(
        "- Decided investment: NT$ {} (capacity NT$ {})\n",
        format_ntd(budget.decided_investment_ntd),
        format_ntd(budget.user_capacity_ntd)
    ));
    out.push_str(&format!("- Total buys: NT$ {}\n", format_ntd(budget.total_buy_ntd)));
    out.push_str(&format!("- Total sells: NT$ {}\n", format_ntd(budget.total_sell_ntd)));
    out.push_str(&format!(
        "- Net investment: NT$ {}\n",
        format_ntd(budget.net_investment_ntd)
    ));
    out.push_str(&format!(
        "- Remaining unallocated: NT$ {}\n",
        format_ntd(budget.remaining_unallocated_ntd)
    ));
    out.push_str(&format!(
        "- Total allocated: NT$ {}\n\n",
        format_ntd(advice.total_allocated_ntd())
    ));

    let trades: Vec<&RecommendedAction> = advice.trade_actions().collect();
    if !trades.is_empty() {
        out.push_str("### Holdings Actions\n");
        for action in trades {
            push_action(&mut out, action);
        }
    }

    if !advice.new_suggestions.is_empty() {
        out.push_str("### New Suggestions\n");
        for action in &advice.new_suggestions {
            push_action(&mut out, action);
        }
    }

    out.push_str("---\n\n");
    out
}

fn push_action(out: &mut String, action: &RecommendedAction) {
    out.push_str(&format!(
        "- **{} ({})**: {} {} shares\n",
        single_line(&action.symbol),
        single_line(&action.name),
        action.action,
        action.shares
    ));
    out.push_str(&format!("  - Price: NT$ {:.2}\n", action.current_price));
    out.push_str(&format!(
        "  - Amount: NT$ {}\n",
        format_ntd(action.allocated_amount)
    ));
    out.push_str(&format!(
        "  - Reasoning: {}\n\n",
        single_line(&action.reasoning)
    ));
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole NTD with thousands separators.
pub fn format_ntd(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
