use crate::domain::advice::{Action, Advice, BudgetSummary, RecommendedAction};
use crate::domain::contract::{ProviderPayload, RawResponse};
use crate::domain::portfolio::{held_shares, Holding, QuoteBook, StockCategory};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Everything the normalizer needs besides the raw answer.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub provider_name: &'a str,
    pub as_of: NaiveDate,
    pub user_capacity_ntd: f64,
    /// Advisory. Lower decisions are provider discretion and only logged.
    pub min_investment_ntd: f64,
    pub holdings: &'a [Holding],
    pub quotes: &'a QuoteBook,
}

/// Turns one provider answer into a validated [`Advice`]. Never fails: invariant
/// violations are corrected in place and logged.
pub fn normalize(raw: &RawResponse, ctx: &NormalizeContext<'_>) -> Advice {
    match raw {
        RawResponse::Parsed(payload) => normalize_payload(payload, ctx),
        RawResponse::Degraded { reason, .. } => degraded_advice(reason, ctx),
    }
}

fn degraded_advice(reason: &str, ctx: &NormalizeContext<'_>) -> Advice {
    tracing::warn!(
        provider = %ctx.provider_name,
        reason = %reason,
        "provider answer unparsable; returning empty advice"
    );
    Advice {
        provider_name: ctx.provider_name.to_string(),
        generated_at: ctx.as_of,
        market_outlook: format!("AI response could not be parsed ({reason})"),
        managed_actions: Vec::new(),
        new_suggestions: Vec::new(),
        budget: BudgetSummary::zero(ctx.user_capacity_ntd),
        parse_failure: Some(reason.to_string()),
    }
}

fn normalize_payload(payload: &ProviderPayload, ctx: &NormalizeContext<'_>) -> Advice {
    // Shares still sellable per symbol; repeated SELLs for one symbol share the holding.
    let mut sellable: HashMap<&str, u64> = HashMap::new();
    let mut managed_actions = Vec::with_capacity(payload.managed_recommendations.len());
    for rec in &payload.managed_recommendations {
        if rec.symbol.is_empty() {
            continue;
        }
        let action = Action::parse(&rec.action).unwrap_or_else(|| {
            tracing::warn!(
                provider = %ctx.provider_name,
                symbol = %rec.symbol,
                action = %rec.action,
                "unknown action coerced to HOLD"
            );
            Action::Hold
        });
        let remaining = sellable
            .entry(rec.symbol.as_str())
            .or_insert_with(|| held_shares(ctx.holdings, &rec.symbol));
        let recommended = managed_action(
            &rec.symbol,
            action,
            rec.shares,
            &rec.reasoning,
            *remaining,
            ctx,
        );
        if recommended.action == Action::Sell {
            *remaining -= recommended.shares;
        }
        managed_actions.push(recommended);
    }

    let mut new_suggestions = Vec::new();
    for suggestion in &payload.new_stock_suggestions {
        if suggestion.symbol.is_empty() {
            continue;
        }
        if held_shares(ctx.holdings, &suggestion.symbol) > 0 {
            tracing::warn!(
                provider = %ctx.provider_name,
                symbol = %suggestion.symbol,
                "new suggestion is already held; dropped"
            );
            continue;
        }
        let shares = whole_shares(suggestion.shares);
        if shares == 0 {
            tracing::debug!(
                provider = %ctx.provider_name,
                symbol = %suggestion.symbol,
                "new suggestion with zero shares skipped"
            );
            continue;
        }
        new_suggestions.push(priced_action(
            &suggestion.symbol,
            Action::Buy,
            shares,
            &suggestion.reasoning,
            0,
            ctx,
        ));
    }

    let requested = payload
        .budget_summary
        .as_ref()
        .map(|b| b.decided_optimal_investment_ntd)
        .unwrap_or(0.0);
    let decided = clamp_decided(requested, ctx);
    let budget = summarize(decided, ctx.user_capacity_ntd, &managed_actions, &new_suggestions);

    Advice {
        provider_name: ctx.provider_name.to_string(),
        generated_at: ctx.as_of,
        market_outlook: payload.market_outlook.clone(),
        managed_actions,
        new_suggestions,
        budget,
        parse_failure: None,
    }
}

fn managed_action(
    symbol: &str,
    action: Action,
    requested_shares: f64,
    reasoning: &str,
    sellable: u64,
    ctx: &NormalizeContext<'_>,
) -> RecommendedAction {
    let held = held_shares(ctx.holdings, symbol);
    let mut shares = whole_shares(requested_shares);
    let mut action = action;

    if action == Action::Sell && shares > sellable {
        tracing::warn!(
            provider = %ctx.provider_name,
            symbol = %symbol,
            requested = shares,
            held,
            sellable,
            "oversell clamped to held shares"
        );
        shares = sellable;
    }
    if action == Action::Sell && shares == 0 {
        action = Action::Hold;
    }

    priced_action(symbol, action, shares, reasoning, held, ctx)
}

fn priced_action(
    symbol: &str,
    action: Action,
    shares: u64,
    reasoning: &str,
    current_holding_shares: u64,
    ctx: &NormalizeContext<'_>,
) -> RecommendedAction {
    let (name, category, price) = match ctx.quotes.get(symbol) {
        Some(quote) => (
            quote.name.clone(),
            quote.category,
            non_negative(quote.current_price),
        ),
        None => (symbol.to_string(), StockCategory::Unknown, 0.0),
    };
    let shares = if action == Action::Hold { 0 } else { shares };

    RecommendedAction {
        symbol: symbol.to_string(),
        name,
        category,
        current_price: price,
        action,
        shares,
        reasoning: reasoning.to_string(),
        allocated_amount: shares as f64 * price,
        current_holding_shares,
    }
}

fn clamp_decided(requested: f64, ctx: &NormalizeContext<'_>) -> f64 {
    let capacity = non_negative(ctx.user_capacity_ntd);
    let requested = if requested.is_finite() { requested } else { 0.0 };
    let decided = requested.clamp(0.0, capacity);
    if decided != requested {
        tracing::warn!(
            provider = %ctx.provider_name,
            requested,
            capacity,
            decided,
            "decided investment clamped into capacity"
        );
    } else if decided < ctx.min_investment_ntd {
        tracing::info!(
            provider = %ctx.provider_name,
            decided,
            minimum = ctx.min_investment_ntd,
            "decided investment below nominal minimum; kept as provider discretion"
        );
    }
    decided
}

fn summarize(
    decided: f64,
    user_capacity_ntd: f64,
    managed: &[RecommendedAction],
    suggestions: &[RecommendedAction],
) -> BudgetSummary {
    let mut total_buy_ntd = 0.0;
    let mut total_sell_ntd = 0.0;
    for action in managed.iter().chain(suggestions) {
        match action.action {
            Action::Buy => total_buy_ntd += action.allocated_amount,
            Action::Sell => total_sell_ntd += action.allocated_amount,
            Action::Hold => {}
        }
    }
    let net_investment_ntd = total_buy_ntd - total_sell_ntd;
    BudgetSummary {
        user_capacity_ntd,
        decided_investment_ntd: decided,
        total_buy_ntd,
        total_sell_ntd,
        net_investment_ntd,
        remaining_unallocated_ntd: decided - net_investment_ntd,
    }
}

fn whole_shares(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        raw.floor() as u64
    } else {
        0
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
