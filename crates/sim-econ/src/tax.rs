//! Tax income: per-capita base rate, land multiplier, and the consumer-goods
//! demand adjustment. Money math runs in `Decimal` and is floored once.

use crate::modifiers::Modifiers;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use sim_core::{Catalog, Constants, Nation, Resource, TickState};
use tracing::debug;

/// Population and land of one province, as seen by the tax model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaxBase {
    pub population: i64,
    pub land: i64,
}

/// Result of assessing one nation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TaxAssessment {
    pub income: i64,
    /// Consumer goods demanded by the whole population.
    pub demand: i64,
    /// Consumer goods to remove from the stockpile.
    pub consumer_goods_consumed: i64,
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// Land multiplier for one province, capped at 1.
pub fn land_multiplier(constants: &Constants, land: i64) -> Decimal {
    let raw = Decimal::from(land - 1) * dec(constants.default_land_tax_multiplier);
    raw.min(Decimal::ONE)
}

/// Assess tax for a nation owning `provinces`. Returns `None` when it owns none.
pub fn assess_tax(
    constants: &Constants,
    tax_factor: f64,
    provinces: &[TaxBase],
    consumer_goods: i64,
) -> Option<TaxAssessment> {
    if provinces.is_empty() {
        return None;
    }
    let base = dec(constants.default_tax_income) * dec(tax_factor);
    let mut income = Decimal::ZERO;
    let mut population: i64 = 0;
    for p in provinces {
        let per_capita = base + base * land_multiplier(constants, p.land);
        income += Decimal::from(p.population.max(0)) * per_capita;
        population = population.saturating_add(p.population.max(0));
    }

    let demand = if population > 0 {
        (population + constants.consumer_goods_per - 1) / constants.consumer_goods_per
    } else {
        0
    };
    let available = consumer_goods.max(0);
    let mut consumed = 0;
    if demand > 0 && available > 0 {
        if available >= demand {
            income *= dec(constants.consumer_goods_tax_multiplier);
            consumed = demand;
        } else {
            let fulfilled = Decimal::from(available) / Decimal::from(demand);
            income *= Decimal::ONE + fulfilled / Decimal::from(2);
            consumed = available;
        }
    }

    let income = income.floor().max(Decimal::ZERO).to_i64().unwrap_or(i64::MAX);
    Some(TaxAssessment {
        income,
        demand,
        consumer_goods_consumed: consumed,
    })
}

/// Assess one nation against the state without mutating anything.
pub fn assess_nation(catalog: &Catalog, state: &TickState, nation: &Nation) -> Option<TaxAssessment> {
    let provinces: Vec<TaxBase> = state
        .provinces_of(nation.id)
        .map(|p| TaxBase {
            population: p.population,
            land: p.land,
        })
        .collect();
    let mods = Modifiers::for_nation(catalog, &nation.policies, &nation.upgrades);
    assess_tax(
        &catalog.constants,
        mods.tax(),
        &provinces,
        nation.resources.get(Resource::ConsumerGoods),
    )
}

/// Totals for one tax pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaxReport {
    pub nations_paid: usize,
    pub total_income: i64,
    pub consumer_goods_consumed: i64,
}

/// Credit tax income to every nation owning at least one province.
pub fn run_tax_income(catalog: &Catalog, state: &mut TickState) -> TaxReport {
    let mut report = TaxReport::default();
    for id in state.owning_nations() {
        let nation = state
            .nations
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Nation::empty(id));
        let Some(assessment) = assess_nation(catalog, state, &nation) else {
            continue;
        };
        let nation = state.nations.entry(id).or_insert(nation);
        nation.money = nation.money.saturating_add(assessment.income);
        nation
            .resources
            .take_up_to(Resource::ConsumerGoods, assessment.consumer_goods_consumed);
        debug!(nation = %id, income = assessment.income, "tax collected");
        report.nations_paid += 1;
        report.total_income = report.total_income.saturating_add(assessment.income);
        report.consumer_goods_consumed += assessment.consumer_goods_consumed;
    }
    report
}
