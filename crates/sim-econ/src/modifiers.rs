//! Stacks a nation's active policies and purchased upgrades into the factors
//! the production, tax, and population models consume.

use sim_core::{
    BuildingKind, Catalog, Category, PolicySet, PolicySpec, ProvinceField, UpgradeSet,
    UpgradeSpec,
};
use tracing::warn;

/// Policy and upgrade modifiers resolved against the catalog for one nation.
///
/// Multipliers from several sources compose by product, additive bonuses by
/// sum. Codes or names the catalog does not know are logged and ignored.
#[derive(Clone, Debug, Default)]
pub struct Modifiers<'a> {
    policies: Vec<&'a PolicySpec>,
    upgrades: Vec<&'a UpgradeSpec>,
}

impl<'a> Modifiers<'a> {
    pub fn for_nation(catalog: &'a Catalog, policies: &PolicySet, upgrades: &UpgradeSet) -> Self {
        let policies = policies
            .iter()
            .filter_map(|code| {
                let spec = catalog.policy(code);
                if spec.is_none() {
                    warn!(%code, "ignoring unknown policy code");
                }
                spec
            })
            .collect();
        let upgrades = upgrades
            .iter()
            .filter_map(|name| {
                let spec = catalog.upgrade(name);
                if spec.is_none() {
                    warn!(upgrade = name, "ignoring unknown upgrade");
                }
                spec
            })
            .collect();
        Self { policies, upgrades }
    }

    /// Money upkeep multiplier for one building kind.
    pub fn upkeep(&self, kind: BuildingKind, category: Option<Category>) -> f64 {
        let from_policies = self
            .policies
            .iter()
            .flat_map(|p| p.upkeep.iter())
            .filter(|f| f.target.matches(kind, category))
            .map(|f| f.factor);
        let from_upgrades = self
            .upgrades
            .iter()
            .flat_map(|u| u.upkeep.iter())
            .filter(|f| f.target.matches(kind, category))
            .map(|f| f.factor);
        from_policies.chain(from_upgrades).product()
    }

    /// Input consumption multiplier.
    pub fn input(&self, kind: BuildingKind, category: Option<Category>) -> f64 {
        self.upgrades
            .iter()
            .flat_map(|u| u.input.iter())
            .filter(|f| f.target.matches(kind, category))
            .map(|f| f.factor)
            .product()
    }

    /// Added to the output multiplier.
    pub fn output_bonus(&self, kind: BuildingKind, category: Option<Category>) -> f64 {
        self.upgrades
            .iter()
            .flat_map(|u| u.output.iter())
            .filter(|b| b.target.matches(kind, category))
            .map(|b| b.amount)
            .sum()
    }

    /// Extra energy per producing building.
    pub fn energy_bonus(&self, kind: BuildingKind, category: Option<Category>) -> f64 {
        self.upgrades
            .iter()
            .flat_map(|u| u.energy.iter())
            .filter(|b| b.target.matches(kind, category))
            .map(|b| b.amount)
            .sum()
    }

    /// Multiplier for a percentage effect. Policies scale both directions;
    /// upgrades only scale effects the building adds.
    pub fn effect(
        &self,
        kind: BuildingKind,
        category: Option<Category>,
        field: ProvinceField,
        added: bool,
    ) -> f64 {
        let policy: f64 = self
            .policies
            .iter()
            .flat_map(|p| p.effect.iter())
            .filter(|f| f.target.matches(kind, category))
            .map(|f| f.factor)
            .product();
        if !added {
            return policy;
        }
        let upgrade: f64 = self
            .upgrades
            .iter()
            .flat_map(|u| u.effect.iter())
            .filter(|f| f.field == field && f.target.matches(kind, category))
            .map(|f| f.factor)
            .product();
        policy * upgrade
    }

    pub fn tax(&self) -> f64 {
        self.policies.iter().map(|p| p.tax).product()
    }

    pub fn productivity(&self) -> f64 {
        self.policies.iter().map(|p| p.productivity).product()
    }

    pub fn happiness(&self) -> f64 {
        self.policies.iter().map(|p| p.happiness).product()
    }

    pub fn population_growth(&self) -> f64 {
        self.policies.iter().map(|p| p.population_growth).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::PolicyCode;

    fn catalog() -> Catalog {
        Catalog::standard().unwrap()
    }

    #[test]
    fn no_policies_or_upgrades_is_neutral() {
        let catalog = catalog();
        let mods = Modifiers::for_nation(&catalog, &PolicySet::default(), &UpgradeSet::default());
        let kind = BuildingKind::Universities;
        assert_eq!(mods.upkeep(kind, Some(Category::PublicWorks)), 1.0);
        assert_eq!(mods.tax(), 1.0);
        assert_eq!(mods.output_bonus(kind, None), 0.0);
    }

    #[test]
    fn policy_upkeep_factors_multiply() {
        let catalog = catalog();
        let policies: PolicySet = [PolicyCode(1), PolicyCode(3)].into_iter().collect();
        let mods = Modifiers::for_nation(&catalog, &policies, &UpgradeSet::default());
        let factor = mods.upkeep(BuildingKind::Universities, Some(Category::PublicWorks));
        assert!((factor - 1.14 * 1.18).abs() < 1e-9);
        assert_eq!(mods.upkeep(BuildingKind::Farms, Some(Category::Agriculture)), 1.0);
    }

    #[test]
    fn unknown_codes_and_names_are_ignored() {
        let catalog = catalog();
        let policies: PolicySet = [PolicyCode(200)].into_iter().collect();
        let upgrades: UpgradeSet = ["no_such_upgrade"].into_iter().collect();
        let mods = Modifiers::for_nation(&catalog, &policies, &upgrades);
        assert_eq!(mods.tax(), 1.0);
        assert_eq!(mods.productivity(), 1.0);
    }

    #[test]
    fn upgrade_effects_only_scale_added_fields() {
        let catalog = catalog();
        let upgrades: UpgradeSet = ["national_health_institution"].into_iter().collect();
        let mods = Modifiers::for_nation(&catalog, &PolicySet::default(), &upgrades);
        let kind = BuildingKind::Hospitals;
        let cat = catalog.building(kind).and_then(|b| b.category);
        assert!((mods.effect(kind, cat, ProvinceField::Happiness, true) - 1.3).abs() < 1e-9);
        assert_eq!(mods.effect(kind, cat, ProvinceField::Happiness, false), 1.0);
        assert_eq!(mods.effect(kind, cat, ProvinceField::Pollution, true), 1.0);
    }
}
