//! Scenario factories the driver chooses from.

use tracing::debug;

use crate::cluster::ClusterManager;
use crate::errors::{CtsError, CtsResult};
use crate::scenario::{FlipTest, RestartTest, Scenario, SimulStart, StandbyTest, StonithTest};

/// Builds one scenario bound to a cluster, paired with its applicability rule.
#[derive(Clone, Copy)]
pub struct ScenarioFactory {
    pub name: &'static str,
    pub build: fn(&ClusterManager) -> Box<dyn Scenario>,
    pub applicable: fn(&ClusterManager) -> bool,
}

impl std::fmt::Debug for ScenarioFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioFactory").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    factories: Vec<ScenarioFactory>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock set. Start and Stop only run as parts of other scenarios.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(ScenarioFactory {
            name: "Flip",
            build: |cm| Box::new(FlipTest::new(cm)),
            applicable: |cm| FlipTest::new(cm).is_applicable(cm),
        });
        registry.register(ScenarioFactory {
            name: "Restart",
            build: |cm| Box::new(RestartTest::new(cm)),
            applicable: |cm| RestartTest::new(cm).is_applicable(cm),
        });
        registry.register(ScenarioFactory {
            name: "Stonith",
            build: |cm| Box::new(StonithTest::new(cm)),
            applicable: |cm| StonithTest::new(cm).is_applicable(cm),
        });
        registry.register(ScenarioFactory {
            name: "SimulStart",
            build: |cm| Box::new(SimulStart::new(cm)),
            applicable: |cm| SimulStart::new(cm).is_applicable(cm),
        });
        registry.register(ScenarioFactory {
            name: "standby",
            build: |cm| Box::new(StandbyTest::new(cm)),
            applicable: |cm| StandbyTest::new(cm).is_applicable(cm),
        });
        registry
    }

    /// Add a factory, replacing any earlier one with the same name.
    pub fn register(&mut self, factory: ScenarioFactory) {
        self.factories.retain(|f| f.name != factory.name);
        self.factories.push(factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name).collect()
    }

    /// Build every scenario applicable to `cm`, in registration order.
    pub fn applicable(&self, cm: &ClusterManager) -> Vec<Box<dyn Scenario>> {
        self.factories
            .iter()
            .filter(|factory| {
                let applicable = (factory.applicable)(cm);
                debug!(scenario = factory.name, applicable, "Checked scenario applicability");
                applicable
            })
            .map(|factory| (factory.build)(cm))
            .collect()
    }

    /// Build one scenario by name (case-insensitive).
    pub fn build(&self, name: &str, cm: &ClusterManager) -> CtsResult<Box<dyn Scenario>> {
        self.factories
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| (f.build)(cm))
            .ok_or_else(|| CtsError::Config(format!("unknown scenario '{name}'")))
    }
}
