//! In-process [`FactSource`] used by tests and the demo server.

use async_trait::async_trait;
use brandscope_core::{
    FactQuery, FactSource, PosId, SourceError, TerritoryPath, UniverseCount, UniverseQuery,
    VisitFact,
};
use tokio::sync::RwLock;

use crate::fixtures::DemoDataset;

#[derive(Clone, Debug)]
struct RegisteredPos {
    id: PosId,
    territory: TerritoryPath,
    deleted: bool,
}

#[derive(Default)]
pub struct InMemoryFactSource {
    facts: RwLock<Vec<VisitFact>>,
    outlets: RwLock<Vec<RegisteredPos>>,
    failure: RwLock<Option<String>>,
}

impl InMemoryFactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds the live facts and outlets of `dataset`.
    pub fn from_dataset(dataset: &DemoDataset) -> Self {
        let outlets = dataset
            .registered_outlets()
            .into_iter()
            .map(|(id, territory, deleted)| RegisteredPos { id, territory, deleted })
            .collect();
        Self {
            facts: RwLock::new(dataset.facts()),
            outlets: RwLock::new(outlets),
            failure: RwLock::new(None),
        }
    }

    pub async fn insert_fact(&self, fact: VisitFact) {
        self.facts.write().await.push(fact);
    }

    pub async fn register_pos(&self, id: PosId, territory: TerritoryPath) {
        let mut outlets = self.outlets.write().await;
        outlets.retain(|outlet| outlet.id != id);
        outlets.push(RegisteredPos { id, territory, deleted: false });
    }

    pub async fn retire_pos(&self, id: PosId) {
        for outlet in self.outlets.write().await.iter_mut().filter(|outlet| outlet.id == id) {
            outlet.deleted = true;
        }
    }

    /// Every later call fails with `message` until cleared with `None`.
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    async fn check_failure(&self) -> Result<(), SourceError> {
        match self.failure.read().await.as_deref() {
            Some(message) => Err(SourceError::new(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FactSource for InMemoryFactSource {
    async fn visit_facts(&self, query: &FactQuery) -> Result<Vec<VisitFact>, SourceError> {
        self.check_failure().await?;
        let facts = self.facts.read().await;
        let mut matching: Vec<VisitFact> = facts
            .iter()
            .filter(|fact| query.territory.matches(&fact.territory))
            .filter(|fact| query.window.contains(fact.visited_on))
            .filter(|fact| query.brand.map_or(true, |brand| brand == fact.brand.id))
            .cloned()
            .collect();
        matching.sort_by_key(|fact| (fact.visited_on, fact.visit_id, fact.brand.id));
        Ok(matching)
    }

    async fn pos_universe(&self, query: &UniverseQuery) -> Result<Vec<UniverseCount>, SourceError> {
        self.check_failure().await?;
        let outlets = self.outlets.read().await;
        let mut counts: Vec<UniverseCount> = Vec::new();
        for outlet in outlets.iter().filter(|outlet| !outlet.deleted) {
            if !query.territory.matches(&outlet.territory) {
                continue;
            }
            let territory = outlet.territory.at(query.level);
            match counts.iter_mut().find(|count| count.territory.id == territory.id) {
                Some(count) => count.pos_count += 1,
                None => counts.push(UniverseCount { territory: territory.clone(), pos_count: 1 }),
            }
        }
        counts.sort_by(|a, b| {
            a.territory.name.cmp(&b.territory.name).then_with(|| a.territory.id.cmp(&b.territory.id))
        });
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use brandscope_core::domain::scope::{DateWindow, TerritoryScope};
    use brandscope_core::{FactQuery, FactSource, PosId, TerritoryId, TerritoryLevel, UniverseQuery};
    use chrono::NaiveDate;

    use super::InMemoryFactSource;
    use crate::fixtures::DemoDataset;

    fn first_quarter() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2024, 3, 31).expect("date"),
        )
        .expect("window")
    }

    #[tokio::test]
    async fn universe_ignores_retired_outlets() {
        let source = InMemoryFactSource::from_dataset(&DemoDataset::generate());
        let mut territory = TerritoryScope::country(DemoDataset::COUNTRY_ID);
        territory.commune = Some(TerritoryId(1111));
        let query = UniverseQuery { territory, level: TerritoryLevel::Commune };

        let before = source.pos_universe(&query).await.expect("universe");
        assert_eq!(before[0].pos_count, 4);

        source.retire_pos(PosId(11114)).await;
        let after = source.pos_universe(&query).await.expect("universe");
        assert_eq!(after[0].pos_count, 3);
    }

    #[tokio::test]
    async fn failure_switch_applies_to_both_queries() {
        let source = InMemoryFactSource::from_dataset(&DemoDataset::generate());
        source.set_failure(Some("store offline")).await;

        let query = FactQuery {
            territory: TerritoryScope::country(DemoDataset::COUNTRY_ID),
            window: first_quarter(),
            brand: None,
        };
        let error = source.visit_facts(&query).await.expect_err("failing source");
        assert_eq!(error.message, "store offline");

        source.set_failure(None).await;
        let facts = source.visit_facts(&query).await.expect("recovered source");
        assert_eq!(facts.len(), DemoDataset::generate().facts().len());
    }
}
