use std::collections::HashMap;

use brandscope_core::{
    BrandRef, PosId, PosRef, TerritoryLevel, TerritoryPath, TerritoryRef, VisitFact, VisitId,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::connection::DbPool;
use crate::RepositoryError;

/// Territory tree of the demo country, parents listed before children.
const TERRITORIES: &[(i64, &str, TerritoryLevel, Option<i64>)] = &[
    (1, "RDC", TerritoryLevel::Country, None),
    (10, "Kinshasa", TerritoryLevel::Province, Some(1)),
    (20, "Kongo Central", TerritoryLevel::Province, Some(1)),
    (11, "Funa", TerritoryLevel::Area, Some(10)),
    (12, "Lukunga", TerritoryLevel::Area, Some(10)),
    (21, "Matadi", TerritoryLevel::Area, Some(20)),
    (111, "Funa Centre", TerritoryLevel::SubArea, Some(11)),
    (121, "Lukunga Ouest", TerritoryLevel::SubArea, Some(12)),
    (211, "Matadi Ville", TerritoryLevel::SubArea, Some(21)),
    (1111, "Limete", TerritoryLevel::Commune, Some(111)),
    (1112, "Kalamu", TerritoryLevel::Commune, Some(111)),
    (1211, "Gombe", TerritoryLevel::Commune, Some(121)),
    (2111, "Mvuzi", TerritoryLevel::Commune, Some(211)),
];

const COMMUNE_IDS: &[i64] = &[1111, 1112, 1211, 2111];

/// Outlets per commune; the last one is registered but never visited.
const OUTLETS_PER_COMMUNE: i64 = 4;

const VISITED_MONTHS: &[u32] = &[1, 2, 3];

const SEED_YEAR: i32 = 2024;

/// Deterministic catalog plus three months of visits.
///
/// The dataset carries one soft-deleted outlet, one soft-deleted visit and
/// one soft-deleted visit item so readers can be checked for exclusion.
#[derive(Clone, Debug)]
pub struct DemoDataset {
    pub outlets: Vec<SeedOutlet>,
    pub visits: Vec<SeedVisit>,
    pub items: Vec<SeedItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeedOutlet {
    pub id: i64,
    pub name: String,
    pub commune_id: i64,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeedVisit {
    pub id: i64,
    pub pos_id: i64,
    pub commune_id: i64,
    pub visited_on: NaiveDate,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeedItem {
    pub id: i64,
    pub visit_id: i64,
    pub brand_id: i64,
    pub stock_units: f64,
    pub presence_counter: i64,
    pub sold_units: f64,
    pub deleted: bool,
}

impl DemoDataset {
    pub const COUNTRY_ID: i64 = 1;
    pub const KINSHASA_ID: i64 = 10;
    pub const BRANDS: &'static [(i64, &'static str)] =
        &[(1, "Aurora"), (2, "Baraka"), (3, "Cobalt"), (4, "Delta")];
    pub const DELETED_POS_ID: i64 = 21115;
    pub const DELETED_VISIT_ID: i64 = 900;
    /// `(visit_id, brand_id)` of the soft-deleted item.
    pub const DELETED_ITEM: (i64, i64) = (1, 4);

    pub fn generate() -> Self {
        let mut outlets = Vec::new();
        for commune_id in COMMUNE_IDS {
            let commune = territory_name(*commune_id);
            for slot in 1..=OUTLETS_PER_COMMUNE {
                outlets.push(SeedOutlet {
                    id: commune_id * 10 + slot,
                    name: format!("{commune} Shop {slot}"),
                    commune_id: *commune_id,
                    deleted: false,
                });
            }
        }
        outlets.push(SeedOutlet {
            id: Self::DELETED_POS_ID,
            name: "Mvuzi Shop 5".to_string(),
            commune_id: 2111,
            deleted: true,
        });

        let mut visits = Vec::new();
        let mut items = Vec::new();
        let mut next_visit = 1;
        for month in VISITED_MONTHS {
            for (commune_index, commune_id) in COMMUNE_IDS.iter().enumerate() {
                for slot in 1..OUTLETS_PER_COMMUNE {
                    let day = 3 + 2 * (slot as u32 - 1) + commune_index as u32;
                    let visit = SeedVisit {
                        id: next_visit,
                        pos_id: commune_id * 10 + slot,
                        commune_id: *commune_id,
                        visited_on: calendar_day(*month, day),
                        deleted: false,
                    };
                    items.extend(Self::items_for(visit.id));
                    visits.push(visit);
                    next_visit += 1;
                }
            }
        }

        visits.push(SeedVisit {
            id: Self::DELETED_VISIT_ID,
            pos_id: 11111,
            commune_id: 1111,
            visited_on: calendar_day(3, 20),
            deleted: true,
        });
        items.push(SeedItem {
            id: Self::DELETED_VISIT_ID * 10 + 1,
            visit_id: Self::DELETED_VISIT_ID,
            brand_id: 1,
            stock_units: 500.0,
            presence_counter: 1,
            sold_units: 500.0,
            deleted: false,
        });

        Self { outlets, visits, items }
    }

    /// Brand lines of one visit. A brand whose seed is 9 was not recorded.
    fn items_for(visit_id: i64) -> Vec<SeedItem> {
        Self::BRANDS
            .iter()
            .filter_map(|(brand_id, _)| {
                let seed = (visit_id * 7 + brand_id * 13 + visit_id * brand_id) % 10;
                let deleted = (visit_id, *brand_id) == Self::DELETED_ITEM;
                if seed == 9 && !deleted {
                    return None;
                }
                let presence_counter = seed % 3;
                let present = presence_counter > 0;
                Some(SeedItem {
                    id: visit_id * 10 + brand_id,
                    visit_id,
                    brand_id: *brand_id,
                    stock_units: if present { (seed + 1) as f64 * 2.0 } else { 0.0 },
                    presence_counter,
                    sold_units: if present { (seed % 5) as f64 * 1.5 } else { 0.0 },
                    deleted,
                })
            })
            .collect()
    }

    pub fn registered_pos_count() -> u64 {
        COMMUNE_IDS.len() as u64 * OUTLETS_PER_COMMUNE as u64
    }

    /// Visit facts a reader must return: live visits and live items only.
    pub fn facts(&self) -> Vec<VisitFact> {
        let live_visits: HashMap<i64, &SeedVisit> =
            self.visits.iter().filter(|visit| !visit.deleted).map(|visit| (visit.id, visit)).collect();
        let outlet_names: HashMap<i64, &str> =
            self.outlets.iter().map(|outlet| (outlet.id, outlet.name.as_str())).collect();

        self.items
            .iter()
            .filter(|item| !item.deleted)
            .filter_map(|item| {
                let visit = live_visits.get(&item.visit_id)?;
                let brand = Self::BRANDS.iter().find(|(id, _)| *id == item.brand_id)?;
                Some(VisitFact {
                    visit_id: VisitId(visit.id),
                    pos: PosRef {
                        id: PosId(visit.pos_id),
                        name: outlet_names.get(&visit.pos_id).copied().unwrap_or_default().to_string(),
                    },
                    territory: territory_path(visit.commune_id)?,
                    brand: BrandRef::new(brand.0, brand.1),
                    visited_on: visit.visited_on,
                    stock_units: item.stock_units,
                    presence_counter: item.presence_counter,
                    sold_units: item.sold_units,
                })
            })
            .collect()
    }

    /// Every outlet with its territory path and soft-delete flag.
    pub fn registered_outlets(&self) -> Vec<(PosId, TerritoryPath, bool)> {
        self.outlets
            .iter()
            .filter_map(|outlet| {
                Some((PosId(outlet.id), territory_path(outlet.commune_id)?, outlet.deleted))
            })
            .collect()
    }

    /// Load the demo dataset. Loading twice leaves the same rows behind.
    pub async fn load(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
        let dataset = Self::generate();
        let mut tx = pool.begin().await?;

        for (id, name, level, parent_id) in TERRITORIES {
            sqlx::query(
                "INSERT INTO territory (id, name, level, parent_id, deleted) VALUES (?, ?, ?, ?, 0)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, level = excluded.level,
                     parent_id = excluded.parent_id, deleted = 0",
            )
            .bind(id)
            .bind(name)
            .bind(level.as_str())
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
        }

        for (id, name) in Self::BRANDS {
            sqlx::query(
                "INSERT INTO brand (id, name, country_id, deleted) VALUES (?, ?, ?, 0)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, deleted = 0",
            )
            .bind(id)
            .bind(name)
            .bind(Self::COUNTRY_ID)
            .execute(&mut *tx)
            .await?;
        }

        for outlet in &dataset.outlets {
            let path = commune_chain(outlet.commune_id)?;
            sqlx::query(
                "INSERT INTO pos (id, name, pos_type, country_id, province_id, area_id, sub_area_id, commune_id, deleted)
                 VALUES (?, ?, 'shop', ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, deleted = excluded.deleted",
            )
            .bind(outlet.id)
            .bind(&outlet.name)
            .bind(path[0])
            .bind(path[1])
            .bind(path[2])
            .bind(path[3])
            .bind(path[4])
            .bind(outlet.deleted)
            .execute(&mut *tx)
            .await?;
        }

        for visit in &dataset.visits {
            let path = commune_chain(visit.commune_id)?;
            sqlx::query(
                "INSERT INTO visit (id, pos_id, country_id, province_id, area_id, sub_area_id, commune_id, agent_id, visited_at, price, deleted)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 'demo-agent', ?, NULL, ?)
                 ON CONFLICT(id) DO UPDATE SET visited_at = excluded.visited_at, deleted = excluded.deleted",
            )
            .bind(visit.id)
            .bind(visit.pos_id)
            .bind(path[0])
            .bind(path[1])
            .bind(path[2])
            .bind(path[3])
            .bind(path[4])
            .bind(format!("{} 09:30:00", visit.visited_on.format("%Y-%m-%d")))
            .bind(visit.deleted)
            .execute(&mut *tx)
            .await?;
        }

        for item in &dataset.items {
            sqlx::query(
                "INSERT INTO visit_item (id, visit_id, brand_id, stock_units, presence_counter, sold_units, deleted)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET stock_units = excluded.stock_units,
                     presence_counter = excluded.presence_counter,
                     sold_units = excluded.sold_units, deleted = excluded.deleted",
            )
            .bind(item.id)
            .bind(item.visit_id)
            .bind(item.brand_id)
            .bind(item.stock_units)
            .bind(item.presence_counter)
            .bind(item.sold_units)
            .bind(item.deleted)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(dataset.summary())
    }

    fn summary(&self) -> SeedSummary {
        SeedSummary {
            territories: TERRITORIES.len(),
            brands: Self::BRANDS.len(),
            outlets: self.outlets.len(),
            visits: self.visits.len(),
            visit_items: self.items.len(),
        }
    }

    /// Check row counts against the generated dataset.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let expected = Self::generate().summary();
        let mut checks = Vec::new();
        for (table, wanted) in [
            ("territory", expected.territories),
            ("brand", expected.brands),
            ("pos", expected.outlets),
            ("visit", expected.visits),
            ("visit_item", expected.visit_items),
        ] {
            // table names come from the fixed list above
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(pool)
                .await?;
            checks.push((table, count == wanted as i64));
        }

        let deleted_visit: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM visit WHERE id = ? AND deleted = 1)")
                .bind(Self::DELETED_VISIT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("deleted-visit", deleted_visit == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove every demo row, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for statement in [
            "DELETE FROM visit_item",
            "DELETE FROM visit",
            "DELETE FROM pos",
            "DELETE FROM brand",
            "DELETE FROM territory WHERE level = 'commune'",
            "DELETE FROM territory WHERE level = 'sub_area'",
            "DELETE FROM territory WHERE level = 'area'",
            "DELETE FROM territory WHERE level = 'province'",
            "DELETE FROM territory",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn calendar_day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(SEED_YEAR, month, day).unwrap_or_default()
}

fn territory_row(id: i64) -> Option<&'static (i64, &'static str, TerritoryLevel, Option<i64>)> {
    TERRITORIES.iter().find(|row| row.0 == id)
}

fn territory_name(id: i64) -> &'static str {
    territory_row(id).map(|row| row.1).unwrap_or("Unknown")
}

/// Country-to-commune ids of `commune_id`.
fn commune_chain(commune_id: i64) -> Result<[i64; 5], RepositoryError> {
    let mut chain = [0; 5];
    let mut cursor = Some(commune_id);
    for slot in (0..5).rev() {
        let row = cursor
            .and_then(territory_row)
            .ok_or_else(|| RepositoryError::Decode(format!("broken territory chain at {commune_id}")))?;
        chain[slot] = row.0;
        cursor = row.3;
    }
    Ok(chain)
}

fn territory_path(commune_id: i64) -> Option<TerritoryPath> {
    let chain = commune_chain(commune_id).ok()?;
    let node = |index: usize| {
        territory_row(chain[index]).map(|row| TerritoryRef::new(row.0, row.1, row.2))
    };
    Some(TerritoryPath {
        country: node(0)?,
        province: node(1)?,
        area: node(2)?,
        sub_area: node(3)?,
        commune: node(4)?,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub territories: usize,
    pub brands: usize,
    pub outlets: usize,
    pub visits: usize,
    pub visit_items: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
