//! SQLite-backed [`FactSource`].
//!
//! Grouping and filtering columns are picked from closed per-level mappings;
//! nothing caller-supplied is ever spliced into SQL text.

use async_trait::async_trait;
use brandscope_core::domain::scope::{DateWindow, TerritoryScope};
use brandscope_core::{
    BrandId, BrandRef, FactQuery, FactSource, PosId, PosRef, SourceError, TerritoryLevel,
    TerritoryPath, TerritoryRef, UniverseCount, UniverseQuery, VisitFact, VisitId,
};
use chrono::NaiveDate;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use crate::{DbPool, RepositoryError};

const VISIT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqlFactSource {
    pool: DbPool,
}

impl SqlFactSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn load_facts(&self, query: &FactQuery) -> Result<Vec<VisitFact>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            r#"
            SELECT vi.visit_id, v.pos_id, p.name AS pos_name,
                date(v.visited_at) AS visited_on,
                vi.brand_id, b.name AS brand_name,
                vi.stock_units, vi.presence_counter, vi.sold_units,
                v.country_id, tc.name AS country_name,
                v.province_id, tp.name AS province_name,
                v.area_id, ta.name AS area_name,
                v.sub_area_id, ts.name AS sub_area_name,
                v.commune_id, tm.name AS commune_name
            FROM visit_item vi
            JOIN visit v ON v.id = vi.visit_id
            JOIN pos p ON p.id = v.pos_id
            JOIN brand b ON b.id = vi.brand_id
            JOIN territory tc ON tc.id = v.country_id
            JOIN territory tp ON tp.id = v.province_id
            JOIN territory ta ON ta.id = v.area_id
            JOIN territory ts ON ts.id = v.sub_area_id
            JOIN territory tm ON tm.id = v.commune_id
            WHERE vi.deleted = 0 AND v.deleted = 0
            "#,
        );
        push_scope(&mut builder, &query.territory, visit_column);
        push_window(&mut builder, &query.window);
        if let Some(brand) = query.brand {
            builder.push(" AND vi.brand_id = ").push_bind(brand.0);
        }
        builder.push(" ORDER BY v.visited_at, vi.visit_id, vi.brand_id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_fact).collect()
    }

    async fn load_universe(
        &self,
        query: &UniverseQuery,
    ) -> Result<Vec<UniverseCount>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT t.id, t.name, COUNT(p.id) AS pos_count FROM pos p JOIN territory t ON t.id = ");
        builder.push(pos_column(query.level));
        builder.push(" WHERE p.deleted = 0");
        push_scope(&mut builder, &query.territory, pos_column);
        builder.push(" GROUP BY t.id, t.name ORDER BY t.name, t.id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let pos_count: i64 = row.try_get("pos_count")?;
                Ok(UniverseCount {
                    territory: TerritoryRef::new(
                        row.try_get("id")?,
                        row.try_get::<String, _>("name")?,
                        query.level,
                    ),
                    pos_count: u64::try_from(pos_count).map_err(|_| {
                        RepositoryError::Decode(format!("negative pos count {pos_count}"))
                    })?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FactSource for SqlFactSource {
    async fn visit_facts(&self, query: &FactQuery) -> Result<Vec<VisitFact>, SourceError> {
        let facts = self.load_facts(query).await?;
        debug!(
            event_name = "db.visit_facts.loaded",
            scope = %query.territory,
            window = %query.window,
            rows = facts.len(),
            "loaded visit facts"
        );
        Ok(facts)
    }

    async fn pos_universe(&self, query: &UniverseQuery) -> Result<Vec<UniverseCount>, SourceError> {
        let counts = self.load_universe(query).await?;
        debug!(
            event_name = "db.pos_universe.loaded",
            scope = %query.territory,
            level = %query.level,
            rows = counts.len(),
            "loaded pos universe"
        );
        Ok(counts)
    }
}

impl From<RepositoryError> for SourceError {
    fn from(error: RepositoryError) -> Self {
        SourceError::new(error.to_string())
    }
}

fn visit_column(level: TerritoryLevel) -> &'static str {
    match level {
        TerritoryLevel::Country => "v.country_id",
        TerritoryLevel::Province => "v.province_id",
        TerritoryLevel::Area => "v.area_id",
        TerritoryLevel::SubArea => "v.sub_area_id",
        TerritoryLevel::Commune => "v.commune_id",
    }
}

fn pos_column(level: TerritoryLevel) -> &'static str {
    match level {
        TerritoryLevel::Country => "p.country_id",
        TerritoryLevel::Province => "p.province_id",
        TerritoryLevel::Area => "p.area_id",
        TerritoryLevel::SubArea => "p.sub_area_id",
        TerritoryLevel::Commune => "p.commune_id",
    }
}

fn push_scope(
    builder: &mut QueryBuilder<'_, Sqlite>,
    scope: &TerritoryScope,
    column: fn(TerritoryLevel) -> &'static str,
) {
    for level in TerritoryLevel::ALL {
        if let Some(id) = scope.id_at(level) {
            builder.push(" AND ").push(column(level)).push(" = ").push_bind(id.0);
        }
    }
}

fn push_window(builder: &mut QueryBuilder<'_, Sqlite>, window: &DateWindow) {
    builder
        .push(" AND date(v.visited_at) BETWEEN ")
        .push_bind(window.start.format(VISIT_DATE_FORMAT).to_string())
        .push(" AND ")
        .push_bind(window.end.format(VISIT_DATE_FORMAT).to_string());
}

fn territory(
    row: &SqliteRow,
    level: TerritoryLevel,
    id_column: &str,
    name_column: &str,
) -> Result<TerritoryRef, RepositoryError> {
    Ok(TerritoryRef::new(row.try_get(id_column)?, row.try_get::<String, _>(name_column)?, level))
}

fn decode_fact(row: &SqliteRow) -> Result<VisitFact, RepositoryError> {
    let raw_date: Option<String> = row.try_get("visited_on")?;
    let raw_date =
        raw_date.ok_or_else(|| RepositoryError::Decode("visit without a readable date".into()))?;
    let visited_on = NaiveDate::parse_from_str(&raw_date, VISIT_DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("visit date `{raw_date}`: {error}")))?;

    Ok(VisitFact {
        visit_id: VisitId(row.try_get("visit_id")?),
        pos: PosRef { id: PosId(row.try_get("pos_id")?), name: row.try_get("pos_name")? },
        territory: TerritoryPath {
            country: territory(row, TerritoryLevel::Country, "country_id", "country_name")?,
            province: territory(row, TerritoryLevel::Province, "province_id", "province_name")?,
            area: territory(row, TerritoryLevel::Area, "area_id", "area_name")?,
            sub_area: territory(row, TerritoryLevel::SubArea, "sub_area_id", "sub_area_name")?,
            commune: territory(row, TerritoryLevel::Commune, "commune_id", "commune_name")?,
        },
        brand: BrandRef { id: BrandId(row.try_get("brand_id")?), name: row.try_get("brand_name")? },
        visited_on,
        stock_units: row.try_get("stock_units")?,
        presence_counter: row.try_get("presence_counter")?,
        sold_units: row.try_get("sold_units")?,
    })
}
