//! Read-only games and odds queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::candidates::status::SCHEDULED_STATUSES;
use crate::candidates::{OddsQuery, OddsRepository, TimeWindow};
use crate::models::{Game, MarketType, OddsRow, Sport};

#[derive(Debug, Clone, sqlx::FromRow)]
struct GameRecord {
    game_id: String,
    sport: String,
    home_team: String,
    away_team: String,
    commence_time: DateTime<Utc>,
    status: String,
    venue_indoor: Option<bool>,
    home_rest_days: Option<i32>,
    away_rest_days: Option<i32>,
}

impl GameRecord {
    fn into_game(self) -> Option<Game> {
        let Some(sport) = Sport::from_key(&self.sport) else {
            debug!("Skipping game {} with unknown sport {}", self.game_id, self.sport);
            return None;
        };
        Some(Game {
            game_id: self.game_id,
            sport,
            home_team: self.home_team,
            away_team: self.away_team,
            commence_time: self.commence_time,
            status: self.status,
            venue_indoor: self.venue_indoor,
            home_rest_days: self.home_rest_days,
            away_rest_days: self.away_rest_days,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct OddsRecord {
    game_id: String,
    market_type: String,
    bookmaker: String,
    outcome: String,
    point: Option<f64>,
    american_odds: i32,
    description: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<OddsRecord> for OddsRow {
    fn from(r: OddsRecord) -> Self {
        Self {
            game_id: r.game_id,
            market_type: MarketType::from_key(&r.market_type),
            bookmaker: r.bookmaker,
            outcome: r.outcome,
            point: r.point,
            american_odds: r.american_odds,
            participant: r.description,
            updated_at: r.updated_at,
        }
    }
}

pub struct PgOddsRepository {
    pool: PgPool,
}

impl PgOddsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OddsRepository for PgOddsRepository {
    async fn fetch_games(&self, window: &TimeWindow, sport: Option<Sport>) -> Result<Vec<Game>> {
        let statuses: Vec<String> = SCHEDULED_STATUSES.iter().map(|s| s.to_string()).collect();

        let records = sqlx::query_as::<_, GameRecord>(
            r#"
            SELECT game_id, sport, home_team, away_team, commence_time, status,
                   venue_indoor, home_rest_days, away_rest_days
            FROM games
            WHERE commence_time >= $1
              AND commence_time < $2
              AND ($3::text IS NULL
                   OR sport = $3
                   OR ($3 = 'soccer' AND sport LIKE 'soccer\_%'))
              AND regexp_replace(
                    translate(lower(status), '- ', '__'), '^status_', ''
                  ) = ANY($4)
            ORDER BY commence_time, game_id
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .bind(sport.map(|s| s.provider_key()))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch games")?;

        Ok(records.into_iter().filter_map(GameRecord::into_game).collect())
    }

    async fn fetch_odds(&self, query: &OddsQuery) -> Result<Vec<OddsRow>> {
        if query.game_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Latest price per (game, market, book, player, outcome, line)
        let records = sqlx::query_as::<_, OddsRecord>(
            r#"
            SELECT DISTINCT ON (game_id, market_type, bookmaker, description, outcome, point)
                   game_id, market_type, bookmaker, outcome, point,
                   american_odds, description, updated_at
            FROM odds
            WHERE game_id = ANY($1)
              AND (cardinality($2::text[]) = 0 OR bookmaker = ANY($2))
              AND ($3 OR market_type NOT LIKE 'player\_%')
            ORDER BY game_id, market_type, bookmaker, description, outcome, point, updated_at DESC
            LIMIT $4
            "#,
        )
        .bind(&query.game_ids)
        .bind(&query.bookmakers)
        .bind(query.include_player_props)
        .bind(query.max_rows as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch odds")?;

        debug!(
            "Fetched {} odds rows for {} games",
            records.len(),
            query.game_ids.len()
        );
        Ok(records.into_iter().map(OddsRow::from).collect())
    }
}
