//! SQLite-backed persistence for rooms and their members.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::protocol::User;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: i64,
    pub slug: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub room_id: i64,
    pub nickname: String,
    pub is_vacation: bool,
    pub has_won: bool,
}

impl From<MemberRow> for User {
    fn from(m: MemberRow) -> Self {
        User {
            id: m.id.to_string(),
            name: m.nickname,
            is_vacation: m.is_vacation,
            has_won: m.has_won,
        }
    }
}

/// Repository for room and member persistence.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database at `url` (creating the file if missing) and apply
    /// embedded migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database url '{url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to sqlite")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations")?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Single connection: every pooled
    /// connection to `:memory:` would otherwise see its own empty database.
    pub async fn memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .context("opening in-memory sqlite")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations")?;
        Ok(Self { pool })
    }

    pub async fn create_room(&self, slug: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO rooms (slug) VALUES (?)")
            .bind(slug)
            .execute(&self.pool)
            .await
            .context("inserting room")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_room(&self, slug: &str) -> Result<Option<RoomRow>> {
        let room = sqlx::query_as::<_, RoomRow>("SELECT id, slug FROM rooms WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("fetching room")?;
        Ok(room)
    }

    /// Members of a room, in insertion order.
    pub async fn members(&self, room_id: i64) -> Result<Vec<MemberRow>> {
        let members = sqlx::query_as::<_, MemberRow>(
            "SELECT id, room_id, nickname, is_vacation, has_won FROM members WHERE room_id = ? ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .context("fetching members")?;
        Ok(members)
    }

    pub async fn insert_member(&self, room_id: i64, nickname: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO members (room_id, nickname) VALUES (?, ?)")
            .bind(room_id)
            .bind(nickname)
            .execute(&self.pool)
            .await
            .context("inserting member")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_vacation(&self, member_id: i64, is_vacation: bool) -> Result<()> {
        sqlx::query("UPDATE members SET is_vacation = ? WHERE id = ?")
            .bind(is_vacation)
            .bind(member_id)
            .execute(&self.pool)
            .await
            .context("updating vacation flag")?;
        Ok(())
    }

    pub async fn set_won(&self, member_id: i64, has_won: bool) -> Result<()> {
        sqlx::query("UPDATE members SET has_won = ? WHERE id = ?")
            .bind(has_won)
            .bind(member_id)
            .execute(&self.pool)
            .await
            .context("updating won flag")?;
        Ok(())
    }

    pub async fn delete_member(&self, member_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .context("deleting member")?;
        Ok(())
    }

    /// Clear every win flag in a room (lottery cycle reset).
    pub async fn reset_wins(&self, room_id: i64) -> Result<()> {
        sqlx::query("UPDATE members SET has_won = FALSE WHERE room_id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .context("resetting win flags")?;
        Ok(())
    }
}
