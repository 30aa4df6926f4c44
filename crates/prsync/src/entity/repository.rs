//! Repository entity - one row per remote repository, carrying its sync cursor.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Remote repository ID.
    #[sea_orm(unique)]
    pub external_id: i64,

    // ─── Naming ──────────────────────────────────────────────────────────────
    /// Owning organization login.
    pub organization: String,
    pub name: String,
    pub full_name: String,

    // ─── Content ─────────────────────────────────────────────────────────────
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    pub is_archived: bool,

    // ─── Cursor ──────────────────────────────────────────────────────────────
    /// Remote "updated" timestamp as of the last complete sync.
    ///
    /// Written together with `last_synced_at`, never on its own.
    pub updated_at: Option<DateTimeWithTimeZone>,
    /// When every pull request of this repository was last fully processed.
    pub last_synced_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pull_request::Entity")]
    PullRequests,
}

impl Related<super::pull_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PullRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this repository completed at least one sync.
    pub fn is_cursored(&self) -> bool {
        self.last_synced_at.is_some()
    }
}
