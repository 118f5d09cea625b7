//! Document entity - one stored record of a mirrored repository.
//!
//! Every collection of every repository shares this table. A row is named by
//! `(collection, doc_key)` and tagged with the repository it belongs to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stored JSON document.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// Collection name (`projects`, `stats`, `issues`, `commits`, ...).
    #[sea_orm(primary_key, auto_increment = false)]
    pub collection: String,

    /// Key within the collection.
    ///
    /// The entity's `id` or `sha`, except contributors, whose key is prefixed
    /// with the repository tag because contributor ids repeat across
    /// repositories.
    #[sea_orm(primary_key, auto_increment = false)]
    pub doc_key: String,

    /// Owning repository in `owner_repo` form.
    pub repo_name: String,

    /// The entity as fetched from the API.
    #[sea_orm(column_type = "Json")]
    pub body: serde_json::Value,

    /// When this document's body last changed.
    pub fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
