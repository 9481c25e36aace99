use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::{article_tags, articles, tags};
use crate::model::user::User;

#[derive(
    Debug,
    Clone,
    PartialEq,
    Queryable,
    Selectable,
    Identifiable,
    Associations,
    AsChangeset,
    Serialize,
)]
#[diesel(table_name = articles)]
#[diesel(belongs_to(User))]
pub struct Article {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(skip_serializing)]
    pub deleted_at: Option<NaiveDateTime>,
    pub title: String,
    pub description: String,
    pub body: String,
    pub user_id: i32,
    pub favorites_count: i32,
}

/// Input for [`crate::store::ArticleStore::create`]. `tag_list` holds plain tag
/// names; the store resolves them to `tags` rows inside the create transaction.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    pub user_id: i32,
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: i32,
    pub name: String,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Queryable,
    Selectable,
    Identifiable,
    Associations,
    Insertable,
)]
#[diesel(table_name = article_tags)]
#[diesel(primary_key(article_id, tag_id))]
#[diesel(belongs_to(Article))]
#[diesel(belongs_to(Tag))]
pub struct ArticleTag {
    pub article_id: i32,
    pub tag_id: i32,
}

/// An article with its associations eager-loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleEntry {
    pub article: Article,
    pub author: User,
    pub tags: Vec<Tag>,
}
