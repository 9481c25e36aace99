use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::comments;
use crate::model::article::Article;
use crate::model::user::User;

#[derive(
    Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Serialize,
)]
#[diesel(table_name = comments)]
#[diesel(belongs_to(Article))]
#[diesel(belongs_to(User))]
pub struct Comment {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub body: String,
    pub user_id: i32,
    pub article_id: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub body: String,
    pub user_id: i32,
    pub article_id: i32,
}

/// A comment with its author eager-loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentEntry {
    pub comment: Comment,
    pub author: User,
}
