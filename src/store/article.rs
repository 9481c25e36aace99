use chrono::{NaiveDateTime, Utc};
use diesel::dsl::{exists, AsSelect};
use diesel::helper_types::{InnerJoin, IntoBoxed, Select};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::{insert_into, select};
use log::debug;

use crate::db::schema::{article_tags, articles, comments, favorite_articles, tags, users};
use crate::db::{DbConnection, Pool};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    Article, ArticleEntry, ArticleTag, Comment, CommentEntry, NewArticle, NewComment, Tag, User,
};

/// Persistence for articles, comments, tags and the favorites relation.
///
/// Methods are synchronous and safe to call concurrently from many threads;
/// all shared state lives in the database behind the pool.
#[derive(Clone)]
pub struct ArticleStore {
    pool: Pool,
}

#[derive(Insertable)]
#[diesel(table_name = articles)]
struct ArticleRow<'a> {
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    title: &'a str,
    description: &'a str,
    body: &'a str,
    user_id: i32,
    favorites_count: i32,
}

impl ArticleStore {
    pub fn new(pool: Pool) -> ArticleStore {
        ArticleStore { pool }
    }

    fn conn(&self) -> StoreResult<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Inserts the article and links its tags as one transaction. Tag rows are
    /// created on first use and reused afterwards.
    pub fn create(&self, draft: &NewArticle) -> StoreResult<Article> {
        if draft.user_id == 0 {
            return Err(StoreError::InvalidArgument("article author is required"));
        }
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        conn.transaction::<_, StoreError, _>(|conn| {
            let article = insert_into(articles::table)
                .values(&ArticleRow {
                    created_at: now,
                    updated_at: now,
                    title: &draft.title,
                    description: &draft.description,
                    body: &draft.body,
                    user_id: draft.user_id,
                    favorites_count: 0,
                })
                .returning(Article::as_returning())
                .get_result(conn)?;
            link_tags(conn, article.id, &draft.tag_list)?;
            Ok(article)
        })
    }

    /// Full-row update by primary key. Returns `NotFound` when the article does
    /// not exist (or is soft-deleted).
    pub fn update(&self, article: &Article) -> StoreResult<Article> {
        if article.id == 0 {
            return Err(StoreError::InvalidArgument("article is not persisted"));
        }
        let mut conn = self.conn()?;
        let mut row = article.clone();
        row.updated_at = Utc::now().naive_utc();
        let updated = diesel::update(
            articles::table
                .find(row.id)
                .filter(articles::deleted_at.is_null()),
        )
        .set(&row)
        .returning(Article::as_returning())
        .get_result(&mut conn)?;
        Ok(updated)
    }

    /// Soft-deletes the article. Deleting an article that is already gone is
    /// not an error.
    pub fn delete(&self, article: &Article) -> StoreResult<()> {
        if article.id == 0 {
            return Err(StoreError::InvalidArgument("article is not persisted"));
        }
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let affected = diesel::update(
            articles::table
                .find(article.id)
                .filter(articles::deleted_at.is_null()),
        )
        .set(articles::deleted_at.eq(now))
        .execute(&mut conn)?;
        if affected == 0 {
            debug!("delete: article {} already absent", article.id);
        }
        Ok(())
    }

    /// Records that `user` favorited `article`: inserts the favorite edge and
    /// increments `favorites_count` in the same transaction. The increment is
    /// a relative update evaluated by the database, so concurrent favorites on
    /// the same article cannot lose counts. The new count is written back to
    /// the `article` argument on success.
    pub fn add_favorite(&self, article: &mut Article, user: &User) -> StoreResult<()> {
        if article.id == 0 {
            return Err(StoreError::InvalidArgument("article is not persisted"));
        }
        if user.id == 0 {
            return Err(StoreError::InvalidArgument("user is not persisted"));
        }
        let mut conn = self.conn()?;
        let article_id = article.id;
        let user_id = user.id;
        let count = conn.transaction::<_, StoreError, _>(|conn| {
            insert_into(favorite_articles::table)
                .values((
                    favorite_articles::article_id.eq(article_id),
                    favorite_articles::user_id.eq(user_id),
                ))
                .execute(conn)?;
            let count = diesel::update(articles::table.find(article_id))
                .set(articles::favorites_count.eq(articles::favorites_count + 1))
                .returning(articles::favorites_count)
                .get_result::<i32>(conn)?;
            Ok(count)
        })?;
        debug!("article {} favorited by {}, count {}", article_id, user_id, count);
        article.favorites_count = count;
        Ok(())
    }

    /// Removes the favorite edge and decrements the counter transactionally.
    /// The counter only moves when an edge row was actually deleted, so the
    /// count stays equal to the number of edges even for spurious unfavorites.
    pub fn delete_favorite(&self, article: &mut Article, user: &User) -> StoreResult<()> {
        if article.id == 0 {
            return Err(StoreError::InvalidArgument("article is not persisted"));
        }
        if user.id == 0 {
            return Err(StoreError::InvalidArgument("user is not persisted"));
        }
        let mut conn = self.conn()?;
        let article_id = article.id;
        let user_id = user.id;
        let current = article.favorites_count;
        let count = conn.transaction::<_, StoreError, _>(|conn| {
            let deleted = diesel::delete(
                favorite_articles::table
                    .filter(favorite_articles::article_id.eq(article_id))
                    .filter(favorite_articles::user_id.eq(user_id)),
            )
            .execute(conn)?;
            if deleted == 0 {
                return Ok(current);
            }
            let count = diesel::update(articles::table.find(article_id))
                .set(articles::favorites_count.eq(articles::favorites_count - 1))
                .returning(articles::favorites_count)
                .get_result::<i32>(conn)?;
            Ok(count)
        })?;
        article.favorites_count = count;
        Ok(())
    }

    /// Whether `user` has favorited `article`. Unsaved arguments mean "no
    /// relationship", not an error, and never hit the database.
    pub fn is_favorited(&self, article: &Article, user: &User) -> StoreResult<bool> {
        if article.id == 0 || user.id == 0 {
            return Ok(false);
        }
        let mut conn = self.conn()?;
        let favorited = select(exists(
            favorite_articles::table
                .filter(favorite_articles::article_id.eq(article.id))
                .filter(favorite_articles::user_id.eq(user.id)),
        ))
        .get_result::<bool>(&mut conn)?;
        Ok(favorited)
    }

    /// Fetches one article with author and tags eager-loaded.
    pub fn get_by_id(&self, id: i32) -> StoreResult<ArticleEntry> {
        let mut conn = self.conn()?;
        let (article, author) = articles::table
            .inner_join(users::table)
            .filter(articles::id.eq(id))
            .filter(articles::deleted_at.is_null())
            .select((Article::as_select(), User::as_select()))
            .first::<(Article, User)>(&mut conn)?;
        let article_tags = ArticleTag::belonging_to(&article)
            .inner_join(tags::table)
            .select(Tag::as_select())
            .load::<Tag>(&mut conn)?;
        Ok(ArticleEntry {
            article,
            author,
            tags: article_tags,
        })
    }

    /// Filtered, paginated article listing, most recent first. Filters are
    /// exact matches; callers pass at most one, and passing several narrows
    /// the result to their conjunction. Tag and favorited-by filters resolve
    /// article ids first, then the main listing applies predicate and
    /// pagination before tags are hydrated.
    pub fn get_articles(
        &self,
        tag: Option<&str>,
        author: Option<&str>,
        favorited_by: Option<&User>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ArticleEntry>> {
        let mut conn = self.conn()?;
        let mut listing = ArticleQuery::new(limit, offset);

        if let Some(name) = tag {
            let ids = article_tags::table
                .inner_join(tags::table)
                .filter(tags::name.eq(name))
                .select(article_tags::article_id)
                .load::<i32>(&mut conn)?;
            listing.restrict_to(ids);
        }
        if let Some(user) = favorited_by {
            let ids = favorite_articles::table
                .filter(favorite_articles::user_id.eq(user.id))
                .select(favorite_articles::article_id)
                .load::<i32>(&mut conn)?;
            listing.restrict_to(ids);
        }
        listing.author_name = author.map(str::to_owned);

        listing.load(&mut conn)
    }

    /// The social feed: articles whose author is in `user_ids`. An empty id
    /// set short-circuits to an empty listing without a query.
    pub fn get_feed_articles(
        &self,
        user_ids: &[i32],
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ArticleEntry>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let mut listing = ArticleQuery::new(limit, offset);
        listing.author_ids = Some(user_ids.to_vec());
        listing.load(&mut conn)
    }

    /// Comments on an article, oldest first, authors eager-loaded.
    pub fn get_comments(&self, article: &Article) -> StoreResult<Vec<CommentEntry>> {
        let mut conn = self.conn()?;
        let rows = comments::table
            .inner_join(users::table)
            .filter(comments::article_id.eq(article.id))
            .order(comments::id.asc())
            .select((Comment::as_select(), User::as_select()))
            .load::<(Comment, User)>(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|(comment, author)| CommentEntry { comment, author })
            .collect())
    }

    pub fn create_comment(&self, draft: &NewComment) -> StoreResult<Comment> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let comment = insert_into(comments::table)
            .values((
                draft,
                comments::created_at.eq(now),
                comments::updated_at.eq(now),
            ))
            .returning(Comment::as_returning())
            .get_result(&mut conn)?;
        Ok(comment)
    }

    pub fn get_comment_by_id(&self, id: i32) -> StoreResult<Comment> {
        let mut conn = self.conn()?;
        let comment = comments::table
            .find(id)
            .select(Comment::as_select())
            .first(&mut conn)?;
        Ok(comment)
    }

    /// Deletes a comment by primary key; deleting a missing comment succeeds.
    pub fn delete_comment(&self, comment: &Comment) -> StoreResult<()> {
        if comment.id == 0 {
            return Err(StoreError::InvalidArgument("comment is not persisted"));
        }
        let mut conn = self.conn()?;
        diesel::delete(comments::table.find(comment.id)).execute(&mut conn)?;
        Ok(())
    }

    /// The full tag reference table.
    pub fn get_tags(&self) -> StoreResult<Vec<Tag>> {
        let mut conn = self.conn()?;
        let all = tags::table
            .order(tags::id.asc())
            .select(Tag::as_select())
            .load(&mut conn)?;
        Ok(all)
    }
}

fn link_tags(conn: &mut PgConnection, article_id: i32, names: &[String]) -> StoreResult<()> {
    for name in names {
        insert_into(tags::table)
            .values(tags::name.eq(name))
            .on_conflict(tags::name)
            .do_nothing()
            .execute(conn)?;
        let tag_id = tags::table
            .filter(tags::name.eq(name))
            .select(tags::id)
            .first::<i32>(conn)?;
        insert_into(article_tags::table)
            .values(&ArticleTag { article_id, tag_id })
            .on_conflict((article_tags::article_id, article_tags::tag_id))
            .do_nothing()
            .execute(conn)?;
    }
    Ok(())
}

type ArticleListing = IntoBoxed<
    'static,
    Select<InnerJoin<articles::table, users::table>, (AsSelect<Article, Pg>, AsSelect<User, Pg>)>,
    Pg,
>;

/// One parameterized listing over `articles INNER JOIN users`: soft-delete
/// predicate, optional filters, recency order and pagination, followed by a
/// keyed tag fetch grouped back onto the page in memory.
struct ArticleQuery {
    author_name: Option<String>,
    article_ids: Option<Vec<i32>>,
    author_ids: Option<Vec<i32>>,
    limit: i64,
    offset: i64,
}

impl ArticleQuery {
    fn new(limit: i64, offset: i64) -> ArticleQuery {
        ArticleQuery {
            author_name: None,
            article_ids: None,
            author_ids: None,
            limit,
            offset,
        }
    }

    // Intersects with any id restriction already present.
    fn restrict_to(&mut self, ids: Vec<i32>) {
        self.article_ids = Some(match self.article_ids.take() {
            None => ids,
            Some(old) => old.into_iter().filter(|id| ids.contains(id)).collect(),
        });
    }

    fn query(&self) -> ArticleListing {
        let mut query = articles::table
            .inner_join(users::table)
            .select((Article::as_select(), User::as_select()))
            .into_boxed()
            .filter(articles::deleted_at.is_null())
            .order(articles::id.desc())
            .limit(self.limit)
            .offset(self.offset);
        if let Some(name) = &self.author_name {
            query = query.filter(users::username.eq(name.clone()));
        }
        if let Some(ids) = &self.article_ids {
            query = query.filter(articles::id.eq_any(ids.clone()));
        }
        if let Some(ids) = &self.author_ids {
            query = query.filter(articles::user_id.eq_any(ids.clone()));
        }
        query
    }

    fn load(self, conn: &mut PgConnection) -> StoreResult<Vec<ArticleEntry>> {
        let rows = self.query().load::<(Article, User)>(conn)?;
        let (page, authors): (Vec<Article>, Vec<User>) = rows.into_iter().unzip();
        let tag_rows = ArticleTag::belonging_to(&page)
            .inner_join(tags::table)
            .select((ArticleTag::as_select(), Tag::as_select()))
            .load::<(ArticleTag, Tag)>(conn)?;
        Ok(zip_tags(page, authors, tag_rows))
    }
}

fn zip_tags(
    page: Vec<Article>,
    authors: Vec<User>,
    tag_rows: Vec<(ArticleTag, Tag)>,
) -> Vec<ArticleEntry> {
    let grouped = tag_rows.grouped_by(&page);
    page.into_iter()
        .zip(authors)
        .zip(grouped)
        .map(|((article, author), tag_rows)| ArticleEntry {
            article,
            author,
            tags: tag_rows.into_iter().map(|(_, tag)| tag).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::debug_query;
    use diesel::r2d2::ConnectionManager;

    // A pool that never connects; guard paths must return before touching it.
    fn dead_pool() -> Pool {
        let manager =
            ConnectionManager::<PgConnection>::new("postgres://localhost:1/unreachable");
        Pool::builder()
            .max_size(1)
            .min_idle(Some(0))
            .build_unchecked(manager)
    }

    fn article(id: i32) -> Article {
        let now = Utc::now().naive_utc();
        Article {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            title: format!("article-{id}"),
            description: String::new(),
            body: String::new(),
            user_id: 1,
            favorites_count: 0,
        }
    }

    fn user(id: i32) -> User {
        let now = Utc::now().naive_utc();
        User {
            id,
            created_at: now,
            updated_at: now,
            username: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
            password: String::new(),
            bio: String::new(),
            image: String::new(),
        }
    }

    #[test]
    fn add_favorite_rejects_unsaved_arguments() {
        let store = ArticleStore::new(dead_pool());

        let err = store.add_favorite(&mut article(0), &user(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = store.add_favorite(&mut article(1), &user(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn delete_favorite_rejects_unsaved_arguments() {
        let store = ArticleStore::new(dead_pool());
        let err = store.delete_favorite(&mut article(0), &user(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn is_favorited_treats_unsaved_arguments_as_no_relationship() {
        let store = ArticleStore::new(dead_pool());
        assert!(!store.is_favorited(&article(0), &user(1)).unwrap());
        assert!(!store.is_favorited(&article(1), &user(0)).unwrap());
    }

    #[test]
    fn empty_feed_is_empty_not_an_error() {
        let store = ArticleStore::new(dead_pool());
        let feed = store.get_feed_articles(&[], 20, 0).unwrap();
        assert!(feed.is_empty());
    }

    #[test]
    fn delete_rejects_unsaved_article() {
        let store = ArticleStore::new(dead_pool());
        let err = store.delete(&article(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn delete_comment_rejects_unsaved_comment() {
        let store = ArticleStore::new(dead_pool());
        let now = Utc::now().naive_utc();
        let comment = Comment {
            id: 0,
            created_at: now,
            updated_at: now,
            body: String::new(),
            user_id: 1,
            article_id: 1,
        };
        let err = store.delete_comment(&comment).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn favorite_counter_update_is_relative() {
        let increment = diesel::update(articles::table.find(7))
            .set(articles::favorites_count.eq(articles::favorites_count + 1));
        let sql = debug_query::<Pg, _>(&increment).to_string();
        assert!(sql.contains("\"favorites_count\" + "), "{sql}");

        let decrement = diesel::update(articles::table.find(7))
            .set(articles::favorites_count.eq(articles::favorites_count - 1));
        let sql = debug_query::<Pg, _>(&decrement).to_string();
        assert!(sql.contains("\"favorites_count\" - "), "{sql}");
    }

    #[test]
    fn listing_query_orders_and_paginates() {
        let mut listing = ArticleQuery::new(20, 40);
        listing.author_name = Some("jake".into());
        listing.restrict_to(vec![1, 2, 3]);

        let sql = debug_query::<Pg, _>(&listing.query()).to_string();
        assert!(sql.contains("INNER JOIN \"users\""), "{sql}");
        assert!(sql.contains("\"deleted_at\" IS NULL"), "{sql}");
        assert!(sql.contains("ORDER BY \"articles\".\"id\" DESC"), "{sql}");
        assert!(sql.contains("LIMIT"), "{sql}");
        assert!(sql.contains("OFFSET"), "{sql}");
        assert!(sql.contains("\"username\""), "{sql}");
    }

    #[test]
    fn id_restrictions_intersect() {
        let mut listing = ArticleQuery::new(20, 0);
        listing.restrict_to(vec![1, 2, 3]);
        listing.restrict_to(vec![2, 3, 4]);
        assert_eq!(listing.article_ids, Some(vec![2, 3]));
    }

    #[test]
    fn zip_tags_groups_by_article() {
        let page = vec![article(1), article(2)];
        let authors = vec![user(10), user(11)];
        let tag_rows = vec![
            (
                ArticleTag {
                    article_id: 1,
                    tag_id: 5,
                },
                Tag {
                    id: 5,
                    name: "rust".into(),
                },
            ),
            (
                ArticleTag {
                    article_id: 1,
                    tag_id: 6,
                },
                Tag {
                    id: 6,
                    name: "databases".into(),
                },
            ),
        ];

        let entries = zip_tags(page, authors, tag_rows);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].article.id, 1);
        assert_eq!(entries[0].author.id, 10);
        let mut names: Vec<_> = entries[0].tags.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["databases", "rust"]);
        assert!(entries[1].tags.is_empty());
    }
}
