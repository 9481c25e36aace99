use chrono::Utc;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{insert_into, select};
use log::debug;

use crate::db::schema::{follows, users};
use crate::db::{DbConnection, Pool};
use crate::error::{StoreError, StoreResult};
use crate::model::{NewUser, User};

/// Persistence for users and the follow graph.
#[derive(Clone)]
pub struct UserStore {
    pool: Pool,
}

impl UserStore {
    pub fn new(pool: Pool) -> UserStore {
        UserStore { pool }
    }

    fn conn(&self) -> StoreResult<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Inserts a user. Duplicate usernames or emails surface the database's
    /// uniqueness violation.
    pub fn create(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let user = insert_into(users::table)
            .values((
                new_user,
                users::created_at.eq(now),
                users::updated_at.eq(now),
            ))
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        Ok(user)
    }

    pub fn get_by_id(&self, id: i32) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let user = users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)?;
        Ok(user)
    }

    pub fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let user = users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)?;
        Ok(user)
    }

    pub fn get_by_username(&self, username: &str) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let user = users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)?;
        Ok(user)
    }

    /// Full-row update by primary key; `NotFound` when the row is gone.
    pub fn update(&self, user: &User) -> StoreResult<User> {
        if user.id == 0 {
            return Err(StoreError::InvalidArgument("user is not persisted"));
        }
        let mut conn = self.conn()?;
        let mut row = user.clone();
        row.updated_at = Utc::now().naive_utc();
        let updated = diesel::update(users::table.find(row.id))
            .set(&row)
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        Ok(updated)
    }

    /// Records that `follower` follows `followed`. A duplicate follow surfaces
    /// the uniqueness violation unchanged; self-follows are not rejected here.
    pub fn follow(&self, follower: &User, followed: &User) -> StoreResult<()> {
        if follower.id == 0 || followed.id == 0 {
            return Err(StoreError::InvalidArgument("both users must be persisted"));
        }
        let mut conn = self.conn()?;
        insert_into(follows::table)
            .values((
                follows::from_user_id.eq(follower.id),
                follows::to_user_id.eq(followed.id),
            ))
            .execute(&mut conn)?;
        debug!("user {} follows {}", follower.id, followed.id);
        Ok(())
    }

    /// Removes the follow edge; removing an absent edge succeeds.
    pub fn unfollow(&self, follower: &User, followed: &User) -> StoreResult<()> {
        if follower.id == 0 || followed.id == 0 {
            return Err(StoreError::InvalidArgument("both users must be persisted"));
        }
        let mut conn = self.conn()?;
        let affected = diesel::delete(
            follows::table
                .filter(follows::from_user_id.eq(follower.id))
                .filter(follows::to_user_id.eq(followed.id)),
        )
        .execute(&mut conn)?;
        if affected == 0 {
            debug!("unfollow: no edge from {} to {}", follower.id, followed.id);
        }
        Ok(())
    }

    /// Whether `follower` follows `followed`. Unsaved arguments mean "not
    /// following", not an error, and never hit the database.
    pub fn is_following(&self, follower: &User, followed: &User) -> StoreResult<bool> {
        if follower.id == 0 || followed.id == 0 {
            return Ok(false);
        }
        let mut conn = self.conn()?;
        let following = select(exists(
            follows::table
                .filter(follows::from_user_id.eq(follower.id))
                .filter(follows::to_user_id.eq(followed.id)),
        ))
        .get_result::<bool>(&mut conn)?;
        Ok(following)
    }

    /// Ids of the users `user` follows, in scan order. A user who follows
    /// nobody gets an empty vec.
    pub fn get_following_user_ids(&self, user: &User) -> StoreResult<Vec<i32>> {
        if user.id == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let ids = follows::table
            .filter(follows::from_user_id.eq(user.id))
            .select(follows::to_user_id)
            .load::<i32>(&mut conn)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::pg::PgConnection;
    use diesel::r2d2::ConnectionManager;

    fn dead_pool() -> Pool {
        let manager =
            ConnectionManager::<PgConnection>::new("postgres://localhost:1/unreachable");
        Pool::builder()
            .max_size(1)
            .min_idle(Some(0))
            .build_unchecked(manager)
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
    fn follow_rejects_unsaved_users() {
        let store = UserStore::new(dead_pool());
        let err = store.follow(&user(0), &user(1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let err = store.unfollow(&user(1), &user(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn is_following_treats_unsaved_users_as_not_following() {
        let store = UserStore::new(dead_pool());
        assert!(!store.is_following(&user(0), &user(1)).unwrap());
        assert!(!store.is_following(&user(1), &user(0)).unwrap());
    }

    #[test]
    fn following_ids_of_unsaved_user_are_empty() {
        let store = UserStore::new(dead_pool());
        assert!(store.get_following_user_ids(&user(0)).unwrap().is_empty());
    }

    #[test]
    fn update_rejects_unsaved_user() {
        let store = UserStore::new(dead_pool());
        let err = store.update(&user(0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
