//! Like/dislike toggling and the post counters it maintains.

use crate::{
    client::{DbClient, DbError, Result, select_full_post},
    record::{FullPostRecord, PreferenceRecord},
};
use plaza_common::model::{
    Id, counter_from_db,
    post::{Post, PostMarker},
    preference::{Preference, PreferenceMarker, PreferenceOutcome, PreferenceState, PreferenceValue},
    user::UserMarker,
};
use sqlx::{Executor, Sqlite, query, query_as, query_scalar};
use tracing::{debug, warn};

impl DbClient {
    /// Toggles `user_id`'s preference for `post_id` towards `desired`.
    ///
    /// Returns `None` if the post does not exist, in which case nothing was
    /// written. A conflicting concurrent write is retried once before
    /// [`DbError::Conflict`] is returned.
    pub async fn apply_preference(
        &self,
        user_id: Id<UserMarker>,
        post_id: Id<PostMarker>,
        desired: PreferenceValue,
    ) -> Result<Option<PreferenceOutcome>> {
        retry_once_on_conflict(move || self.try_apply_preference(user_id, post_id, desired))
            .await
            .inspect_err(|err| {
                if matches!(err, DbError::Conflict) {
                    warn!(%user_id, %post_id, "Preference write still conflicted after retry");
                }
            })
    }

    async fn try_apply_preference(
        &self,
        user_id: Id<UserMarker>,
        post_id: Id<PostMarker>,
        desired: PreferenceValue,
    ) -> Result<Option<PreferenceOutcome>> {
        let mut transaction = self.pool.begin().await?;

        // A no-op write as the first statement takes the write lock before
        // anything is read, so toggles on the same post serialize.
        let locked = query("UPDATE posts SET likes = likes WHERE post_snowflake = ?")
            .bind(post_id.to_db())
            .execute(&mut *transaction)
            .await?
            .rows_affected();
        if locked == 0 {
            return Ok(None);
        }

        let existing = fetch_preference_with(&mut *transaction, user_id, post_id).await?;
        let (next_state, delta) =
            PreferenceState::from(existing.map(|preference| preference.value)).apply(desired);

        if let Some(existing) = existing {
            query("DELETE FROM preferences WHERE preference_snowflake = ?")
                .bind(existing.id.to_db())
                .execute(&mut *transaction)
                .await?;
        }

        if let Some(value) = next_state.value() {
            let preference_id = self.next_id::<PreferenceMarker>()?;

            query(
                "
                INSERT INTO preferences (preference_snowflake, user_snowflake, post_snowflake, value)
                VALUES (?, ?, ?, ?)
                ",
            )
            .bind(preference_id.to_db())
            .bind(user_id.to_db())
            .bind(post_id.to_db())
            .bind(i64::from(value.get()))
            .execute(&mut *transaction)
            .await?;
        }

        query(
            "
            UPDATE posts
            SET
                likes = likes + ?,
                dislikes = dislikes + ?
            WHERE post_snowflake = ?
            ",
        )
        .bind(delta.likes)
        .bind(delta.dislikes)
        .bind(post_id.to_db())
        .execute(&mut *transaction)
        .await?;

        let post = fetch_post_with(&mut *transaction, post_id).await?;
        transaction.commit().await?;

        debug!(
            %user_id,
            %post_id,
            ?desired,
            ?next_state,
            likes = post.likes,
            dislikes = post.dislikes,
            "Applied preference"
        );

        Ok(Some(PreferenceOutcome {
            post,
            preference: next_state.value(),
        }))
    }

    pub async fn fetch_preference(
        &self,
        user_id: Id<UserMarker>,
        post_id: Id<PostMarker>,
    ) -> Result<Option<Preference>> {
        fetch_preference_with(&self.pool, user_id, post_id).await
    }

    /// Number of preferences with `value` on a post, counted from the rows.
    pub async fn count_preferences(
        &self,
        post_id: Id<PostMarker>,
        value: PreferenceValue,
    ) -> Result<u64> {
        let count: i64 = query_scalar(
            "
            SELECT COUNT(*)
            FROM preferences
            WHERE post_snowflake = ? AND value = ?
            ",
        )
        .bind(post_id.to_db())
        .bind(i64::from(value.get()))
        .fetch_one(&self.pool)
        .await?;

        Ok(counter_from_db(count)?)
    }

    /// Recomputes a post's counters from its preference rows.
    pub async fn repair_post_counters(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let repaired = query(
            "
            UPDATE posts
            SET
                likes = (
                    SELECT COUNT(*) FROM preferences
                    WHERE preferences.post_snowflake = posts.post_snowflake AND value = 1
                ),
                dislikes = (
                    SELECT COUNT(*) FROM preferences
                    WHERE preferences.post_snowflake = posts.post_snowflake AND value = 2
                )
            WHERE post_snowflake = ?
            ",
        )
        .bind(post_id.to_db())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if repaired == 0 {
            return Ok(None);
        }
        self.fetch_post(post_id).await
    }
}

/// Runs `attempt` a second time if the first run hit [`DbError::Conflict`].
async fn retry_once_on_conflict<T, F, Fut>(mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt().await {
        Err(DbError::Conflict) => {
            debug!("Write conflicted, retrying once");
            attempt().await
        }
        result => result,
    }
}

async fn fetch_preference_with(
    executor: impl Executor<'_, Database = Sqlite>,
    user_id: Id<UserMarker>,
    post_id: Id<PostMarker>,
) -> Result<Option<Preference>> {
    let record = query_as::<_, PreferenceRecord>(
        "
        SELECT
            preferences.preference_snowflake,
            preferences.user_snowflake,
            preferences.post_snowflake,
            preferences.value
        FROM
            preferences
        WHERE
            preferences.user_snowflake = ? AND preferences.post_snowflake = ?
        ",
    )
    .bind(user_id.to_db())
    .bind(post_id.to_db())
    .fetch_optional(executor)
    .await?;

    let preference = record.map(Preference::try_from).transpose()?;
    Ok(preference)
}

async fn fetch_post_with(
    executor: impl Executor<'_, Database = Sqlite>,
    post_id: Id<PostMarker>,
) -> Result<Post> {
    let record = query_as::<_, FullPostRecord>(concat!(
        select_full_post!(),
        "WHERE posts.post_snowflake = ?"
    ))
    .bind(post_id.to_db())
    .fetch_one(executor)
    .await?;

    Ok(Post::try_from(record)?)
}
