use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{SearchParams, StoreFacade};
use crate::error::{AppError, AppResult};
use crate::models::{
    Channel, FileInfo, Id, OutgoingWebhook, Post, PostList, Preference, Profile, Session, Status,
    Team,
};

/// Postgres-backed [`StoreFacade`] (spec §6.2), in the teacher's query
/// style: explicit column lists, `RETURNING`, compound `(create_at, id)`
/// cursors for paginated reads, soft-delete via a `delete_at` column.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

const POST_COLUMNS: &str = "id, user_id, channel_id, root_id, parent_id, create_at, update_at, \
     delete_at, message, post_type, file_ids, props, hashtags";

#[async_trait]
impl StoreFacade for PgStore {
    async fn get_channel(&self, id: Id) -> AppResult<Channel> {
        sqlx::query_as::<_, Channel>(
            "SELECT id, team_id, type, display_name, name, create_at, update_at, delete_at
             FROM channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("channel not found".into()))
    }

    async fn get_channel_members(&self, channel_id: Id) -> AppResult<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT u.id, u.username, u.first_name, u.locale, u.email, u.delete_at, u.notify_props
             FROM users u
             JOIN channel_members cm ON cm.user_id = u.id
             WHERE cm.channel_id = $1 AND u.delete_at = 0",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn is_channel_member(&self, channel_id: Id, user_id: Id) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM channel_members WHERE channel_id = $1 AND user_id = $2)",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn join_channel(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO channel_members (channel_id, user_id, last_viewed_at, mention_count)
             VALUES ($1, $2, now(), 0)
             ON CONFLICT (channel_id, user_id) DO NOTHING",
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_viewed_at(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        sqlx::query(
            "UPDATE channel_members SET last_viewed_at = now(), mention_count = 0
             WHERE channel_id = $1 AND user_id = $2",
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_mention_count(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        sqlx::query(
            "UPDATE channel_members SET mention_count = mention_count + 1
             WHERE channel_id = $1 AND user_id = $2",
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_post(&self, id: Id) -> AppResult<Post> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("post not found".into()))
    }

    async fn save_post(&self, post: &Post) -> AppResult<Post> {
        let query = format!(
            "INSERT INTO posts ({POST_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {POST_COLUMNS}"
        );
        let saved = sqlx::query_as::<_, Post>(&query)
            .bind(post.id)
            .bind(post.user_id)
            .bind(post.channel_id)
            .bind(post.root_id)
            .bind(post.parent_id)
            .bind(post.create_at)
            .bind(post.update_at)
            .bind(post.delete_at)
            .bind(&post.message)
            .bind(post.post_type)
            .bind(&post.file_ids)
            .bind(&post.props)
            .bind(&post.hashtags)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    async fn update_post(&self, post: &Post) -> AppResult<Post> {
        let query = format!(
            "UPDATE posts SET message = $2, hashtags = $3, update_at = $4
             WHERE id = $1
             RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&query)
            .bind(post.id)
            .bind(&post.message)
            .bind(&post.hashtags)
            .bind(post.update_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("post not found".into()))
    }

    async fn delete_post(&self, id: Id, delete_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE posts SET delete_at = $2, update_at = $2 WHERE id = $1")
            .bind(id)
            .bind(delete_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_posts(&self, channel_id: Id, offset: i64, limit: i64) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE channel_id = $1 AND delete_at = 0
             ORDER BY create_at DESC, id DESC
             OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(channel_id)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_posts_since(&self, channel_id: Id, since_ms: i64) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE channel_id = $1 AND EXTRACT(EPOCH FROM create_at) * 1000 > $2
             ORDER BY create_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(channel_id)
            .bind(since_ms as f64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_posts_before(
        &self,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE channel_id = $1 AND delete_at = 0
               AND (create_at, id) < (SELECT create_at, id FROM posts WHERE id = $2)
             ORDER BY create_at DESC, id DESC
             OFFSET $3 LIMIT $4"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(channel_id)
            .bind(post_id)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_posts_after(
        &self,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE channel_id = $1 AND delete_at = 0
               AND (create_at, id) > (SELECT create_at, id FROM posts WHERE id = $2)
             ORDER BY create_at ASC, id ASC
             OFFSET $3 LIMIT $4"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(channel_id)
            .bind(post_id)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_flagged_posts(&self, user_id: Id, offset: i64, limit: i64) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts p
             JOIN preferences pref ON pref.name = p.id::text
             WHERE pref.user_id = $1 AND pref.category = 'flagged_post' AND p.delete_at = 0
             ORDER BY p.create_at DESC
             OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(user_id)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_thread_posts(&self, root_id: Id) -> AppResult<PostList> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE (id = $1 OR root_id = $1) AND delete_at = 0
             ORDER BY create_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, Post>(&query)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().fold(PostList::new(), |mut list, p| {
            list.push(p);
            list
        }))
    }

    async fn get_etag_for_channel(&self, channel_id: Id) -> AppResult<String> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(update_at) FROM posts WHERE channel_id = $1",
        )
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;
        let ms = latest.map(|t| t.timestamp_millis()).unwrap_or(0);
        Ok(format!("{channel_id}.{ms}"))
    }

    async fn search_posts(
        &self,
        team_id: Id,
        user_id: Id,
        groups: &[SearchParams],
    ) -> AppResult<PostList> {
        let mut combined = PostList::new();
        for group in groups {
            let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
                format!(
                    "SELECT DISTINCT {POST_COLUMNS} FROM posts p
                     JOIN channels c ON c.id = p.channel_id
                     JOIN channel_members cm ON cm.channel_id = c.id AND cm.user_id = "
                ),
            );
            builder.push_bind(user_id);
            builder.push(" WHERE c.team_id = ");
            builder.push_bind(team_id);
            builder.push(" AND p.delete_at = 0");

            if !group.terms.is_empty() {
                builder.push(" AND p.message ILIKE ");
                builder.push_bind(format!("%{}%", group.terms.replace('%', "\\%")));
            }
            if let Some(channel) = group.in_channel {
                builder.push(" AND p.channel_id = ");
                builder.push_bind(channel);
            }
            if let Some(from_user) = group.from_user {
                builder.push(" AND p.user_id = ");
                builder.push_bind(from_user);
            }
            if let Some(on_date) = group.on_date {
                builder.push(" AND p.create_at::date = ");
                builder.push_bind(on_date);
            }

            let rows = builder
                .build_query_as::<Post>()
                .fetch_all(&self.pool)
                .await?;
            for p in rows {
                combined.push(p);
            }
        }
        Ok(combined)
    }

    async fn get_user(&self, id: Id) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            "SELECT id, username, first_name, locale, email, delete_at, notify_props
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    async fn get_profiles_in_channel(&self, channel_id: Id) -> AppResult<Vec<Profile>> {
        self.get_channel_members(channel_id).await
    }

    async fn get_profiles_by_usernames(
        &self,
        team_id: Id,
        usernames: &[String],
    ) -> AppResult<Vec<Profile>> {
        let lowered: Vec<String> = usernames.iter().map(|u| u.to_lowercase()).collect();
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT u.id, u.username, u.first_name, u.locale, u.email, u.delete_at, u.notify_props
             FROM users u
             JOIN team_members tm ON tm.user_id = u.id
             WHERE tm.team_id = $1 AND lower(u.username) = ANY($2)",
        )
        .bind(team_id)
        .bind(&lowered)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn get_unread_count(&self, channel_id: Id, user_id: Id) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts p
             JOIN channel_members cm ON cm.channel_id = p.channel_id
             WHERE p.channel_id = $1 AND cm.user_id = $2
               AND p.create_at > cm.last_viewed_at AND p.delete_at = 0",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_team(&self, id: Id) -> AppResult<Team> {
        sqlx::query_as::<_, Team>(
            "SELECT id, owner_id, name, display_name, create_at, delete_at
             FROM teams WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("team not found".into()))
    }

    async fn get_teams_by_user_id(&self, user_id: Id) -> AppResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>(
            "SELECT t.id, t.owner_id, t.name, t.display_name, t.create_at, t.delete_at
             FROM teams t
             JOIN team_members tm ON tm.team_id = t.id
             WHERE tm.user_id = $1 AND t.delete_at = 0",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(teams)
    }

    async fn is_team_member(&self, team_id: Id, user_id: Id) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM team_members WHERE team_id = $1 AND user_id = $2)",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn get_preference(
        &self,
        user_id: Id,
        category: &str,
        name: &str,
    ) -> AppResult<Option<Preference>> {
        let pref = sqlx::query_as::<_, Preference>(
            "SELECT user_id, category, name, value FROM preferences
             WHERE user_id = $1 AND category = $2 AND name = $3",
        )
        .bind(user_id)
        .bind(category)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pref)
    }

    async fn save_preference(&self, pref: &Preference) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO preferences (user_id, category, name, value)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, category, name) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(pref.user_id)
        .bind(&pref.category)
        .bind(&pref.name)
        .bind(&pref.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_preference(&self, user_id: Id, category: &str, name: &str) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM preferences WHERE user_id = $1 AND category = $2 AND name = $3",
        )
        .bind(user_id)
        .bind(category)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_flagged_preferences_for_post(&self, post_id: Id) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM preferences WHERE category = 'flagged_post' AND name = $1",
        )
        .bind(post_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sessions_with_active_device_ids(&self, user_id: Id) -> AppResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, device_id, platform, expires_at FROM sessions
             WHERE user_id = $1 AND device_id IS NOT NULL AND device_id != ''
               AND expires_at > now()",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn get_online(&self, user_ids: &[Id]) -> AppResult<Vec<Status>> {
        let statuses = sqlx::query_as::<_, Status>(
            "SELECT user_id, status FROM statuses
             WHERE user_id = ANY($1) AND status = 'online'",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(statuses)
    }

    async fn get_outgoing_webhooks_by_team(&self, team_id: Id) -> AppResult<Vec<OutgoingWebhook>> {
        let hooks = sqlx::query_as::<_, OutgoingWebhook>(
            "SELECT id, creator_id, team_id, channel_id, content_type, trigger_words,
                    trigger_when, callback_urls, token, create_at, delete_at
             FROM outgoing_webhooks
             WHERE team_id = $1 AND delete_at = 0",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(hooks)
    }

    async fn get_file_infos_for_post(&self, post_id: Id) -> AppResult<Vec<FileInfo>> {
        let files = sqlx::query_as::<_, FileInfo>(
            "SELECT id, post_id, name, mime_type, create_at, delete_at
             FROM file_info WHERE post_id = $1 AND delete_at = 0",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    async fn attach_file_to_post(&self, file_id: Id, post_id: Id) -> AppResult<()> {
        sqlx::query("UPDATE file_info SET post_id = $2 WHERE id = $1 AND post_id IS NULL")
            .bind(file_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_file_infos_for_post(&self, post_id: Id) -> AppResult<()> {
        sqlx::query("UPDATE file_info SET delete_at = $2 WHERE post_id = $1 AND delete_at = 0")
            .bind(post_id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
