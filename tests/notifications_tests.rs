//! Scenario coverage for `NotificationDispatcher::dispatch_inner` and
//! `WebhookDispatcher::dispatch_inner` (spec §8 S1-S5) against an in-memory
//! `FakeStore`/`FakeEventBus`, rather than the Postgres-backed harness in
//! `tests/common` — none of these scenarios touch HTTP routing or the DB,
//! only the dispatch algorithms themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};

use postflow_server::config::{Config, PushContentSetting, SmtpConfig};
use postflow_server::error::{AppError, AppResult};
use postflow_server::events::{Event, EventBus};
use postflow_server::models::{
    Channel, ChannelType, ContentType, FileInfo, Id, NotifyProps, OutgoingWebhook, Post, PostList,
    PostType, Preference, Profile, Session, Status, Team, TriggerWhen,
};
use postflow_server::notifications::email::EmailSender;
use postflow_server::notifications::i18n::EnglishTranslator;
use postflow_server::notifications::push::PushProxyClient;
use postflow_server::notifications::NotificationDispatcher;
use postflow_server::posts::cache::ChannelPostCache;
use postflow_server::store::{SearchParams, StoreFacade};
use postflow_server::webhooks::WebhookDispatcher;

// ── Fake collaborators ──────────────────────────────────────────────────────

/// Backs only the paths `NotificationDispatcher`/`WebhookDispatcher`
/// actually exercise; every other `StoreFacade` method is a stub since
/// nothing here calls them.
#[derive(Default)]
struct FakeStore {
    profiles: Mutex<HashMap<Id, Profile>>,
    channel_members: Mutex<HashMap<Id, Vec<Id>>>,
    posts: Mutex<HashMap<Id, Post>>,
    threads: Mutex<HashMap<Id, Vec<Id>>>,
    mention_counts: Mutex<HashMap<(Id, Id), u64>>,
    statuses: Mutex<HashMap<Id, Status>>,
    sessions: Mutex<HashMap<Id, Vec<Session>>>,
    teams: Mutex<HashMap<Id, Team>>,
    webhooks: Mutex<HashMap<Id, Vec<OutgoingWebhook>>>,
}

impl FakeStore {
    fn add_profile(&self, profile: Profile) {
        self.profiles.lock().unwrap().insert(profile.id, profile);
    }

    fn add_to_channel(&self, channel_id: Id, user_id: Id) {
        self.channel_members.lock().unwrap().entry(channel_id).or_default().push(user_id);
    }

    fn add_post(&self, post: Post) {
        let root_id = post.root_id.unwrap_or(post.id);
        self.threads.lock().unwrap().entry(root_id).or_default().push(post.id);
        self.posts.lock().unwrap().insert(post.id, post);
    }

    fn add_session(&self, user_id: Id, session: Session) {
        self.sessions.lock().unwrap().entry(user_id).or_default().push(session);
    }

    fn add_team(&self, team: Team) {
        self.teams.lock().unwrap().insert(team.id, team);
    }

    fn add_webhook(&self, hook: OutgoingWebhook) {
        self.webhooks.lock().unwrap().entry(hook.team_id).or_default().push(hook);
    }

    fn mention_count(&self, channel_id: Id, user_id: Id) -> u64 {
        *self.mention_counts.lock().unwrap().get(&(channel_id, user_id)).unwrap_or(&0)
    }
}

#[async_trait]
impl StoreFacade for FakeStore {
    async fn get_channel(&self, _id: Id) -> AppResult<Channel> {
        Err(AppError::NotFound("fake store: get_channel unused".into()))
    }

    async fn get_channel_members(&self, channel_id: Id) -> AppResult<Vec<Profile>> {
        self.get_profiles_in_channel(channel_id).await
    }

    async fn is_channel_member(&self, channel_id: Id, user_id: Id) -> AppResult<bool> {
        Ok(self
            .channel_members
            .lock()
            .unwrap()
            .get(&channel_id)
            .is_some_and(|m| m.contains(&user_id)))
    }

    async fn join_channel(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        self.add_to_channel(channel_id, user_id);
        Ok(())
    }

    async fn update_last_viewed_at(&self, _channel_id: Id, _user_id: Id) -> AppResult<()> {
        Ok(())
    }

    async fn increment_mention_count(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        *self.mention_counts.lock().unwrap().entry((channel_id, user_id)).or_insert(0) += 1;
        Ok(())
    }

    async fn get_post(&self, id: Id) -> AppResult<Post> {
        self.posts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("post not found".into()))
    }

    async fn save_post(&self, post: &Post) -> AppResult<Post> {
        self.add_post(post.clone());
        Ok(post.clone())
    }

    async fn update_post(&self, post: &Post) -> AppResult<Post> {
        self.posts.lock().unwrap().insert(post.id, post.clone());
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Id, delete_at: DateTime<Utc>) -> AppResult<()> {
        if let Some(p) = self.posts.lock().unwrap().get_mut(&id) {
            p.delete_at = delete_at.timestamp_millis();
        }
        Ok(())
    }

    async fn get_posts(&self, _channel_id: Id, _offset: i64, _limit: i64) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_posts_since(&self, _channel_id: Id, _since_ms: i64) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_posts_before(
        &self,
        _channel_id: Id,
        _post_id: Id,
        _offset: i64,
        _limit: i64,
    ) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_posts_after(
        &self,
        _channel_id: Id,
        _post_id: Id,
        _offset: i64,
        _limit: i64,
    ) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_flagged_posts(&self, _user_id: Id, _offset: i64, _limit: i64) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_thread_posts(&self, root_id: Id) -> AppResult<PostList> {
        let ids = self.threads.lock().unwrap().get(&root_id).cloned().unwrap_or_default();
        let posts = self.posts.lock().unwrap();
        let mut list = PostList::new();
        for id in ids {
            if let Some(p) = posts.get(&id) {
                list.push(p.clone());
            }
        }
        Ok(list)
    }

    async fn get_etag_for_channel(&self, channel_id: Id) -> AppResult<String> {
        Ok(format!("{channel_id}.0"))
    }

    async fn search_posts(&self, _team_id: Id, _user_id: Id, _groups: &[SearchParams]) -> AppResult<PostList> {
        Ok(PostList::new())
    }

    async fn get_user(&self, id: Id) -> AppResult<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    async fn get_profiles_in_channel(&self, channel_id: Id) -> AppResult<Vec<Profile>> {
        let members = self.channel_members.lock().unwrap().get(&channel_id).cloned().unwrap_or_default();
        let profiles = self.profiles.lock().unwrap();
        Ok(members.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }

    async fn get_profiles_by_usernames(&self, _team_id: Id, _usernames: &[String]) -> AppResult<Vec<Profile>> {
        Ok(Vec::new())
    }

    async fn get_unread_count(&self, _channel_id: Id, _user_id: Id) -> AppResult<i64> {
        Ok(0)
    }

    async fn get_team(&self, id: Id) -> AppResult<Team> {
        self.teams
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("team not found".into()))
    }

    async fn get_teams_by_user_id(&self, _user_id: Id) -> AppResult<Vec<Team>> {
        Ok(Vec::new())
    }

    async fn is_team_member(&self, _team_id: Id, _user_id: Id) -> AppResult<bool> {
        Ok(true)
    }

    async fn get_preference(&self, _user_id: Id, _category: &str, _name: &str) -> AppResult<Option<Preference>> {
        Ok(None)
    }

    async fn save_preference(&self, _pref: &Preference) -> AppResult<()> {
        Ok(())
    }

    async fn delete_preference(&self, _user_id: Id, _category: &str, _name: &str) -> AppResult<()> {
        Ok(())
    }

    async fn delete_flagged_preferences_for_post(&self, _post_id: Id) -> AppResult<()> {
        Ok(())
    }

    async fn get_sessions_with_active_device_ids(&self, user_id: Id) -> AppResult<Vec<Session>> {
        Ok(self.sessions.lock().unwrap().get(&user_id).cloned().unwrap_or_default())
    }

    async fn get_online(&self, user_ids: &[Id]) -> AppResult<Vec<Status>> {
        let statuses = self.statuses.lock().unwrap();
        Ok(user_ids.iter().filter_map(|id| statuses.get(id).cloned()).collect())
    }

    async fn get_outgoing_webhooks_by_team(&self, team_id: Id) -> AppResult<Vec<OutgoingWebhook>> {
        Ok(self.webhooks.lock().unwrap().get(&team_id).cloned().unwrap_or_default())
    }

    async fn get_file_infos_for_post(&self, _post_id: Id) -> AppResult<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    async fn attach_file_to_post(&self, _file_id: Id, _post_id: Id) -> AppResult<()> {
        Ok(())
    }

    async fn delete_file_infos_for_post(&self, _post_id: Id) -> AppResult<()> {
        Ok(())
    }
}

/// Same recording pattern as `ephemeral::tests::RecordingBus`, reused here
/// so both the channel-wide broadcast and any ephemeral advisory can be
/// inspected after a dispatch.
#[derive(Default)]
struct FakeEventBus {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventBus for FakeEventBus {
    async fn publish(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct FakeEmailSender {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl EmailSender for FakeEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string(), body.to_string()));
    }
}

#[derive(Default)]
struct FakePushClient {
    sent: Mutex<Vec<postflow_server::models::PushNotification>>,
}

#[async_trait]
impl PushProxyClient for FakePushClient {
    async fn send_push(&self, notification: &postflow_server::models::PushNotification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

fn test_config(max_notifications_per_channel: usize) -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: "test-secret".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        is_dev: true,
        allowed_origins: Vec::new(),
        send_email_notifications: true,
        send_push_notifications: true,
        push_notification_server: "https://push.self-hosted.test".to_string(),
        push_notification_contents: PushContentSetting::Generic,
        enable_email_batching: false,
        is_licensed: false,
        license_has_managed_push: false,
        max_notifications_per_channel,
        site_name: "Postflow Test".to_string(),
        enable_outgoing_webhooks: true,
        enable_insecure_outgoing_connections: true,
        enable_post_username_override: false,
        enable_post_icon_override: false,
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from_address: "notifications@postflow.test".to_string(),
        },
        server_id: "postflow-test".to_string(),
    }
}

fn profile(username: &str, notify: &[(&str, &str)]) -> Profile {
    let mut map = HashMap::new();
    for (k, v) in notify {
        map.insert(k.to_string(), v.to_string());
    }
    Profile {
        id: Id::new(),
        username: username.to_string(),
        first_name: String::new(),
        locale: "en".to_string(),
        email: format!("{username}@example.test"),
        delete_at: 0,
        notify_props: sqlx::types::Json(NotifyProps(map)),
    }
}

fn team() -> Team {
    let now = Utc::now();
    Team {
        id: Id::new(),
        owner_id: Id::new(),
        name: "acme".to_string(),
        display_name: "Acme".to_string(),
        create_at: now,
        delete_at: 0,
    }
}

fn channel(team_id: Id, kind: ChannelType) -> Channel {
    let now = Utc::now();
    Channel {
        id: Id::new(),
        team_id,
        r#type: kind,
        display_name: "general".to_string(),
        name: "general".to_string(),
        create_at: now,
        update_at: now,
        delete_at: 0,
    }
}

fn post(user_id: Id, channel_id: Id, message: &str, root_id: Option<Id>) -> Post {
    let now = Utc::now();
    Post {
        id: Id::new(),
        user_id,
        channel_id,
        root_id,
        parent_id: root_id,
        create_at: now,
        update_at: now,
        delete_at: 0,
        message: message.to_string(),
        post_type: PostType::User,
        file_ids: serde_json::json!([]),
        props: serde_json::json!({}),
        hashtags: String::new(),
    }
}

fn build_dispatcher(
    store: Arc<FakeStore>,
    events: Arc<FakeEventBus>,
    config: Config,
) -> (NotificationDispatcher, Arc<FakeEmailSender>, Arc<FakePushClient>) {
    let store_facade: Arc<dyn StoreFacade> = store;
    let event_bus: Arc<dyn EventBus> = events;
    let email = Arc::new(FakeEmailSender::default());
    let push = Arc::new(FakePushClient::default());
    let dispatcher = NotificationDispatcher::new(
        store_facade,
        event_bus,
        email.clone(),
        push.clone(),
        Arc::new(EnglishTranslator),
        Arc::new(config),
    );
    (dispatcher, email, push)
}

// ── S1: plain post, nobody mentioned ─────────────────────────────────────────

#[tokio::test]
async fn s1_plain_post_mentions_nobody() {
    let store = Arc::new(FakeStore::default());
    let events = Arc::new(FakeEventBus::default());
    let team = team();
    let channel = channel(team.id, ChannelType::Open);
    let alice = profile("alice", &[]);
    let bob = profile("bob", &[]);
    store.add_profile(alice.clone());
    store.add_profile(bob.clone());
    store.add_to_channel(channel.id, alice.id);
    store.add_to_channel(channel.id, bob.id);

    let (dispatcher, email, push) = build_dispatcher(store, events.clone(), test_config(1000));
    let post = post(alice.id, channel.id, "hello world", None);
    dispatcher.dispatch(&post, &team, &channel).await;

    assert!(email.sent.lock().unwrap().is_empty());
    assert!(push.sent.lock().unwrap().is_empty());

    let recorded = events.events.lock().unwrap();
    assert_eq!(recorded.len(), 1, "only the channel-wide posted broadcast");
    let mentioned = recorded[0].payload["mentioned_user_ids"].as_array().unwrap();
    assert!(mentioned.is_empty());
}

// ── S2: direct mention by keyword ───────────────────────────────────────────

#[tokio::test]
async fn s2_direct_mention_notifies_by_email_and_push() {
    let store = Arc::new(FakeStore::default());
    let events = Arc::new(FakeEventBus::default());
    let team = team();
    let channel = channel(team.id, ChannelType::Open);
    let alice = profile("alice", &[]);
    let bob = profile("bob", &[("mention_keys", "dragon"), ("push", "mention")]);
    let carol = profile("carol", &[]);
    for p in [&alice, &bob, &carol] {
        store.add_profile((*p).clone());
        store.add_to_channel(channel.id, p.id);
    }
    // Bob is offline (no status recorded) with one active mobile session.
    store.add_session(
        bob.id,
        Session {
            id: Id::new(),
            user_id: bob.id,
            device_id: Some("device-1".to_string()),
            platform: "ios".to_string(),
            expires_at: Utc::now() + chrono::Duration::days(1),
        },
    );

    let (dispatcher, email, push) = build_dispatcher(store.clone(), events.clone(), test_config(1000));
    let post = post(alice.id, channel.id, "watch out, DRAGON!", None);
    dispatcher.dispatch(&post, &team, &channel).await;

    assert_eq!(store.mention_count(channel.id, bob.id), 1);

    let sent_emails = email.sent.lock().unwrap();
    assert_eq!(sent_emails.len(), 1);
    assert_eq!(sent_emails[0].0, bob.email);

    let sent_pushes = push.sent.lock().unwrap();
    assert_eq!(sent_pushes.len(), 1);

    let recorded = events.events.lock().unwrap();
    let posted = recorded.iter().find(|e| e.channel_id == Some(channel.id)).unwrap();
    let mentioned: Vec<String> = posted.payload["mentioned_user_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(mentioned, vec![bob.id.to_string()]);
}

// ── S3: @channel suppressed in an over-sized room ───────────────────────────

#[tokio::test]
async fn s3_channel_mention_suppressed_over_limit() {
    let store = Arc::new(FakeStore::default());
    let events = Arc::new(FakeEventBus::default());
    let team = team();
    let channel = channel(team.id, ChannelType::Open);
    let alice = profile("alice", &[]);
    let bob = profile("bob", &[]);
    let carol = profile("carol", &[]);
    for p in [&alice, &bob, &carol] {
        store.add_profile((*p).clone());
        store.add_to_channel(channel.id, p.id);
    }

    // Three members, limit of two — @channel must be suppressed.
    let (dispatcher, email, push) = build_dispatcher(store, events.clone(), test_config(2));
    let post = post(alice.id, channel.id, "@channel heads up", None);
    dispatcher.dispatch(&post, &team, &channel).await;

    assert!(email.sent.lock().unwrap().is_empty());
    assert!(push.sent.lock().unwrap().is_empty());

    let recorded = events.events.lock().unwrap();
    assert_eq!(recorded.len(), 2, "channel broadcast plus author-only ephemeral advisory");

    let posted = recorded.iter().find(|e| e.user_id.is_none()).expect("posted broadcast");
    assert!(posted.payload["mentioned_user_ids"].as_array().unwrap().is_empty());

    let ephemeral = recorded.iter().find(|e| e.user_id == Some(alice.id)).expect("ephemeral advisory");
    let message = ephemeral.payload["post"]["message"].as_str().unwrap();
    assert!(message.contains("too many members"), "{message}");
}

// ── S4: thread-reply notification via the `comments` preference ────────────

/// Grounded in `original_source/app/notification.go`'s thread loop, which
/// checks each thread post's *own author*'s `comments` setting against
/// `threadPost.Id == list.Order[0]` — so `comments=root` only fires for
/// whoever authored the root post, never for a bystander who merely set the
/// preference. Carol authors the root post here; Bob just replies once with
/// no preference set, so he falls to the corrected default (`Never`) and is
/// not re-notified for having participated.
#[tokio::test]
async fn s4_thread_reply_notifies_root_author_with_comments_root() {
    let store = Arc::new(FakeStore::default());
    let events = Arc::new(FakeEventBus::default());
    let team = team();
    let channel = channel(team.id, ChannelType::Open);
    let carol = profile("carol", &[("comments", "root")]);
    let bob = profile("bob", &[]);
    let alice = profile("alice", &[]);
    for p in [&carol, &bob, &alice] {
        store.add_profile((*p).clone());
        store.add_to_channel(channel.id, p.id);
    }

    let root = post(carol.id, channel.id, "starting a thread", None);
    store.add_post(root.clone());
    let bobs_reply = post(bob.id, channel.id, "following along", Some(root.id));
    store.add_post(bobs_reply);

    let (dispatcher, email, push) = build_dispatcher(store.clone(), events.clone(), test_config(1000));
    let alices_reply = post(alice.id, channel.id, "another reply", Some(root.id));
    store.add_post(alices_reply.clone());
    dispatcher.dispatch(&alices_reply, &team, &channel).await;

    let recorded = events.events.lock().unwrap();
    let posted = recorded.iter().find(|e| e.channel_id == Some(channel.id)).unwrap();
    let mentioned: Vec<String> = posted.payload["mentioned_user_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(mentioned.contains(&carol.id.to_string()), "{mentioned:?}");
    assert!(!mentioned.contains(&bob.id.to_string()), "{mentioned:?}");

    // Both are offline with no sessions, but email is still gated on
    // `email_enabled`/online-status only — Carol gets one, Bob gets none.
    let sent_to: Vec<&str> = email.sent.lock().unwrap().iter().map(|(to, ..)| to.as_str()).collect();
    assert_eq!(sent_to, vec![carol.email.as_str()]);
    assert!(push.sent.lock().unwrap().is_empty(), "neither has an active session");
}

// ── S5: webhook-generated posts never retrigger the webhook ─────────────────

async fn hook_handler(State(call_count): State<Arc<AtomicUsize>>) -> Json<serde_json::Value> {
    call_count.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({ "text": "ok" }))
}

/// Binds an ephemeral local HTTP callback recording how many times it was
/// invoked, standing in for the webhook's remote endpoint.
async fn spawn_callback_server() -> (String, Arc<AtomicUsize>) {
    let call_count = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/hook", post(hook_handler)).with_state(call_count.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), call_count)
}

#[tokio::test]
async fn s5_webhook_response_post_does_not_retrigger_the_webhook() {
    let store = Arc::new(FakeStore::default());
    let events = Arc::new(FakeEventBus::default());
    let team = team();
    let channel = channel(team.id, ChannelType::Open);
    store.add_team(team.clone());

    let alice = profile("alice", &[]);
    store.add_profile(alice.clone());
    store.add_to_channel(channel.id, alice.id);

    let (callback_url, call_count) = spawn_callback_server().await;
    let now = Utc::now();
    store.add_webhook(OutgoingWebhook {
        id: Id::new(),
        creator_id: Id::new(),
        team_id: team.id,
        channel_id: Some(channel.id),
        content_type: ContentType::Json,
        trigger_words: "bot".to_string(),
        trigger_when: TriggerWhen::Full,
        callback_urls: vec![callback_url],
        token: "tok".to_string(),
        create_at: now,
        delete_at: 0,
    });

    let (notifications, _email, _push) = build_dispatcher(store.clone(), events, test_config(1000));
    let cache = Arc::new(ChannelPostCache::new());
    let http_client = reqwest::Client::new();
    let webhooks = WebhookDispatcher::new(
        store.clone(),
        cache,
        Arc::new(notifications),
        http_client,
        Arc::new(test_config(1000)),
    );

    let triggering_post = post(alice.id, channel.id, "bot status", None);
    store.add_post(triggering_post.clone());
    webhooks.dispatch(&triggering_post, &channel).await;

    assert_eq!(call_count.load(Ordering::SeqCst), 1, "webhook callback hit exactly once");

    let all_posts = store.posts.lock().unwrap();
    let generated: Vec<&Post> = all_posts.values().filter(|p| p.from_webhook()).collect();
    assert_eq!(generated.len(), 1, "exactly one webhook-generated post");
    assert_eq!(generated[0].message, "ok");
}
