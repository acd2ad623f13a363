//! Shared fixtures: an in-memory store behind every repository trait and a
//! helper that wires both routers the way the binary does.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime, macros::datetime};
use tower::ServiceExt;
use uuid::Uuid;

use yatube::application::{
    accounts::{AccountService, SESSION_COOKIE},
    follows::FollowService,
    groups::GroupService,
    listing::ListingService,
    pagination::PageWindow,
    posts::PostService,
    repos::{
        CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
        CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, GroupsWriteRepo,
        HealthRepo, PostScope, PostsRepo, PostsWriteRepo, RepoError, SessionsRepo,
        UpdatePostParams, UsersRepo,
    },
};
use yatube::cache::{CacheConfig, CacheState};
use yatube::domain::entities::{
    CommentRecord, FollowCounts, GroupRecord, PostRecord, SessionRecord, UserRecord,
};
use yatube::domain::follows::FollowEdge;
use yatube::infra::http::{self, AdminState, HttpState};
use yatube::infra::uploads::UploadStorage;

/// Posts get strictly increasing publication times from this instant.
const CLOCK_START: OffsetDateTime = datetime!(2024-03-05 09:00 UTC);

#[derive(Debug, Clone)]
struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
    sessions: BTreeMap<Uuid, SessionRecord>,
    groups: BTreeMap<i64, GroupRecord>,
    posts: BTreeMap<i64, StoredPost>,
    comments: BTreeMap<i64, StoredComment>,
    follows: Vec<(i64, i64)>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&self, id: i64) -> OffsetDateTime {
        CLOCK_START + Duration::minutes(id)
    }

    fn post_record(&self, post: &StoredPost) -> Option<PostRecord> {
        let author = self.users.get(&post.author_id)?.to_ref();
        let group = post
            .group_id
            .and_then(|id| self.groups.get(&id))
            .map(GroupRecord::to_ref);
        let comment_count = self
            .comments
            .values()
            .filter(|comment| comment.post_id == post.id)
            .count() as u64;

        Some(PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author,
            group,
            image: post.image.clone(),
            comment_count,
        })
    }

    fn in_scope(&self, post: &StoredPost, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(group_id) => post.group_id == Some(group_id),
            PostScope::Author(author_id) => post.author_id == author_id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|&(follower, author)| follower == user_id && author == post.author_id),
        }
    }

    fn scoped(&self, scope: PostScope) -> Vec<&StoredPost> {
        let mut posts: Vec<&StoredPost> = self
            .posts
            .values()
            .filter(|post| self.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }

    fn comment_record(&self, comment: &StoredComment) -> Option<CommentRecord> {
        let author = self.users.get(&comment.author_id)?.to_ref();
        Some(CommentRecord {
            id: comment.id,
            post_id: comment.post_id,
            author,
            text: comment.text.clone(),
            created: comment.created,
        })
    }
}

/// Keeps every table in one mutex; tests are small enough for that.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store lock")
    }

    /// Insert a user directly. The password hash is unusable, so such users
    /// can only act through [`TestApp::session_cookie`].
    pub fn add_user(&self, username: &str) -> UserRecord {
        let mut tables = self.lock();
        let id = tables.allocate_id();
        let user = UserRecord {
            id,
            username: username.to_string(),
            password_hash: "!".to_string(),
            date_joined: tables.tick(id),
        };
        tables.users.insert(id, user.clone());
        user
    }

    pub fn add_group(&self, title: &str, slug: &str) -> GroupRecord {
        let mut tables = self.lock();
        let id = tables.allocate_id();
        let group = GroupRecord {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        };
        tables.groups.insert(id, group.clone());
        group
    }

    pub fn add_post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> i64 {
        let mut tables = self.lock();
        let id = tables.allocate_id();
        let post = StoredPost {
            id,
            text: text.to_string(),
            pub_date: tables.tick(id),
            author_id: author.id,
            group_id: group.map(|group| group.id),
            image: None,
        };
        tables.posts.insert(id, post);
        id
    }

    /// Drop a post and its comments, as the database cascade does.
    pub fn remove_post(&self, id: i64) {
        let mut tables = self.lock();
        tables.posts.remove(&id);
        tables.comments.retain(|_, comment| comment.post_id != id);
    }

    pub fn add_follow(&self, user: &UserRecord, author: &UserRecord) {
        let mut tables = self.lock();
        if !tables.follows.contains(&(user.id, author.id)) {
            tables.follows.push((user.id, author.id));
        }
    }

    pub fn post(&self, id: i64) -> Option<PostRecord> {
        let tables = self.lock();
        tables.posts.get(&id).and_then(|post| tables.post_record(post))
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn follow_edges(&self) -> Vec<(i64, i64)> {
        self.lock().follows.clone()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn comments_on(&self, post_id: i64) -> Vec<String> {
        self.lock()
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.text.clone())
            .collect()
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.lock();
        if tables
            .users
            .values()
            .any(|user| user.username == params.username)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".into(),
            });
        }
        let id = tables.allocate_id();
        let user = UserRecord {
            id,
            username: params.username,
            password_hash: params.password_hash,
            date_joined: tables.tick(id),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let session = SessionRecord {
            id: params.id,
            user_id: params.user_id,
            secret_hash: params.secret_hash,
            expires_at: params.expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), RepoError> {
        self.lock().sessions.remove(&id);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tables = self.lock();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups: Vec<GroupRecord> = self.lock().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self
            .lock()
            .groups
            .values()
            .find(|group| group.slug == slug)
            .cloned())
    }

    async fn find_group_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(self.lock().groups.get(&id).cloned())
    }
}

#[async_trait]
impl GroupsWriteRepo for MemoryStore {
    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.lock();
        if tables.groups.values().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".into(),
            });
        }
        let id = tables.allocate_id();
        let group = GroupRecord {
            id,
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.lock();
        if tables.groups.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        for post in tables.posts.values_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        scope: PostScope,
        window: PageWindow,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.lock();
        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        Ok(tables
            .scoped(scope)
            .into_iter()
            .skip(offset)
            .take(window.limit as usize)
            .filter_map(|post| tables.post_record(post))
            .collect())
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        Ok(self.lock().scoped(scope).len() as u64)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post(id))
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.lock();
        if !tables.users.contains_key(&params.author_id) {
            return Err(RepoError::InvalidInput {
                message: "unknown author".into(),
            });
        }
        let id = tables.allocate_id();
        let post = StoredPost {
            id,
            text: params.text,
            pub_date: tables.tick(id),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        let record = tables
            .post_record(&post)
            .ok_or_else(|| RepoError::from_persistence("post without author"))?;
        tables.posts.insert(id, post);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.lock();
        let post = tables.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        tables
            .post_record(&post)
            .ok_or_else(|| RepoError::from_persistence("post without author"))
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.lock();
        let mut comments: Vec<CommentRecord> = tables
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id)
            .filter_map(|comment| tables.comment_record(comment))
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.lock();
        if !tables.posts.contains_key(&params.post_id) {
            return Err(RepoError::InvalidInput {
                message: "unknown post".into(),
            });
        }
        let id = tables.allocate_id();
        let comment = StoredComment {
            id,
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created: tables.tick(id),
        };
        let record = tables
            .comment_record(&comment)
            .ok_or_else(|| RepoError::from_persistence("comment without author"))?;
        tables.comments.insert(id, comment);
        Ok(record)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let mut tables = self.lock();
        let pair = (edge.user_id(), edge.author_id());
        if tables.follows.contains(&pair) {
            return Ok(false);
        }
        tables.follows.push(pair);
        Ok(true)
    }

    async fn unfollow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let mut tables = self.lock();
        let before = tables.follows.len();
        let pair = (edge.user_id(), edge.author_id());
        tables.follows.retain(|existing| *existing != pair);
        Ok(tables.follows.len() != before)
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.lock().follows.contains(&(user_id, author_id)))
    }

    async fn follow_counts(&self, user_id: i64) -> Result<FollowCounts, RepoError> {
        let tables = self.lock();
        let followers = tables
            .follows
            .iter()
            .filter(|(_, author)| *author == user_id)
            .count() as u64;
        let following = tables
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .count() as u64;
        Ok(FollowCounts {
            followers,
            following,
        })
    }
}

#[async_trait]
impl HealthRepo for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub accounts: Arc<AccountService>,
    pub cache: Option<CacheState>,
    pub public: Router,
    pub admin: Router,
    pub uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_cache() -> Self {
        Self::build(true)
    }

    fn build(cached: bool) -> Self {
        let store = MemoryStore::new();
        let uploads = tempfile::tempdir().expect("temp upload dir");
        let storage =
            Arc::new(UploadStorage::new(uploads.path().to_path_buf()).expect("upload storage"));

        let accounts = Arc::new(AccountService::new(
            store.clone(),
            store.clone(),
            Duration::hours(1),
        ));
        let listing = Arc::new(ListingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            10,
        ));
        let posts = Arc::new(PostService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            storage.clone(),
        ));
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let groups = Arc::new(GroupService::new(store.clone(), store.clone()));
        let cache = cached.then(|| CacheState::new(CacheConfig::default()));

        let public = http::build_router(HttpState {
            listing,
            posts,
            follows,
            accounts: accounts.clone(),
            health: store.clone(),
            upload_storage: storage,
            cache: cache.clone(),
            cookie_secure: false,
            upload_limit_bytes: 1024 * 1024,
        });
        let admin = http::build_admin_router(AdminState {
            health: store.clone(),
            groups,
            cache: cache.clone(),
        });

        Self {
            store,
            accounts,
            cache,
            public,
            admin,
            uploads,
        }
    }

    /// `Cookie` header value of a fresh session for `user`.
    pub async fn session_cookie(&self, user: &UserRecord) -> String {
        let session = self
            .accounts
            .open_session(user.id)
            .await
            .expect("open session");
        format!("{SESSION_COOKIE}={}", session.token)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        send(&self.public, request.body(Body::empty()).expect("request")).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        body: &str,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        send(
            &self.public,
            request.body(Body::from(body.to_string())).expect("request"),
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        form: MultipartBody,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, form.content_type());
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        send(&self.public, request.body(form.finish()).expect("request")).await
    }

    pub async fn admin_request(&self, method: &str, uri: &str, body: &str) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("request");
        send(&self.admin, request).await
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

pub async fn body_to_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

pub fn assert_redirect(response: &Response<Body>, target: &str) {
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(response), target);
}

/// Number of post cards rendered in a listing page.
pub fn card_count(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

/// Hand-built `multipart/form-data` body.
pub struct MultipartBody {
    boundary: &'static str,
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "yatube-test-boundary",
            bytes: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn finish(mut self) -> Body {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Body::from(self.bytes)
    }
}

/// A 1x1 GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04,
    0x01, 0x0a, 0x00, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x4c, 0x01, 0x00, 0x3b,
];
