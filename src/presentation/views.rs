use crate::application::accounts::Viewer;
use crate::application::error::{ErrorReport, FieldErrors, HttpError};
use crate::application::listing::{PostDetail, ProfileListing};
use crate::application::pagination::Page;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::{HUMAN_DATE_FORMAT, HUMAN_DATETIME_FORMAT, summarize};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const BRAND_TITLE: &str = "Yatube";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// The 404 page. `path` is echoed back so the reader sees what was missing.
pub fn render_not_found_response(chrome: LayoutChrome, path: &str) -> Response {
    let content = ErrorPageView::not_found(path);
    let view = LayoutContext::new(chrome.with_title("Page not found"), content);
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        format!("Resource not found: {path}"),
    )
    .attach(&mut response);
    response
}

/// The generic 500 page. The diagnostic chain goes into the report, never
/// into the body.
pub fn render_server_error_response(chrome: LayoutChrome, report: ErrorReport) -> Response {
    let status = report.status;
    let view = LayoutContext::new(
        chrome.with_title("Server error"),
        ErrorPageView::server_error(),
    );
    let mut response = render_template_response(ServerErrorTemplate { view }, status);
    report.attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

/// Header links; what is offered depends on who is looking.
#[derive(Clone)]
pub struct NavigationView {
    pub username: Option<String>,
}

impl NavigationView {
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub title: String,
}

impl LayoutChrome {
    pub fn for_viewer(viewer: &Viewer) -> Self {
        Self {
            brand: BrandView {
                title: BRAND_TITLE.to_string(),
                href: "/".to_string(),
            },
            navigation: NavigationView {
                username: viewer.user().map(|user| user.username.clone()),
            },
            title: BRAND_TITLE.to_string(),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            navigation: chrome.navigation,
            title: chrome.title,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupLink {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub summary: String,
    pub author: String,
    pub author_href: String,
    pub published: String,
    pub iso_date: String,
    pub group: Option<GroupLink>,
    pub image_url: Option<String>,
    pub comment_count: u64,
    pub detail_href: String,
    pub edit_href: Option<String>,
}

impl PostCard {
    pub fn from_record(post: &PostRecord, viewer: &Viewer) -> Self {
        let detail_href = post_href(&post.author.username, post.id);
        let edit_href =
            (viewer.id() == Some(post.author.id)).then(|| format!("{detail_href}edit/"));

        Self {
            id: post.id,
            text: post.text.clone(),
            summary: summarize(&post.text),
            author: post.author.username.clone(),
            author_href: profile_href(&post.author.username),
            published: format_date(post.pub_date),
            iso_date: format_iso(post.pub_date),
            group: post.group.as_ref().map(|group| GroupLink {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
            comment_count: post.comment_count,
            detail_href,
            edit_href,
        }
    }
}

/// Previous and next links plus the page numbers around the current one.
#[derive(Clone)]
pub struct PaginatorView {
    pub number: u64,
    pub num_pages: u64,
    pub previous: Option<u64>,
    pub next: Option<u64>,
    pub pages: Vec<u64>,
    pub show: bool,
}

impl PaginatorView {
    const SPREAD: u64 = 2;

    pub fn from_page<T>(page: &Page<T>) -> Self {
        let first = page.number.saturating_sub(Self::SPREAD).max(1);
        let last = (page.number + Self::SPREAD).min(page.num_pages);

        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous: page.previous_page_number(),
            next: page.next_page_number(),
            pages: (first..=last).collect(),
            show: page.has_other_pages(),
        }
    }
}

pub struct ListingContext {
    pub posts: Vec<PostCard>,
    pub total_count: u64,
    pub paginator: PaginatorView,
}

impl ListingContext {
    pub fn from_page(page: &Page<PostRecord>, viewer: &Viewer) -> Self {
        Self {
            posts: page
                .items
                .iter()
                .map(|post| PostCard::from_record(post, viewer))
                .collect(),
            total_count: page.total_count,
            paginator: PaginatorView::from_page(page),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// A titled listing without further context: the index and the follow feed.
pub struct ListingPage {
    pub heading: String,
    pub listing: ListingContext,
}

impl ListingPage {
    pub fn new(heading: impl Into<String>, listing: ListingContext) -> Self {
        Self {
            heading: heading.into(),
            listing,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<ListingPage>,
}

pub struct GroupContext {
    pub title: String,
    pub description: String,
    pub listing: ListingContext,
}

impl GroupContext {
    pub fn new(group: &GroupRecord, listing: ListingContext) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            listing,
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<ListingPage>,
}

pub struct AuthorSummary {
    pub username: String,
    pub href: String,
    pub post_count: u64,
    pub followers: u64,
    pub following: u64,
}

pub struct ProfileContext {
    pub author: AuthorSummary,
    pub show_follow: bool,
    pub is_following: bool,
    pub follow_href: String,
    pub unfollow_href: String,
    pub listing: ListingContext,
}

impl ProfileContext {
    pub fn new(profile: &ProfileListing, viewer: &Viewer) -> Self {
        let username = &profile.author.username;
        let href = profile_href(username);

        Self {
            author: AuthorSummary {
                username: username.clone(),
                href: href.clone(),
                post_count: profile.page.total_count,
                followers: profile.counts.followers,
                following: profile.counts.following,
            },
            show_follow: profile.can_follow,
            is_following: profile.follow_state.is_following(),
            follow_href: format!("{href}follow/"),
            unfollow_href: format!("{href}unfollow/"),
            listing: ListingContext::from_page(&profile.page, viewer),
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

pub struct CommentView {
    pub author: String,
    pub author_href: String,
    pub text: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author.username.clone(),
            author_href: profile_href(&comment.author.username),
            text: comment.text.clone(),
            created: format_datetime(comment.created),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub author: AuthorSummary,
    pub comments: Vec<CommentView>,
    pub can_comment: bool,
    pub comment_action: String,
}

impl PostDetailContext {
    pub fn new(detail: &PostDetail, viewer: &Viewer) -> Self {
        let post = PostCard::from_record(&detail.post, viewer);
        let comment_action = format!("{}comment/", post.detail_href);

        Self {
            author: AuthorSummary {
                username: detail.post.author.username.clone(),
                href: profile_href(&detail.post.author.username),
                post_count: detail.author_post_count,
                followers: detail.author_counts.followers,
                following: detail.author_counts.following,
            },
            comments: detail.comments.iter().map(CommentView::from).collect(),
            can_comment: viewer.is_authenticated(),
            comment_action,
            post,
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct GroupChoice {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupChoice>,
    pub no_group_selected: bool,
    pub current_image: Option<String>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
    pub form_errors: Vec<String>,
}

impl PostFormContext {
    /// An empty form for a new post.
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self::build(false, "/new/".to_string(), String::new(), None, groups, None)
    }

    /// A form pre-filled from an existing post.
    pub fn edit(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        let action = format!("{}edit/", post_href(&post.author.username, post.id));
        Self::build(
            true,
            action,
            post.text.clone(),
            post.group.as_ref().map(|group| group.id.to_string()),
            groups,
            post.image.as_deref(),
        )
    }

    /// Put submitted values and their errors back into the form.
    pub fn with_submission(
        mut self,
        text: &str,
        group: Option<&str>,
        groups: &[GroupRecord],
        errors: &FieldErrors,
    ) -> Self {
        self.text = text.to_string();
        self.groups = group_choices(groups, group);
        self.no_group_selected = self.groups.iter().all(|choice| !choice.selected);
        self.text_errors = errors.get("text").to_vec();
        self.group_errors = errors.get("group").to_vec();
        self.image_errors = errors.get("image").to_vec();
        self.form_errors = errors.non_field().to_vec();
        self
    }

    fn build(
        is_edit: bool,
        action: String,
        text: String,
        selected: Option<String>,
        groups: &[GroupRecord],
        image: Option<&str>,
    ) -> Self {
        let groups = group_choices(groups, selected.as_deref());
        let no_group_selected = groups.iter().all(|choice| !choice.selected);

        Self {
            is_edit,
            action,
            text,
            groups,
            no_group_selected,
            current_image: image.map(media_url),
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
            form_errors: Vec::new(),
        }
    }
}

fn group_choices(groups: &[GroupRecord], selected: Option<&str>) -> Vec<GroupChoice> {
    let selected = selected.map(str::trim);
    groups
        .iter()
        .map(|group| GroupChoice {
            id: group.id,
            title: group.title.clone(),
            selected: selected == Some(group.id.to_string().as_str()),
        })
        .collect()
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

#[derive(Default)]
pub struct LoginContext {
    pub username: String,
    pub next: Option<String>,
    pub form_errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

#[derive(Default)]
pub struct SignupContext {
    pub username: String,
    pub username_errors: Vec<String>,
    pub password_errors: Vec<String>,
    pub confirmation_errors: Vec<String>,
}

impl SignupContext {
    pub fn with_errors(username: &str, errors: &FieldErrors) -> Self {
        Self {
            username: username.to_string(),
            username_errors: errors.get("username").to_vec(),
            password_errors: errors.get("password").to_vec(),
            confirmation_errors: errors.get("password_confirmation").to_vec(),
        }
    }
}

#[derive(Template)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupContext>,
}

pub struct ErrorPageView {
    pub heading: String,
    pub message: String,
    pub path: Option<String>,
}

impl ErrorPageView {
    pub fn not_found(path: &str) -> Self {
        Self {
            heading: "Page not found".to_string(),
            message: "Nothing lives at this address.".to_string(),
            path: Some(path.to_string()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            heading: "Server error".to_string(),
            message: "Something went wrong on our side. Please try again later.".to_string(),
            path: None,
        }
    }
}

#[derive(Template)]
#[template(path = "misc/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[derive(Template)]
#[template(path = "misc/500.html")]
pub struct ServerErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn profile_href(username: &str) -> String {
    format!("/{username}/")
}

pub fn post_href(username: &str, post_id: i64) -> String {
    format!("/{username}/{post_id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_url(path: &str) -> String {
    format!("/media/{}", path.trim_start_matches('/'))
}

fn format_date(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATE_FORMAT).unwrap_or_default()
}

fn format_datetime(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATETIME_FORMAT).unwrap_or_default()
}

fn format_iso(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}
