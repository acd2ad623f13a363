mod support;

use axum::http::StatusCode;
use support::{TestApp, assert_redirect, body_to_string, card_count};

#[tokio::test]
async fn following_is_idempotent_and_never_targets_yourself() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    let cookie = app.session_cookie(&mia).await;

    let first = app.post_form("/leo/follow/", "", Some(&cookie)).await;
    assert_redirect(&first, "/leo/");
    let again = app.get("/leo/follow/", Some(&cookie)).await;
    assert_redirect(&again, "/leo/");
    assert_eq!(app.store.follow_edges(), vec![(mia.id, leo.id)]);

    let own = app.post_form("/mia/follow/", "", Some(&cookie)).await;
    assert_redirect(&own, "/mia/");
    assert_eq!(app.store.follow_edges(), vec![(mia.id, leo.id)]);

    let unknown = app.post_form("/ghost/follow/", "", Some(&cookie)).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_button_reflects_follow_state() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    let cookie = app.session_cookie(&mia).await;

    let before = body_to_string(app.get("/leo/", Some(&cookie)).await).await;
    assert!(before.contains("action=\"/leo/follow/\""));

    app.store.add_follow(&mia, &leo);
    let after = body_to_string(app.get("/leo/", Some(&cookie)).await).await;
    assert!(after.contains("action=\"/leo/unfollow/\""));
    assert!(after.contains("Followers: 1"));

    // Authors see no button on their own profile.
    let own = body_to_string(app.get("/mia/", Some(&cookie)).await).await;
    assert!(!own.contains("/mia/follow/"));
    assert!(!own.contains("/mia/unfollow/"));
}

#[tokio::test]
async fn feed_lists_only_followed_authors() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    let sam = app.store.add_user("sam");
    app.store.add_post(&leo, "Written by leo", None);
    app.store.add_post(&sam, "Written by sam", None);
    app.store.add_post(&mia, "Written by mia", None);
    let cookie = app.session_cookie(&mia).await;

    let empty = body_to_string(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(card_count(&empty), 0);

    app.post_form("/leo/follow/", "", Some(&cookie)).await;
    let feed = body_to_string(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(card_count(&feed), 1);
    assert!(feed.contains("Written by leo"));
    assert!(!feed.contains("Written by sam"));
    assert!(!feed.contains("Written by mia"));

    // Sam's feed is unaffected by Mia's subscriptions.
    let sam_cookie = app.session_cookie(&sam).await;
    let sam_feed = body_to_string(app.get("/follow/", Some(&sam_cookie)).await).await;
    assert_eq!(card_count(&sam_feed), 0);

    let response = app.post_form("/leo/unfollow/", "", Some(&cookie)).await;
    assert_redirect(&response, "/leo/");
    assert!(app.store.follow_edges().is_empty());
    let feed = body_to_string(app.get("/follow/", Some(&cookie)).await).await;
    assert_eq!(card_count(&feed), 0);

    // Unfollowing twice is harmless.
    let response = app.post_form("/leo/unfollow/", "", Some(&cookie)).await;
    assert_redirect(&response, "/leo/");
}
