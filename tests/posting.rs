mod support;

use axum::http::{StatusCode, header};
use support::{
    MultipartBody, SMALL_GIF, TestApp, assert_redirect, body_bytes, body_to_string, location,
};

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login_with_next() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let post_id = app.store.add_post(&leo, "Hello", None);

    let cases = [
        ("/new/".to_string(), "/auth/login/?next=%2Fnew%2F".to_string()),
        ("/follow/".to_string(), "/auth/login/?next=%2Ffollow%2F".to_string()),
        (
            format!("/leo/{post_id}/edit/"),
            format!("/auth/login/?next=%2Fleo%2F{post_id}%2Fedit%2F"),
        ),
        (
            "/follow/?page=2".to_string(),
            "/auth/login/?next=%2Ffollow%2F%3Fpage%3D2".to_string(),
        ),
    ];
    for (uri, target) in cases {
        let response = app.get(&uri, None).await;
        assert_redirect(&response, &target);
    }

    let response = app
        .post_form(&format!("/leo/{post_id}/comment/"), "text=hi", None)
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("/auth/login/?next="));
    assert!(app.store.comments_on(post_id).is_empty());
}

#[tokio::test]
async fn creating_a_post_redirects_home_and_lists_it_first() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let cats = app.store.add_group("Cats", "cats");
    app.store.add_post(&leo, "Older entry", None);
    let cookie = app.session_cookie(&leo).await;

    let form_page = app.get("/new/", Some(&cookie)).await;
    assert_eq!(form_page.status(), StatusCode::OK);
    let form_html = body_to_string(form_page).await;
    assert!(form_html.contains(&format!("value=\"{}\"", cats.id)));

    let form = MultipartBody::new()
        .text("text", "Fresh from the keyboard")
        .text("group", &cats.id.to_string());
    let response = app.post_multipart("/new/", form, Some(&cookie)).await;
    assert_redirect(&response, "/");
    assert_eq!(app.store.post_count(), 2);

    let index = body_to_string(app.get("/", None).await).await;
    let fresh = index.find("Fresh from the keyboard").expect("new post listed");
    let older = index.find("Older entry").expect("old post listed");
    assert!(fresh < older);

    let group = body_to_string(app.get("/group/cats/", None).await).await;
    assert!(group.contains("Fresh from the keyboard"));
}

#[tokio::test]
async fn invalid_submissions_render_the_form_again() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let cookie = app.session_cookie(&leo).await;

    let blank = MultipartBody::new().text("text", "   ").text("group", "");
    let response = app.post_multipart("/new/", blank, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response).await;
    assert!(body.contains("class=\"error\""));

    let bad_group = MultipartBody::new()
        .text("text", "Kept text")
        .text("group", "424242");
    let response = app.post_multipart("/new/", bad_group, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response).await;
    assert!(body.contains("Select a valid choice."));
    assert!(body.contains("Kept text"));

    let not_an_image = MultipartBody::new()
        .text("text", "With a broken picture")
        .file("image", "notes.png", "image/png", b"plain text pretending");
    let response = app
        .post_multipart("/new/", not_an_image, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response).await;
    assert!(body.contains("Upload a valid image."));

    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn uploaded_images_are_stored_and_served() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let cookie = app.session_cookie(&leo).await;

    let form = MultipartBody::new()
        .text("text", "Look at this pixel")
        .file("image", "pixel.gif", "image/gif", SMALL_GIF);
    let response = app.post_multipart("/new/", form, Some(&cookie)).await;
    assert_redirect(&response, "/");

    let index = body_to_string(app.get("/", None).await).await;
    let start = index.find("src=\"/media/").expect("image rendered") + "src=\"".len();
    let end = start + index[start..].find('"').expect("closing quote");
    let media_path = index[start..end].to_string();
    assert!(media_path.starts_with("/media/posts/"));
    assert!(media_path.ends_with(".gif"));

    let media = app.get(&media_path, None).await;
    assert_eq!(media.status(), StatusCode::OK);
    assert_eq!(
        media.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/gif"
    );
    assert_eq!(body_bytes(media).await, SMALL_GIF);

    let missing = app.get("/media/posts/nothing-here.gif", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authors_edit_their_posts_in_place() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let cats = app.store.add_group("Cats", "cats");
    let post_id = app.store.add_post(&leo, "First draft", Some(&cats));
    let before = app.store.post(post_id).expect("post");
    let cookie = app.session_cookie(&leo).await;

    let form_page = app
        .get(&format!("/leo/{post_id}/edit/"), Some(&cookie))
        .await;
    assert_eq!(form_page.status(), StatusCode::OK);
    let html = body_to_string(form_page).await;
    assert!(html.contains("First draft"));
    assert!(html.contains(&format!("value=\"{}\" selected", cats.id)));

    let form = MultipartBody::new()
        .text("text", "Second draft")
        .text("group", "");
    let response = app
        .post_multipart(&format!("/leo/{post_id}/edit/"), form, Some(&cookie))
        .await;
    assert_redirect(&response, &format!("/leo/{post_id}/"));

    let after = app.store.post(post_id).expect("post");
    assert_eq!(after.text, "Second draft");
    assert_eq!(after.group, None);
    assert_eq!(after.pub_date, before.pub_date);
    assert_eq!(after.author, before.author);
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn other_users_are_redirected_to_the_post() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    let post_id = app.store.add_post(&leo, "Leo's words", None);
    let cookie = app.session_cookie(&mia).await;

    let response = app
        .get(&format!("/leo/{post_id}/edit/"), Some(&cookie))
        .await;
    assert_redirect(&response, &format!("/leo/{post_id}/"));

    let form = MultipartBody::new().text("text", "Hijacked");
    let response = app
        .post_multipart(&format!("/leo/{post_id}/edit/"), form, Some(&cookie))
        .await;
    assert_redirect(&response, &format!("/leo/{post_id}/"));
    assert_eq!(app.store.post(post_id).expect("post").text, "Leo's words");

    let wrong_owner = app
        .get(&format!("/mia/{post_id}/edit/"), Some(&cookie))
        .await;
    assert_eq!(wrong_owner.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_in_readers_comment_on_posts() {
    let app = TestApp::new();
    let leo = app.store.add_user("leo");
    let mia = app.store.add_user("mia");
    let post_id = app.store.add_post(&leo, "Open for discussion", None);
    let cookie = app.session_cookie(&mia).await;

    let detail = body_to_string(app.get(&format!("/leo/{post_id}/"), Some(&cookie)).await).await;
    assert!(detail.contains(&format!("action=\"/leo/{post_id}/comment/\"")));

    let response = app
        .post_form(
            &format!("/leo/{post_id}/comment/"),
            "text=Nice+post",
            Some(&cookie),
        )
        .await;
    assert_redirect(&response, &format!("/leo/{post_id}/"));

    let blank = app
        .post_form(&format!("/leo/{post_id}/comment/"), "text=+++", Some(&cookie))
        .await;
    assert_redirect(&blank, &format!("/leo/{post_id}/"));
    assert_eq!(app.store.comments_on(post_id), vec!["Nice post".to_string()]);

    let detail = body_to_string(app.get(&format!("/leo/{post_id}/"), None).await).await;
    assert!(detail.contains("Nice post"));
    assert!(detail.contains("href=\"/mia/\""));

    let index = body_to_string(app.get("/", None).await).await;
    assert!(index.contains("Comments (1)"));
}
