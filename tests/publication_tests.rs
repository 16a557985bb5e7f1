mod helpers;

use std::time::Duration;

use actix_web::test;

#[actix_web::test]
async fn test_publish_assigns_share_token_and_stores_pdf() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (user_id, access) = register_and_login!(app, "ada");

    let publication = create_publication!(app, access, "On Primes");
    assert_eq!(publication["author_id"], user_id);
    assert_eq!(publication["author_name"], "ada");
    assert_eq!(publication["type"], "article");
    assert_eq!(publication["like_count"], 0);
    assert_eq!(publication["liked_by_me"], false);

    let token = publication["share_token"].as_str().unwrap();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    let pub_id = publication["id"].as_str().unwrap();
    assert!(parts.files.pdf_path(pub_id).exists());
}

#[actix_web::test]
async fn test_publish_rejects_bad_payloads() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, access) = register_and_login!(app, "ada");

    // Unknown publication type fails deserialization.
    let req = test::TestRequest::post()
        .uri("/api/publications")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .set_json(serde_json::json!({
            "title": "X",
            "type": "novel",
            "pdf_base64": "aGVsbG8="
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Garbage base64 is a validation error, not a crash.
    let req = test::TestRequest::post()
        .uri("/api/publications")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .set_json(serde_json::json!({
            "title": "X",
            "type": "article",
            "pdf_base64": "not base64!!!"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_like_toggles_and_floors() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");
    let (_, bob) = register_and_login!(app, "bob");

    let publication = create_publication!(app, ada, "On Primes");
    let pub_id = publication["id"].as_str().unwrap();

    let like = |token: String| {
        test::TestRequest::post()
            .uri(&format!("/api/publications/{}/like", pub_id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request()
    };

    let body: serde_json::Value = test::call_and_read_body_json(&app, like(bob.clone())).await;
    assert_eq!(body, serde_json::json!({ "liked": true, "like_count": 1 }));

    let body: serde_json::Value = test::call_and_read_body_json(&app, like(ada.clone())).await;
    assert_eq!(body, serde_json::json!({ "liked": true, "like_count": 2 }));

    // Second toggle from the same user unlikes.
    let body: serde_json::Value = test::call_and_read_body_json(&app, like(bob.clone())).await;
    assert_eq!(body, serde_json::json!({ "liked": false, "like_count": 1 }));

    // liked_by_me reflects the viewer, not the author.
    let req = test::TestRequest::get()
        .uri(&format!("/api/publications/{}", pub_id))
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["liked_by_me"], true);

    let req = test::TestRequest::get()
        .uri(&format!("/api/publications/{}", pub_id))
        .insert_header(("Authorization", format!("Bearer {}", bob)))
        .to_request();
    let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["liked_by_me"], false);
}

#[actix_web::test]
async fn test_feed_follows_only_and_paginates() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (ada_id, ada) = register_and_login!(app, "ada");
    let (_, bob) = register_and_login!(app, "bob");
    let (_, carol) = register_and_login!(app, "carol");

    for i in 0..5 {
        create_publication!(app, ada, &format!("ada-{}", i));
        // Distinct created_at keeps the cursor walk unambiguous.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    create_publication!(app, carol, "carol-0");

    // No follows yet: the feed is empty, not the whole site.
    let req = test::TestRequest::get()
        .uri("/api/publications/feed")
        .insert_header(("Authorization", format!("Bearer {}", bob)))
        .to_request();
    let page: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page.as_array().unwrap().len(), 0);

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", ada_id))
        .insert_header(("Authorization", format!("Bearer {}", bob)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // Walk the feed in pages of 2: newest first, no duplicates, no gaps,
    // and carol's publication never appears.
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let uri = match &cursor {
            None => "/api/publications/feed?limit=2".to_string(),
            Some(c) => format!("/api/publications/feed?limit=2&cursor={}", c),
        };
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header(("Authorization", format!("Bearer {}", bob)))
            .to_request();
        let page: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let items = page.as_array().unwrap();
        if items.is_empty() {
            break;
        }
        for item in items {
            seen.push(item["title"].as_str().unwrap().to_string());
        }
        cursor = Some(items[items.len() - 1]["created_at"].as_str().unwrap().to_string());
    }
    assert_eq!(seen, vec!["ada-4", "ada-3", "ada-2", "ada-1", "ada-0"]);
}

#[actix_web::test]
async fn test_explore_shows_everyone() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");
    let (_, bob) = register_and_login!(app, "bob");

    create_publication!(app, ada, "ada-pub");
    tokio::time::sleep(Duration::from_millis(2)).await;
    create_publication!(app, bob, "bob-pub");

    let req = test::TestRequest::get()
        .uri("/api/publications/explore")
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let page: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let titles: Vec<&str> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["bob-pub", "ada-pub"]);
}

#[actix_web::test]
async fn test_feed_rejects_malformed_cursor() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");

    let req = test::TestRequest::get()
        .uri("/api/publications/feed?cursor=yesterday")
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_pdf_served_with_cache_headers() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");

    let publication = create_publication!(app, ada, "On Primes");
    let pub_id = publication["id"].as_str().unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/publications/{}/pdf", pub_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "application/pdf"
    );
    assert_eq!(
        resp.headers().get("Cache-Control").unwrap(),
        "public, max-age=86400"
    );
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"%PDF-1.4 test");
}

#[actix_web::test]
async fn test_public_view_omits_internals() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");

    let publication = create_publication!(app, ada, "On Primes");
    let token = publication["share_token"].as_str().unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/p/{}", token))
        .to_request();
    let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["title"], "On Primes");
    assert_eq!(view["author_name"], "ada");
    assert!(view.get("author_id").is_none());
    assert!(view.get("pdf_path").is_none());
}

#[actix_web::test]
async fn test_delete_publication_author_only() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);
    let (_, ada) = register_and_login!(app, "ada");
    let (_, bob) = register_and_login!(app, "bob");

    let publication = create_publication!(app, ada, "On Primes");
    let pub_id = publication["id"].as_str().unwrap().to_string();
    assert!(parts.files.pdf_path(&pub_id).exists());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/publications/{}", pub_id))
        .insert_header(("Authorization", format!("Bearer {}", bob)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/publications/{}", pub_id))
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    assert!(!parts.files.pdf_path(&pub_id).exists());

    let req = test::TestRequest::get()
        .uri(&format!("/api/publications/{}", pub_id))
        .insert_header(("Authorization", format!("Bearer {}", ada)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
