mod helpers;

use actix_web::test;

#[actix_web::test]
async fn test_missing_typeset_binary_reported_as_unprocessable() {
    let mut parts = helpers::test_parts();
    parts.config.typeset_bin = "violeta-no-such-binary".to_string();
    let app = test_app!(parts);

    let req = test::TestRequest::post()
        .uri("/api/compile")
        .set_json(serde_json::json!({
            "source": "\\documentclass{article}\\begin{document}hi\\end{document}"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Typesetting binary unavailable");
}

#[actix_web::test]
async fn test_bad_asset_base64_rejected() {
    let parts = helpers::test_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::post()
        .uri("/api/compile")
        .set_json(serde_json::json!({
            "source": "\\documentclass{article}",
            "assets": [{ "name": "figure.png", "data_base64": "not base64!!!" }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Invalid base64 for asset figure.png");
}
