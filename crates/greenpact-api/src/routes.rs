use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, chat, complaints, contracts, crops, demands, greenbot, prices, ratings, users};

/// Every HTTP route of the API. WebSocket entry points, static media and
/// the CORS/trace layers are added by the server binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/user/signup/", post(auth::signup))
        .route("/user/login/", post(auth::login))
        .route("/user/login/admin/", post(auth::admin_login))
        .route("/user/token/refresh/", post(auth::refresh))
        .route("/crops/prices/", get(prices::all_prices))
        .route("/crops/prices/{state}", get(prices::state_prices))
        .route("/crops/prices/commodity/{name}", get(prices::commodity_prices))
        .route("/greenbot/chat/", post(greenbot::chat));

    let protected_routes = Router::new()
        // Users
        .route("/user/profile/", get(users::own_profile).put(users::update_own_profile))
        .route("/user/profile/{username}/", get(users::get_profile).put(users::update_profile))
        .route("/user/verify/", get(users::pending_verifications))
        .route(
            "/user/verify/{username}/",
            get(users::verification_detail).put(users::set_verification),
        )
        .route("/user/allusers/", get(users::verified_users))
        .route("/user/allusers/{username}/", get(users::get_profile).delete(users::remove_user))
        // Listings
        .route("/crops/detail/", get(crops::list_crops).post(crops::create_crop))
        .route(
            "/crops/detail/{id}",
            get(crops::get_crop).put(crops::update_crop).delete(crops::delete_crop),
        )
        .route("/crops/detail/curr/{username}/", get(crops::crops_of_user))
        .route("/demands/", get(demands::list_demands).post(demands::create_demand))
        .route(
            "/demands/{id}",
            get(demands::get_demand).put(demands::update_demand).delete(demands::delete_demand),
        )
        .route("/demands/curr/{username}/", get(demands::demands_of_user))
        // Contracts
        .route("/contracts/", get(contracts::list_contracts).post(contracts::create_contract))
        .route("/contracts/allcontracts/", get(contracts::all_contracts))
        .route(
            "/contracts/{id}/",
            get(contracts::get_contract)
                .put(contracts::update_contract)
                .delete(contracts::delete_contract),
        )
        .route("/contracts/{id}/approve/", post(contracts::approve))
        .route("/contracts/transaction/", post(contracts::create_transaction))
        .route("/contracts/transaction/user/", get(contracts::my_transactions))
        .route(
            "/contracts/transaction/{id}/",
            get(contracts::contract_transactions)
                .put(contracts::update_transaction)
                .delete(contracts::delete_transaction),
        )
        .route("/contracts/alltransaction/", get(contracts::all_transactions))
        .route("/contracts/progress/", post(contracts::create_progress))
        .route(
            "/contracts/progress/{id}/",
            get(contracts::contract_progress).delete(contracts::delete_progress),
        )
        .route("/contracts/progress/detail/{id}/", get(contracts::payment_progress))
        .route("/contracts/allprogress/", get(contracts::all_progress))
        .route("/contracts/facematch/", post(contracts::face_match))
        // Chat
        .route("/chat/rooms/", get(chat::list_rooms))
        .route("/chat/create/", get(chat::list_rooms).post(chat::create_room))
        .route("/chat/unread-notifications/", get(chat::unread_notifications))
        .route("/chat/mark-read/{id}", post(chat::mark_read))
        .route("/chat/{room}", get(chat::room_history).post(chat::send_message))
        // Ratings
        .route("/ratings/", post(ratings::create_rating))
        .route(
            "/ratings/{key}/",
            get(ratings::ratings_of_user)
                .put(ratings::update_rating)
                .delete(ratings::delete_rating),
        )
        .route("/ratings/update/image/{id}/", delete(ratings::delete_rating_image))
        // Complaints
        .route("/complaints/", get(complaints::list_complaints).post(complaints::create_complaint))
        .route(
            "/complaints/{id}/",
            get(complaints::get_complaint)
                .put(complaints::update_complaint)
                .patch(complaints::update_complaint)
                .delete(complaints::delete_complaint),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{self, FailingAdvisor, FailingRenderer, admin, app, app_with, encoded, token};

    async fn call(router: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn farmer_signup() -> Value {
        json!({
            "username": "ravi",
            "password": "wheatfield42",
            "role": "farmer",
            "name": "Ravi Kumar",
            "phoneno": "9876543210",
            "address": "Village Rampur, Punjab",
            "image": encoded("face.jpg", b"ravi-face"),
            "aadhar_image": encoded("aadhar.jpg", b"ravi-aadhar"),
            "signature": encoded("sign.png", b"ravi-sign"),
            "qr_code_image": encoded("upi.png", b"ravi-upi"),
        })
    }

    fn contractor_signup() -> Value {
        json!({
            "username": "kiran",
            "password": "buyersmarket9",
            "role": "contractor",
            "name": "Kiran Traders",
            "phoneno": "9123456780",
            "address": "Mandi Road, Ludhiana",
            "gstin": "03ABCDE1234F1Z5",
            "aadhar_image": encoded("aadhar.jpg", b"kiran-aadhar"),
            "signature": encoded("sign.png", b"kiran-sign"),
        })
    }

    #[tokio::test]
    async fn anonymous_requests_are_turned_away() {
        let app = app().await;
        let router = build_router(app.state.clone());

        let (status, body) = call(&router, Method::GET, "/contracts/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication credentials were not provided.");

        let (status, _) = call(&router, Method::GET, "/complaints/", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_reports_field_errors() {
        let app = app().await;
        let router = build_router(app.state.clone());

        let mut weak = farmer_signup();
        weak["password"] = json!("short");
        let (status, body) = call(&router, Method::POST, "/user/signup/", None, Some(weak)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["password"].is_array());

        let mut no_qr = farmer_signup();
        no_qr.as_object_mut().unwrap().remove("qr_code_image");
        let (status, body) = call(&router, Method::POST, "/user/signup/", None, Some(no_qr)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["qr_code_image"].is_array());

        let (status, _) = call(&router, Method::POST, "/user/signup/", None, Some(farmer_signup())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&router, Method::POST, "/user/signup/", None, Some(farmer_signup())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["username"].is_array());
    }

    #[tokio::test]
    async fn contract_from_signup_to_full_payment() {
        let app = app().await;
        let router = build_router(app.state.clone());
        let root = token(&app.state, &admin(&app.state));

        for body in [farmer_signup(), contractor_signup()] {
            let (status, reply) = call(&router, Method::POST, "/user/signup/", None, Some(body)).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(reply["success"], "User registered successfully");
        }

        let login = json!({ "username": "ravi", "password": "wheatfield42" });
        let (status, body) = call(&router, Method::POST, "/user/login/", None, Some(login.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Wait for the admin to verify your profile");

        let (status, pending) = call(&router, Method::GET, "/user/verify/", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["farmer"].as_array().unwrap().len(), 1);
        assert_eq!(pending["contractor"].as_array().unwrap().len(), 1);
        for username in ["ravi", "kiran"] {
            let uri = format!("/user/verify/{}/", username);
            let (status, _) = call(&router, Method::PUT, &uri, Some(&root), Some(json!({ "is_verified": true }))).await;
            assert_eq!(status, StatusCode::OK);
        }

        // Phone numbers work as the login identifier too.
        let by_phone = json!({ "username": "9876543210", "password": "wheatfield42" });
        let (status, body) = call(&router, Method::POST, "/user/login/", None, Some(by_phone)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["role"], "farmer");
        let farmer = body["access"].as_str().unwrap().to_string();

        let login = json!({ "username": "kiran", "password": "buyersmarket9" });
        let (_, body) = call(&router, Method::POST, "/user/login/", None, Some(login)).await;
        let buyer = body["access"].as_str().unwrap().to_string();

        let crop = json!({
            "crop_name": "Wheat",
            "crop_price": 2200,
            "quantity": 50,
            "harvested_time": "2026-04-10",
            "location": "Rampur",
            "crop_image": encoded("wheat.jpg", b"golden"),
        });
        let (status, _) = call(&router, Method::POST, "/crops/detail/", Some(&buyer), Some(crop.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, crop) = call(&router, Method::POST, "/crops/detail/", Some(&farmer), Some(crop)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(crop["crop_image"].as_str().unwrap().contains("/media/crop/image/"));

        let proposal = json!({
            "farmer_username": "ravi",
            "crop_id": crop["crop_id"],
            "nego_price": 2100,
            "quantity": 10,
            "delivery_address": "Mandi Road, Ludhiana",
            "delivery_date": "2026-05-01",
            "terms": ["Moisture below 12%"],
        });
        let (status, contract) = call(&router, Method::POST, "/contracts/", Some(&buyer), Some(proposal)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(contract["total_price"], 21000);
        assert_eq!(contract["status"], false);
        let id = contract["contract_id"].as_str().unwrap().to_string();

        let approve = format!("/contracts/{}/approve/", id);
        let (status, _) = call(&router, Method::POST, &approve, Some(&buyer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, approved) = call(&router, Method::POST, &approve, Some(&farmer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], true);
        let pdf = approved["pdf_url"].as_str().unwrap().to_string();
        let relative = pdf.split("/media/").nth(1).unwrap();
        let bytes = std::fs::read(app.state.media.root().join(relative)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        for (amount, reference) in [(12000, "UTR-1"), (9000, "UTR-2")] {
            let payment = json!({
                "contract_id": id,
                "amount": amount,
                "date": "2026-05-02",
                "reference_number": reference,
                "receipt": encoded("receipt.png", reference.as_bytes()),
            });
            let (status, _) = call(&router, Method::POST, "/contracts/transaction/", Some(&buyer), Some(payment)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let detail = format!("/contracts/progress/detail/{}/", id);
        let (status, progress) = call(&router, Method::GET, &detail, Some(&farmer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["total_paid"], 21000);
        assert_eq!(progress["remaining_amount"], 0);
        assert_eq!(progress["payment_complete"], true);

        let report = json!({ "contract_id": id, "current_status": "Harvested", "date": "2026-04-12" });
        let (status, _) = call(&router, Method::POST, "/contracts/progress/", Some(&farmer), Some(report)).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, reports) = call(&router, Method::GET, &format!("/contracts/progress/{}/", id), Some(&buyer), None).await;
        assert_eq!(reports["data"][0]["current_status"], "Harvested");

        let selfie = json!({ "image": encoded("live.jpg", b"ravi-live") });
        let (status, body) = call(&router, Method::POST, "/contracts/facematch/", Some(&farmer), Some(selfie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Verification"], true);

        let (status, _) = call(&router, Method::GET, "/contracts/allcontracts/", Some(&farmer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, all) = call(&router, Method::GET, "/contracts/allcontracts/", Some(&root), None).await;
        assert_eq!(all["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approval_survives_a_broken_renderer() {
        let app = app_with(Arc::new(test_support::EchoAdvisor), Arc::new(test_support::FixedPrices), Arc::new(FailingRenderer)).await;
        let router = build_router(app.state.clone());
        let farmer = test_support::account(&app.state, "ravi", greenpact_types::models::Role::Farmer, true);
        let buyer = test_support::account(&app.state, "kiran", greenpact_types::models::Role::Contractor, true);
        let crop = test_support::crop_of(&app.state, &farmer);
        let contract = test_support::contract_between(&app.state, &farmer, &buyer, crop);

        let uri = format!("/contracts/{}/approve/", contract.id);
        let (status, body) = call(&router, Method::POST, &uri, Some(&token(&app.state, &farmer)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], true);
        assert!(body["pdf_url"].is_null());
    }

    #[tokio::test]
    async fn price_views_hide_market_detail() {
        let app = app().await;
        let router = build_router(app.state.clone());

        let (status, body) = call(&router, Method::GET, "/crops/prices/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["market"], "Azadpur");

        let (_, body) = call(&router, Method::GET, "/crops/prices/Punjab", None, None).await;
        assert!(body["data"][0].get("market").is_none());
        assert_eq!(body["data"][0]["state"], "Punjab");

        let (status, page) = call(&router, Method::GET, "/crops/prices/commodity/Wheat?page=2&page_size=2", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 3);
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
        assert!(page["next"].is_null());

        let (status, body) = call(&router, Method::GET, "/crops/prices/commodity/Wheat?page=9", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid page.");
    }

    #[tokio::test]
    async fn greenbot_threads_the_history() {
        let app = app().await;
        let router = build_router(app.state.clone());

        let ask = json!({ "message": "When to sow wheat?", "history": [] });
        let (status, body) = call(&router, Method::POST, "/greenbot/chat/", None, Some(ask)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "echo: When to sow wheat?");
        assert_eq!(body["history"].as_array().unwrap().len(), 2);
        assert_eq!(body["history"][1]["role"], "assistant");

        let broken = app_with(Arc::new(FailingAdvisor), Arc::new(test_support::FixedPrices), Arc::new(crate::documents::PdfContractRenderer)).await;
        let router = build_router(broken.state.clone());
        let ask = json!({ "message": "hello", "history": [] });
        let (status, body) = call(&router, Method::POST, "/greenbot/chat/", None, Some(ask)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "upstream unavailable");
    }
}
