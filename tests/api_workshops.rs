mod common;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use certgen::models::NewStudent;
use certgen::server::handlers;
use common::{template_png, workshop_form, multipart_body, text_element_json, TestEnv};

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($env.state.clone()))
                .app_data(web::Data::new($env.templates.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

async fn seed_students(env: &TestEnv) -> Vec<String> {
    let rows = [
        ("Arjun Kumar", "4SH24MC001", "MCA"),
        ("Riya Sharma", "1RV22CS045", "CSE"),
        ("Rahul Verma", "1RV22IS012", "ISE"),
    ];
    let mut ids = Vec::new();
    for (name, usn, branch) in rows {
        let student = env
            .state
            .add_student(NewStudent {
                student_name: name.to_string(),
                usn: usn.to_string(),
                gender: String::new(),
                branch: branch.to_string(),
                year: 2,
            })
            .await
            .unwrap();
        ids.push(student.id);
    }
    ids
}

fn page_count(pdf: &[u8]) -> usize {
    let text = String::from_utf8_lossy(pdf);
    text.matches("/Type /Page").count() - text.matches("/Type /Pages").count()
}

#[actix_rt::test]
async fn create_workshop_from_form() {
    let env = TestEnv::new();
    let app = app!(env);
    let cookie = env.session_cookie();

    let (content_type, body) = workshop_form("Machine Learning Fundamentals", &template_png(400, 300));
    let req = test::TestRequest::post()
        .uri("/api/workshops")
        .cookie(cookie.clone())
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let workshop = &created["workshop"];
    assert_eq!(workshop["workshopName"], "Machine Learning Fundamentals");
    assert_eq!(workshop["organizedDepartment"], "Computer Science");
    assert_eq!(workshop["students"], json!([]));
    assert!(workshop.get("templateFileId").is_none());
    assert!(workshop["certificateTemplate"].as_str().unwrap().ends_with("/view"));
    let element: Value = serde_json::from_str(workshop["textElement"].as_str().unwrap()).unwrap();
    assert_eq!(element["fontSize"], 32.0);
    assert_eq!(env.backend.file_count(), 1);

    let id = workshop["$id"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}", id))
        .cookie(cookie.clone())
        .to_request();
    let fetched: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched["workshop"]["$id"], id);

    let req = test::TestRequest::get().uri("/api/workshops").cookie(cookie).to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["workshops"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn create_workshop_rejects_bad_input() {
    let env = TestEnv::new();
    let app = app!(env);
    let cookie = env.session_cookie();

    let (content_type, body) = workshop_form("Broken Template", b"not an image");
    let req = test::TestRequest::post()
        .uri("/api/workshops")
        .cookie(cookie.clone())
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let element = text_element_json();
    let (content_type, body) = multipart_body(
        &[
            ("workshopName", "Bad Date"),
            ("resourcePerson", "Prof. Michael Chen"),
            ("date", "22/03/2024"),
            ("department", "Computer Science"),
            ("textElement", &element),
        ],
        &[("certificateTemplate", "t.png", "image/png", template_png(10, 10).as_slice())],
    );
    let req = test::TestRequest::post()
        .uri("/api/workshops")
        .cookie(cookie.clone())
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the bucket
    assert_eq!(env.backend.file_count(), 0);

    let req = test::TestRequest::get()
        .uri("/api/workshops/missing")
        .cookie(cookie)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn attendance_stats_and_certificates() {
    let env = TestEnv::new();
    let app = app!(env);
    let cookie = env.session_cookie();
    let ids = seed_students(&env).await;

    let (content_type, body) = workshop_form("Data Science with Python", &template_png(320, 240));
    let req = test::TestRequest::post()
        .uri("/api/workshops")
        .cookie(cookie.clone())
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let workshop_id = created["workshop"]["$id"].as_str().unwrap().to_string();

    // Unknown ids are rejected
    let req = test::TestRequest::put()
        .uri(&format!("/api/workshops/{}/attendance", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "student_ids": ["nobody"] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri(&format!("/api/workshops/{}/attendance", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "student_ids": [ids[2], ids[0], ids[2]] }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["workshop"]["students"], json!([ids[2], ids[0]]));

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/attendance", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let attendance: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(attendance["stats"], json!({ "present": 2, "absent": 1, "total": 3 }));

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/attendance?branch=CSE", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let attendance: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(attendance["stats"], json!({ "present": 0, "absent": 1, "total": 1 }));

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/attendees", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let attendees: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(attendees["total_attendees"], 2);
    assert_eq!(attendees["attendees"][0]["studentName"], "Arjun Kumar");

    let req = test::TestRequest::get()
        .uri("/api/dashboard")
        .cookie(cookie.clone())
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard["total_students"], 3);
    assert_eq!(dashboard["total_workshops"], 1);
    assert_eq!(dashboard["total_certificates"], 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/preview?name=Arjun%20Kumar&width=160", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
    let png = test::read_body(resp).await;
    let preview = image::load_from_memory(&png).unwrap();
    assert_eq!((preview.width(), preview.height()), (160, 120));

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/preview?blank=true", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let png = test::call_and_read_body(&app, req).await;
    let bare = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(bare.dimensions(), (320, 240));
    assert!(bare.pixels().all(|p| *p == image::Rgba([250, 245, 230, 255])));

    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/certificates/{}", workshop_id, ids[0]))
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
    let pdf = test::read_body(resp).await;
    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(page_count(&pdf), 1);

    // Riya did not attend
    let req = test::TestRequest::get()
        .uri(&format!("/api/workshops/{}/certificates/{}", workshop_id, ids[1]))
        .cookie(cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workshops/{}/certificates", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    let pdf = test::call_and_read_body(&app, req).await;
    assert_eq!(page_count(&pdf), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workshops/{}/certificates", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "student_ids": [ids[2], ids[0]] }))
        .to_request();
    let pdf = test::call_and_read_body(&app, req).await;
    assert_eq!(page_count(&pdf), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workshops/{}/certificates", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "student_ids": [ids[2], ids[1]] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workshops/{}/certificates", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "student_ids": [] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn text_element_update_and_delete() {
    let env = TestEnv::new();
    let app = app!(env);
    let cookie = env.session_cookie();

    let (content_type, body) = workshop_form("UI/UX Design Principles", &template_png(200, 140));
    let req = test::TestRequest::post()
        .uri("/api/workshops")
        .cookie(cookie.clone())
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let workshop_id = created["workshop"]["$id"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri(&format!("/api/workshops/{}/text_element", workshop_id))
        .cookie(cookie.clone())
        .set_json(json!({ "text_element": {
            "text": "Student Name", "x": 140.0, "y": -5.0, "fontSize": 24.0,
            "color": "#b45309", "fontFamily": "sans-serif", "referenceWidth": 100.0
        }}))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    let element: Value = serde_json::from_str(updated["workshop"]["textElement"].as_str().unwrap()).unwrap();
    assert_eq!(element["x"], 100.0);
    assert_eq!(element["y"], 0.0);
    assert_eq!(element["referenceWidth"], 100.0);

    let rejected = [
        json!({ "text": "Student Name", "x": 50.0, "y": 50.0, "fontSize": 24.0,
                "color": "orange", "fontFamily": "serif" }),
        json!({ "text": "Student Name", "x": 50.0, "y": 50.0, "fontSize": 10000000.0,
                "color": "#000000", "fontFamily": "serif" }),
        json!({ "text": "Student Name", "x": 50.0, "y": 50.0, "fontSize": 32.0,
                "color": "#000000", "fontFamily": "serif", "referenceWidth": 0.0001 }),
    ];
    for element in rejected {
        let req = test::TestRequest::put()
            .uri(&format!("/api/workshops/{}/text_element", workshop_id))
            .cookie(cookie.clone())
            .set_json(json!({ "text_element": element }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    let req = test::TestRequest::delete()
        .uri(&format!("/api/workshops/{}", workshop_id))
        .cookie(cookie.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert_eq!(env.backend.file_count(), 0);
    assert!(env.state.db.fetch_workshops().await.unwrap().is_empty());
}
