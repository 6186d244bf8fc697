#[cfg(test)]
mod tests {
    use actix_web::{test, App};

    #[actix_rt::test]
    async fn test_live_get() {
        let mut app = test::init_service(App::new().service(rugram::live::view_live)).await;
        let req = test::TestRequest::default().uri("/live").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_notifications_get() {
        let mut app =
            test::init_service(App::new().service(rugram::notifications::view_notifications))
                .await;
        let req = test::TestRequest::default()
            .uri("/notifications")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_login_form_get() {
        let mut app = test::init_service(App::new().service(rugram::login::view_login)).await;
        let req = test::TestRequest::default().uri("/login").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_register_form_get() {
        let mut app =
            test::init_service(App::new().service(rugram::create_user::create_user_get)).await;
        let req = test::TestRequest::default().uri("/register").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert!(resp.status().is_success());
    }
}
