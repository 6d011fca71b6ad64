#[cfg(test)]
mod tests {
    use crate::auth::{AuthError, Role};
    use crate::db::companies::{
        create_company, delete_company, list_companies, register_company,
    };
    use crate::db::users::{
        NewUser, create_user, list_users, login, reset_password, signup,
        update_user_company,
    };
    use crate::error::AppError;
    use crate::test::test_utils::{
        STANDARD_PASSWORD, TestDbBuilder, create_standard_test_db, find_user_by_username,
        test_signer,
    };

    fn new_user(username: &str, role: Role, company_id: Option<i64>) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "pw".to_string(),
            role,
            company_id,
        }
    }

    #[rocket::async_test]
    async fn test_first_signup_becomes_master() {
        let test_db = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");

        let first = signup(&test_db.pool, "alice", "pw").await.unwrap();
        assert_eq!(first.role, Role::Master);
        assert_eq!(first.company_id, None);

        let second = signup(&test_db.pool, "dave", "pw").await.unwrap();
        assert_eq!(second.role, Role::Staff);
        assert_eq!(second.company_id, None);
    }

    #[rocket::async_test]
    async fn test_signup_duplicate_username_conflicts() {
        let test_db = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");

        signup(&test_db.pool, "alice", "pw").await.unwrap();
        let result = signup(&test_db.pool, "alice", "other").await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[rocket::async_test]
    async fn test_login_checks_password() {
        let test_db = create_standard_test_db().await;
        let signer = test_signer();

        let outcome = login(&test_db.pool, &signer, "acme_admin", STANDARD_PASSWORD)
            .await
            .unwrap();
        assert_eq!(outcome.user.username, "acme_admin");
        assert_eq!(outcome.user.company_name.as_deref(), Some("Acme"));
        assert_eq!(
            signer.verify(&outcome.token).unwrap().user_id().unwrap(),
            test_db.user_id("acme_admin")
        );

        let wrong = login(&test_db.pool, &signer, "acme_admin", "nope").await;
        assert!(matches!(
            wrong,
            Err(AppError::Authentication(AuthError::Credentials))
        ));

        let unknown = login(&test_db.pool, &signer, "nobody", STANDARD_PASSWORD).await;
        assert!(matches!(
            unknown,
            Err(AppError::Authentication(AuthError::Credentials))
        ));
    }

    #[rocket::async_test]
    async fn test_list_users_is_tenant_scoped() {
        let test_db = create_standard_test_db().await;
        let acme = test_db.company_id("Acme");

        let admin = test_db.context("acme_admin").await;
        let users = list_users(&test_db.pool, &admin).await.unwrap();
        assert!(!users.is_empty());
        assert!(users.iter().all(|u| u.company_id == Some(acme)));

        let master = test_db.context("root").await;
        assert_eq!(list_users(&test_db.pool, &master).await.unwrap().len(), 5);

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            list_users(&test_db.pool, &staff).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[rocket::async_test]
    async fn test_unassigned_admin_sees_no_users() {
        let test_db = TestDbBuilder::new()
            .company("Acme")
            .admin("drifter", None)
            .staff("acme_staff", Some("Acme"))
            .build()
            .await
            .expect("Failed to build test database");

        let admin = test_db.context("drifter").await;
        assert!(list_users(&test_db.pool, &admin).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn test_admin_creates_users_in_own_company_only() {
        let test_db = create_standard_test_db().await;
        let acme = test_db.company_id("Acme");
        let globex = test_db.company_id("Globex");
        let admin = test_db.context("acme_admin").await;

        let created = create_user(&test_db.pool, &admin, new_user("carol", Role::Staff, None))
            .await
            .unwrap();
        assert_eq!(created.company_id, Some(acme));
        assert_eq!(created.role, Role::Staff);

        let second_admin = create_user(
            &test_db.pool,
            &admin,
            new_user("erin", Role::Admin, Some(acme)),
        )
        .await
        .unwrap();
        assert_eq!(second_admin.role, Role::Admin);

        assert!(matches!(
            create_user(&test_db.pool, &admin, new_user("mallory", Role::Master, None)).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            create_user(
                &test_db.pool,
                &admin,
                new_user("frank", Role::Staff, Some(globex))
            )
            .await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            create_user(&test_db.pool, &admin, new_user("carol", Role::Staff, None)).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[rocket::async_test]
    async fn test_master_creates_any_role_anywhere() {
        let test_db = create_standard_test_db().await;
        let globex = test_db.company_id("Globex");
        let master = test_db.context("root").await;

        let second_master = create_user(
            &test_db.pool,
            &master,
            new_user("root2", Role::Master, None),
        )
        .await
        .unwrap();
        assert_eq!(second_master.role, Role::Master);

        let staff = create_user(
            &test_db.pool,
            &master,
            new_user("gina", Role::Staff, Some(globex)),
        )
        .await
        .unwrap();
        assert_eq!(staff.company_name.as_deref(), Some("Globex"));

        assert!(matches!(
            create_user(
                &test_db.pool,
                &master,
                new_user("hank", Role::Staff, Some(9999))
            )
            .await,
            Err(AppError::NotFound(_))
        ));

        let staff_ctx = test_db.context("acme_staff").await;
        assert!(matches!(
            create_user(&test_db.pool, &staff_ctx, new_user("ivy", Role::Staff, None)).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[rocket::async_test]
    async fn test_update_user_company() {
        let test_db = create_standard_test_db().await;
        let master = test_db.context("root").await;
        let staff_id = test_db.user_id("acme_staff");

        let moved = update_user_company(&test_db.pool, &master, staff_id, "Globex")
            .await
            .unwrap();
        assert_eq!(moved.company_id, Some(test_db.company_id("Globex")));

        let unassigned = update_user_company(&test_db.pool, &master, staff_id, "  ")
            .await
            .unwrap();
        assert_eq!(unassigned.company_id, None);

        assert!(matches!(
            update_user_company(&test_db.pool, &master, staff_id, "Initech").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update_user_company(&test_db.pool, &master, 9999, "Acme").await,
            Err(AppError::NotFound(_))
        ));

        let admin = test_db.context("acme_admin").await;
        assert!(matches!(
            update_user_company(&test_db.pool, &admin, staff_id, "Acme").await,
            Err(AppError::Authorization(_))
        ));
    }

    #[rocket::async_test]
    async fn test_reset_password_respects_tenant() {
        let test_db = create_standard_test_db().await;
        let signer = test_signer();
        let admin = test_db.context("acme_admin").await;

        reset_password(
            &test_db.pool,
            &admin,
            test_db.user_id("acme_staff"),
            "fresh-password",
        )
        .await
        .unwrap();
        assert!(
            login(&test_db.pool, &signer, "acme_staff", "fresh-password")
                .await
                .is_ok()
        );

        assert!(matches!(
            reset_password(
                &test_db.pool,
                &admin,
                test_db.user_id("globex_staff"),
                "stolen"
            )
            .await,
            Err(AppError::Authorization(_))
        ));

        let master = test_db.context("root").await;
        reset_password(
            &test_db.pool,
            &master,
            test_db.user_id("globex_staff"),
            "master-set",
        )
        .await
        .unwrap();

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            reset_password(&test_db.pool, &staff, test_db.user_id("acme_staff"), "x").await,
            Err(AppError::Authorization(_))
        ));
    }

    #[rocket::async_test]
    async fn test_register_company_creates_company_and_admin() {
        let test_db = TestDbBuilder::new()
            .master("alice")
            .build()
            .await
            .expect("Failed to build test database");
        let master = test_db.context("alice").await;

        let registered = register_company(&test_db.pool, &master, "Acme", "bob", "pw1")
            .await
            .unwrap();
        assert_eq!(registered.company.name, "Acme");
        assert_eq!(registered.admin.role, Role::Admin);
        assert_eq!(registered.admin.company_id, Some(registered.company.id));
    }

    #[rocket::async_test]
    async fn test_register_company_rolls_back_on_duplicate_admin() {
        let test_db = TestDbBuilder::new()
            .master("alice")
            .staff("bob", None)
            .build()
            .await
            .expect("Failed to build test database");
        let master = test_db.context("alice").await;

        let result = register_company(&test_db.pool, &master, "Acme", "bob", "pw1").await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let companies = list_companies(&test_db.pool, &master).await.unwrap();
        assert!(companies.iter().all(|c| c.name != "Acme"));

        let bob = find_user_by_username(&test_db.pool, "bob")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.role, Role::Staff);
    }

    #[rocket::async_test]
    async fn test_register_company_requires_master_and_unique_name() {
        let test_db = create_standard_test_db().await;

        let admin = test_db.context("acme_admin").await;
        assert!(matches!(
            register_company(&test_db.pool, &admin, "Initech", "ivan", "pw").await,
            Err(AppError::Authorization(_))
        ));
        assert!(
            find_user_by_username(&test_db.pool, "ivan")
                .await
                .unwrap()
                .is_none()
        );

        let master = test_db.context("root").await;
        assert!(matches!(
            register_company(&test_db.pool, &master, "Acme", "ivan", "pw").await,
            Err(AppError::Conflict(_))
        ));
        assert!(
            find_user_by_username(&test_db.pool, "ivan")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[rocket::async_test]
    async fn test_list_companies_by_role() {
        let test_db = create_standard_test_db().await;

        let master = test_db.context("root").await;
        assert_eq!(list_companies(&test_db.pool, &master).await.unwrap().len(), 2);

        let admin = test_db.context("globex_admin").await;
        let own = list_companies(&test_db.pool, &admin).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].name, "Globex");

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            list_companies(&test_db.pool, &staff).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[rocket::async_test]
    async fn test_delete_company_is_restricted_while_referenced() {
        let test_db = create_standard_test_db().await;
        let master = test_db.context("root").await;

        let empty = create_company(&test_db.pool, &master, "Initech").await.unwrap();
        assert!(matches!(
            create_company(&test_db.pool, &master, "Initech").await,
            Err(AppError::Conflict(_))
        ));

        assert!(matches!(
            delete_company(&test_db.pool, &master, test_db.company_id("Acme")).await,
            Err(AppError::Conflict(_))
        ));

        delete_company(&test_db.pool, &master, empty.id).await.unwrap();
        assert!(matches!(
            delete_company(&test_db.pool, &master, empty.id).await,
            Err(AppError::NotFound(_))
        ));

        let names: Vec<String> = list_companies(&test_db.pool, &master)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Acme".to_string(), "Globex".to_string()]);
    }
}
