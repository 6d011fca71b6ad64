#[cfg(test)]
mod tests {
    use crate::db::analytics::{
        GenreCount, PRACTICE_SET_SIZE, analysis, dashboard, review_set, warmup_set, weak_set,
    };
    use crate::db::questions::delete_question;
    use crate::db::results::{admin_results, my_results};
    use crate::db::users::update_user_company;
    use crate::diagnosis::PatternType;
    use crate::error::AppError;
    use crate::test::test_utils::{TestDbBuilder, create_standard_test_db};

    fn ids(session: &crate::db::questions::QuizSession) -> Vec<i64> {
        let mut ids: Vec<i64> = session.questions.iter().map(|q| q.id).collect();
        ids.sort();
        ids
    }

    #[rocket::async_test]
    async fn test_dashboard_accuracy_per_genre() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Global SQL", true, 0).await;
        test_db.record_answer("acme_staff", "Global SQL", true, 0).await;
        test_db.record_answer("acme_staff", "Global SQL", false, 0).await;
        test_db.record_answer("acme_staff", "Acme math", true, 0).await;
        // Another user's answers never leak in.
        test_db.record_answer("globex_staff", "Global SQL", false, 0).await;

        let staff = test_db.context("acme_staff").await;
        let stats = dashboard(&test_db.pool, &staff).await.unwrap();

        assert_eq!(stats.genre_stats["SQL"], 66.7);
        assert_eq!(stats.genre_stats["math"], 100.0);
        assert_eq!(
            stats.genre_counts["SQL"],
            GenreCount {
                correct: 2,
                total: 3
            }
        );
        assert_eq!(stats.review_count, 1);
    }

    #[rocket::async_test]
    async fn test_dashboard_is_empty_without_answers() {
        let test_db = create_standard_test_db().await;
        let staff = test_db.context("acme_staff").await;

        let stats = dashboard(&test_db.pool, &staff).await.unwrap();
        assert!(stats.genre_stats.is_empty());
        assert_eq!(stats.review_count, 0);
    }

    #[rocket::async_test]
    async fn test_review_set_only_covers_recent_mistakes() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Acme math", false, 10).await;
        test_db.record_answer("acme_staff", "Global SQL", false, 1).await;
        test_db.record_answer("acme_staff", "Global SQL", false, 0).await;
        test_db.record_answer("acme_staff", "Acme SQL", true, 0).await;

        let staff = test_db.context("acme_staff").await;

        let review = review_set(&test_db.pool, &staff).await.unwrap();
        assert_eq!(ids(&review), vec![test_db.question_id("Global SQL")]);

        let weak = weak_set(&test_db.pool, &staff).await.unwrap();
        let mut expected = vec![
            test_db.question_id("Global SQL"),
            test_db.question_id("Acme math"),
        ];
        expected.sort();
        assert_eq!(ids(&weak), expected);

        let stats = dashboard(&test_db.pool, &staff).await.unwrap();
        assert_eq!(stats.review_count, 1);
    }

    #[rocket::async_test]
    async fn test_review_count_ignores_questions_from_a_former_company() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Acme math", false, 0).await;

        let staff = test_db.context("acme_staff").await;
        assert_eq!(dashboard(&test_db.pool, &staff).await.unwrap().review_count, 1);

        let master = test_db.context("root").await;
        update_user_company(
            &test_db.pool,
            &master,
            test_db.user_id("acme_staff"),
            "Globex",
        )
        .await
        .unwrap();

        let moved = test_db.context("acme_staff").await;
        assert_eq!(dashboard(&test_db.pool, &moved).await.unwrap().review_count, 0);
        assert!(matches!(
            review_set(&test_db.pool, &moved).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_practice_sets_are_not_found_when_nothing_was_missed() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Global SQL", true, 0).await;
        test_db.record_answer("acme_staff", "Acme math", false, 30).await;

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            review_set(&test_db.pool, &staff).await,
            Err(AppError::NotFound(_))
        ));
        assert!(weak_set(&test_db.pool, &staff).await.is_ok());

        let other = test_db.context("globex_staff").await;
        assert!(matches!(
            weak_set(&test_db.pool, &other).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_weak_set_is_capped() {
        let mut builder = TestDbBuilder::new().staff("learner", None);
        for n in 0..15 {
            builder = builder.question(&format!("Q{}", n), "SQL", "A:B", "A", None);
        }
        let test_db = builder.build().await.expect("Failed to build test database");
        for n in 0..15 {
            test_db
                .record_answer("learner", &format!("Q{}", n), false, 0)
                .await;
        }

        let learner = test_db.context("learner").await;
        let weak = weak_set(&test_db.pool, &learner).await.unwrap();
        assert_eq!(weak.questions.len(), PRACTICE_SET_SIZE);
    }

    #[rocket::async_test]
    async fn test_weak_set_skips_deleted_questions() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Acme math", false, 0).await;

        let master = test_db.context("root").await;
        delete_question(&test_db.pool, &master, test_db.question_id("Acme math"))
            .await
            .unwrap();

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            weak_set(&test_db.pool, &staff).await,
            Err(AppError::NotFound(_))
        ));
        assert!(my_results(&test_db.pool, &staff).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn test_warmup_orders_by_global_accuracy() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Global math", true, 0).await;
        test_db.record_answer("acme_staff", "Acme SQL", true, 0).await;
        test_db.record_answer("acme_admin", "Acme SQL", false, 0).await;
        test_db.record_answer("globex_staff", "Global SQL", false, 0).await;

        let staff = test_db.context("acme_staff").await;

        let warmup = warmup_set(&test_db.pool, &staff, None, 10).await.unwrap();
        let order: Vec<i64> = warmup.questions.iter().map(|q| q.id).collect();
        assert_eq!(
            order,
            vec![
                test_db.question_id("Global math"),
                test_db.question_id("Acme SQL"),
                test_db.question_id("Global SQL"),
                test_db.question_id("Acme math"),
            ]
        );

        let top = warmup_set(&test_db.pool, &staff, None, 1).await.unwrap();
        assert_eq!(top.questions[0].id, test_db.question_id("Global math"));

        let sql = warmup_set(&test_db.pool, &staff, Some("SQL"), 10).await.unwrap();
        let titles: Vec<&str> = sql.questions.iter().map(|q| q.title.as_str()).collect();
        assert_eq!(titles, vec!["Acme SQL", "Global SQL"]);
    }

    #[rocket::async_test]
    async fn test_warmup_errors() {
        let test_db = create_standard_test_db().await;
        let staff = test_db.context("acme_staff").await;

        assert!(matches!(
            warmup_set(&test_db.pool, &staff, None, 0).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            warmup_set(&test_db.pool, &staff, Some("chemistry"), 5).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_analysis_uses_answer_history() {
        let test_db = create_standard_test_db().await;
        let staff = test_db.context("acme_staff").await;

        let fresh = analysis(&test_db.pool, &staff).await.unwrap();
        assert_eq!(fresh.pattern_type, PatternType::Beginner);
        assert_eq!(fresh.score, 0);

        for days_ago in (0..3).rev() {
            test_db.record_answer("acme_staff", "Global SQL", true, days_ago).await;
            test_db.record_answer("acme_staff", "Acme math", true, days_ago).await;
        }

        let diagnosis = analysis(&test_db.pool, &staff).await.unwrap();
        assert_eq!(diagnosis.pattern_type, PatternType::Balanced);
        assert_eq!(diagnosis.score, 100);
        assert_eq!(diagnosis.genre_stats["SQL"].count, 3);
        assert_eq!(diagnosis.genre_stats["math"].correct_rate, 100.0);
    }

    #[rocket::async_test]
    async fn test_my_results_are_private() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Global SQL", true, 1).await;
        test_db.record_answer("acme_staff", "Acme math", false, 0).await;
        test_db.record_answer("globex_staff", "Global SQL", true, 0).await;

        let staff = test_db.context("acme_staff").await;
        let results = my_results(&test_db.pool, &staff).await.unwrap();

        let titles: Vec<&str> = results.iter().map(|r| r.question_title.as_str()).collect();
        assert_eq!(titles, vec!["Acme math", "Global SQL"]);
    }

    #[rocket::async_test]
    async fn test_admin_results_are_tenant_scoped() {
        let test_db = create_standard_test_db().await;
        test_db.record_answer("acme_staff", "Global SQL", true, 0).await;
        test_db.record_answer("acme_admin", "Acme math", false, 0).await;
        test_db.record_answer("globex_staff", "Globex SQL", true, 0).await;

        let admin = test_db.context("acme_admin").await;
        let results = admin_results(&test_db.pool, &admin).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(
            results
                .iter()
                .all(|r| r.company_name.as_deref() == Some("Acme"))
        );

        let master = test_db.context("root").await;
        assert_eq!(admin_results(&test_db.pool, &master).await.unwrap().len(), 3);

        let staff = test_db.context("acme_staff").await;
        assert!(matches!(
            admin_results(&test_db.pool, &staff).await,
            Err(AppError::Authorization(_))
        ));
    }
}
