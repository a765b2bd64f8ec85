//! End-to-end scenarios against in-memory stores

mod common;

use common::{NORMALIZED_PHONE, PHONE, harness, harness_with, now, seed_order, test_config};
use domain_notifications::models::{MessageTemplate, QueuedNotification};
use domain_notifications::repository::NotificationRepository;
use domain_notifications::{
    AlertKind, EnqueueError, EnqueueRequest, ErrorCategory, NotificationStatus, NotificationType,
    OrderLinks, StatsPeriod,
};
use std::time::Duration;
use strum::IntoEnumIterator;
use uuid::Uuid;

fn payment_request(order_id: Uuid) -> EnqueueRequest {
    EnqueueRequest::new(order_id, PHONE, "", NotificationType::PaymentConfirmed)
}

mod enqueue_tests {
    use super::*;

    #[tokio::test]
    async fn test_payment_confirmed_renders_total_and_items() {
        let h = harness();
        let order_id = seed_order(&h).await;

        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
        assert_eq!(row.attempts, 0);
        assert_eq!(row.scheduled_at, now(&h));
        assert!(row.message_content.contains("R$ 35.50"));
        assert!(row.message_content.contains("Feijoada"));
        assert!(row.message_content.contains("Guaraná"));
        assert!(row.message_content.contains("Maria"));
    }

    #[tokio::test]
    async fn test_phone_is_encrypted_at_rest_and_decrypted_on_read() {
        let h = harness();
        let order_id = seed_order(&h).await;
        h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        let stored = h.notifications.all().await;
        assert_ne!(stored[0].customer_phone, NORMALIZED_PHONE);
        assert!(!stored[0].customer_phone.contains("98765"));

        let read = h.services.queue.get_order_notifications(order_id).await.unwrap();
        assert_eq!(read[0].customer_phone, NORMALIZED_PHONE);
    }

    #[tokio::test]
    async fn test_customer_name_overrides_order_name() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let request = EnqueueRequest::new(order_id, PHONE, "Dona Ana", NotificationType::Ready);

        let id = h.services.queue.enqueue(request).await.unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert!(row.message_content.contains("Dona Ana"));
    }

    #[tokio::test]
    async fn test_order_created_includes_links() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let request = EnqueueRequest::new(order_id, PHONE, "", NotificationType::OrderCreated)
            .with_links(OrderLinks {
                tracking_url: Some("https://r.example.com/t/42".into()),
                payment_url: Some("https://pay.example.com/42".into()),
            });

        let id = h.services.queue.enqueue(request).await.unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert!(row.message_content.contains("https://r.example.com/t/42"));
        assert!(row.message_content.contains("https://pay.example.com/42"));
        assert!(row.message_content.contains("mesa 7"));
    }

    #[tokio::test]
    async fn test_store_template_takes_precedence() {
        let h = harness();
        h.templates
            .put(MessageTemplate {
                template_type: NotificationType::Ready,
                content: "{{customer_name}}, pedido {{order_number}} pronto!".into(),
                variables: vec!["customer_name".into(), "order_number".into()],
                is_active: true,
            })
            .await;
        let order_id = seed_order(&h).await;

        let id = h
            .services
            .queue
            .enqueue(EnqueueRequest::new(order_id, PHONE, "", NotificationType::Ready))
            .await
            .unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.message_content, "Maria, pedido A-042 pronto!");
    }

    #[tokio::test]
    async fn test_custom_message_is_sent_verbatim() {
        let h = harness();
        let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "Maria", NotificationType::Custom)
            .with_custom_message("Sua mesa está pronta.");

        let id = h.services.queue.enqueue(request).await.unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.message_content, "Sua mesa está pronta.");
    }

    #[tokio::test]
    async fn test_invalid_phone_is_rejected_without_row() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let request = EnqueueRequest::new(order_id, "12345", "", NotificationType::Ready);

        let result = h.services.queue.enqueue(request).await;

        assert!(matches!(result, Err(EnqueueError::InvalidPhone(_))));
        assert!(h.notifications.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_is_a_render_failure() {
        let h = harness();
        let result = h.services.queue.enqueue(payment_request(Uuid::new_v4())).await;

        assert!(matches!(result, Err(EnqueueError::RenderFailure(_))));
        assert!(h.notifications.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_custom_message_violates_compliance() {
        let h = harness();
        let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
            .with_custom_message("");

        let result = h.services.queue.enqueue(request).await;

        match result {
            Err(EnqueueError::ComplianceViolation(violations)) => {
                assert!(violations.iter().any(|v| v == "Message is empty"));
            }
            other => panic!("expected compliance violation, got {:?}", other),
        }
        assert!(h.notifications.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_message_violates_compliance() {
        let h = harness();
        let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
            .with_custom_message("a".repeat(4097));

        let result = h.services.queue.enqueue(request).await;

        assert!(matches!(result, Err(EnqueueError::ComplianceViolation(_))));
    }

    #[tokio::test]
    async fn test_customer_rate_limit_blocks_eleventh_message() {
        let h = harness();
        for i in 0..10 {
            let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
                .with_custom_message(format!("Mensagem {}", i));
            h.services.queue.enqueue(request).await.unwrap();
        }

        let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
            .with_custom_message("Mensagem 11");
        let result = h.services.queue.enqueue(request).await;

        match result {
            Err(EnqueueError::ComplianceViolation(violations)) => {
                assert!(violations[0].contains("Customer rate limit exceeded"));
            }
            other => panic!("expected rate limit violation, got {:?}", other),
        }
        assert_eq!(h.notifications.all().await.len(), 10);
    }

    #[tokio::test]
    async fn test_disallowed_type_is_rejected() {
        let mut config = test_config();
        config.compliance.allowed_types = vec![NotificationType::Ready];
        let h = harness_with(config);
        let order_id = seed_order(&h).await;

        let result = h.services.queue.enqueue(payment_request(order_id)).await;

        assert!(matches!(result, Err(EnqueueError::ComplianceViolation(_))));
    }
}

mod processing_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_send_marks_row_sent() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        let results = h.services.queue.process_pending_notifications().await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.sent_at, Some(now(&h)));
        assert_eq!(row.whatsapp_message_id.as_deref(), Some("wamid.1"));

        let sends = h.transport.sends();
        assert_eq!(sends[0].number, NORMALIZED_PHONE);
        assert_eq!(sends[0].text, row.message_content);
    }

    #[tokio::test]
    async fn test_network_timeout_schedules_retry_with_backoff() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("Network timeout: request timed out", 1);

        let results = h.services.queue.process_pending_notifications().await;

        assert!(!results[0].success);
        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.scheduled_at, now(&h) + chrono::Duration::milliseconds(1000));
        assert!(row.error_message.is_none());

        let logs = h.error_logs.all().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].category, ErrorCategory::Network);
        assert!(logs[0].is_retryable);
        assert_eq!(logs[0].notification_id, Some(id));
        assert_ne!(logs[0].customer_phone.as_deref(), Some(NORMALIZED_PHONE));
    }

    #[tokio::test]
    async fn test_retry_is_not_due_before_backoff_elapses() {
        let h = harness();
        let order_id = seed_order(&h).await;
        h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("Network timeout", 1);
        h.services.queue.process_pending_notifications().await;

        h.clock.advance(chrono::Duration::milliseconds(500));
        assert!(h.services.queue.process_pending_notifications().await.is_empty());

        h.clock.advance(chrono::Duration::milliseconds(500));
        let results = h.services.queue.process_pending_notifications().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }

    #[tokio::test]
    async fn test_repeated_failures_end_failed() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("Network timeout", 3);

        h.services.queue.process_pending_notifications().await;
        h.clock.advance(chrono::Duration::seconds(1));
        h.services.queue.process_pending_notifications().await;
        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.attempts, 2);
        assert_eq!(row.scheduled_at, now(&h) + chrono::Duration::seconds(2));

        h.clock.advance(chrono::Duration::seconds(2));
        h.services.queue.process_pending_notifications().await;

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.attempts, 3);
        assert_eq!(row.error_message.as_deref(), Some("Network timeout"));
        assert_eq!(h.transport.sends().len(), 3);

        // Exhausted rows are not picked up again.
        h.clock.advance(chrono::Duration::minutes(5));
        assert!(h.services.queue.process_pending_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("HTTP 400: invalid number", 1);

        h.services.queue.process_pending_notifications().await;

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.error_message.as_deref(), Some("HTTP 400: invalid number"));
        assert!(!h.error_logs.all().await[0].is_retryable);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("HTTP 503: upstream down", 1);

        h.services.queue.process_pending_notifications().await;

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_connection_error_raises_immediate_alert() {
        let h = harness();
        let order_id = seed_order(&h).await;
        h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("Connection error: connection refused", 1);

        h.services.queue.process_pending_notifications().await;

        let alerts = h.alerts.all().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CriticalError);
    }

    #[tokio::test]
    async fn test_retry_failed_resets_rows_with_attempts_left() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        h.transport.fail_always("HTTP 400: invalid number", 1);
        h.services.queue.process_pending_notifications().await;

        let reset = h.services.queue.retry_failed_notifications().await.unwrap();

        assert_eq!(reset, 1);
        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
        assert_eq!(row.attempts, 0);
        assert!(row.error_message.is_none());

        h.services.queue.process_pending_notifications().await;
        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_cancel_only_affects_pending_rows() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        assert!(h.services.queue.cancel_notification(id).await.unwrap());
        assert!(!h.services.queue.cancel_notification(id).await.unwrap());
        assert!(h.services.queue.process_pending_notifications().await.is_empty());
        assert_eq!(
            h.notifications.get(id).await.unwrap().unwrap().status,
            NotificationStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_queue_stats_delivery_rate() {
        let h = harness();
        for _ in 0..2 {
            let order_id = seed_order(&h).await;
            h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        }
        h.transport.script([Ok(()), Err("HTTP 400: invalid number".to_string())]);
        h.services.queue.process_pending_notifications().await;

        let stats = h.services.queue.get_queue_stats().await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.total_today, 2);
        assert_eq!(stats.sent_today, 1);
        assert!((stats.delivery_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_recover_interrupted_requeues_in_flight_rows() {
        let h = harness();
        let mut row = QueuedNotification::new_pending(
            Uuid::new_v4(),
            NORMALIZED_PHONE.into(),
            "lookup".into(),
            NotificationType::Ready,
            "Pedido pronto".into(),
            now(&h),
        );
        row.status = NotificationStatus::Retrying;
        row.attempts = 1;
        h.notifications.insert(&row).await.unwrap();

        assert_eq!(h.services.queue.recover_interrupted().await.unwrap(), 1);

        let row = h.notifications.get(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn test_recover_interrupted_fails_row_on_final_attempt() {
        let h = harness();
        let mut row = QueuedNotification::new_pending(
            Uuid::new_v4(),
            NORMALIZED_PHONE.into(),
            "lookup".into(),
            NotificationType::Ready,
            "Pedido pronto".into(),
            now(&h),
        );
        row.status = NotificationStatus::Retrying;
        row.attempts = 3;
        h.notifications.insert(&row).await.unwrap();

        assert_eq!(h.services.queue.recover_interrupted().await.unwrap(), 1);
        h.clock.advance(chrono::Duration::hours(1));
        assert!(h.services.queue.process_pending_notifications().await.is_empty());

        let row = h.notifications.get(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.attempts, 3);
        assert_eq!(row.error_message.as_deref(), Some("Interrupted after final attempt"));
        assert!(h.transport.sends().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_sends_in_concurrent_groups_with_delay() {
        let h = harness();
        h.transport.set_latency(Duration::from_millis(100));
        for i in 0..7 {
            let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
                .with_custom_message(format!("Mensagem {}", i));
            h.services.queue.enqueue(request).await.unwrap();
            // Distinct scheduled_at keeps the processing order deterministic.
            h.clock.advance(chrono::Duration::milliseconds(1));
        }

        let results = h.services.queue.process_pending_notifications().await;
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.success));

        let sends = h.transport.sends();
        let offset = |i: usize| sends[i].started - sends[0].started;
        // Groups of three, sent together.
        assert_eq!(offset(1), Duration::ZERO);
        assert_eq!(offset(2), Duration::ZERO);
        // Next group waits for the previous one plus the inter-group delay.
        assert_eq!(offset(3), Duration::from_millis(1100));
        assert_eq!(offset(5), Duration::from_millis(1100));
        assert_eq!(offset(6), Duration::from_millis(2200));
        assert_eq!(sends[0].text, "Mensagem 0");
        assert_eq!(sends[6].text, "Mensagem 6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_limits_one_pass() {
        let mut config = test_config();
        config.queue.batch_size = 2;
        let h = harness_with(config);
        for i in 0..3 {
            let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
                .with_custom_message(format!("Mensagem {}", i));
            h.services.queue.enqueue(request).await.unwrap();
        }

        assert_eq!(h.services.queue.process_pending_notifications().await.len(), 2);
        assert_eq!(h.services.queue.process_pending_notifications().await.len(), 1);
        assert!(h.services.queue.process_pending_notifications().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_processing_sends_after_enqueue() {
        let mut config = test_config();
        config.queue.immediate_processing = true;
        let h = harness_with(config);
        let order_id = seed_order(&h).await;

        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if h.notifications.get(id).await.unwrap().unwrap().status == NotificationStatus::Sent {
                break;
            }
        }
        assert_eq!(
            h.notifications.get(id).await.unwrap().unwrap().status,
            NotificationStatus::Sent
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_immediate_pass() {
        let mut config = test_config();
        config.queue.immediate_processing = true;
        let h = harness_with(config);
        h.transport.set_latency(Duration::from_secs(5));
        let order_id = seed_order(&h).await;

        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.sends().len(), 1);

        h.services.shutdown().await;

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Sent);
        assert_eq!(h.transport.sends().len(), 1);
    }

    #[tokio::test]
    async fn test_no_immediate_pass_after_shutdown() {
        let mut config = test_config();
        config.queue.immediate_processing = true;
        let h = harness_with(config);
        let order_id = seed_order(&h).await;
        h.services.shutdown().await;

        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();
        tokio::task::yield_now().await;

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, NotificationStatus::Pending);
        assert!(h.transport.sends().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_processing_runs_on_interval() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let id = h.services.queue.enqueue(payment_request(order_id)).await.unwrap();

        assert!(h.services.queue.start_auto_processing());
        assert!(!h.services.queue.start_auto_processing());
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(
            h.notifications.get(id).await.unwrap().unwrap().status,
            NotificationStatus::Sent
        );
        h.services.shutdown().await;
        assert!(!h.services.queue.is_auto_processing());
    }
}

mod opt_out_tests {
    use super::*;

    #[tokio::test]
    async fn test_opted_out_customer_is_rejected_for_every_type() {
        let h = harness();
        h.services
            .opt_outs
            .opt_out(PHONE, Some("PARAR".into()))
            .await
            .unwrap();
        let order_id = seed_order(&h).await;

        for notification_type in NotificationType::iter() {
            let request = EnqueueRequest::new(order_id, "+55 11 98765-4321", "", notification_type)
                .with_custom_message("Olá");
            let result = h.services.queue.enqueue(request).await;
            assert!(
                matches!(result, Err(EnqueueError::OptedOut)),
                "{} was not rejected",
                notification_type
            );
        }
        assert!(h.notifications.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_opt_out_cancels_pending_notifications() {
        let h = harness();
        let first = h
            .services
            .queue
            .enqueue(payment_request(seed_order(&h).await))
            .await
            .unwrap();
        let second = h
            .services
            .queue
            .enqueue(payment_request(seed_order(&h).await))
            .await
            .unwrap();

        let cancelled = h.services.opt_outs.opt_out("11987654321", None).await.unwrap();

        assert_eq!(cancelled, 2);
        for id in [first, second] {
            assert_eq!(
                h.notifications.get(id).await.unwrap().unwrap().status,
                NotificationStatus::Cancelled
            );
        }
        assert!(h.services.queue.process_pending_notifications().await.is_empty());
        assert!(h.transport.sends().is_empty());

        let result = h.services.queue.enqueue(payment_request(seed_order(&h).await)).await;
        assert!(matches!(result, Err(EnqueueError::OptedOut)));
    }

    #[tokio::test]
    async fn test_opt_in_allows_notifications_again() {
        let h = harness();
        h.services.opt_outs.opt_out(PHONE, None).await.unwrap();

        assert!(h.services.opt_outs.opt_in(PHONE).await.unwrap());
        assert!(!h.services.opt_outs.is_opted_out(PHONE).await);

        let result = h.services.queue.enqueue(payment_request(seed_order(&h).await)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_opt_out_statistics() {
        let h = harness();
        h.services.opt_outs.opt_out(PHONE, None).await.unwrap();
        h.services.opt_outs.opt_out("21987654321", None).await.unwrap();

        let stats = h.services.opt_outs.get_statistics().await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.today, 2);
        assert_eq!(stats.this_week, 2);
        assert_eq!(stats.this_month, 2);
    }
}

mod trigger_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_change_maps_to_notification_type() {
        let h = harness();
        let cases = [
            ("paid", NotificationType::PaymentConfirmed),
            ("in_preparation", NotificationType::Preparing),
            ("ready", NotificationType::Ready),
        ];

        for (status, expected) in cases {
            let order_id = seed_order(&h).await;
            let id = h
                .services
                .trigger
                .on_order_status_change(order_id, status, Some("pending"))
                .await
                .unwrap();
            let row = h.notifications.get(id).await.unwrap().unwrap();
            assert_eq!(row.notification_type, expected);
        }
    }

    #[tokio::test]
    async fn test_status_change_ignores_unmapped_and_unchanged() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let trigger = &h.services.trigger;

        assert!(trigger.on_order_status_change(order_id, "delivered", Some("ready")).await.is_none());
        assert!(trigger.on_order_status_change(order_id, "shipped", None).await.is_none());
        assert!(trigger.on_order_status_change(order_id, "ready", Some("ready")).await.is_none());
        assert!(h.notifications.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_event_is_skipped_while_active() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let trigger = &h.services.trigger;

        assert!(trigger.on_order_ready(order_id).await.is_some());
        assert!(trigger.on_order_ready(order_id).await.is_none());

        h.services.queue.process_pending_notifications().await;
        assert!(trigger.on_order_ready(order_id).await.is_none());
        assert_eq!(h.notifications.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_notification_can_be_triggered_again() {
        let h = harness();
        let order_id = seed_order(&h).await;
        let trigger = &h.services.trigger;
        trigger.on_order_ready(order_id).await.unwrap();
        h.transport.fail_always("HTTP 400: invalid number", 1);
        h.services.queue.process_pending_notifications().await;

        assert!(trigger.on_order_ready(order_id).await.is_some());
        assert_eq!(h.notifications.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_order_without_phone_is_skipped() {
        let h = harness();
        let order_id = Uuid::new_v4();
        let mut order = common::order(order_id);
        order.customer_phone = None;
        h.orders.put(order).await;

        assert!(h.services.trigger.on_payment_confirmed(order_id).await.is_none());
        assert!(h.notifications.all().await.is_empty());
        assert!(h.error_logs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_logged_not_raised() {
        let h = harness();
        let order_id = Uuid::new_v4();

        assert!(h.services.trigger.on_order_preparing(order_id).await.is_none());

        let logs = h.error_logs.all().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].order_id, Some(order_id));
    }

    #[tokio::test]
    async fn test_opted_out_customer_is_skipped_silently() {
        let h = harness();
        h.services.opt_outs.opt_out(PHONE, None).await.unwrap();
        let order_id = seed_order(&h).await;

        assert!(h.services.trigger.on_order_ready(order_id).await.is_none());
        assert!(h.error_logs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_order_created_with_links() {
        let h = harness();
        let order_id = seed_order(&h).await;

        let id = h
            .services
            .trigger
            .on_order_created_with_links(
                order_id,
                OrderLinks {
                    tracking_url: Some("https://r.example.com/t/42".into()),
                    payment_url: None,
                },
            )
            .await
            .unwrap();

        let row = h.notifications.get(id).await.unwrap().unwrap();
        assert_eq!(row.notification_type, NotificationType::OrderCreated);
        assert!(row.message_content.contains("https://r.example.com/t/42"));
    }
}

mod monitor_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_high_failure_rate_alert_is_deduplicated() {
        let h = harness();
        for i in 0..10 {
            let request = EnqueueRequest::new(Uuid::new_v4(), PHONE, "", NotificationType::Custom)
                .with_custom_message(format!("Mensagem {}", i));
            h.services.queue.enqueue(request).await.unwrap();
            h.clock.advance(chrono::Duration::milliseconds(1));
        }
        h.transport.fail_always("HTTP 400: invalid number", 3);
        h.services.queue.process_pending_notifications().await;

        let stats = h
            .services
            .monitor
            .get_delivery_stats(StatsPeriod::LastHour)
            .await
            .unwrap();
        assert_eq!(stats.total, 10);
        assert_eq!(stats.sent, 7);
        assert_eq!(stats.failed, 3);

        let raised = h.services.monitor.check_and_alert().await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, AlertKind::HighFailureRate);

        assert!(h.services.monitor.check_and_alert().await.unwrap().is_empty());
    }
}
