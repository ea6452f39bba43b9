//! 翻译管理器集成测试
//!
//! 所有测试都在 `LocalSet` 中运行，并暂停时钟以便精确控制去抖与延迟。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::LocalSet;

use xplaino::translation::constants;
use xplaino::translation::{
    DisplayMode, SessionEvent, SessionState, TextExtractor, TranslationError, ViewMode,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{
    network_tier, remote_translation, test_config, HtmlTestHelper, ManagerHarness, ScriptedRemote,
};

/// 等到已翻译数达到 `count`
async fn wait_for_progress(events: &mut broadcast::Receiver<SessionEvent>, count: usize) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Progress { translated, .. }) if translated >= count => return,
            Ok(SessionEvent::Error { code, message }) => panic!("unexpected error {}: {}", code, message),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(e) => panic!("event stream closed: {}", e),
        }
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_partial_translations() {
    let remote = Arc::new(ScriptedRemote::new().with_item_delay(Duration::from_millis(50)));
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(20),
                provider,
                20.0,
                1000.0,
                test_config(),
            );
            let mut events = harness.manager.subscribe();

            let count = harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            assert_eq!(count, 20);
            assert_eq!(harness.manager.state(), SessionState::Translating);

            wait_for_progress(&mut events, 5).await;
            harness.manager.stop_translation();

            assert_eq!(harness.manager.state(), SessionState::PartiallyTranslated);
            assert!(!harness.manager.is_observing());

            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(harness.manager.translated_count(), 5);

            let after_stop = drain(&mut events);
            assert!(after_stop
                .iter()
                .all(|e| !matches!(e, SessionEvent::Error { .. } | SessionEvent::LoginRequired)));

            let html = harness.html();
            assert_eq!(html.matches(constants::ATTR_TRANSLATED).count(), 5);
            for i in 0..5 {
                let expected = remote_translation("es", &HtmlTestHelper::paragraph_text(i));
                assert!(html.contains(&expected));
            }
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_full_translation_then_clear_restores_page() {
    let remote = Arc::new(ScriptedRemote::new());
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let html = HtmlTestHelper::paragraphs(8);
            let harness = ManagerHarness::new(&html, provider, 30.0, 800.0, test_config());
            let before = harness.html();

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            harness.manager.wait_until_settled().await;

            assert_eq!(harness.manager.state(), SessionState::FullyTranslated);
            assert_eq!(harness.manager.translated_count(), 8);
            assert!(!harness.manager.is_observing());

            let translated = harness.html();
            assert_eq!(translated.matches(constants::TRANSLATION_CLASS).count(), 8);
            for i in 0..8 {
                let text = HtmlTestHelper::paragraph_text(i);
                assert!(translated.contains(&text));
                assert!(translated.contains(&remote_translation("es", &text)));
            }
            // 已标记的元素和插入的译文节点都不会再被提取
            assert!(TextExtractor::default().extract(&harness.document).is_empty());

            harness.manager.clear_translations();

            assert_eq!(harness.manager.state(), SessionState::Idle);
            assert_eq!(harness.manager.element_count(), 0);
            assert_eq!(harness.html(), before);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_replace_mode_toggle_and_clear() {
    let remote = Arc::new(ScriptedRemote::new().with_translation("Bonjour", "Hello"));
    let provider = network_tier(remote);

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                "<html lang=\"fr\"><body><p>Bonjour</p></body></html>",
                provider,
                30.0,
                800.0,
                test_config(),
            );
            let before = harness.html();

            harness.manager.translate_page("en", DisplayMode::Replace).unwrap();
            harness.manager.wait_until_settled().await;

            let translated = harness.html();
            assert!(translated.contains(">Hello</p>"));
            assert!(translated.contains(&format!("{}=\"Bonjour\"", constants::ATTR_ORIGINAL)));

            harness.manager.toggle_view(ViewMode::Original);
            assert_eq!(harness.manager.view_mode(), ViewMode::Original);
            assert!(harness.html().contains(">Bonjour</p>"));
            assert_eq!(harness.manager.state(), SessionState::FullyTranslated);

            harness.manager.toggle_view(ViewMode::Translated);
            assert!(harness.html().contains(">Hello</p>"));

            harness.manager.clear_translations();
            let cleared = harness.html();
            assert!(!cleared.contains(constants::ATTR_ORIGINAL));
            assert!(cleared.contains(">Bonjour</p>"));
            assert_eq!(cleared, before);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_append_mode_toggle_hides_siblings() {
    let provider = network_tier(Arc::new(ScriptedRemote::new()));

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(3),
                provider,
                30.0,
                800.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            harness.manager.wait_until_settled().await;
            assert_eq!(harness.html().matches("hidden=\"\"").count(), 0);

            harness.manager.toggle_view(ViewMode::Original);
            assert_eq!(harness.html().matches("hidden=\"\"").count(), 3);

            harness.manager.toggle_view(ViewMode::Translated);
            assert_eq!(harness.html().matches("hidden=\"\"").count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_viewport_drives_translation_waves() {
    let remote = Arc::new(ScriptedRemote::new());
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(30),
                provider,
                100.0,
                300.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            settle().await;

            assert_eq!(remote.requested_ids(), vec!["0", "1", "2", "3"]);
            assert_eq!(harness.manager.translated_count(), 4);
            assert_eq!(harness.manager.state(), SessionState::Translating);

            harness.scroll_to(1000.0);
            settle().await;
            assert_eq!(harness.manager.translated_count(), 9);
            assert_eq!(remote.requests().len(), 2);

            // 回到已观察过的位置不会重复请求
            harness.scroll_to(0.0);
            settle().await;
            assert_eq!(remote.requests().len(), 2);

            harness.manager.stop_translation();
            assert_eq!(harness.manager.state(), SessionState::PartiallyTranslated);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_scroll_bursts_are_debounced_into_one_wave() {
    let remote = Arc::new(ScriptedRemote::new());
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(40),
                provider,
                100.0,
                300.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            settle().await;
            assert_eq!(remote.requests().len(), 1);

            harness.scroll_to(1000.0);
            tokio::time::sleep(Duration::from_millis(40)).await;
            harness.scroll_to(1500.0);
            tokio::time::sleep(Duration::from_millis(40)).await;
            harness.scroll_to(2000.0);
            settle().await;

            let requests = remote.requests();
            assert_eq!(requests.len(), 2);
            let ids: Vec<usize> = requests[1]
                .items
                .iter()
                .map(|item| item.id.parse().unwrap())
                .collect();
            assert_eq!(ids, (9..=23).collect::<Vec<_>>());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_large_wave_is_sent_in_batches() {
    let remote = Arc::new(ScriptedRemote::new());
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(32),
                provider,
                10.0,
                1000.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            harness.manager.wait_until_settled().await;

            let sizes: Vec<usize> = remote.requests().iter().map(|r| r.items.len()).collect();
            assert_eq!(sizes, vec![15, 15, 2]);
            assert_eq!(harness.manager.state(), SessionState::FullyTranslated);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_results_land_on_matching_elements() {
    let remote = Arc::new(ScriptedRemote::new().reversed());
    let provider = network_tier(remote);

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(10),
                provider,
                30.0,
                800.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            harness.manager.wait_until_settled().await;

            let session = harness.manager.session();
            for element in &session.elements {
                let expected =
                    remote_translation("es", &HtmlTestHelper::paragraph_text(element.index));
                assert_eq!(element.translated_text.as_deref(), Some(expected.as_str()));
            }
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_service_error_is_reported_and_state_settles() {
    let remote = Arc::new(ScriptedRemote::new().failing("SERVER_ERROR", "boom"));
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(30),
                provider,
                100.0,
                300.0,
                test_config(),
            );
            let mut events = harness.manager.subscribe();

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            settle().await;

            let received = drain(&mut events);
            assert!(received.contains(&SessionEvent::Error {
                code: "SERVER_ERROR".to_string(),
                message: "boom".to_string()
            }));
            assert_eq!(harness.manager.state(), SessionState::Idle);
            assert!(harness.manager.is_observing());

            // 新的可见元素会再次进入翻译
            harness.scroll_to(1000.0);
            settle().await;
            assert_eq!(remote.requests().len(), 2);
            assert!(drain(&mut events).contains(&SessionEvent::StateChanged(SessionState::Translating)));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_result_fails_the_pass() {
    let remote = Arc::new(ScriptedRemote::new().omitting("1"));
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(3),
                provider,
                30.0,
                800.0,
                test_config(),
            );
            let mut events = harness.manager.subscribe();

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            settle().await;

            let received = drain(&mut events);
            assert!(received.iter().any(|event| matches!(
                event,
                SessionEvent::Error { code, .. } if code == "INCOMPLETE_RESULT"
            )));
            assert_eq!(harness.manager.state(), SessionState::PartiallyTranslated);
            assert_eq!(harness.manager.translated_count(), 2);
            assert_eq!(remote.requested_ids(), vec!["0", "1", "2"]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_login_required_is_signalled() {
    let provider = network_tier(Arc::new(ScriptedRemote::new().login_required()));

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(3),
                provider,
                30.0,
                800.0,
                test_config(),
            );
            let mut events = harness.manager.subscribe();

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            settle().await;

            let received = drain(&mut events);
            assert!(received.contains(&SessionEvent::LoginRequired));
            assert!(!received.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
            assert_eq!(harness.manager.state(), SessionState::Idle);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_does_not_duplicate_translations() {
    let provider = network_tier(Arc::new(ScriptedRemote::new()));

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(4),
                provider,
                30.0,
                800.0,
                test_config(),
            );

            harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            harness.manager.wait_until_settled().await;

            let count = harness.manager.translate_page("fr", DisplayMode::Append).unwrap();
            assert_eq!(count, 4);
            harness.manager.wait_until_settled().await;

            let session = harness.manager.session();
            assert_eq!(session.target_language, "fr");
            assert_eq!(session.source_language.as_deref(), Some("en"));
            assert_eq!(session.translated_count(), 4);

            let html = harness.html();
            assert_eq!(html.matches(constants::TRANSLATION_CLASS).count(), 4);
            assert!(html.contains(&remote_translation("fr", &HtmlTestHelper::paragraph_text(0))));
            assert!(!html.contains(&remote_translation("es", &HtmlTestHelper::paragraph_text(0))));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_stays_idle() {
    let remote = Arc::new(ScriptedRemote::new());
    let provider = network_tier(remote.clone());

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                "<html><body><p>1</p><script>x()</script></body></html>",
                provider,
                30.0,
                800.0,
                test_config(),
            );

            let count = harness.manager.translate_page("es", DisplayMode::Append).unwrap();
            assert_eq!(count, 0);
            assert_eq!(harness.manager.state(), SessionState::Idle);

            harness.manager.wait_until_settled().await;
            assert!(remote.requests().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_blank_target_language_is_rejected() {
    let provider = network_tier(Arc::new(ScriptedRemote::new()));

    LocalSet::new()
        .run_until(async move {
            let harness = ManagerHarness::new(
                &HtmlTestHelper::paragraphs(2),
                provider,
                30.0,
                800.0,
                test_config(),
            );

            let result = harness.manager.translate_page("  ", DisplayMode::Append);
            assert!(matches!(result, Err(TranslationError::InvalidInput(_))));
            assert_eq!(harness.manager.state(), SessionState::Idle);
        })
        .await;
}
