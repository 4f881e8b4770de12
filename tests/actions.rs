//! Interaction-layer tests against the scripted backend

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Action, FakeBackend};
use quiesce::{
    DriveConfig, ElementInfo, Error, Key, Page, PageBackend, Provider, ScrollState, Selector,
    SelectorKind,
};

fn page_with(backend: FakeBackend) -> Page<FakeBackend> {
    Page::new(backend, Arc::new(DriveConfig::fast()))
}

// =============================================================================
// Element resolution
// =============================================================================

#[tokio::test(start_paused = true)]
async fn resolves_css_id_and_class_selectors() {
    let backend = FakeBackend::new();
    backend.add_element("#signup", 10);
    backend.add_element(".next-button", 11);
    backend.add_element("input[name='user']", 12);
    let page = page_with(backend);

    // Id and Class are sugar for their CSS forms.
    let by_id = page.get_element(&Selector::id("signup")).await.unwrap();
    let by_css = page.get_element(&Selector::css("#signup")).await.unwrap();
    assert_eq!(by_id, by_css);

    let by_class = page
        .get_element(&Selector::class("next-button"))
        .await
        .unwrap();
    assert_eq!(by_class.raw(), 11);

    let by_attr = page
        .get_element(&Selector::css("input[name='user']"))
        .await
        .unwrap();
    assert_eq!(by_attr.raw(), 12);
}

#[tokio::test(start_paused = true)]
async fn missing_element_is_a_typed_error() {
    let page = page_with(FakeBackend::new());

    let err = page
        .get_element(&Selector::xpath("//button[@id='go']"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        Error::ElementNotFound {
            kind: SelectorKind::XPath,
            ..
        }
    ));

    let err = page.get_element(&Selector::css("#nope")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ElementNotFound {
            kind: SelectorKind::Css,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn bulk_selectors_are_rejected_by_single_element_ops() {
    let page = page_with(FakeBackend::new());

    let err = page
        .get_element(&Selector::css_all("li.item"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSelector { .. }));

    let err = page
        .get_elements(&Selector::css("li.item"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedSelector { .. }));
}

#[tokio::test(start_paused = true)]
async fn bulk_query_returns_empty_vec_when_nothing_matches() {
    let backend = FakeBackend::new();
    backend.add_element("li.item", 1);
    backend.add_element("li.item", 2);
    let page = page_with(backend);

    let found = page.get_elements(&Selector::css_all("li.item")).await.unwrap();
    assert_eq!(found.len(), 2);

    // Zero matches is the empty list, not an error.
    let found = page.get_elements(&Selector::css_all("li.gone")).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_for_polls_until_the_element_appears() {
    let backend = FakeBackend::new();
    let page = page_with(backend);

    let late = Selector::id("late");
    let waiter = page.wait_for(&late, 5_000);
    let inserter = async {
        tokio::time::sleep(Duration::from_millis(700)).await;
        page.backend().add_element("#late", 42);
    };

    let (found, ()) = tokio::join!(waiter, inserter);
    assert_eq!(found.unwrap().raw(), 42);
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out_with_a_typed_error() {
    let page = page_with(FakeBackend::new());
    let err = page.wait_for(&Selector::id("never"), 500).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

// =============================================================================
// Typing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn line_breaks_become_enter_presses() {
    let backend = FakeBackend::new();
    backend.add_element("#box", 1);
    let page = page_with(backend);

    page.type_text(&Selector::css("#box"), "hi\nyo").await.unwrap();

    let actions = page.backend().actions();
    assert_eq!(
        actions,
        vec![
            Action::Focus(1),
            Action::TypeChar('h'),
            Action::TypeChar('i'),
            Action::PressKey(Key::Enter),
            Action::TypeChar('y'),
            Action::TypeChar('o'),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn single_line_text_never_presses_enter() {
    let backend = FakeBackend::new();
    backend.add_element("#box", 1);
    let page = page_with(backend);

    page.type_text(&Selector::css("#box"), "plain").await.unwrap();

    let actions = page.backend().actions();
    assert!(!actions.contains(&Action::PressKey(Key::Enter)));
    assert_eq!(
        actions.iter().filter(|a| matches!(a, Action::TypeChar(_))).count(),
        5
    );
}

#[tokio::test(start_paused = true)]
async fn typing_refocuses_when_the_page_steals_focus() {
    let backend = FakeBackend::new();
    backend.add_element("#box", 1);
    backend.drop_focus_after_chars(2);
    let page = page_with(backend);

    page.type_text(&Selector::css("#box"), "abcd").await.unwrap();

    let focuses = page
        .backend()
        .actions()
        .iter()
        .filter(|a| matches!(a, Action::Focus(1)))
        .count();
    assert_eq!(focuses, 2, "expected a refocus after focus was stolen");
}

// =============================================================================
// Clearing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn clear_input_multi_clicks_then_deletes() {
    let backend = FakeBackend::new();
    backend.add_element("#field", 7);
    let page = page_with(backend);

    page.clear_input(&Selector::css("#field")).await.unwrap();

    let actions = page.backend().actions();
    match &actions[0] {
        Action::Click { element, count } => {
            assert_eq!(*element, 7);
            assert!((3..=6).contains(count), "click count {} out of range", count);
        }
        other => panic!("expected a click first, got {:?}", other),
    }
    assert_eq!(actions.last(), Some(&Action::PressKey(Key::Delete)));
}

// =============================================================================
// Clicking
// =============================================================================

#[tokio::test(start_paused = true)]
async fn try_click_settled_reports_absent_elements_without_clicking() {
    let page = page_with(FakeBackend::new());

    let clicked = page
        .try_click_settled(&Selector::id("interstitial"), Provider::Generic)
        .await
        .unwrap();
    assert!(!clicked);
    assert!(page.backend().actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_settled_subscribes_before_dispatching_the_click() {
    let backend = FakeBackend::new();
    backend.add_element("#go", 3);
    backend.emit_navigation_on_click("frame-1", "https://example.com/step2");
    let page = page_with(backend);

    page.click_settled(&Selector::css("#go"), Provider::Generic)
        .await
        .unwrap();

    let actions = page.backend().actions();
    let subscribe_at = actions.iter().position(|a| *a == Action::Subscribe);
    let click_at = actions
        .iter()
        .position(|a| matches!(a, Action::Click { .. }));
    assert!(
        subscribe_at.unwrap() < click_at.unwrap(),
        "listener must be attached before the click"
    );
}

// =============================================================================
// Dropdowns
// =============================================================================

#[tokio::test(start_paused = true)]
async fn select_option_uses_native_selection_for_css_kinds() {
    let backend = FakeBackend::new();
    backend.add_element("#month", 5);
    let page = page_with(backend);

    page.select_option(&Selector::id("month"), "3").await.unwrap();

    assert_eq!(
        page.backend().actions(),
        vec![Action::SelectValue {
            css: "#month".into(),
            value: "3".into(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn select_option_derives_a_plain_match_for_xpath() {
    let backend = FakeBackend::new();
    backend.add_xpath_element("//select[contains(@class,'country')]", 9);
    backend.add_element("[name='country']", 9);
    backend.set_info(
        9,
        ElementInfo {
            tag: "select".into(),
            id: Some("ctry".into()),
            name: Some("country".into()),
            class_name: Some("country wide".into()),
        },
    );
    let page = page_with(backend);

    page.select_option(
        &Selector::xpath("//select[contains(@class,'country')]"),
        "DE",
    )
    .await
    .unwrap();

    assert!(page.backend().actions().contains(&Action::SelectValue {
        css: "[name='country']".into(),
        value: "DE".into(),
    }));
}

#[tokio::test(start_paused = true)]
async fn select_option_fails_when_no_plain_match_is_derivable() {
    let backend = FakeBackend::new();
    backend.add_xpath_element("//select", 9);
    backend.set_info(9, ElementInfo::default());
    let page = page_with(backend);

    let err = page
        .select_option(&Selector::xpath("//select"), "DE")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SelectorUnderivable(_)));
}

// =============================================================================
// Scrolling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn scroll_to_bottom_reaches_the_document_end() {
    let backend = FakeBackend::new();
    backend.set_scroll(ScrollState {
        scroll_y: 0.0,
        viewport_height: 800.0,
        document_height: 4000.0,
    });
    let page = page_with(backend);

    page.scroll_to_bottom().await.unwrap();

    let state = page.backend().scroll_state().await.unwrap();
    assert!(state.at_bottom());

    // Bottom seeking only ever moves down.
    for action in page.backend().actions() {
        if let Action::ScrollBy(dy) = action {
            assert!(dy > 0.0);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn scroll_to_element_ends_with_scroll_into_view() {
    let backend = FakeBackend::new();
    backend.add_element("#deep", 21);
    backend.set_element_top(21, 2600.0);
    backend.set_scroll(ScrollState {
        scroll_y: 0.0,
        viewport_height: 900.0,
        document_height: 4000.0,
    });
    let page = page_with(backend);

    page.scroll_to_element(&Selector::css("#deep"), 200, 400)
        .await
        .unwrap();

    let actions = page.backend().actions();
    assert_eq!(actions.last(), Some(&Action::ScrollIntoView(21)));

    // The initial jump lands above the element, not past it.
    if let Some(Action::ScrollBy(first)) = actions
        .iter()
        .find(|a| matches!(a, Action::ScrollBy(_)))
    {
        assert!(*first > 0.0 && *first < 2600.0);
    } else {
        panic!("expected an initial jump");
    }
}
