mod common;

use area_toolkit::transport::recording::Request;
use area_toolkit::transport::{CrossingEvent, EventKind, ModifierMask, ProtocolEvent};
use area_toolkit::{
    Button, ButtonEvent, Display, KeyEvent, Rect, WidgetEvent, WidgetId, WidgetOptions,
};

use common::{catcher_window, key_press, open, pointer, press, release, Log, Recorder};

const XK_A: u32 = 0x61;

/// Top-level at (10, 20) with two children, the first one consuming keys
struct Window {
    top: WidgetId,
    eager: WidgetId,
    passive: WidgetId,
}

fn window(display: &Display, log: &Log) -> Window {
    let root = display.default_root().unwrap();
    let top = display
        .create_widget(
            root,
            WidgetOptions::top_level(Rect::new(10, 20, 200, 200), "input"),
            Recorder::new(log),
        )
        .unwrap();
    let eager = display
        .create_widget(top, WidgetOptions::new(Rect::new(0, 0, 50, 50)), Recorder::consuming(log))
        .unwrap();
    let passive = display
        .create_widget(top, WidgetOptions::new(Rect::new(100, 0, 50, 50)), Recorder::new(log))
        .unwrap();
    display.map(top).unwrap();
    log.take();
    Window { top, eager, passive }
}

fn key(keysym: u32) -> KeyEvent {
    KeyEvent {
        keysym,
        ..KeyEvent::default()
    }
}

#[test]
fn test_request_focus_moves_focus_inside_top_level() {
    let (display, handle) = open();
    let log = Log::new();
    let w = window(&display, &log);
    assert_eq!(display.focus_widget(w.top).unwrap(), Some(w.top));
    assert!(!display.has_primary_focus(w.top).unwrap());

    // Without primary focus the request claims it
    display.request_focus(w.eager).unwrap();
    assert!(display.has_primary_focus(w.top).unwrap());
    assert!(display.has_focus(w.eager).unwrap());
    assert_eq!(log.input(), vec![(w.eager, WidgetEvent::FocusIn(None))]);
    log.take();

    display.request_focus(w.passive).unwrap();
    assert_eq!(
        log.input(),
        vec![
            (w.eager, WidgetEvent::FocusOut(Some(w.passive))),
            (w.passive, WidgetEvent::FocusIn(Some(w.eager))),
        ]
    );
    log.take();

    // Server focus changes on the top-level
    let top_window = display.window_handle(w.top).unwrap();
    handle.push_event(ProtocolEvent::new(top_window, EventKind::FocusOut));
    display.process_pending_events().unwrap();
    assert_eq!(log.input(), vec![(w.passive, WidgetEvent::FocusOut(None))]);
    assert!(!display.has_focus(w.passive).unwrap());
    log.take();

    display.set_default_focus(w.eager).unwrap();
    handle.push_event(ProtocolEvent::new(top_window, EventKind::FocusIn));
    handle.push_event(ProtocolEvent::new(top_window, EventKind::FocusIn));
    display.process_pending_events().unwrap();
    assert_eq!(log.input(), vec![(w.eager, WidgetEvent::FocusIn(None))]);
    assert_eq!(display.focus_widget(w.top).unwrap(), Some(w.eager));
}

#[test]
fn test_destroying_focus_widget_returns_focus_to_top_level() {
    let (display, _handle) = open();
    let log = Log::new();
    let w = window(&display, &log);
    display.request_focus(w.passive).unwrap();
    display.set_default_focus(w.passive).unwrap();

    display.destroy(w.passive).unwrap();
    assert_eq!(display.focus_widget(w.top).unwrap(), Some(w.top));
}

#[test]
fn test_keys_bubble_from_focus_widget_to_top_level() {
    let (display, handle) = open();
    let log = Log::new();
    let w = window(&display, &log);

    // Reported on any descendant, routed through the focus widget
    display.request_focus(w.passive).unwrap();
    log.take();
    let eager_window = display.window_handle(w.eager).unwrap();
    handle.push_event(key_press(eager_window, XK_A));
    display.process_pending_events().unwrap();
    assert_eq!(
        log.input(),
        vec![
            (w.passive, WidgetEvent::KeyPress(key(XK_A))),
            (w.top, WidgetEvent::KeyPress(key(XK_A))),
        ]
    );
    log.take();

    // A consuming handler stops the bubble
    display.request_focus(w.eager).unwrap();
    log.take();
    handle.push_event(key_press(eager_window, XK_A));
    display.process_pending_events().unwrap();
    assert_eq!(log.input(), vec![(w.eager, WidgetEvent::KeyPress(key(XK_A)))]);
    log.take();

    // Insensitive widgets are skipped
    display.set_sensitive(w.eager, false).unwrap();
    log.take();
    handle.push_event(key_press(eager_window, XK_A));
    display.process_pending_events().unwrap();
    assert_eq!(log.input(), vec![(w.top, WidgetEvent::KeyPress(key(XK_A)))]);
}

#[test]
fn test_keys_outside_top_levels_are_dropped() {
    let (display, handle) = open();
    let log = Log::new();
    let root = display.default_root().unwrap();
    let plain = display
        .create_widget(root, WidgetOptions::new(Rect::sized(10, 10)), Recorder::new(&log))
        .unwrap();
    handle.push_event(key_press(display.window_handle(plain).unwrap(), XK_A));
    display.process_pending_events().unwrap();
    assert!(log.input().is_empty());
}

#[test]
fn test_wheel_notch_bubbles_on_release() {
    let (display, handle) = open();
    let log = Log::new();
    let w = window(&display, &log);
    display.request_focus(w.passive).unwrap();
    log.take();
    let passive_window = display.window_handle(w.passive).unwrap();

    // Root (50, 60) is (40, 40) inside the top-level at (10, 20)
    handle.push_event(press(passive_window, Button::WHEEL_UP, pointer(5, 5, 50, 60, 100)));
    handle.push_event(release(passive_window, Button::WHEEL_UP, pointer(5, 5, 50, 60, 101)));
    handle.push_event(release(passive_window, Button::WHEEL_DOWN, pointer(5, 5, 50, 60, 102)));
    display.process_pending_events().unwrap();

    let notch = |button, time, delta| WidgetEvent::Wheel {
        event: ButtonEvent {
            button,
            pointer: pointer(40, 40, 50, 60, time),
        },
        delta,
    };
    assert_eq!(
        log.input(),
        vec![
            (w.passive, notch(Button::WHEEL_UP, 101, 120)),
            (w.top, notch(Button::WHEEL_UP, 101, 120)),
            (w.passive, notch(Button::WHEEL_DOWN, 102, -120)),
            (w.top, notch(Button::WHEEL_DOWN, 102, -120)),
        ]
    );
}

#[test]
fn test_wheel_outside_top_level_is_a_plain_button() {
    let (display, handle) = open();
    let log = Log::new();
    let root = display.default_root().unwrap();
    let panel = display
        .create_widget(root, WidgetOptions::new(Rect::new(300, 300, 40, 40)), Recorder::new(&log))
        .unwrap();
    let inner = display
        .create_widget(panel, WidgetOptions::new(Rect::new(10, 10, 10, 10)), Recorder::new(&log))
        .unwrap();
    let inner_window = display.window_handle(inner).unwrap();

    handle.push_event(press(inner_window, Button::WHEEL_DOWN, pointer(1, 1, 311, 312, 7)));
    display.process_pending_events().unwrap();

    assert_eq!(
        log.input(),
        vec![(
            panel,
            WidgetEvent::ButtonPress(ButtonEvent {
                button: Button::WHEEL_DOWN,
                pointer: pointer(11, 12, 311, 312, 7),
            })
        )]
    );
}

#[test]
fn test_second_press_within_interval_is_double_click() {
    let (display, handle) = open();
    let log = Log::new();
    let root = display.default_root().unwrap();
    let target = display
        .create_widget(root, WidgetOptions::new(Rect::sized(20, 20)), Recorder::new(&log))
        .unwrap();
    let window = display.window_handle(target).unwrap();

    for (button, time) in [
        (Button::LEFT, 1000),
        (Button::LEFT, 1200),
        (Button::LEFT, 1300),
        (Button::LEFT, 2000),
        (Button::RIGHT, 2100),
    ] {
        handle.push_event(press(window, button, pointer(1, 1, 1, 1, time)));
    }
    display.process_pending_events().unwrap();

    let kinds: Vec<(Button, u32, bool)> = log
        .events_for(target)
        .into_iter()
        .map(|event| match event {
            WidgetEvent::ButtonPress(e) => (e.button, e.pointer.time, false),
            WidgetEvent::ButtonDoubleClick(e) => (e.button, e.pointer.time, true),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            (Button::LEFT, 1000, false),
            (Button::LEFT, 1200, true),
            // The click timer restarts after a double click
            (Button::LEFT, 1300, false),
            (Button::LEFT, 2000, false),
            (Button::RIGHT, 2100, false),
        ]
    );
    assert_eq!(display.known_event_time().unwrap(), 2100);
}

#[test]
fn test_crossings_name_the_child_window() {
    let (display, handle) = open();
    let log = Log::new();
    let w = window(&display, &log);
    let top_window = display.window_handle(w.top).unwrap();
    let crossing = CrossingEvent {
        x: 3,
        y: 4,
        subwindow: Some(display.window_handle(w.eager).unwrap()),
        time: 9,
        ..CrossingEvent::default()
    };
    handle.push_event(ProtocolEvent::new(top_window, EventKind::Leave(crossing)));
    display.process_pending_events().unwrap();
    assert_eq!(
        log.input(),
        vec![(
            w.top,
            WidgetEvent::Leave {
                child: Some(w.eager),
                event: crossing,
            }
        )]
    );
}

/// Two overlapping popups: P1 at (100, 100) and P2 at (130, 130), 50x50
struct Popups {
    p1: WidgetId,
    p2: WidgetId,
    catcher: u32,
}

fn popups(display: &Display, handle: &area_toolkit::transport::recording::RecordingHandle, log: &Log) -> Popups {
    let root = display.default_root().unwrap();
    let p1 = display
        .create_widget(root, WidgetOptions::popup(Rect::new(100, 100, 50, 50)), Recorder::new(log))
        .unwrap();
    let p2 = display
        .create_widget(root, WidgetOptions::popup(Rect::new(130, 130, 50, 50)), Recorder::new(log))
        .unwrap();
    handle.take_requests();
    display.map(p1).unwrap();
    display.map(p2).unwrap();
    let requests = handle.take_requests();
    let catcher = catcher_window(&requests).unwrap();
    assert!(requests.contains(&Request::GrabPointer { window: catcher, time: 0 }));
    assert!(requests.contains(&Request::GrabKeyboard { window: catcher, time: 0 }));
    assert_eq!(display.active_popups(0).unwrap(), vec![p1, p2]);
    log.take();
    Popups { p1, p2, catcher }
}

fn motion(window: u32, root_x: i32, root_y: i32, time: u32) -> ProtocolEvent {
    ProtocolEvent::new(window, EventKind::Motion(pointer(0, 0, root_x, root_y, time)))
}

#[test]
fn test_button_drag_stays_with_pressed_popup() {
    let (display, handle) = open();
    let log = Log::new();
    let p = popups(&display, &handle, &log);

    handle.push_event(press(p.catcher, Button::LEFT, pointer(0, 0, 120, 120, 10)));
    let mut held = pointer(0, 0, 140, 140, 11);
    held.state = ModifierMask::BUTTON1;
    handle.push_event(ProtocolEvent::new(p.catcher, EventKind::Motion(held)));
    let mut up = pointer(0, 0, 140, 140, 12);
    up.state = ModifierMask::BUTTON1;
    handle.push_event(release(p.catcher, Button::LEFT, up));
    handle.push_event(motion(p.catcher, 170, 170, 13));
    display.process_pending_events().unwrap();

    let mut moved = held;
    moved.x = 40;
    moved.y = 40;
    let mut released = up;
    released.x = 40;
    released.y = 40;
    assert_eq!(
        log.input(),
        vec![
            (p.p1, WidgetEvent::synthetic_enter()),
            (
                p.p1,
                WidgetEvent::ButtonPress(ButtonEvent {
                    button: Button::LEFT,
                    pointer: pointer(20, 20, 120, 120, 10),
                })
            ),
            // Inside P2 as well, but the press pinned P1
            (p.p1, WidgetEvent::Motion(moved)),
            (
                p.p1,
                WidgetEvent::ButtonRelease(ButtonEvent {
                    button: Button::LEFT,
                    pointer: released,
                })
            ),
            (p.p1, WidgetEvent::synthetic_leave()),
            (p.p2, WidgetEvent::synthetic_enter()),
            (p.p2, WidgetEvent::Motion(pointer(40, 40, 170, 170, 13))),
        ]
    );
}

#[test]
fn test_press_outside_goes_to_topmost_popup() {
    let (display, handle) = open();
    let log = Log::new();
    let p = popups(&display, &handle, &log);

    handle.push_event(press(p.catcher, Button::LEFT, pointer(0, 0, 500, 10, 3)));
    display.process_pending_events().unwrap();
    assert_eq!(
        log.input(),
        vec![
            (p.p2, WidgetEvent::synthetic_enter()),
            (
                p.p2,
                WidgetEvent::ButtonPress(ButtonEvent {
                    button: Button::LEFT,
                    pointer: pointer(370, -120, 500, 10, 3),
                })
            ),
        ]
    );

    // Lowering P2 makes P1 the target for outside presses
    assert!(display.lower_popup(p.p2).unwrap());
    assert_eq!(display.active_popups(0).unwrap(), vec![p.p2, p.p1]);
}

#[test]
fn test_popup_keys_and_release() {
    let (display, handle) = open();
    let log = Log::new();
    let p = popups(&display, &handle, &log);

    handle.push_event(key_press(p.catcher, XK_A));
    display.process_pending_events().unwrap();
    assert_eq!(log.input(), vec![(p.p2, WidgetEvent::KeyPress(key(XK_A)))]);
    log.take();

    // Pointer inside P2, then P2 closes: it gets a leave, the grab stays
    handle.push_event(motion(p.catcher, 170, 170, 20));
    display.process_pending_events().unwrap();
    log.take();
    handle.take_requests();
    display.unmap(p.p2).unwrap();
    assert_eq!(
        log.input(),
        vec![(p.p2, WidgetEvent::synthetic_leave())]
    );
    assert!(!handle
        .requests()
        .iter()
        .any(|request| matches!(request, Request::UngrabPointer)));

    // Last popup out releases the grab at the last known event time
    display.destroy(p.p1).unwrap();
    let requests = handle.take_requests();
    assert!(requests.contains(&Request::UngrabPointer));
    assert!(requests.contains(&Request::UngrabKeyboard));
    assert!(display.active_popups(0).unwrap().is_empty());
    assert_eq!(display.known_event_time().unwrap(), 20);

    // Mapping a popup again re-grabs on the same catcher
    display.map(p.p2).unwrap();
    assert!(handle
        .take_requests()
        .contains(&Request::GrabPointer { window: p.catcher, time: 20 }));
}

#[test]
fn test_non_popup_cannot_join_grab() {
    let (display, _handle) = open();
    let log = Log::new();
    let w = window(&display, &log);
    assert!(display.lower_popup(w.top).is_ok_and(|lowered| !lowered));
    assert!(display.active_popups(0).unwrap().is_empty());
}
