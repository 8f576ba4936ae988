//! Crash detection and recovery against real processes.

#![cfg(unix)]

mod common;

use std::time::Duration;

use radiovisor::{
    BackoffPolicy, Category, ControlError, DomainEvent, EventFilter, Mode, ModeParams,
    RadioControl, RetryPolicy,
};

fn stopped_events(events: &[DomainEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, DomainEvent::StatusChange(s) if !s.running))
        .count()
}

#[tokio::test]
async fn test_crash_frees_lease_and_reports_once() {
    let mut cfg = common::config();
    cfg.decode_bin = common::tools().crashing.clone();
    let control = RadioControl::builder(cfg).build();
    let mut sub = control.subscribe(EventFilter::only(&[Category::Status, Category::Reading]));

    control
        .start_mode(ModeParams::default_for(Mode::Decode))
        .await
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let ev = common::next_event(&mut sub, 5).await;
        let done = matches!(ev.as_ref(), DomainEvent::StatusChange(s) if !s.running);
        seen.push(ev.as_ref().clone());
        if done {
            break;
        }
    }
    assert!(matches!(&seen[0], DomainEvent::StatusChange(s) if s.running));
    assert!(seen.iter().any(|e| matches!(e, DomainEvent::Reading(_))));
    match seen.last() {
        Some(DomainEvent::StatusChange(s)) => assert_eq!(s.exit_code, Some(3)),
        other => panic!("unexpected last event: {other:?}"),
    }

    let status = control.status();
    assert_eq!(status.active_mode, None);
    assert!(!status.is_running(Mode::Decode));

    // No second stop event arrives later.
    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Some(ev) = sub.try_recv() {
        seen.push(ev.as_ref().clone());
    }
    assert_eq!(stopped_events(&seen), 1);

    assert!(matches!(
        control.stop_mode(Mode::Decode).await,
        Err(ControlError::NotRunning { mode: Mode::Decode })
    ));

    // The receiver is free for any mode again.
    let mut audio = ModeParams::default_for(Mode::AudioListen);
    if let ModeParams::AudioListen(p) = &mut audio {
        p.frequency = 95_000_000;
    }
    control.start_mode(audio).await.unwrap();
    control.stop_mode(Mode::AudioListen).await.unwrap();
}

#[tokio::test]
async fn test_killed_process_frees_lease_and_reports_once() {
    let control = RadioControl::builder(common::config()).build();
    let mut sub = control.subscribe(EventFilter::only(&[Category::Status, Category::Reading]));

    control
        .start_mode(ModeParams::default_for(Mode::Decode))
        .await
        .unwrap();
    let started = common::next_event(&mut sub, 5).await;
    assert!(matches!(started.as_ref(), DomainEvent::StatusChange(s) if s.running));
    let reading = common::next_event(&mut sub, 5).await;
    assert!(matches!(reading.as_ref(), DomainEvent::Reading(_)));

    let pid = control
        .status()
        .modes
        .iter()
        .find(|m| m.mode == Mode::Decode)
        .and_then(|m| m.process.pid)
        .expect("running decoder has a pid");
    // SAFETY: plain signal delivery to our own child.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    assert_eq!(rc, 0);

    let mut seen = Vec::new();
    loop {
        let ev = common::next_event(&mut sub, 5).await;
        let done = matches!(ev.as_ref(), DomainEvent::StatusChange(s) if !s.running);
        seen.push(ev.as_ref().clone());
        if done {
            break;
        }
    }
    match seen.last() {
        Some(DomainEvent::StatusChange(s)) => {
            assert_eq!(s.mode, Mode::Decode);
            assert_eq!(s.exit_code, None);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
    assert_eq!(control.status().active_mode, None);
    assert!(!control.is_running(Mode::Decode));

    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Some(ev) = sub.try_recv() {
        seen.push(ev.as_ref().clone());
    }
    assert_eq!(stopped_events(&seen), 1);

    assert!(matches!(
        control.stop_mode(Mode::Decode).await,
        Err(ControlError::NotRunning { mode: Mode::Decode })
    ));
}

#[tokio::test]
async fn test_restart_policy_respawns_until_exhausted() {
    let mut cfg = common::config();
    cfg.decode_bin = common::tools().crashing.clone();
    cfg.restart = RetryPolicy::bounded(
        2,
        BackoffPolicy {
            first: Duration::from_millis(50),
            max: Duration::from_millis(50),
            ..BackoffPolicy::default()
        },
    );
    let control = RadioControl::builder(cfg).build();
    let mut sub = control.subscribe(EventFilter::only(&[Category::Status]));

    control
        .start_mode(ModeParams::default_for(Mode::Decode))
        .await
        .unwrap();

    let mut started = 0;
    let mut stopped = 0;
    while stopped < 3 {
        match common::next_event(&mut sub, 5).await.as_ref() {
            DomainEvent::StatusChange(s) if s.running => started += 1,
            DomainEvent::StatusChange(_) => stopped += 1,
            _ => {}
        }
    }
    assert_eq!(started, 3);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sub.try_recv().is_none());
    assert_eq!(control.status().active_mode, None);
    assert_eq!(control.status().modes[0].process.restarts, 2);
}
