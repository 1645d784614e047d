//! Assertions over run reports and events

use species_dl::{Event, RunReport, SessionStatus, SessionSummary};
use std::path::Path;
use tokio::sync::broadcast;

/// Drain every event already sent on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Summary for the species whose display name is `name`
pub fn summary<'a>(report: &'a RunReport, name: &str) -> &'a SessionSummary {
    report
        .species
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no summary for {}", name))
}

/// Assert a species' status and number of images saved in this run
pub fn assert_session(report: &RunReport, name: &str, status: SessionStatus, accepted: usize) {
    let s = summary(report, name);
    assert_eq!(s.status, status, "status of {}", name);
    assert_eq!(s.accepted, accepted, "accepted count of {}", name);
}

/// Assert that exactly `count` image files sit in `dir`
pub fn assert_image_count(dir: &Path, count: usize) {
    let images = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("read {}: {}", dir.display(), e))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == "png" || ext == "jpg" || ext == "webp")
        })
        .count();
    assert_eq!(images, count, "images in {}", dir.display());
}
