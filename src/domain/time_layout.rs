//! Vertical geometry for the time-ruled week view.

use crate::domain::models::Event;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub hour_height: f64,
    pub header_offset: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 23,
            hour_height: 50.0,
            header_offset: 40.0,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.end_hour <= self.start_hour {
            return Err("layout.end_hour must be after layout.start_hour".to_string());
        }
        if self.end_hour > 24 {
            return Err("layout.end_hour must be <= 24".to_string());
        }
        if self.hour_height <= 0.0 {
            return Err("layout.hour_height must be > 0".to_string());
        }
        if self.header_offset < 0.0 {
            return Err("layout.header_offset must be >= 0".to_string());
        }
        Ok(())
    }

    /// Pixel offset of the first visible hour line.
    pub fn window_top(&self) -> f64 {
        self.header_offset
    }

    pub fn window_bottom(&self) -> f64 {
        f64::from(self.end_hour - self.start_hour) * self.hour_height + self.header_offset
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SlotGeometry {
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PositionedEvent {
    pub event_id: String,
    pub column: usize,
    pub geometry: SlotGeometry,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HourMark {
    pub hour: u32,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct TimeLayoutEngine {
    config: LayoutConfig,
}

impl TimeLayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Raw geometry before visibility and clipping.
    pub fn raw_geometry(&self, start_minutes: u32, duration_minutes: u32) -> SlotGeometry {
        let since_window = f64::from(start_minutes) - f64::from(self.config.start_hour * 60);
        SlotGeometry {
            top: since_window / 60.0 * self.config.hour_height + self.config.header_offset,
            height: f64::from(duration_minutes) / 60.0 * self.config.hour_height,
        }
    }

    /// Geometry to render, or `None` when the event is outside the window
    /// for this pass.
    pub fn geometry(&self, start_minutes: u32, duration_minutes: u32) -> Option<SlotGeometry> {
        let raw = self.raw_geometry(start_minutes, duration_minutes);
        let window_top = self.config.window_top();
        let window_bottom = self.config.window_bottom();

        if raw.top < window_top || raw.top >= window_bottom {
            return None;
        }

        let height = raw.height.min(window_bottom - raw.top);
        let top = raw.top.max(window_top);
        Some(SlotGeometry { top, height })
    }

    pub fn event_geometry(&self, event: &Event) -> Option<SlotGeometry> {
        self.geometry(event.start_minutes()?, event.duration)
    }

    /// Places every visible event into the column of its day. Events on days
    /// outside `week`, or with an unparseable date/time, are skipped.
    pub fn layout_week(&self, events: &[Event], week: &[NaiveDate]) -> Vec<PositionedEvent> {
        events
            .iter()
            .filter_map(|event| {
                let day = event.naive_date()?;
                let column = week.iter().position(|candidate| *candidate == day)?;
                let geometry = self.event_geometry(event)?;
                Some(PositionedEvent {
                    event_id: event.id.clone(),
                    column,
                    geometry,
                })
            })
            .collect()
    }

    pub fn hour_marks(&self) -> Vec<HourMark> {
        (self.config.start_hour..self.config.end_hour)
            .map(|hour| HourMark {
                hour,
                label: format!("{hour:02}:00"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventCategory;
    use proptest::prelude::*;

    fn event_at(id: &str, date: &str, time: &str, duration: u32) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            duration,
            description: String::new(),
            category: EventCategory::Work,
        }
    }

    #[test]
    fn nine_oclock_hour_long_event_geometry() {
        let engine = TimeLayoutEngine::default();
        let geometry = engine.geometry(9 * 60, 60).expect("visible");
        assert_eq!(geometry.top, 190.0);
        assert_eq!(geometry.height, 50.0);
    }

    #[test]
    fn window_start_event_sits_on_header_offset() {
        let engine = TimeLayoutEngine::default();
        let geometry = engine.geometry(6 * 60, 30).expect("visible");
        assert_eq!(geometry.top, 40.0);
        assert_eq!(geometry.height, 25.0);
    }

    #[test]
    fn events_before_window_are_omitted() {
        let engine = TimeLayoutEngine::default();
        assert!(engine.geometry(5 * 60, 30).is_none());
        assert!(engine.geometry(5 * 60 + 30, 60).is_none());
    }

    #[test]
    fn events_at_or_after_window_end_are_omitted() {
        let engine = TimeLayoutEngine::default();
        assert!(engine.geometry(23 * 60, 30).is_none());
        assert!(engine.geometry(23 * 60 + 30, 15).is_none());
    }

    #[test]
    fn event_straddling_window_end_is_height_clipped() {
        let engine = TimeLayoutEngine::default();
        let geometry = engine.geometry(22 * 60 + 30, 90).expect("visible");
        assert_eq!(geometry.top, 865.0);
        assert_eq!(geometry.height, 25.0);
        assert_eq!(geometry.top + geometry.height, engine.config().window_bottom());
    }

    #[test]
    fn layout_week_assigns_columns_and_drops_hidden() {
        let engine = TimeLayoutEngine::default();
        let week: Vec<NaiveDate> = crate::domain::calendar_grid::week_grid(
            NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date"),
        );
        let events = vec![
            event_at("monday-standup", "2026-10-19", "09:00", 15),
            event_at("early-run", "2026-10-20", "05:00", 45),
            event_at("next-week", "2026-10-26", "10:00", 60),
            event_at("saturday-dinner", "2026-10-24", "19:00", 120),
        ];

        let positioned = engine.layout_week(&events, &week);
        let ids: Vec<_> = positioned.iter().map(|item| item.event_id.as_str()).collect();
        assert_eq!(ids, vec!["monday-standup", "saturday-dinner"]);
        assert_eq!(positioned[0].column, 1);
        assert_eq!(positioned[1].column, 6);
    }

    #[test]
    fn hour_marks_cover_visible_window() {
        let marks = TimeLayoutEngine::default().hour_marks();
        assert_eq!(marks.len(), 17);
        assert_eq!(marks[0].label, "06:00");
        assert_eq!(marks[16].label, "22:00");
    }

    proptest! {
        #[test]
        fn visible_geometry_stays_inside_window(start in 0u32..1440u32, duration in 1u32..600u32) {
            let engine = TimeLayoutEngine::default();
            if let Some(geometry) = engine.geometry(start, duration) {
                prop_assert!(geometry.top >= engine.config().window_top());
                prop_assert!(geometry.height > 0.0);
                prop_assert!(geometry.top + geometry.height <= engine.config().window_bottom() + 1e-9);
            } else {
                prop_assert!(start < 6 * 60 || start >= 23 * 60);
            }
        }
    }
}
