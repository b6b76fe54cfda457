use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{
    builder::calendar,
    config::CutoffConfig,
    error::{AchError, Result},
};

/// Cutoff windows for one routing number, in its local timezone.
#[derive(Debug, Clone)]
pub struct RoutingCutoffs {
    pub routing_number: String,
    pub timezone: Tz,
    windows: Vec<NaiveTime>,
}

impl RoutingCutoffs {
    pub fn windows(&self) -> &[NaiveTime] {
        &self.windows
    }

    /// First window strictly after `now` that falls on a banking day.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.timezone).date_naive();
        for offset in 0..=14 {
            let day = today + Duration::days(offset);
            if !calendar::is_banking_day(day) {
                continue;
            }
            for window in &self.windows {
                let local = self.timezone.from_local_datetime(&day.and_time(*window));
                // a window inside a DST gap does not fire that day
                let Some(fire) = local.earliest() else {
                    continue;
                };
                let fire = fire.with_timezone(&Utc);
                if fire > now {
                    return Some(fire);
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct CutoffSchedule {
    routings: Vec<RoutingCutoffs>,
}

impl CutoffSchedule {
    pub fn from_config(cutoffs: &[CutoffConfig]) -> Result<Self> {
        if cutoffs.is_empty() {
            return Err(AchError::Config("no cutoff windows configured".to_string()));
        }

        let mut routings = Vec::with_capacity(cutoffs.len());
        for cutoff in cutoffs {
            let timezone: Tz = cutoff.timezone.parse().map_err(|_| {
                AchError::Config(format!(
                    "cutoff for {}: unknown timezone {:?}",
                    cutoff.routing_number, cutoff.timezone
                ))
            })?;
            if cutoff.windows.is_empty() {
                return Err(AchError::Config(format!(
                    "cutoff for {} has no windows",
                    cutoff.routing_number
                )));
            }
            let mut windows = cutoff
                .windows
                .iter()
                .map(|w| {
                    NaiveTime::parse_from_str(w.trim(), "%H:%M").map_err(|_| {
                        AchError::Config(format!(
                            "cutoff for {}: window {:?} is not HH:MM",
                            cutoff.routing_number, w
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            windows.sort();
            windows.dedup();

            routings.push(RoutingCutoffs {
                routing_number: cutoff.routing_number.clone(),
                timezone,
                windows,
            });
        }
        Ok(Self { routings })
    }

    pub fn routings(&self) -> &[RoutingCutoffs] {
        &self.routings
    }

    pub fn timezone_for(&self, routing_number: &str) -> Option<Tz> {
        self.routings
            .iter()
            .find(|r| r.routing_number == routing_number)
            .map(|r| r.timezone)
    }

    /// The earliest upcoming cutoff and every routing number due at that instant.
    pub fn next_cutoff(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<String>)> {
        let upcoming: Vec<(DateTime<Utc>, &str)> = self
            .routings
            .iter()
            .filter_map(|r| r.next_after(now).map(|at| (at, r.routing_number.as_str())))
            .collect();
        let earliest = upcoming.iter().map(|(at, _)| *at).min()?;
        let due = upcoming
            .iter()
            .filter(|(at, _)| *at == earliest)
            .map(|(_, routing)| routing.to_string())
            .collect();
        Some((earliest, due))
    }
}
