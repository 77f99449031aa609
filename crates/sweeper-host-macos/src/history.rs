//! Login history from `last`

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone};
use std::sync::Arc;
use sweeper_api::{LoginEvent, TerminalKind};
use sweeper_host_api::{CommandSpec, HostResult, LoginHistory, ProcessExecutor};
use sweeper_util::Username;
use tracing::debug;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Pseudo-users `last` reports for system events
const SYSTEM_ENTRIES: [&str; 3] = ["reboot", "shutdown", "wtmp"];

/// [`LoginHistory`] read from the `last` command
pub struct LastLoginHistory {
    executor: Arc<dyn ProcessExecutor>,
}

impl LastLoginHistory {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl LoginHistory for LastLoginHistory {
    async fn login_events(&self) -> HostResult<Vec<LoginEvent>> {
        let output = self
            .executor
            .run_checked(&CommandSpec::new("/usr/bin/last"))
            .await?;
        let events = parse_last_output(&output.stdout, sweeper_util::now());
        debug!(count = events.len(), "Collected login events");
        Ok(events)
    }
}

/// Parse `last` output.
///
/// Lines look like `user tty [host] Ddd Mmm dd HH:MM ...`. `last` omits the
/// year, so each entry gets the year that puts it at or before `now`.
pub fn parse_last_output(output: &str, now: DateTime<Local>) -> Vec<LoginEvent> {
    output
        .lines()
        .filter_map(|line| parse_last_line(line, now))
        .collect()
}

fn parse_last_line(line: &str, now: DateTime<Local>) -> Option<LoginEvent> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 || SYSTEM_ENTRIES.contains(&tokens[0]) {
        return None;
    }

    let user = tokens[0];
    let tty = tokens[1];

    // The date starts at the first weekday token after the tty
    let date_at = (2..tokens.len().saturating_sub(3)).find(|&i| WEEKDAYS.contains(&tokens[i]))?;
    let host = tokens[2..date_at].join(" ");

    let month = month_number(tokens[date_at + 1])?;
    let day: u32 = tokens[date_at + 2].parse().ok()?;
    let time = NaiveTime::parse_from_str(tokens[date_at + 3], "%H:%M").ok()?;

    let time = infer_year(month, day, time, now)?;

    let terminal = if tty == "console" {
        TerminalKind::Gui
    } else if !host.is_empty() {
        TerminalKind::Ssh
    } else {
        TerminalKind::Local
    };

    Some(LoginEvent {
        username: Username::from(user),
        terminal,
        time,
    })
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn infer_year(month: u32, day: u32, time: NaiveTime, now: DateTime<Local>) -> Option<i64> {
    [now.year(), now.year() - 1]
        .into_iter()
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .filter_map(|date| Local.from_local_datetime(&date.and_time(time)).earliest())
        .find(|dt| *dt <= now)
        .map(|dt| dt.timestamp())
}
