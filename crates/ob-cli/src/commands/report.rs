//! Report command for playtime summaries.
//!
//! This module implements `oblivionis report` with various period options
//! (--week, --last-week, --day, --last-day), an optional member filter and
//! output formats (human-readable, JSON).

use std::fmt::Write;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use ob_core::MemberId;
use ob_db::{Database, Playtime};
use serde::Serialize;

/// Report period type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    LastWeek,
    Day,
    LastDay,
}

/// Period type for JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Week,
    Day,
}

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: PeriodType,
    pub timezone: String,
    pub member: Option<String>,
    /// Playtime per game, longest first.
    pub games: Vec<Playtime>,
    /// Playtime per member, longest first.
    pub members: Vec<Playtime>,
}

impl ReportData {
    fn total_seconds(&self) -> i64 {
        self.games.iter().map(|g| g.seconds).sum()
    }

    fn total_sessions(&self) -> i64 {
        self.games.iter().map(|g| g.sessions).sum()
    }
}

// ========== Period Date Calculation ==========

/// Converts a local date at midnight to UTC.
/// Handles DST ambiguity by picking the earlier time.
fn local_midnight_to_utc(local_date: NaiveDate) -> DateTime<Utc> {
    let midnight = local_date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        // Single or ambiguous (DST fall-back): use the earlier time
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // DST spring-forward gap at midnight: the day starts at 1am
            let one_am = midnight + chrono::Duration::hours(1);
            Local
                .from_local_datetime(&one_am)
                .earliest()
                .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc))
        }
    }
}

/// Calculates week boundaries (Mon 00:00 to next Mon 00:00 local time) as half-open interval.
fn week_boundaries(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = today.weekday().num_days_from_monday();
    let monday = today - chrono::Duration::days(i64::from(days_since_monday));
    let next_monday = monday + chrono::Duration::days(7);

    (local_midnight_to_utc(monday), local_midnight_to_utc(next_monday))
}

/// Calculates last week boundaries (previous Mon 00:00 to this Mon 00:00 local time).
fn last_week_boundaries(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = today.weekday().num_days_from_monday();
    let this_monday = today - chrono::Duration::days(i64::from(days_since_monday));
    let last_monday = this_monday - chrono::Duration::days(7);

    (local_midnight_to_utc(last_monday), local_midnight_to_utc(this_monday))
}

/// Calculates day boundaries (today 00:00 to tomorrow 00:00 local time).
fn day_boundaries(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let tomorrow = today + chrono::Duration::days(1);
    (local_midnight_to_utc(today), local_midnight_to_utc(tomorrow))
}

/// Calculates yesterday boundaries (yesterday 00:00 to today 00:00 local time).
fn last_day_boundaries(today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let yesterday = today - chrono::Duration::days(1);
    (local_midnight_to_utc(yesterday), local_midnight_to_utc(today))
}

/// Get boundaries for a given period, using the provided date as reference.
pub fn get_period_boundaries(period: Period, today: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    match period {
        Period::Week => week_boundaries(today),
        Period::LastWeek => last_week_boundaries(today),
        Period::Day => day_boundaries(today),
        Period::LastDay => last_day_boundaries(today),
    }
}

// ========== Duration Formatting ==========

/// Formats seconds as a duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if >= 1 minute, "Xs" below that.
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "0m".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn format_sessions(count: i64) -> String {
    if count == 1 {
        "1 session".to_string()
    } else {
        format!("{count} sessions")
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

// ========== Report Generation ==========

/// Generates report data from the database.
pub fn generate_report_data(
    db: &Database,
    period: Period,
    member: Option<&MemberId>,
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<ReportData> {
    let (period_start, period_end) = get_period_boundaries(period, today);

    let period_type = match period {
        Period::Week | Period::LastWeek => PeriodType::Week,
        Period::Day | Period::LastDay => PeriodType::Day,
    };

    let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());

    // Zero-second sessions (clamped clock skew) would only add empty bars
    let games = db
        .playtime_by_game(period_start, period_end, member)?
        .into_iter()
        .filter(|g| g.seconds > 0)
        .collect();
    let members = db
        .playtime_by_user(period_start, period_end, member)?
        .into_iter()
        .filter(|m| m.seconds > 0)
        .collect();

    Ok(ReportData {
        generated_at,
        period_start,
        period_end,
        period_type,
        timezone,
        member: member.map(ToString::to_string),
        games,
        members,
    })
}

/// Formats the period description for the report header.
fn format_period_description(report_data: &ReportData) -> String {
    let start_date = report_data.period_start.with_timezone(&Local).date_naive();

    match report_data.period_type {
        // "Week of Jan 27, 2025"
        PeriodType::Week => format!("Week of {}", start_date.format("%b %-d, %Y")),
        // "Wednesday, Jan 29, 2025"
        PeriodType::Day => format!("{}", start_date.format("%A, %b %-d, %Y")),
    }
}

fn write_playtime_rows(output: &mut String, rows: &[Playtime]) {
    let max = rows.iter().map(|r| r.seconds).max().unwrap_or(0);
    for row in rows {
        let duration = format_duration(row.seconds);
        let bar = progress_bar(row.seconds, max);
        let sessions = format_sessions(row.sessions);
        writeln!(output, "{:<30}{duration:>8}  {bar}  {sessions}", row.name).unwrap();
    }
}

/// Formats the human-readable report output.
pub fn format_report(data: &ReportData) -> String {
    let mut output = String::new();

    let period_desc = format_period_description(data);
    writeln!(output, "PLAYTIME REPORT: {period_desc}").unwrap();
    if let Some(member) = &data.member {
        writeln!(output, "Member: {member}").unwrap();
    }

    if data.games.is_empty() {
        let period_word = match data.period_type {
            PeriodType::Week => "week",
            PeriodType::Day => "day",
        };
        writeln!(output).unwrap();
        writeln!(output, "No play sessions recorded this {period_word}.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'oblivionis status' to check tracking health.").unwrap();
        return output;
    }

    writeln!(output).unwrap();
    writeln!(output, "BY GAME").unwrap();
    writeln!(output, "───────").unwrap();
    write_playtime_rows(&mut output, &data.games);

    // A single member's report has nothing to break down
    if data.member.is_none() {
        writeln!(output).unwrap();
        writeln!(output, "BY MEMBER").unwrap();
        writeln!(output, "─────────").unwrap();
        write_playtime_rows(&mut output, &data.members);
    }

    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    writeln!(output, "Total played:  {}", format_duration(data.total_seconds())).unwrap();
    writeln!(output, "Sessions:      {}", data.total_sessions()).unwrap();
    writeln!(output, "Games:         {}", data.games.len()).unwrap();

    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub generated_at: String,
    pub timezone: String,
    pub period: JsonPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    pub games: Vec<JsonPlaytime>,
    pub members: Vec<JsonPlaytime>,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub struct JsonPeriod {
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub period_type: PeriodType,
}

#[derive(Debug, Serialize)]
pub struct JsonPlaytime {
    pub name: String,
    pub seconds: i64,
    pub sessions: i64,
}

#[derive(Debug, Serialize)]
pub struct JsonTotals {
    pub seconds: i64,
    pub sessions: i64,
    pub game_count: usize,
}

fn json_rows(rows: &[Playtime]) -> Vec<JsonPlaytime> {
    rows.iter()
        .map(|row| JsonPlaytime {
            name: row.name.clone(),
            seconds: row.seconds,
            sessions: row.sessions,
        })
        .collect()
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    let local_start = data.period_start.with_timezone(&Local);
    let local_end = data.period_end.with_timezone(&Local);

    // period_end is the first moment of the next period; report the last day
    let end_date = (local_end.date_naive() - chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();

    let report = JsonReport {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: data.timezone.clone(),
        period: JsonPeriod {
            start: local_start.date_naive().format("%Y-%m-%d").to_string(),
            end: end_date,
            period_type: data.period_type,
        },
        member: data.member.clone(),
        games: json_rows(&data.games),
        members: json_rows(&data.members),
        totals: JsonTotals {
            seconds: data.total_seconds(),
            sessions: data.total_sessions(),
            game_count: data.games.len(),
        },
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run(db: &Database, period: Period, member: Option<&MemberId>, json: bool) -> Result<()> {
    let generated_at = Utc::now();
    let today = Local::now().date_naive();
    let data = generate_report_data(db, period, member, today, generated_at)?;

    if json {
        let output = format_report_json(&data)?;
        println!("{output}");
    } else {
        let output = format_report(&data);
        print!("{output}");
    }

    Ok(())
}
