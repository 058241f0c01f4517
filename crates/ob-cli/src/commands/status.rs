//! Status command for showing what has been recorded.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::SecondsFormat;

use ob_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let counts = db.counts()?;

    writeln!(writer, "Oblivionis status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Users:      {}", counts.users)?;
    writeln!(writer, "Games:      {}", counts.games)?;
    writeln!(writer, "Activities: {}", counts.activities)?;

    match db.last_activity_at()? {
        Some(at) => writeln!(
            writer,
            "Last activity: {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?,
        None => writeln!(writer, "No activities recorded.")?,
    }

    Ok(())
}
