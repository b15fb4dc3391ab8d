use std::fmt::Display;

use colored::{Color, Colorize};
use log::Level;

/// External crates only need to log warnings and errors
const ALLOWED_EXTERNAL_LEVELS: [Level; 2] = [Level::Warn, Level::Error];
const ALLOWED_LEVELS: [Level; 3] = [Level::Info, Level::Warn, Level::Error];
const VERBOSE_LEVELS: [Level; 4] = [Level::Debug, Level::Info, Level::Warn, Level::Error];

pub fn init_logger(verbose: bool) -> Result<(), log::SetLoggerError> {
    let allowed: &'static [Level] = if verbose {
        &VERBOSE_LEVELS
    } else {
        &ALLOWED_LEVELS
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_to_string(&record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| {
            let target = Target::from_str(meta.target());

            let is_allowed = allowed.contains(&meta.level());
            let is_severe = ALLOWED_EXTERNAL_LEVELS.contains(&meta.level());

            target.is_local() && is_allowed || is_severe
        })
        .chain(std::io::stderr())
        .apply()
}

enum Target {
    External(String),
    Cli,
    Client,
    Core,
    Backend,
}

impl Target {
    fn from_str(str: &str) -> Self {
        let module = str.split("::").next().unwrap_or_default();

        match module {
            "soundspot" => Self::Cli,
            "soundspot_client" => Self::Client,
            "soundspot_core" => Self::Core,
            "soundspot_impls" => Self::Backend,
            other => Target::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Cli => "CLI".bright_green(),
            Target::Client => "CLIENT".bright_purple(),
            Target::Core => "CORE".blue(),
            Target::Backend => "BACKEND".cyan(),
        };

        Display::fmt(&result, f)
    }
}

fn level_to_string(level: &Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}

/// Colors used for terminal output outside of log lines
pub enum LogColor {
    Red,
    Dimmed,
}

impl From<LogColor> for Color {
    fn from(value: LogColor) -> Self {
        match value {
            LogColor::Red => Color::Red,
            LogColor::Dimmed => Color::BrightBlack,
        }
    }
}
